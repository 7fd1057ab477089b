use thiserror::Error;

/// Error type for all vargrid operations.
///
/// Every error carries a human-readable message naming the offending
/// identifier (array, row, column, field or file). Only malformed individual
/// cells are recoverable during a scan; every other kind aborts the current
/// query.
#[derive(Debug, Error)]
pub enum VarGridError {
    /// Malformed or contradictory query configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Unknown field or field type mismatch.
    #[error("schema error: {0}")]
    Schema(String),

    /// Missing array, row, contig or sample.
    #[error("not found: {0}")]
    NotFound(String),

    /// A cell violates the array invariants (e.g. `END < c_begin`).
    #[error("data error: {0}")]
    Data(String),

    /// Underlying storage or file I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Compression or decompression failure.
    #[error("codec error: {0}")]
    Codec(String),

    /// API misuse: double free, use after close.
    #[error("state error: {0}")]
    State(String),
}

/// Result alias used throughout the vargrid workspace.
pub type Result<T> = std::result::Result<T, VarGridError>;
