//! Storage back-end and codec contracts.
//!
//! The array store is an external collaborator. The engine consumes it
//! through two small traits: [`ArrayBackend`] opens named arrays inside a
//! workspace, and [`ArrayHandle`] scans one array in `(column, row)` order
//! with attribute projection. [`mem`](crate::mem) provides the embedded
//! reference implementation.
//!
//! The codec registry lives here too because both the storage layer and the
//! genotype-block emitters compress through it.

use crate::cell::{Cell, CellHeader};
use std::io::Write;
use std::path::Path;
use vargrid_core::interval::RangeList;
use vargrid_core::{Result, VarGridError};

/// Inclusive row and column bounds of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayDomain {
    /// Inclusive `(lo, hi)` row bounds.
    pub rows: (u64, u64),
    /// Inclusive `(lo, hi)` column bounds.
    pub columns: (u64, u64),
}

/// One scan's parameters: projection, ranges, read-window bound.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Attributes to decode; empty means all.
    pub attributes: Vec<String>,
    /// Normalized row ranges; empty means all rows.
    pub row_ranges: RangeList,
    /// Normalized column ranges.
    pub column_ranges: RangeList,
    /// Per-attribute in-flight window bound in bytes.
    pub segment_size: u64,
}

/// An opened array.
///
/// A handle walks cells in column-major `(column, row)` order:
/// [`advance`](ArrayHandle::advance) steps to the next cell and returns its
/// coordinates, [`current`](ArrayHandle::current) borrows its projected
/// fields. The borrow is valid only until the next `advance`.
pub trait ArrayHandle {
    /// Row and column bounds of the array.
    fn domain(&self) -> ArrayDomain;

    /// Starts a scan; any previous scan state is discarded.
    fn scan(&mut self, request: ScanRequest) -> Result<()>;

    /// Steps to the next cell, returning its coordinates, or `None` at the
    /// end of the scan.
    fn advance(&mut self) -> Result<Option<CellHeader>>;

    /// The cell `advance` last returned.
    ///
    /// # Errors
    ///
    /// `State` when no scan is active or the scan is exhausted.
    fn current(&self) -> Result<Cell<'_>>;

    /// Closes the handle; all later calls fail with `State`.
    fn close(&mut self) -> Result<()>;
}

impl std::fmt::Debug for dyn ArrayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn ArrayHandle")
            .field("domain", &self.domain())
            .finish()
    }
}

/// Opens arrays inside a workspace.
pub trait ArrayBackend: Send + Sync {
    /// Opens a named array.
    ///
    /// # Errors
    ///
    /// `NotFound` when the workspace holds no array of that name.
    fn open_array(&self, workspace: &Path, array: &str) -> Result<Box<dyn ArrayHandle>>;
}

/// Compression codec kinds the registry can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    /// gzip framing (RFC 1952).
    Gzip,
    /// Raw zlib stream (RFC 1950); the genotype-block codec.
    Zlib,
    /// Zstandard.
    Zstd,
}

/// A one-shot compressor.
pub trait Codec {
    /// Compresses `src`, appending to `dst`.
    ///
    /// # Errors
    ///
    /// `Codec` on any failure in the underlying implementation.
    fn compress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<()>;
}

/// Builds a codec of the requested kind and level.
pub fn create_codec(kind: CodecKind, level: u32) -> Box<dyn Codec> {
    match kind {
        CodecKind::Gzip => Box::new(GzipCodec { level }),
        CodecKind::Zlib => Box::new(ZlibCodec { level }),
        CodecKind::Zstd => Box::new(ZstdCodec {
            level: level as i32,
        }),
    }
}

struct GzipCodec {
    level: u32,
}

impl Codec for GzipCodec {
    fn compress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<()> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(self.level));
        encoder
            .write_all(src)
            .and_then(|_| encoder.finish())
            .map(|out| dst.extend_from_slice(&out))
            .map_err(|e| VarGridError::Codec(format!("gzip: {e}")))
    }
}

struct ZlibCodec {
    level: u32,
}

impl Codec for ZlibCodec {
    fn compress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<()> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(self.level));
        encoder
            .write_all(src)
            .and_then(|_| encoder.finish())
            .map(|out| dst.extend_from_slice(&out))
            .map_err(|e| VarGridError::Codec(format!("zlib: {e}")))
    }
}

struct ZstdCodec {
    level: i32,
}

impl Codec for ZstdCodec {
    fn compress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<()> {
        zstd::encode_all(src, self.level)
            .map(|out| dst.extend_from_slice(&out))
            .map_err(|e| VarGridError::Codec(format!("zstd: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_zlib_codec_round_trip() {
        let payload = b"ACGTACGTACGTACGTACGTACGT".repeat(64);
        let mut dst = Vec::new();
        create_codec(CodecKind::Zlib, 6)
            .compress(&payload, &mut dst)
            .unwrap();
        assert!(dst.len() < payload.len(), "repetitive payload must shrink");

        let mut decoder = flate2::read::ZlibDecoder::new(dst.as_slice());
        let mut back = Vec::new();
        decoder.read_to_end(&mut back).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_zstd_codec_round_trip() {
        let payload = b"ACGTACGTACGTACGTACGTACGT".repeat(64);
        let mut dst = Vec::new();
        create_codec(CodecKind::Zstd, 3)
            .compress(&payload, &mut dst)
            .unwrap();
        let back = zstd::decode_all(dst.as_slice()).unwrap();
        assert_eq!(back, payload);
    }
}
