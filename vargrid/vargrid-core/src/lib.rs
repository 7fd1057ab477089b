//! Core types for the vargrid variant array engine
//!
//! vargrid persists genomic variant calls in a columnar, sparse, two-dimensional
//! array: rows are callsets (samples), columns are genomic positions flattened
//! across concatenated contigs. This crate provides the pieces shared by the
//! query and export crates:
//!
//! - **Metadata resolution**: callset map (row → sample), VID map
//!   (column → contig/position plus field schemas), reference genome identity
//! - **Query configuration**: JSON document, JSON string and binary payloads,
//!   all normalizing to the same internal state, with concurrency-rank
//!   selection over vector-valued fields
//! - **Interval arithmetic**: range normalization and domain intersection on
//!   the flattened column axis
//! - **Error handling**: the `VarGridError` kinds shared across the workspace
//!
//! ## Coordinate conventions
//!
//! Column coordinates are 0-based offsets on the flattened axis; genomic
//! positions are 1-based within a contig. `ContigMap` converts between the
//! two in `O(log contigs)`.

#![warn(missing_docs)]

/// Query configuration documents and normalization.
pub mod config;
/// Contig offsets and column ↔ genomic coordinate conversion.
pub mod contig;
/// Error kinds shared across the vargrid workspace.
pub mod error;
/// Field type descriptors and the name → type registry.
pub mod fields;
/// Range normalization and intersection on the column/row axes.
pub mod interval;
/// Callset and VID document loaders and the immutable metadata resolver.
pub mod metadata;

pub use config::{QueryConfig, QueryDocument, DEFAULT_SEGMENT_SIZE};
pub use contig::{ContigInfo, ContigMap, GenomicInterval};
pub use error::{Result, VarGridError};
pub use fields::{FieldClass, FieldKind, FieldRegistry, FieldType};
pub use metadata::Metadata;
