//! Contig offsets and coordinate conversion.
//!
//! Every contig owns a disjoint span on the flattened column axis. A column
//! coordinate `c` maps to the unique contig whose span contains it; the
//! genomic position within that contig is 1-based, so column
//! `contig.offset` is genomic position 1 of that contig.

use crate::error::{Result, VarGridError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A reference sequence with its span on the flattened column axis.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContigInfo {
    /// Contig name (e.g. "chr1", "1").
    pub name: String,
    /// Contig length in base pairs.
    pub length: u64,
    /// Starting offset on the flattened column axis.
    pub offset: u64,
}

impl ContigInfo {
    /// Inclusive column span `[offset, offset + length)` end bound.
    fn span_end(&self) -> u64 {
        self.offset + self.length
    }
}

/// A genomic interval in 1-based inclusive coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenomicInterval {
    /// Contig name.
    pub contig_name: String,
    /// 1-based inclusive start position.
    pub start: u64,
    /// 1-based inclusive end position.
    pub end: u64,
}

/// Offset-sorted contig lookup table.
///
/// Supports both directions of the coordinate mapping: column → (contig,
/// 1-based position) via binary search over offsets, and (contig, position) →
/// column via the name index.
#[derive(Debug, Clone, Default)]
pub struct ContigMap {
    // Sorted ascending by offset.
    contigs: Vec<ContigInfo>,
    by_name: HashMap<String, usize>,
}

impl ContigMap {
    /// Builds a map from contig entries, validating that spans are disjoint.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error on duplicate names or overlapping spans.
    pub fn new(mut contigs: Vec<ContigInfo>) -> Result<Self> {
        contigs.sort_by_key(|c| c.offset);
        let mut by_name = HashMap::with_capacity(contigs.len());
        for (idx, contig) in contigs.iter().enumerate() {
            if by_name.insert(contig.name.clone(), idx).is_some() {
                return Err(VarGridError::Config(format!(
                    "duplicate contig '{}' in vid mapping",
                    contig.name
                )));
            }
            if idx > 0 {
                let prev = &contigs[idx - 1];
                if prev.span_end() > contig.offset {
                    return Err(VarGridError::Config(format!(
                        "contig '{}' (offset {}) overlaps '{}' (offset {}, length {})",
                        contig.name, contig.offset, prev.name, prev.offset, prev.length
                    )));
                }
            }
        }
        Ok(ContigMap { contigs, by_name })
    }

    /// Number of contigs.
    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    /// True when the map holds no contigs.
    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    /// Contig entries in ascending offset order.
    pub fn contigs(&self) -> &[ContigInfo] {
        &self.contigs
    }

    /// Looks up a contig by name.
    pub fn contig(&self, name: &str) -> Result<&ContigInfo> {
        self.by_name
            .get(name)
            .map(|&idx| &self.contigs[idx])
            .ok_or_else(|| VarGridError::NotFound(format!("contig '{name}'")))
    }

    /// Maps a column coordinate to `(contig, 1-based position)`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no contig span contains the column.
    pub fn column_to_genomic(&self, column: u64) -> Result<(&ContigInfo, u64)> {
        let idx = match self.contigs.binary_search_by(|c| c.offset.cmp(&column)) {
            Ok(idx) => idx,
            Err(0) => {
                return Err(VarGridError::NotFound(format!(
                    "no contig spans column {column}"
                )))
            }
            Err(idx) => idx - 1,
        };
        let contig = &self.contigs[idx];
        if column >= contig.span_end() {
            return Err(VarGridError::NotFound(format!(
                "no contig spans column {column}"
            )));
        }
        Ok((contig, column - contig.offset + 1))
    }

    /// Maps a contig name and 1-based position to a column coordinate.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown contigs and `Data` for positions
    /// outside the contig length.
    pub fn genomic_to_column(&self, contig_name: &str, position: u64) -> Result<u64> {
        let contig = self.contig(contig_name)?;
        if position == 0 || position > contig.length {
            return Err(VarGridError::Data(format!(
                "position {position} outside contig '{contig_name}' (length {})",
                contig.length
            )));
        }
        Ok(contig.offset + position - 1)
    }

    /// Converts a column interval into a genomic interval.
    ///
    /// The interval must start inside a contig span; the end is clamped to
    /// the span of that contig.
    pub fn genomic_interval(&self, column_lo: u64, column_hi: u64) -> Result<GenomicInterval> {
        let (contig, start) = self.column_to_genomic(column_lo)?;
        let end = start + (column_hi.min(contig.span_end() - 1) - column_lo);
        Ok(GenomicInterval {
            contig_name: contig.name.clone(),
            start,
            end,
        })
    }
}
