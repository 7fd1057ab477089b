//! Callset and VID document loaders and the immutable metadata resolver.
//!
//! Two JSON documents describe a workspace: the **callset map** assigns each
//! sample to a row of the array, and the **VID map** declares the contig
//! spans on the column axis plus the type of every stored field. Both are
//! loaded once at engine construction and never mutated afterwards, so the
//! resolver is safe to share across concurrent readers.

use crate::contig::{ContigInfo, ContigMap};
use crate::error::{Result, VarGridError};
use crate::fields::{FieldClass, FieldKind, FieldRegistry, FieldType};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One callset (sample) entry in the callset map document.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CallsetEntry {
    /// Row of the array holding this sample's calls.
    pub row_idx: u64,
}

/// The callset map document: sample name → row assignment.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CallsetDocument {
    /// Sample name → entry.
    pub callsets: HashMap<String, CallsetEntry>,
}

/// Field arity in the VID document: a fixed element count or `"var"`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum LengthDescriptor {
    /// Fixed number of elements.
    Fixed(usize),
    /// Symbolic length; only `"var"` is recognized.
    Symbolic(String),
}

/// One contig entry in the VID document.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VidContig {
    /// Contig length in base pairs.
    pub length: u64,
    /// Starting offset on the flattened column axis.
    pub tiledb_column_offset: u64,
}

fn default_dimensions() -> usize {
    1
}

/// One field entry in the VID document.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VidField {
    /// Element kind (`int32`, `float32`, `char`; `int`/`float` accepted).
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Arity: a number or `"var"`. Missing means scalar.
    #[serde(default)]
    pub length: Option<LengthDescriptor>,
    /// Dimension count, default 1.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// True when values carry phase separators (genotype layout).
    #[serde(default)]
    pub phased: bool,
    /// VCF column classes (`INFO`, `FORMAT`); FORMAT when absent.
    #[serde(default)]
    pub vcf_field_class: Vec<FieldClass>,
}

impl VidField {
    fn to_field_type(&self, name: &str) -> Result<FieldType> {
        let fixed_count = match &self.length {
            None => Some(1),
            Some(LengthDescriptor::Fixed(n)) => Some(*n),
            Some(LengthDescriptor::Symbolic(s)) if s.eq_ignore_ascii_case("var") => None,
            Some(LengthDescriptor::Symbolic(s)) => {
                return Err(VarGridError::Config(format!(
                    "field '{name}': unknown length descriptor '{s}'"
                )))
            }
        };
        Ok(FieldType {
            kind: self.kind,
            fixed_count,
            dimensions: self.dimensions,
            contains_phase: self.phased,
        })
    }
}

/// The VID map document: contig spans plus field schemas.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct VidDocument {
    /// Contig name → span.
    pub contigs: HashMap<String, VidContig>,
    /// Field name → type descriptor.
    pub fields: HashMap<String, VidField>,
}

/// Immutable workspace metadata: sample rows, contig spans, field schemas.
#[derive(Debug, Clone)]
pub struct Metadata {
    // Sorted ascending by row for binary-search lookups.
    samples: Vec<(u64, String)>,
    sample_rows: HashMap<String, u64>,
    contigs: ContigMap,
    fields: FieldRegistry,
    reference_genome: String,
}

impl Metadata {
    /// Loads metadata from callset and VID map files.
    ///
    /// # Errors
    ///
    /// Returns `Io` when a file cannot be read and `Config` when a document
    /// does not parse or violates the contig-span invariants.
    pub fn load(
        callset_mapping_file: &Path,
        vid_mapping_file: &Path,
        reference_genome: &str,
    ) -> Result<Self> {
        let callsets: CallsetDocument = read_json(callset_mapping_file)?;
        let vid: VidDocument = read_json(vid_mapping_file)?;
        debug!(
            "loaded metadata: {} callsets, {} contigs, {} fields",
            callsets.callsets.len(),
            vid.contigs.len(),
            vid.fields.len()
        );
        Self::from_documents(callsets, vid, reference_genome)
    }

    /// Builds metadata from already-parsed documents.
    pub fn from_documents(
        callsets: CallsetDocument,
        vid: VidDocument,
        reference_genome: &str,
    ) -> Result<Self> {
        let mut samples: Vec<(u64, String)> = callsets
            .callsets
            .iter()
            .map(|(name, entry)| (entry.row_idx, name.clone()))
            .collect();
        samples.sort();
        for window in samples.windows(2) {
            if window[0].0 == window[1].0 {
                return Err(VarGridError::Config(format!(
                    "samples '{}' and '{}' share row {}",
                    window[0].1, window[1].1, window[0].0
                )));
            }
        }
        let sample_rows = samples
            .iter()
            .map(|(row, name)| (name.clone(), *row))
            .collect();

        let contig_entries = vid
            .contigs
            .iter()
            .map(|(name, contig)| ContigInfo {
                name: name.clone(),
                length: contig.length,
                offset: contig.tiledb_column_offset,
            })
            .collect();
        let contigs = ContigMap::new(contig_entries)?;

        let mut field_entries = Vec::with_capacity(vid.fields.len());
        for (name, field) in &vid.fields {
            field_entries.push((name.clone(), field.to_field_type(name)?));
        }
        let mut fields = FieldRegistry::new(field_entries);
        for (name, field) in &vid.fields {
            if !field.vcf_field_class.is_empty() {
                fields = fields.with_classes(name, field.vcf_field_class.clone());
            }
        }

        Ok(Metadata {
            samples,
            sample_rows,
            contigs,
            fields,
            reference_genome: reference_genome.to_string(),
        })
    }

    /// Sample name for a row.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no callset maps to the row.
    pub fn row_to_sample(&self, row: u64) -> Result<&str> {
        self.samples
            .binary_search_by_key(&row, |(r, _)| *r)
            .map(|idx| self.samples[idx].1.as_str())
            .map_err(|_| VarGridError::NotFound(format!("no sample for row {row}")))
    }

    /// Row for a sample name.
    pub fn sample_to_row(&self, sample: &str) -> Result<u64> {
        self.sample_rows
            .get(sample)
            .copied()
            .ok_or_else(|| VarGridError::NotFound(format!("sample '{sample}'")))
    }

    /// All `(row, sample)` pairs in ascending row order.
    pub fn samples(&self) -> &[(u64, String)] {
        &self.samples
    }

    /// Contig span lookup table.
    pub fn contigs(&self) -> &ContigMap {
        &self.contigs
    }

    /// Field type registry.
    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    /// Reference genome identifier the workspace was loaded against.
    pub fn reference_genome(&self) -> &str {
        &self.reference_genome
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| VarGridError::Config(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_documents() -> (CallsetDocument, VidDocument) {
        let callsets: CallsetDocument = serde_json::from_str(
            r#"{"callsets": {"HG00141": {"row_idx": 0}, "HG01958": {"row_idx": 1}}}"#,
        )
        .unwrap();
        let vid: VidDocument = serde_json::from_str(
            r#"{
                "contigs": {
                    "1": {"length": 249250621, "tiledb_column_offset": 0},
                    "2": {"length": 243199373, "tiledb_column_offset": 249250621}
                },
                "fields": {
                    "REF": {"type": "char", "length": "var"},
                    "ALT": {"type": "char", "length": "var"},
                    "GT": {"type": "int", "length": "var", "phased": true},
                    "DP": {"type": "int", "length": 1}
                }
            }"#,
        )
        .unwrap();
        (callsets, vid)
    }

    #[test]
    fn test_row_sample_lookup() {
        let (callsets, vid) = sample_documents();
        let metadata = Metadata::from_documents(callsets, vid, "hg19").unwrap();
        assert_eq!(metadata.row_to_sample(0).unwrap(), "HG00141");
        assert_eq!(metadata.row_to_sample(1).unwrap(), "HG01958");
        assert!(metadata.row_to_sample(2).is_err());
        assert_eq!(metadata.sample_to_row("HG01958").unwrap(), 1);
    }

    #[test]
    fn test_field_types_from_vid() {
        let (callsets, vid) = sample_documents();
        let metadata = Metadata::from_documents(callsets, vid, "hg19").unwrap();
        assert!(metadata.fields().field_type("REF").unwrap().is_string());
        let gt = metadata.fields().field_type("GT").unwrap();
        assert!(gt.is_int() && gt.contains_phase);
        assert_eq!(
            metadata.fields().field_type("DP").unwrap().fixed_count,
            Some(1)
        );
        assert!(metadata.fields().field_type("XX").is_err());
    }

    #[test]
    fn test_duplicate_rows_rejected() {
        let callsets: CallsetDocument = serde_json::from_str(
            r#"{"callsets": {"a": {"row_idx": 0}, "b": {"row_idx": 0}}}"#,
        )
        .unwrap();
        let result = Metadata::from_documents(callsets, VidDocument::default(), "hg19");
        assert!(result.is_err(), "two samples on one row must be rejected");
    }

    #[test]
    fn test_contig_spans_cross_contig_boundary() {
        let (callsets, vid) = sample_documents();
        let metadata = Metadata::from_documents(callsets, vid, "hg19").unwrap();
        let (contig, pos) = metadata.contigs().column_to_genomic(249250621).unwrap();
        assert_eq!(contig.name, "2");
        assert_eq!(pos, 1);
    }
}
