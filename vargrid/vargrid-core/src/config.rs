//! Query configuration documents and normalization.
//!
//! A query configuration arrives in one of three equivalent forms: a JSON
//! document on disk, the same document as a string, or a binary payload
//! (the bincode encoding of [`QueryDocument`]). All three decode to the same
//! internal state.
//!
//! Several document fields are vector-valued so that cooperating ranks can
//! share one document: `workspace` and `array` accept a string or a list of
//! strings, and the range fields hold one list of ranges per rank. A
//! concurrency rank `k` selects the `k`-th element of every vector-valued
//! field; a rank with no matching element is a `Config` error.

use crate::error::{Result, VarGridError};
use crate::interval::{self, RangeList};
use serde::de::{SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;

/// Default read-window segment size: 10 MiB.
pub const DEFAULT_SEGMENT_SIZE: u64 = 10 * 1024 * 1024;

/// Newest document version this build understands.
const SUPPORTED_VERSION: u32 = 1;

// Accepts either a plain string or a list of strings. JSON documents use
// whichever shape they like; the binary form always carries the list.
fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrList;

    impl<'de> Visitor<'de> for StringOrList {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: serde::de::Error>(self, value: &str) -> std::result::Result<Self::Value, E> {
            Ok(vec![value.to_string()])
        }

        fn visit_seq<A: SeqAccess<'de>>(
            self,
            mut seq: A,
        ) -> std::result::Result<Self::Value, A::Error> {
            let mut values = Vec::new();
            while let Some(value) = seq.next_element::<String>()? {
                values.push(value);
            }
            Ok(values)
        }
    }

    if deserializer.is_human_readable() {
        deserializer.deserialize_any(StringOrList)
    } else {
        deserializer.deserialize_seq(StringOrList)
    }
}

/// The on-disk / on-wire query configuration document.
///
/// Unknown keys are ignored when `version` is newer than the supported
/// version; an unknown key under the supported version is still ignored, as
/// serde does by default, keeping old engines forward-compatible.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct QueryDocument {
    /// Workspace path; rank-indexed when a list.
    #[serde(default, deserialize_with = "string_or_list")]
    pub workspace: Vec<String>,
    /// Array name; rank-indexed when a list.
    #[serde(default, deserialize_with = "string_or_list")]
    pub array: Vec<String>,
    /// Column ranges per rank (outer index = rank).
    #[serde(default)]
    pub query_column_ranges: Vec<Vec<(u64, u64)>>,
    /// Row ranges per rank (outer index = rank).
    #[serde(default)]
    pub query_row_ranges: Vec<Vec<(u64, u64)>>,
    /// Attribute projection; empty means all attributes.
    #[serde(default)]
    pub query_attributes: Vec<String>,
    /// Read-window bound in bytes.
    #[serde(default)]
    pub segment_size: Option<u64>,
    /// Callset map document path.
    #[serde(default)]
    pub callset_mapping_file: Option<String>,
    /// VID map document path.
    #[serde(default)]
    pub vid_mapping_file: Option<String>,
    /// Reference genome identifier.
    #[serde(default)]
    pub reference_genome: Option<String>,
    /// Document version; documents newer than the engine still parse.
    #[serde(default)]
    pub version: Option<u32>,
}

/// A normalized query configuration: one rank's view of the document.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Workspace path.
    pub workspace: String,
    /// Array name.
    pub array: String,
    /// Attribute projection; empty means all attributes.
    pub attributes: Vec<String>,
    /// Normalized column ranges.
    pub column_ranges: RangeList,
    /// Normalized row ranges; empty means all rows.
    pub row_ranges: RangeList,
    /// Read-window bound in bytes.
    pub segment_size: u64,
    /// Concurrency rank this configuration was normalized for.
    pub rank: usize,
    /// Callset map document path, when the document named one.
    pub callset_mapping_file: Option<String>,
    /// VID map document path, when the document named one.
    pub vid_mapping_file: Option<String>,
    /// Reference genome identifier, when the document named one.
    pub reference_genome: Option<String>,
}

impl QueryConfig {
    /// Reads and normalizes a JSON document from disk.
    pub fn from_file(path: &Path, rank: usize) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let document: QueryDocument = serde_json::from_str(&text)
            .map_err(|e| VarGridError::Config(format!("{}: {e}", path.display())))?;
        Self::from_document(&document, rank)
    }

    /// Normalizes a JSON document held in a string.
    pub fn from_json_str(text: &str, rank: usize) -> Result<Self> {
        let document: QueryDocument = serde_json::from_str(text)
            .map_err(|e| VarGridError::Config(format!("query document: {e}")))?;
        Self::from_document(&document, rank)
    }

    /// Normalizes a binary document payload (bincode-encoded
    /// [`QueryDocument`]).
    pub fn from_bytes(payload: &[u8], rank: usize) -> Result<Self> {
        let document: QueryDocument = bincode::deserialize(payload)
            .map_err(|e| VarGridError::Config(format!("binary query document: {e}")))?;
        Self::from_document(&document, rank)
    }

    /// Normalizes a parsed document for one concurrency rank.
    ///
    /// # Errors
    ///
    /// `Config` when required fields are missing, a vector-valued field has
    /// no element for the rank, or a range is inverted.
    pub fn from_document(document: &QueryDocument, rank: usize) -> Result<Self> {
        if let Some(version) = document.version {
            if version > SUPPORTED_VERSION {
                log::warn!(
                    "query document version {version} is newer than supported \
                     version {SUPPORTED_VERSION}; unknown fields were ignored"
                );
            }
        }
        let workspace = select_for_rank(&document.workspace, rank, "workspace")?
            .ok_or_else(|| VarGridError::Config("missing required field 'workspace'".into()))?
            .clone();
        let array = select_for_rank(&document.array, rank, "array")?
            .ok_or_else(|| VarGridError::Config("missing required field 'array'".into()))?
            .clone();
        let column_ranges =
            match select_for_rank(&document.query_column_ranges, rank, "query_column_ranges")? {
                Some(ranges) => interval::normalize_ranges(ranges)?,
                None => interval::scan_full(),
            };
        let row_ranges =
            match select_for_rank(&document.query_row_ranges, rank, "query_row_ranges")? {
                Some(ranges) => interval::normalize_ranges(ranges)?,
                None => Vec::new(),
            };
        Ok(QueryConfig {
            workspace,
            array,
            attributes: document.query_attributes.clone(),
            column_ranges,
            row_ranges,
            segment_size: document.segment_size.unwrap_or(DEFAULT_SEGMENT_SIZE),
            rank,
            callset_mapping_file: document.callset_mapping_file.clone(),
            vid_mapping_file: document.vid_mapping_file.clone(),
            reference_genome: document.reference_genome.clone(),
        })
    }

    /// Builds a configuration directly, bypassing the document forms.
    pub fn direct(
        workspace: impl Into<String>,
        array: impl Into<String>,
        attributes: Vec<String>,
        column_ranges: &[(u64, u64)],
        row_ranges: &[(u64, u64)],
        segment_size: u64,
    ) -> Result<Self> {
        Ok(QueryConfig {
            workspace: workspace.into(),
            array: array.into(),
            attributes,
            column_ranges: interval::normalize_ranges(column_ranges)?,
            row_ranges: interval::normalize_ranges(row_ranges)?,
            segment_size,
            rank: 0,
            callset_mapping_file: None,
            vid_mapping_file: None,
            reference_genome: None,
        })
    }

    /// Row ranges with the empty list expanded to the full axis.
    pub fn effective_row_ranges(&self) -> RangeList {
        if self.row_ranges.is_empty() {
            interval::scan_full()
        } else {
            self.row_ranges.clone()
        }
    }
}

// Rank selection over a vector-valued field: empty selects nothing, a rank
// inside the vector selects that element, anything else is a config error.
fn select_for_rank<'a, T>(values: &'a [T], rank: usize, field: &str) -> Result<Option<&'a T>> {
    if values.is_empty() {
        return Ok(None);
    }
    values.get(rank).map(Some).ok_or_else(|| {
        VarGridError::Config(format!(
            "rank {rank} out of bounds for '{field}' ({} element(s))",
            values.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "workspace": "/data/ws",
        "array": "t0_1_2",
        "query_column_ranges": [[[0, 17000], [17000, 18000]]],
        "query_row_ranges": [[[0, 3]]],
        "query_attributes": ["DP"],
        "segment_size": 40
    }"#;

    /// The JSON string, file and binary forms must normalize identically.
    #[test]
    fn test_three_forms_agree() {
        let from_str = QueryConfig::from_json_str(DOCUMENT, 0).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query.json");
        std::fs::write(&path, DOCUMENT).unwrap();
        let from_file = QueryConfig::from_file(&path, 0).unwrap();

        let document: QueryDocument = serde_json::from_str(DOCUMENT).unwrap();
        let payload = bincode::serialize(&document).unwrap();
        let from_bytes = QueryConfig::from_bytes(&payload, 0).unwrap();

        for config in [&from_str, &from_file, &from_bytes] {
            assert_eq!(config.workspace, "/data/ws");
            assert_eq!(config.array, "t0_1_2");
            assert_eq!(config.column_ranges, vec![(0, 18000)]);
            assert_eq!(config.row_ranges, vec![(0, 3)]);
            assert_eq!(config.attributes, vec!["DP".to_string()]);
            assert_eq!(config.segment_size, 40);
        }
    }

    #[test]
    fn test_defaults() {
        let config =
            QueryConfig::from_json_str(r#"{"workspace": "ws", "array": "a"}"#, 0).unwrap();
        assert_eq!(config.column_ranges, interval::scan_full());
        assert!(config.row_ranges.is_empty(), "empty row ranges mean all rows");
        assert_eq!(config.segment_size, DEFAULT_SEGMENT_SIZE);
        assert!(config.attributes.is_empty(), "empty attributes mean all");
    }

    #[test]
    fn test_missing_required_fields() {
        assert!(QueryConfig::from_json_str(r#"{"array": "a"}"#, 0).is_err());
        assert!(QueryConfig::from_json_str(r#"{"workspace": "ws"}"#, 0).is_err());
    }

    /// Rank 1 over singleton vectors mirrors the original engine's config
    /// exception.
    #[test]
    fn test_rank_out_of_bounds() {
        let err = QueryConfig::from_json_str(DOCUMENT, 1).unwrap_err();
        assert!(matches!(err, VarGridError::Config(_)));
    }

    #[test]
    fn test_rank_selects_vector_elements() {
        let document = r#"{
            "workspace": ["ws0", "ws1"],
            "array": ["a0", "a1"],
            "query_column_ranges": [[[0, 10]], [[20, 30]]],
            "query_row_ranges": [[[0, 1]], [[2, 3]]]
        }"#;
        let config = QueryConfig::from_json_str(document, 1).unwrap();
        assert_eq!(config.workspace, "ws1");
        assert_eq!(config.array, "a1");
        assert_eq!(config.column_ranges, vec![(20, 30)]);
        assert_eq!(config.row_ranges, vec![(2, 3)]);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config = QueryConfig::from_json_str(
            r#"{"workspace": "ws", "array": "a", "version": 99, "future_knob": true}"#,
            0,
        )
        .unwrap();
        assert_eq!(config.workspace, "ws");
    }
}
