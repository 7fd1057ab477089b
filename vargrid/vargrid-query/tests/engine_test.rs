//! Integration tests for the engine facade.
//!
//! Builds a small workspace on the in-memory backend and exercises both
//! result surfaces end to end: collection mode, processor mode, range
//! short-circuits, attribute projection and the document-driven
//! constructors.

use std::path::PathBuf;
use std::sync::Arc;
use vargrid_core::GenomicInterval;
use vargrid_query::cell::GenomicField;
use vargrid_query::mem::{MemoryArray, MemoryBackend, StoredField};
use vargrid_query::processor::VariantCallProcessor;
use vargrid_query::VarGrid;

const WORKSPACE: &str = "/ws";
const ARRAY: &str = "t0_1_2";

fn write_metadata(dir: &tempfile::TempDir) -> (String, String) {
    let callset_path = dir.path().join("callset.json");
    std::fs::write(
        &callset_path,
        r#"{"callsets": {
            "HG00141": {"row_idx": 0},
            "HG01958": {"row_idx": 1},
            "HG01530": {"row_idx": 2}
        }}"#,
    )
    .unwrap();
    let vid_path = dir.path().join("vid.json");
    std::fs::write(
        &vid_path,
        r#"{
            "contigs": {
                "1": {"length": 10000, "tiledb_column_offset": 0},
                "2": {"length": 10000, "tiledb_column_offset": 10000}
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
    (
        callset_path.to_string_lossy().into_owned(),
        vid_path.to_string_lossy().into_owned(),
    )
}

fn backend_with(cells: Vec<(u64, u64, u64, Vec<StoredField>)>) -> Arc<MemoryBackend> {
    let mut array = MemoryArray::new(3, 20000);
    for (row, column, end, fields) in cells {
        array.insert(row, column, end, fields).unwrap();
    }
    let mut backend = MemoryBackend::new();
    backend.register(&PathBuf::from(WORKSPACE), ARRAY, array);
    Arc::new(backend)
}

fn engine(backend: Arc<MemoryBackend>, dir: &tempfile::TempDir) -> VarGrid {
    let (callset, vid) = write_metadata(dir);
    VarGrid::connect(backend, WORKSPACE, &callset, &vid, "hg19", Vec::new(), None).unwrap()
}

/// Scenario: querying the exact range of a single cell returns one variant
/// whose single call carries the same field buffers byte for byte.
#[test]
fn test_single_cell_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let stored = vec![
        StoredField::text("REF", "A"),
        StoredField::text("ALT", "C"),
        StoredField::int32("GT", &[0, 0, 1]),
    ];
    let backend = backend_with(vec![(0, 100, 100, stored.clone())]);
    let mut grid = engine(backend, &dir);

    let results = grid.query_variants(ARRAY, &[(100, 100)], &[(0, 0)]).unwrap();
    assert_eq!(results.size(), 1);
    let variant = results.at(0).unwrap();
    assert_eq!(variant.interval(), (100, 100));
    assert_eq!(variant.num_calls(), 1);
    let call = variant.calls().next().unwrap();
    assert_eq!((call.row, call.column, call.end), (0, 100, 100));
    let expected: Vec<GenomicField> = stored
        .iter()
        .map(|f| GenomicField::new(f.name.clone(), f.bytes.clone(), f.elements))
        .collect();
    assert_eq!(call.fields, expected, "field buffers must round trip");
}

/// Scenario: two overlapping calls reconcile into three variants with the
/// expected memberships.
#[test]
fn test_overlap_split() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend_with(vec![
        (0, 100, 150, vec![StoredField::text("REF", "A")]),
        (1, 120, 200, vec![StoredField::text("REF", "C")]),
    ]);
    let mut grid = engine(backend, &dir);

    let results = grid.query_variants(ARRAY, &[(0, 19999)], &[]).unwrap();
    assert_eq!(results.size(), 3);
    let intervals: Vec<(u64, u64)> = (0..3).map(|i| results.at(i).unwrap().interval()).collect();
    assert_eq!(intervals, vec![(100, 119), (120, 150), (151, 200)]);
    assert_eq!(results.at(0).unwrap().num_calls(), 1);
    assert_eq!(results.at(1).unwrap().num_calls(), 2);
    let rows: Vec<u64> = results.at(1).unwrap().calls().map(|c| c.row).collect();
    assert_eq!(rows, vec![0, 1], "calls inside a variant ascend by row");
    assert_eq!(results.at(2).unwrap().calls().next().unwrap().row, 1);
}

/// Scenario: a `<NON_REF>` reference block split by a later SNV contributes
/// its call to the SNV's reconciled variant.
#[test]
fn test_non_ref_block_split() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend_with(vec![
        (
            0,
            1000,
            2000,
            vec![StoredField::text("REF", "T"), StoredField::text("ALT", "&")],
        ),
        (
            1,
            1500,
            1500,
            vec![StoredField::text("REF", "G"), StoredField::text("ALT", "A")],
        ),
    ]);
    let mut grid = engine(backend, &dir);

    let results = grid.query_variants(ARRAY, &[(0, 19999)], &[]).unwrap();
    assert_eq!(results.size(), 3);
    let middle = results.at(1).unwrap();
    assert_eq!(middle.interval(), (1500, 1500));
    assert_eq!(middle.num_calls(), 2);
    let block_call = middle.calls().next().unwrap();
    assert_eq!(block_call.row, 0);
    let alt = block_call.fields.iter().find(|f| f.name() == "ALT").unwrap();
    assert_eq!(
        vargrid_query::cell::decode_alt_list(
            alt.str_value(&vargrid_core::FieldType::string()).unwrap()
        ),
        vec!["<NON_REF>"]
    );
}

#[derive(Default)]
struct CountingProcessor {
    initialized: bool,
    intervals: Vec<(u64, u64)>,
    calls: Vec<(String, u64, u64, GenomicInterval)>,
}

impl VariantCallProcessor for CountingProcessor {
    fn initialize(&mut self, field_types: &vargrid_core::FieldRegistry) -> vargrid_core::Result<()> {
        assert!(field_types.contains("REF"));
        self.initialized = true;
        Ok(())
    }

    fn process_interval(&mut self, interval: (u64, u64)) -> vargrid_core::Result<()> {
        self.intervals.push(interval);
        Ok(())
    }

    fn process_call(
        &mut self,
        sample_name: &str,
        coordinates: (u64, u64),
        genomic_interval: &GenomicInterval,
        _fields: &[GenomicField],
    ) -> vargrid_core::Result<()> {
        self.calls.push((
            sample_name.to_string(),
            coordinates.0,
            coordinates.1,
            genomic_interval.clone(),
        ));
        Ok(())
    }
}

/// Processor mode delivers one interval per reconciled variant and the calls
/// in row order with 1-based genomic intervals.
#[test]
fn test_processor_mode() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend_with(vec![
        (0, 100, 150, vec![StoredField::text("REF", "A")]),
        (1, 120, 200, vec![StoredField::text("REF", "C")]),
    ]);
    let mut grid = engine(backend, &dir);

    let mut processor = CountingProcessor::default();
    grid.query_variant_calls(&mut processor, ARRAY, &[(0, 19999)], &[(0, 2)])
        .unwrap();
    assert!(processor.initialized);
    assert_eq!(
        processor.intervals,
        vec![(100, 119), (120, 150), (151, 200)]
    );
    // Row 0's call appears in two variants, row 1's in two.
    assert_eq!(processor.calls.len(), 4);
    let (sample, row, column, interval) = &processor.calls[0];
    assert_eq!(sample, "HG00141");
    assert_eq!((*row, *column), (0, 100));
    assert_eq!(interval.contig_name, "1");
    assert_eq!((interval.start, interval.end), (101, 151));
}

/// Ranges outside the array domain return an empty result without error.
#[test]
fn test_empty_intersection() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend_with(vec![(0, 100, 100, vec![StoredField::text("REF", "A")])]);
    let mut grid = engine(backend, &dir);

    let results = grid
        .query_variants(ARRAY, &[(1_000_000, 2_000_000)], &[])
        .unwrap();
    assert_eq!(results.size(), 0);
}

/// A document-driven engine queries its configured array, and the same
/// document as a binary payload behaves identically.
#[test]
fn test_document_constructors() {
    let dir = tempfile::tempdir().unwrap();
    let (callset, vid) = write_metadata(&dir);
    let backend = backend_with(vec![
        (0, 100, 150, vec![StoredField::text("REF", "A")]),
        (1, 120, 200, vec![StoredField::text("REF", "C")]),
    ]);
    let document = format!(
        r#"{{
            "workspace": "{WORKSPACE}",
            "array": "{ARRAY}",
            "query_column_ranges": [[[0, 19999]]],
            "query_row_ranges": [[[0, 2]]],
            "callset_mapping_file": "{callset}",
            "vid_mapping_file": "{vid}",
            "reference_genome": "hg19"
        }}"#
    );

    let mut grid = VarGrid::with_config_str(backend.clone(), &document, 0).unwrap();
    let results = grid.query_variants_configured().unwrap();
    assert_eq!(results.size(), 3);

    let parsed: vargrid_core::QueryDocument = serde_json::from_str(&document).unwrap();
    let payload = bincode::serialize(&parsed).unwrap();
    let mut grid = VarGrid::with_config_bytes(backend.clone(), &payload, 0).unwrap();
    let results = grid.query_variants_configured().unwrap();
    assert_eq!(results.size(), 3);

    // Rank 1 over singleton vectors is a config error, as in the original
    // engine.
    assert!(VarGrid::with_config_str(backend, &document, 1).is_err());
}

/// A non-empty projection still carries REF and ALT.
#[test]
fn test_projection_keeps_mandatory_attributes() {
    let dir = tempfile::tempdir().unwrap();
    let (callset, vid) = write_metadata(&dir);
    let backend = backend_with(vec![(
        0,
        100,
        100,
        vec![
            StoredField::text("REF", "A"),
            StoredField::text("ALT", "C"),
            StoredField::int32("GT", &[0, 0, 1]),
            StoredField::int32("DP", &[76]),
        ],
    )]);
    let mut grid = VarGrid::connect(
        backend,
        WORKSPACE,
        &callset,
        &vid,
        "hg19",
        vec!["DP".to_string()],
        Some(40),
    )
    .unwrap();

    let results = grid.query_variants(ARRAY, &[(0, 19999)], &[]).unwrap();
    let variant = results.at(0).unwrap();
    let names: Vec<&str> = variant
        .calls()
        .next()
        .unwrap()
        .fields
        .iter()
        .map(|f| f.name())
        .collect();
    assert_eq!(names, vec!["REF", "ALT", "DP"], "GT was not requested");
}

/// Empty constructor arguments are rejected up front.
#[test]
fn test_empty_arguments_rejected() {
    let backend = backend_with(Vec::new());
    assert!(VarGrid::connect(backend, "", "", "", "", Vec::new(), None).is_err());
}
