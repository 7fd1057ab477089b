//! Embedded in-memory array backend.
//!
//! `MemoryBackend` registers arrays under a `(workspace, name)` key and
//! serves the [`storage`](crate::storage) contract from process memory.
//! Cells live column-major in a `BTreeMap<(column, row), _>`, which makes
//! the `(column, row)` scan order a plain in-order walk. The test suite and
//! embedded callers use this backend; production arrays stay behind an
//! external implementation of the same traits.

use crate::cell::{Cell, CellHeader, FieldSlice};
use crate::storage::{ArrayBackend, ArrayDomain, ArrayHandle, ScanRequest};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vargrid_core::{Result, VarGridError};

/// An owned attribute buffer inside a stored cell.
#[derive(Debug, Clone)]
pub struct StoredField {
    /// Attribute name.
    pub name: String,
    /// Raw little-endian element buffer.
    pub bytes: Vec<u8>,
    /// Number of elements in the buffer.
    pub elements: usize,
}

impl StoredField {
    /// A string attribute (one element per byte).
    pub fn text(name: impl Into<String>, value: &str) -> Self {
        StoredField {
            name: name.into(),
            bytes: value.as_bytes().to_vec(),
            elements: value.len(),
        }
    }

    /// An int32 attribute.
    pub fn int32(name: impl Into<String>, values: &[i32]) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 4);
        for value in values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        StoredField {
            name: name.into(),
            bytes,
            elements: values.len(),
        }
    }

    /// A float32 attribute.
    pub fn float32(name: impl Into<String>, values: &[f32]) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 4);
        for value in values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        StoredField {
            name: name.into(),
            bytes,
            elements: values.len(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredCell {
    end: u64,
    fields: Vec<StoredField>,
}

/// A sparse in-memory array with a fixed row/column domain.
#[derive(Debug, Clone)]
pub struct MemoryArray {
    num_rows: u64,
    num_columns: u64,
    // Keyed (column, row): in-order iteration is the scan order.
    cells: BTreeMap<(u64, u64), StoredCell>,
}

impl MemoryArray {
    /// Creates an empty array with the given domain.
    pub fn new(num_rows: u64, num_columns: u64) -> Self {
        MemoryArray {
            num_rows,
            num_columns,
            cells: BTreeMap::new(),
        }
    }

    /// Inserts one cell.
    ///
    /// # Errors
    ///
    /// `Data` when the interval is inverted, outside the domain, or overlaps
    /// an existing cell of the same row.
    pub fn insert(
        &mut self,
        row: u64,
        column: u64,
        end: u64,
        fields: Vec<StoredField>,
    ) -> Result<()> {
        if end < column {
            return Err(VarGridError::Data(format!(
                "cell ({row}, {column}): END {end} < begin {column}"
            )));
        }
        if row >= self.num_rows || end >= self.num_columns {
            return Err(VarGridError::Data(format!(
                "cell ({row}, {column})..{end} outside domain {}x{}",
                self.num_rows, self.num_columns
            )));
        }
        let overlap = self
            .cells
            .iter()
            .filter(|((_, r), _)| *r == row)
            .any(|((c, _), cell)| *c <= end && cell.end >= column);
        if overlap {
            return Err(VarGridError::Data(format!(
                "cell ({row}, {column})..{end} overlaps an existing call of row {row}"
            )));
        }
        self.cells.insert((column, row), StoredCell { end, fields });
        Ok(())
    }

    /// Number of stored cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when the array holds no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// In-memory implementation of [`ArrayBackend`].
#[derive(Default)]
pub struct MemoryBackend {
    arrays: HashMap<(PathBuf, String), Arc<MemoryArray>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    /// Registers an array under `(workspace, name)`.
    pub fn register(&mut self, workspace: &Path, name: &str, array: MemoryArray) {
        self.arrays
            .insert((workspace.to_path_buf(), name.to_string()), Arc::new(array));
    }
}

impl ArrayBackend for MemoryBackend {
    fn open_array(&self, workspace: &Path, array: &str) -> Result<Box<dyn ArrayHandle>> {
        let key = (workspace.to_path_buf(), array.to_string());
        let array = self.arrays.get(&key).cloned().ok_or_else(|| {
            VarGridError::NotFound(format!(
                "array '{}' in workspace '{}'",
                key.1,
                key.0.display()
            ))
        })?;
        debug!("opened array '{}' ({} cells)", key.1, array.len());
        Ok(Box::new(MemoryHandle {
            array,
            scan: None,
            closed: false,
        }))
    }
}

struct DecodedCell {
    header: CellHeader,
    fields: Vec<StoredField>,
}

struct ScanState {
    keys: Vec<(u64, u64)>,
    attributes: Vec<String>,
    segment_size: u64,
    next_key: usize,
    chunk: Vec<DecodedCell>,
    chunk_pos: usize,
    started: bool,
}

struct MemoryHandle {
    array: Arc<MemoryArray>,
    scan: Option<ScanState>,
    closed: bool,
}

impl MemoryHandle {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(VarGridError::State("array handle used after close".into()));
        }
        Ok(())
    }

    // Refills the decode chunk, keeping per-attribute bytes under the
    // segment bound (always at least one cell per chunk).
    fn refill(&mut self) {
        let state = self.scan.as_mut().expect("scan state");
        state.chunk.clear();
        state.chunk_pos = 0;
        let mut attribute_bytes: HashMap<String, u64> = HashMap::new();
        while state.next_key < state.keys.len() {
            let key = state.keys[state.next_key];
            let cell = &self.array.cells[&key];
            let projected: Vec<StoredField> = cell
                .fields
                .iter()
                .filter(|field| {
                    state.attributes.is_empty()
                        || state.attributes.iter().any(|a| a == &field.name)
                })
                .cloned()
                .collect();
            if !state.chunk.is_empty() {
                let over_budget = projected.iter().any(|field| {
                    attribute_bytes.get(field.name.as_str()).copied().unwrap_or(0)
                        + field.bytes.len() as u64
                        > state.segment_size
                });
                if over_budget {
                    break;
                }
            }
            for field in &projected {
                *attribute_bytes.entry(field.name.clone()).or_insert(0) +=
                    field.bytes.len() as u64;
            }
            state.chunk.push(DecodedCell {
                header: CellHeader {
                    row: key.1,
                    column: key.0,
                    end: cell.end,
                },
                fields: projected,
            });
            state.next_key += 1;
        }
    }
}

impl ArrayHandle for MemoryHandle {
    fn domain(&self) -> ArrayDomain {
        ArrayDomain {
            rows: (0, self.array.num_rows.saturating_sub(1)),
            columns: (0, self.array.num_columns.saturating_sub(1)),
        }
    }

    fn scan(&mut self, request: ScanRequest) -> Result<()> {
        self.check_open()?;
        let keys: Vec<(u64, u64)> = request
            .column_ranges
            .iter()
            .flat_map(|&(col_lo, col_hi)| {
                self.array
                    .cells
                    .range((col_lo, 0)..=(col_hi, u64::MAX))
                    .map(|(key, _)| *key)
            })
            .filter(|&(_, row)| {
                request.row_ranges.is_empty()
                    || request.row_ranges.iter().any(|&(lo, hi)| lo <= row && row <= hi)
            })
            .collect();
        debug!(
            "scan selected {} of {} cells",
            keys.len(),
            self.array.len()
        );
        self.scan = Some(ScanState {
            keys,
            attributes: request.attributes,
            segment_size: request.segment_size.max(1),
            next_key: 0,
            chunk: Vec::new(),
            chunk_pos: 0,
            started: false,
        });
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<CellHeader>> {
        self.check_open()?;
        {
            let state = self
                .scan
                .as_mut()
                .ok_or_else(|| VarGridError::State("advance before scan".into()))?;
            if state.started && state.chunk_pos + 1 < state.chunk.len() {
                state.chunk_pos += 1;
                return Ok(Some(state.chunk[state.chunk_pos].header));
            }
            state.started = true;
        }
        self.refill();
        let state = self.scan.as_ref().expect("scan state");
        Ok(state.chunk.first().map(|cell| cell.header))
    }

    fn current(&self) -> Result<Cell<'_>> {
        self.check_open()?;
        let state = self
            .scan
            .as_ref()
            .ok_or_else(|| VarGridError::State("current before scan".into()))?;
        if !state.started || state.chunk.is_empty() {
            return Err(VarGridError::State("no current cell".into()));
        }
        let cell = &state.chunk[state.chunk_pos];
        Ok(Cell {
            header: cell.header,
            fields: cell
                .fields
                .iter()
                .map(|field| FieldSlice {
                    name: &field.name,
                    bytes: &field.bytes,
                    elements: field.elements,
                })
                .collect(),
        })
    }

    fn close(&mut self) -> Result<()> {
        self.check_open()?;
        self.scan = None;
        self.closed = true;
        Ok(())
    }
}
