//! Column-major scan iteration.
//!
//! `ScanIterator` compiles a normalized query configuration against one
//! opened array: it intersects the requested ranges with the array domain
//! once, projects attributes, and then walks cells in `(column, row)` order.
//! An empty intersection never starts a scan on the handle.
//!
//! Two classes of bad input are handled differently, per the recovery
//! policy: a malformed individual cell (`END < c_begin`) is skipped with a
//! warning and a counter increment, while an ordering violation from the
//! backend is a fatal `Data` error.

use crate::cell::{Cell, CellHeader};
use crate::storage::{ArrayBackend, ArrayHandle, ScanRequest};
use log::{debug, warn};
use std::path::Path;
use vargrid_core::interval;
use vargrid_core::{QueryConfig, Result, VarGridError};

/// A planned scan over one array.
pub struct ScanIterator {
    handle: Box<dyn ArrayHandle>,
    // Empty domain intersection: the iterator yields nothing and the handle
    // never scans.
    exhausted: bool,
    last_key: Option<(u64, u64)>,
    skipped: u64,
    closed: bool,
}

impl ScanIterator {
    /// Opens the configured array and plans the scan.
    ///
    /// # Errors
    ///
    /// Propagates `NotFound`/`Io` from the backend open and `Config` from
    /// range normalization.
    pub fn open(backend: &dyn ArrayBackend, config: &QueryConfig) -> Result<Self> {
        let mut handle = backend.open_array(Path::new(&config.workspace), &config.array)?;
        let domain = handle.domain();
        let column_ranges = interval::intersect(&config.column_ranges, domain.columns);
        let row_ranges = if config.row_ranges.is_empty() {
            Vec::new()
        } else {
            interval::intersect(&config.row_ranges, domain.rows)
        };
        // An explicit row constraint that misses the domain is as empty as a
        // missed column constraint.
        let exhausted =
            column_ranges.is_empty() || (!config.row_ranges.is_empty() && row_ranges.is_empty());
        if exhausted {
            debug!(
                "query on array '{}' does not intersect the domain; skipping scan",
                config.array
            );
        } else {
            handle.scan(ScanRequest {
                attributes: config.attributes.clone(),
                row_ranges,
                column_ranges,
                segment_size: config.segment_size,
            })?;
        }
        Ok(ScanIterator {
            handle,
            exhausted,
            last_key: None,
            skipped: 0,
            closed: false,
        })
    }

    /// Steps to the next well-formed cell.
    ///
    /// # Errors
    ///
    /// `Data` when the backend violates `(column, row)` ordering, `State`
    /// after `close`.
    pub fn advance(&mut self) -> Result<Option<CellHeader>> {
        if self.closed {
            return Err(VarGridError::State("scan iterator used after close".into()));
        }
        if self.exhausted {
            return Ok(None);
        }
        loop {
            let header = match self.handle.advance()? {
                Some(header) => header,
                None => {
                    self.exhausted = true;
                    return Ok(None);
                }
            };
            let key = (header.column, header.row);
            if let Some(last) = self.last_key {
                if key <= last {
                    return Err(VarGridError::Data(format!(
                        "cell ({}, {}) arrived after ({}, {}): backend broke column-major order",
                        header.row, header.column, last.1, last.0
                    )));
                }
            }
            self.last_key = Some(key);
            if header.end < header.column {
                warn!(
                    "skipping malformed cell ({}, {}): END {} < begin {}",
                    header.row, header.column, header.end, header.column
                );
                self.skipped += 1;
                continue;
            }
            return Ok(Some(header));
        }
    }

    /// The cell `advance` last returned; borrow valid until the next call.
    pub fn current(&self) -> Result<Cell<'_>> {
        if self.closed {
            return Err(VarGridError::State("scan iterator used after close".into()));
        }
        self.handle.current()
    }

    /// Number of malformed cells skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Closes the scan and the underlying array handle.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(VarGridError::State("scan iterator closed twice".into()));
        }
        self.closed = true;
        self.handle.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{MemoryArray, MemoryBackend, StoredField};
    use std::path::PathBuf;
    use vargrid_core::QueryConfig;

    fn backend() -> (MemoryBackend, PathBuf) {
        let mut array = MemoryArray::new(2, 1000);
        array
            .insert(0, 10, 20, vec![StoredField::text("REF", "A")])
            .unwrap();
        array
            .insert(1, 15, 15, vec![StoredField::text("REF", "T")])
            .unwrap();
        let workspace = PathBuf::from("/ws");
        let mut backend = MemoryBackend::new();
        backend.register(&workspace, "calls", array);
        (backend, workspace)
    }

    fn config(column_ranges: &[(u64, u64)], row_ranges: &[(u64, u64)]) -> QueryConfig {
        QueryConfig::direct("/ws", "calls", Vec::new(), column_ranges, row_ranges, 1024).unwrap()
    }

    #[test]
    fn test_scan_yields_in_order() {
        let (backend, _) = backend();
        let mut scan = ScanIterator::open(&backend, &config(&[(0, 999)], &[])).unwrap();
        let first = scan.advance().unwrap().unwrap();
        assert_eq!((first.column, first.row, first.end), (10, 0, 20));
        let second = scan.advance().unwrap().unwrap();
        assert_eq!((second.column, second.row), (15, 1));
        assert!(scan.advance().unwrap().is_none());
        scan.close().unwrap();
    }

    /// Ranges outside the domain yield nothing without starting a scan.
    #[test]
    fn test_empty_intersection_short_circuits() {
        let (backend, _) = backend();
        let mut scan = ScanIterator::open(&backend, &config(&[(5000, 6000)], &[])).unwrap();
        assert!(scan.advance().unwrap().is_none());

        let mut scan = ScanIterator::open(&backend, &config(&[(0, 999)], &[(10, 20)])).unwrap();
        assert!(scan.advance().unwrap().is_none());
    }

    #[test]
    fn test_close_then_advance_is_state_error() {
        let (backend, _) = backend();
        let mut scan = ScanIterator::open(&backend, &config(&[(0, 999)], &[])).unwrap();
        scan.close().unwrap();
        assert!(matches!(
            scan.advance().unwrap_err(),
            VarGridError::State(_)
        ));
    }
}
