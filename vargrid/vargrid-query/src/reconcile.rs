//! Interval reconciliation.
//!
//! Calls from different samples overlap freely on the column axis; a
//! **variant** is a maximal sub-interval over which the set of active calls
//! is constant. The reconciler consumes calls in `(column, row)` order and
//! emits variant boundaries whenever the sweep crosses a fresh call begin,
//! an `END + 1` of an active call, or a closing `END`.
//!
//! Calls are stored once in a flat vector; variants hold indices into it,
//! so a call spanning several reconciled variants is never duplicated.
//!
//! # Edge cases
//!
//! - A call with `END < begin` is a `Data` error (the scan layer normally
//!   filters these before they get here)
//! - A call beginning at `c_hi + 1` of the pending variant closes it exactly;
//!   no zero-width interval is emitted
//! - Two active calls on one row mean the per-row disjointness invariant is
//!   broken: `Data` error

use crate::cell::GenomicField;
use std::collections::VecDeque;
use vargrid_core::{Result, VarGridError};

/// One call: its originating row, interval and owned field bag.
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Row (callset) coordinate.
    pub row: u64,
    /// Start column of the call interval.
    pub column: u64,
    /// Inclusive end column of the call interval.
    pub end: u64,
    /// Owned attribute values in storage order.
    pub fields: Vec<GenomicField>,
}

/// A reconciled variant: an interval plus indices of participating calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Inclusive reconciled interval start.
    pub column_lo: u64,
    /// Inclusive reconciled interval end.
    pub column_hi: u64,
    /// Indices into the reconciler's call vector, ascending by row.
    pub call_indices: Vec<usize>,
}

/// Streaming interval reconciler.
#[derive(Debug, Default)]
pub struct Reconciler {
    calls: Vec<CallRecord>,
    // Indices of calls covering the open segment, sorted by row.
    active: Vec<usize>,
    segment_start: u64,
    ready: VecDeque<Variant>,
    finished: bool,
}

impl Reconciler {
    /// Creates an empty reconciler.
    pub fn new() -> Self {
        Reconciler::default()
    }

    /// Feeds the next call, in `(column, row)` order.
    ///
    /// Emitted variants become available through [`pop`](Reconciler::pop).
    pub fn push(&mut self, call: CallRecord) -> Result<()> {
        if self.finished {
            return Err(VarGridError::State("reconciler already finished".into()));
        }
        if call.end < call.column {
            return Err(VarGridError::Data(format!(
                "call ({}, {}): END {} < begin {}",
                call.row, call.column, call.end, call.column
            )));
        }
        let begin = call.column;

        // Close every segment that ends before this begin.
        while !self.active.is_empty() {
            let min_end = self.min_active_end();
            if min_end >= begin {
                break;
            }
            self.emit(self.segment_start, min_end);
            self.retire_through(min_end);
            self.segment_start = min_end + 1;
        }

        if self.active.is_empty() {
            self.segment_start = begin;
        } else if begin > self.segment_start {
            // A fresh begin inside an open segment splits it.
            self.emit(self.segment_start, begin - 1);
            self.segment_start = begin;
        }

        if self
            .active
            .iter()
            .any(|&idx| self.calls[idx].row == call.row)
        {
            return Err(VarGridError::Data(format!(
                "row {} has overlapping calls at column {}",
                call.row, call.column
            )));
        }

        let idx = self.calls.len();
        self.calls.push(call);
        let row = self.calls[idx].row;
        let pos = self
            .active
            .partition_point(|&existing| self.calls[existing].row < row);
        self.active.insert(pos, idx);
        Ok(())
    }

    /// Flushes the remaining open segments; no more calls may be pushed.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        while !self.active.is_empty() {
            let min_end = self.min_active_end();
            self.emit(self.segment_start, min_end);
            self.retire_through(min_end);
            self.segment_start = min_end + 1;
        }
    }

    /// Takes the next completed variant, if any.
    pub fn pop(&mut self) -> Option<Variant> {
        self.ready.pop_front()
    }

    /// The call vector variants index into.
    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    /// Consumes the reconciler, returning the call vector and any variants
    /// not yet popped.
    pub fn into_parts(mut self) -> (Vec<CallRecord>, Vec<Variant>) {
        self.finish();
        (self.calls, self.ready.into_iter().collect())
    }

    fn min_active_end(&self) -> u64 {
        self.active
            .iter()
            .map(|&idx| self.calls[idx].end)
            .min()
            .expect("active set non-empty")
    }

    fn retire_through(&mut self, end: u64) {
        let calls = &self.calls;
        self.active.retain(|&idx| calls[idx].end > end);
    }

    fn emit(&mut self, lo: u64, hi: u64) {
        self.ready.push_back(Variant {
            column_lo: lo,
            column_hi: hi,
            call_indices: self.active.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(row: u64, column: u64, end: u64) -> CallRecord {
        CallRecord {
            row,
            column,
            end,
            fields: Vec::new(),
        }
    }

    fn reconcile(calls: Vec<CallRecord>) -> (Vec<CallRecord>, Vec<Variant>) {
        let mut reconciler = Reconciler::new();
        for c in calls {
            reconciler.push(c).unwrap();
        }
        reconciler.into_parts()
    }

    /// A single SNV yields one single-call variant.
    #[test]
    fn test_single_cell() {
        let (calls, variants) = reconcile(vec![call(0, 100, 100)]);
        assert_eq!(variants.len(), 1);
        assert_eq!((variants[0].column_lo, variants[0].column_hi), (100, 100));
        assert_eq!(variants[0].call_indices, vec![0]);
        assert_eq!(calls.len(), 1);
    }

    /// Overlapping calls split into three maximal constant-membership
    /// segments.
    #[test]
    fn test_overlap_split() {
        let (_, variants) = reconcile(vec![call(0, 100, 150), call(1, 120, 200)]);
        assert_eq!(
            variants,
            vec![
                Variant {
                    column_lo: 100,
                    column_hi: 119,
                    call_indices: vec![0],
                },
                Variant {
                    column_lo: 120,
                    column_hi: 150,
                    call_indices: vec![0, 1],
                },
                Variant {
                    column_lo: 151,
                    column_hi: 200,
                    call_indices: vec![1],
                },
            ]
        );
    }

    /// A reference block split by a later SNV keeps the block's call in the
    /// middle segment.
    #[test]
    fn test_spanning_block_split_by_snv() {
        let (_, variants) = reconcile(vec![call(0, 1000, 2000), call(1, 1500, 1500)]);
        assert_eq!(variants.len(), 3);
        assert_eq!((variants[0].column_lo, variants[0].column_hi), (1000, 1499));
        assert_eq!((variants[1].column_lo, variants[1].column_hi), (1500, 1500));
        assert_eq!(variants[1].call_indices, vec![0, 1]);
        assert_eq!((variants[2].column_lo, variants[2].column_hi), (1501, 2000));
        assert_eq!(variants[2].call_indices, vec![0]);
    }

    /// Calls sharing a start column merge into one variant.
    #[test]
    fn test_shared_start_merges() {
        let (_, variants) = reconcile(vec![call(0, 100, 100), call(1, 100, 100)]);
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].call_indices, vec![0, 1]);
    }

    /// A begin at `c_hi + 1` starts a new variant with no zero-width
    /// interval in between.
    #[test]
    fn test_adjacent_begin_no_zero_width() {
        let (_, variants) = reconcile(vec![call(0, 100, 150), call(1, 151, 160)]);
        assert_eq!(variants.len(), 2);
        assert_eq!((variants[0].column_lo, variants[0].column_hi), (100, 150));
        assert_eq!((variants[1].column_lo, variants[1].column_hi), (151, 160));
    }

    /// Consecutive variants never overlap and calls stay row-ascending.
    #[test]
    fn test_global_invariants() {
        let (calls, variants) = reconcile(vec![
            call(2, 10, 40),
            call(0, 20, 30),
            call(1, 25, 55),
            call(0, 50, 50),
        ]);
        for pair in variants.windows(2) {
            assert!(
                pair[0].column_hi < pair[1].column_lo,
                "variants must be disjoint and ordered"
            );
        }
        for variant in &variants {
            assert!(variant.column_lo <= variant.column_hi);
            for &idx in &variant.call_indices {
                let c = &calls[idx];
                assert!(
                    c.column <= variant.column_lo && c.end >= variant.column_hi,
                    "every member call must contain the reconciled interval"
                );
            }
            let rows: Vec<u64> = variant.call_indices.iter().map(|&i| calls[i].row).collect();
            let mut sorted = rows.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(rows, sorted, "calls must be strictly ascending by row");
        }
    }

    #[test]
    fn test_inverted_call_rejected() {
        let mut reconciler = Reconciler::new();
        assert!(matches!(
            reconciler.push(call(0, 100, 90)).unwrap_err(),
            VarGridError::Data(_)
        ));
    }

    #[test]
    fn test_same_row_overlap_rejected() {
        let mut reconciler = Reconciler::new();
        reconciler.push(call(0, 100, 150)).unwrap();
        assert!(matches!(
            reconciler.push(call(0, 120, 130)).unwrap_err(),
            VarGridError::Data(_)
        ));
    }
}
