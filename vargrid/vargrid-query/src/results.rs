//! Collection-mode result handle.
//!
//! `VariantResults` owns the reconciled variants of one query and the flat
//! call vector they index into. The handle supports random access, forward
//! iteration, and explicit storage release; releasing twice is a `State`
//! error, and dropping the handle releases implicitly.

use crate::reconcile::{CallRecord, Variant};
use vargrid_core::{Result, VarGridError};

/// Owned result set of a variant query.
#[derive(Debug, Default)]
pub struct VariantResults {
    calls: Vec<CallRecord>,
    variants: Vec<Variant>,
    cursor: usize,
    freed: bool,
}

/// One variant resolved against the result set's call vector.
#[derive(Debug, Clone, Copy)]
pub struct VariantHandle<'a> {
    results: &'a VariantResults,
    variant: &'a Variant,
}

impl VariantResults {
    pub(crate) fn new(calls: Vec<CallRecord>, variants: Vec<Variant>) -> Self {
        VariantResults {
            calls,
            variants,
            cursor: 0,
            freed: false,
        }
    }

    /// Number of variants, 0 after `free`.
    pub fn size(&self) -> usize {
        if self.freed {
            0
        } else {
            self.variants.len()
        }
    }

    /// Random access; `None` out of range or after `free`.
    pub fn at(&self, pos: usize) -> Option<VariantHandle<'_>> {
        if self.freed {
            return None;
        }
        self.variants.get(pos).map(|variant| VariantHandle {
            results: self,
            variant,
        })
    }

    /// Forward iteration; `None` at the end.
    pub fn next(&mut self) -> Option<VariantHandle<'_>> {
        let pos = self.cursor;
        self.cursor += 1;
        self.at(pos)
    }

    /// Releases the owned storage.
    ///
    /// # Errors
    ///
    /// `State` when already freed.
    pub fn free(&mut self) -> Result<()> {
        if self.freed {
            return Err(VarGridError::State("variant results freed twice".into()));
        }
        self.freed = true;
        self.calls = Vec::new();
        self.variants = Vec::new();
        Ok(())
    }
}

impl<'a> VariantHandle<'a> {
    /// The reconciled `(column_lo, column_hi)` interval.
    pub fn interval(&self) -> (u64, u64) {
        (self.variant.column_lo, self.variant.column_hi)
    }

    /// Number of participating calls.
    pub fn num_calls(&self) -> usize {
        self.variant.call_indices.len()
    }

    /// Participating calls in ascending row order.
    pub fn calls(&self) -> impl Iterator<Item = &'a CallRecord> + 'a {
        let results = self.results;
        let variant = self.variant;
        variant
            .call_indices
            .iter()
            .map(move |&idx| &results.calls[idx])
    }
}
