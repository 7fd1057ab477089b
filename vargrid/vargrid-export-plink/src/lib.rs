//! PLINK and BGEN emission for the vargrid variant array engine
//!
//! Produces three sibling artifact families from one query: TPED/TFAM
//! transposed text, the bit-packed BED matrix with BIM/FAM sidecars, and
//! BGEN v1.2 with per-variant compressed genotype probability blocks.
//!
//! The scan order is column-major, so the emitter runs the query twice: a
//! first pass enumerates participating samples and variant sites, a second
//! pass emits matrix rows. See [`emitter`] for the state machine.

#![warn(missing_docs)]

/// BED bit packing and the BED/BIM/FAM writers.
pub mod bed;
/// BGEN v1.2 writing and probability-slot enumeration.
pub mod bgen;
/// Two-pass orchestration.
pub mod emitter;
/// Phase-0 sample/variant maps.
pub mod maps;
/// TPED rows and pedigree/BIM sidecar lines.
pub mod tped;

pub use bgen::BgenCompression;
pub use emitter::{EmitterState, PedMapOptions, PlinkEmitter, PlinkFormats};

use std::path::Path;
use vargrid_core::{interval, Result};
use vargrid_query::VarGrid;

/// Queries an array twice and writes the selected PLINK-family artifacts
/// under `prefix` (`.tped`, `.tfam`, `.bed`, `.bim`, `.fam`, `.bgen`).
///
/// When the engine's concurrency rank is greater than 0 the prefix gains a
/// `.{rank}` infix, keeping per-rank outputs disjoint.
pub fn generate_ped_map(
    grid: &mut VarGrid,
    array: &str,
    column_ranges: &[(u64, u64)],
    row_ranges: &[(u64, u64)],
    prefix: &Path,
    options: PedMapOptions,
) -> Result<()> {
    let total = expected_cells(grid, column_ranges, row_ranges);
    let rank = grid.config().rank;
    let mut emitter = PlinkEmitter::new(grid.metadata().clone(), prefix, rank, total, options)?;
    grid.query_variant_calls(&mut emitter, array, column_ranges, row_ranges)?;
    emitter.advance_state()?;
    grid.query_variant_calls(&mut emitter, array, column_ranges, row_ranges)?;
    emitter.finalize()
}

/// Like [`generate_ped_map`] but using the engine's configured array and
/// ranges.
pub fn generate_ped_map_configured(
    grid: &mut VarGrid,
    prefix: &Path,
    options: PedMapOptions,
) -> Result<()> {
    let config = grid.config().clone();
    let total = expected_cells(grid, &config.column_ranges, &config.row_ranges);
    let mut emitter =
        PlinkEmitter::new(grid.metadata().clone(), prefix, config.rank, total, options)?;
    grid.query_variant_calls_configured(&mut emitter)?;
    emitter.advance_state()?;
    grid.query_variant_calls_configured(&mut emitter)?;
    emitter.finalize()
}

// Approximate upper bound on the cells one pass will deliver: the product
// of the range widths (occupancy is unknown up front on a sparse array).
fn expected_cells(grid: &VarGrid, column_ranges: &[(u64, u64)], row_ranges: &[(u64, u64)]) -> u64 {
    let column_width = interval::total_width(column_ranges);
    let row_width = if row_ranges.is_empty() {
        grid.metadata().samples().len() as u64
    } else {
        interval::total_width(row_ranges)
    };
    column_width.saturating_mul(row_width)
}
