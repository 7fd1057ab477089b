//! Range arithmetic on the row and column axes.
//!
//! Query ranges are inclusive `(lo, hi)` pairs. Normalization sorts and
//! merges them once per query; intersection with the array domain decides
//! whether the array needs to be opened at all.
//!
//! # Edge cases
//!
//! - `lo > hi` in a requested range → `Config` error
//! - Adjacent ranges (`hi + 1 == next.lo`) are merged
//! - An empty intersection yields an empty list, never an error

use crate::error::{Result, VarGridError};

/// Inclusive `(lo, hi)` range pairs.
pub type RangeList = Vec<(u64, u64)>;

/// Largest addressable coordinate, `2^63 - 2`.
pub const MAX_COORDINATE: u64 = i64::MAX as u64 - 1;

/// The full-axis scan range `[[0, 2^63 - 2]]`.
pub fn scan_full() -> RangeList {
    vec![(0, MAX_COORDINATE)]
}

/// Sorts and merges ranges, rejecting inverted pairs.
///
/// # Errors
///
/// Returns a `Config` error when any range has `lo > hi`.
pub fn normalize_ranges(ranges: &[(u64, u64)]) -> Result<RangeList> {
    for &(lo, hi) in ranges {
        if lo > hi {
            return Err(VarGridError::Config(format!(
                "inverted range [{lo}, {hi}]"
            )));
        }
    }
    let mut sorted: RangeList = ranges.to_vec();
    sorted.sort_unstable();
    let mut merged: RangeList = Vec::with_capacity(sorted.len());
    for (lo, hi) in sorted {
        match merged.last_mut() {
            Some((_, last_hi)) if lo <= last_hi.saturating_add(1) => {
                *last_hi = (*last_hi).max(hi);
            }
            _ => merged.push((lo, hi)),
        }
    }
    Ok(merged)
}

/// Intersects normalized ranges with an inclusive domain.
pub fn intersect(ranges: &[(u64, u64)], domain: (u64, u64)) -> RangeList {
    let (dom_lo, dom_hi) = domain;
    ranges
        .iter()
        .filter_map(|&(lo, hi)| {
            let lo = lo.max(dom_lo);
            let hi = hi.min(dom_hi);
            (lo <= hi).then_some((lo, hi))
        })
        .collect()
}

/// Sum of `hi - lo + 1` over the ranges, saturating.
///
/// Used by emitters for progress totals; on a sparse array this is an upper
/// bound on the number of cells, not an exact count.
pub fn total_width(ranges: &[(u64, u64)]) -> u64 {
    ranges
        .iter()
        .fold(0u64, |acc, &(lo, hi)| acc.saturating_add(hi - lo + 1))
}
