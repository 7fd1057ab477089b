//! VCF emission for the vargrid variant array engine
//!
//! Streams reconciled variants into VCF text. The emitter runs in processor
//! mode: every reconciled variant becomes one record, with REF/ALT merged
//! across the participating samples, genotypes remapped onto the merged
//! allele list, INFO unioned and FORMAT columns following the configured
//! field ordering.
//!
//! Output compression is dispatched by extension or an explicit format
//! string: plain text, gzip, or BGZF.

#![warn(missing_docs)]

/// The processor-mode VCF emitter.
pub mod emitter;
/// Compression-dispatching VCF writers.
pub mod writer;

pub use emitter::VcfEmitter;
pub use writer::{VcfCompressionType, VcfLocalWriter};

use std::path::Path;
use vargrid_core::{Result, VarGridError};
use vargrid_query::VarGrid;

/// Queries an array and writes the reconciled variants as VCF.
///
/// `format` selects compression: `"z"` gzip, `"bz"` BGZF, anything else
/// plain text. When `overwrite` is false an existing output file is a
/// `State` error.
pub fn generate_vcf(
    grid: &mut VarGrid,
    array: &str,
    column_ranges: &[(u64, u64)],
    row_ranges: &[(u64, u64)],
    output: &Path,
    format: &str,
    overwrite: bool,
) -> Result<()> {
    let mut emitter = open_emitter(grid, output, format, overwrite)?;
    grid.query_variant_calls(&mut emitter, array, column_ranges, row_ranges)?;
    emitter.finish()
}

/// Like [`generate_vcf`] but using the engine's configured array and ranges.
pub fn generate_vcf_configured(
    grid: &mut VarGrid,
    output: &Path,
    format: &str,
    overwrite: bool,
) -> Result<()> {
    let mut emitter = open_emitter(grid, output, format, overwrite)?;
    grid.query_variant_calls_configured(&mut emitter)?;
    emitter.finish()
}

fn open_emitter(
    grid: &VarGrid,
    output: &Path,
    format: &str,
    overwrite: bool,
) -> Result<VcfEmitter> {
    if !overwrite && output.exists() {
        return Err(VarGridError::State(format!(
            "output file '{}' exists and overwrite is disabled",
            output.display()
        )));
    }
    let compression = VcfCompressionType::from_format(format, output);
    let writer = VcfLocalWriter::with_compression(output, compression)?;
    Ok(VcfEmitter::new(grid.metadata().clone(), writer))
}
