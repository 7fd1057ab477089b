//! Processor-mode result delivery.
//!
//! Instead of buffering variants, a query can push every reconciled variant
//! and its calls into a caller-supplied [`VariantCallProcessor`]. Callbacks
//! run synchronously on the scan thread; a processor may perform I/O, but it
//! must not retain the borrowed field slices past the callback.

use crate::cell::GenomicField;
use log::debug;
use vargrid_core::{FieldRegistry, GenomicInterval, Result};

/// Receives reconciled variants call by call.
pub trait VariantCallProcessor {
    /// Called once before the first variant with the full field type map.
    fn initialize(&mut self, field_types: &FieldRegistry) -> Result<()> {
        let _ = field_types;
        Ok(())
    }

    /// Called once per reconciled variant, before its calls.
    fn process_interval(&mut self, interval: (u64, u64)) -> Result<()>;

    /// Called for each participating call, in ascending row order.
    ///
    /// `coordinates` is the `(row, column)` pair of the underlying cell;
    /// `genomic_interval` is the cell's own interval mapped to 1-based
    /// contig coordinates.
    fn process_call(
        &mut self,
        sample_name: &str,
        coordinates: (u64, u64),
        genomic_interval: &GenomicInterval,
        fields: &[GenomicField],
    ) -> Result<()>;
}

/// Default processor: logs each call at debug level.
#[derive(Debug, Default)]
pub struct LogCallProcessor {
    field_types: Option<FieldRegistry>,
}

impl LogCallProcessor {
    /// Creates the processor.
    pub fn new() -> Self {
        LogCallProcessor::default()
    }
}

impl VariantCallProcessor for LogCallProcessor {
    fn initialize(&mut self, field_types: &FieldRegistry) -> Result<()> {
        self.field_types = Some(field_types.clone());
        Ok(())
    }

    fn process_interval(&mut self, interval: (u64, u64)) -> Result<()> {
        debug!("variant interval [{}, {}]", interval.0, interval.1);
        Ok(())
    }

    fn process_call(
        &mut self,
        sample_name: &str,
        coordinates: (u64, u64),
        genomic_interval: &GenomicInterval,
        fields: &[GenomicField],
    ) -> Result<()> {
        let rendered: Vec<String> = fields
            .iter()
            .map(|field| {
                let value = self
                    .field_types
                    .as_ref()
                    .and_then(|types| types.field_type(field.name()).ok())
                    .map(|ty| field.to_display(ty))
                    .unwrap_or_else(|| String::from("?"));
                format!("{}={value}", field.name())
            })
            .collect();
        debug!(
            "call {} ({}, {}) {}:{}-{} {}",
            sample_name,
            coordinates.0,
            coordinates.1,
            genomic_interval.contig_name,
            genomic_interval.start,
            genomic_interval.end,
            rendered.join(" ")
        );
        Ok(())
    }
}
