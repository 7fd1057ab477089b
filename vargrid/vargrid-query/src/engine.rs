//! The engine facade.
//!
//! `VarGrid` ties together a storage backend, the immutable workspace
//! metadata and a base query configuration. It is constructed either
//! directly from workspace parameters or from a query-configuration
//! document (file, string or binary payload) with a concurrency rank.
//!
//! Per-engine operations are single-threaded and cooperative; parallelism
//! happens across ranks, each owning a disjoint slice of the configured
//! ranges. The rank is always an explicit parameter — never ambient state.

use crate::cell::GenomicField;
use crate::processor::VariantCallProcessor;
use crate::reconcile::{CallRecord, Reconciler, Variant};
use crate::results::VariantResults;
use crate::scan::ScanIterator;
use crate::storage::ArrayBackend;
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vargrid_core::{
    interval, Metadata, QueryConfig, Result, VarGridError, DEFAULT_SEGMENT_SIZE,
};

// Attributes every query carries in addition to the requested projection.
const MANDATORY_ATTRIBUTES: [&str; 2] = ["REF", "ALT"];

/// Query engine over one workspace.
pub struct VarGrid {
    backend: Arc<dyn ArrayBackend>,
    metadata: Metadata,
    base_config: QueryConfig,
    // Array name → normalized per-array configuration; populated on first
    // use, never mutated during a query.
    config_cache: HashMap<String, QueryConfig>,
}

impl VarGrid {
    /// Connects to a workspace with explicit metadata files.
    ///
    /// # Errors
    ///
    /// `Config` on empty arguments, `Io`/`Config` from metadata loading.
    pub fn connect(
        backend: Arc<dyn ArrayBackend>,
        workspace: &str,
        callset_mapping_file: &str,
        vid_mapping_file: &str,
        reference_genome: &str,
        attributes: Vec<String>,
        segment_size: Option<u64>,
    ) -> Result<Self> {
        for (name, value) in [
            ("workspace", workspace),
            ("callset_mapping_file", callset_mapping_file),
            ("vid_mapping_file", vid_mapping_file),
            ("reference_genome", reference_genome),
        ] {
            if value.is_empty() {
                return Err(VarGridError::Config(format!("empty {name}")));
            }
        }
        let metadata = Metadata::load(
            &resolve_path(workspace, callset_mapping_file),
            &resolve_path(workspace, vid_mapping_file),
            reference_genome,
        )?;
        let base_config = QueryConfig::direct(
            workspace,
            String::new(),
            attributes,
            &interval::scan_full(),
            &[],
            segment_size.unwrap_or(DEFAULT_SEGMENT_SIZE),
        )?;
        Ok(VarGrid {
            backend,
            metadata,
            base_config,
            config_cache: HashMap::new(),
        })
    }

    /// Connects using a query-configuration document file.
    pub fn with_config_file(
        backend: Arc<dyn ArrayBackend>,
        path: &Path,
        rank: usize,
    ) -> Result<Self> {
        Self::from_config(backend, QueryConfig::from_file(path, rank)?)
    }

    /// Connects using a query-configuration document held in a string.
    pub fn with_config_str(
        backend: Arc<dyn ArrayBackend>,
        text: &str,
        rank: usize,
    ) -> Result<Self> {
        Self::from_config(backend, QueryConfig::from_json_str(text, rank)?)
    }

    /// Connects using a binary query-configuration payload.
    pub fn with_config_bytes(
        backend: Arc<dyn ArrayBackend>,
        payload: &[u8],
        rank: usize,
    ) -> Result<Self> {
        Self::from_config(backend, QueryConfig::from_bytes(payload, rank)?)
    }

    fn from_config(backend: Arc<dyn ArrayBackend>, config: QueryConfig) -> Result<Self> {
        let callset = config.callset_mapping_file.as_deref().ok_or_else(|| {
            VarGridError::Config("query document names no callset_mapping_file".into())
        })?;
        let vid = config.vid_mapping_file.as_deref().ok_or_else(|| {
            VarGridError::Config("query document names no vid_mapping_file".into())
        })?;
        let metadata = Metadata::load(
            &resolve_path(&config.workspace, callset),
            &resolve_path(&config.workspace, vid),
            config.reference_genome.as_deref().unwrap_or(""),
        )?;
        Ok(VarGrid {
            backend,
            metadata,
            base_config: config,
            config_cache: HashMap::new(),
        })
    }

    /// Workspace metadata resolver.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The engine's base configuration.
    pub fn config(&self) -> &QueryConfig {
        &self.base_config
    }

    /// Queries variants from an array with explicit ranges.
    pub fn query_variants(
        &mut self,
        array: &str,
        column_ranges: &[(u64, u64)],
        row_ranges: &[(u64, u64)],
    ) -> Result<VariantResults> {
        let config = self.config_with_ranges(array, column_ranges, row_ranges)?;
        self.collect_variants(&config)
    }

    /// Queries variants using the engine's configured array and ranges.
    pub fn query_variants_configured(&mut self) -> Result<VariantResults> {
        let config = self.configured()?;
        self.collect_variants(&config)
    }

    /// Streams variant calls into a processor, with explicit ranges.
    pub fn query_variant_calls(
        &mut self,
        processor: &mut dyn VariantCallProcessor,
        array: &str,
        column_ranges: &[(u64, u64)],
        row_ranges: &[(u64, u64)],
    ) -> Result<()> {
        let config = self.config_with_ranges(array, column_ranges, row_ranges)?;
        self.stream_calls(&config, processor)
    }

    /// Streams variant calls using the engine's configured array and ranges.
    pub fn query_variant_calls_configured(
        &mut self,
        processor: &mut dyn VariantCallProcessor,
    ) -> Result<()> {
        let config = self.configured()?;
        self.stream_calls(&config, processor)
    }

    fn configured(&self) -> Result<QueryConfig> {
        if self.base_config.array.is_empty() {
            return Err(VarGridError::Config(
                "engine was not constructed with a configured array".into(),
            ));
        }
        Ok(self.effective(self.base_config.clone()))
    }

    fn config_with_ranges(
        &mut self,
        array: &str,
        column_ranges: &[(u64, u64)],
        row_ranges: &[(u64, u64)],
    ) -> Result<QueryConfig> {
        let mut config = match self.config_cache.get(array) {
            Some(cached) => cached.clone(),
            None => {
                let mut base = self.base_config.clone();
                base.array = array.to_string();
                self.config_cache.insert(array.to_string(), base.clone());
                base
            }
        };
        config.column_ranges = interval::normalize_ranges(column_ranges)?;
        config.row_ranges = interval::normalize_ranges(row_ranges)?;
        Ok(self.effective(config))
    }

    // The projection always carries the mandatory attributes on top of the
    // requested ones; an empty projection already means "all".
    fn effective(&self, mut config: QueryConfig) -> QueryConfig {
        if !config.attributes.is_empty() {
            for required in MANDATORY_ATTRIBUTES {
                if !config.attributes.iter().any(|a| a == required) {
                    config.attributes.push(required.to_string());
                }
            }
        }
        config
    }

    fn collect_variants(&self, config: &QueryConfig) -> Result<VariantResults> {
        let mut scanner = ScanIterator::open(self.backend.as_ref(), config)?;
        let mut reconciler = Reconciler::new();
        while scanner.advance()?.is_some() {
            reconciler.push(owned_record(&scanner)?)?;
        }
        debug!(
            "collected query on '{}': {} cells skipped",
            config.array,
            scanner.skipped()
        );
        scanner.close()?;
        let (calls, variants) = reconciler.into_parts();
        Ok(VariantResults::new(calls, variants))
    }

    fn stream_calls(
        &self,
        config: &QueryConfig,
        processor: &mut dyn VariantCallProcessor,
    ) -> Result<()> {
        processor.initialize(self.metadata.fields())?;
        let mut scanner = ScanIterator::open(self.backend.as_ref(), config)?;
        let mut reconciler = Reconciler::new();
        while scanner.advance()?.is_some() {
            reconciler.push(owned_record(&scanner)?)?;
            while let Some(variant) = reconciler.pop() {
                self.deliver(&variant, reconciler.calls(), processor)?;
            }
        }
        reconciler.finish();
        while let Some(variant) = reconciler.pop() {
            self.deliver(&variant, reconciler.calls(), processor)?;
        }
        debug!(
            "streamed query on '{}': {} cells skipped",
            config.array,
            scanner.skipped()
        );
        scanner.close()
    }

    fn deliver(
        &self,
        variant: &Variant,
        calls: &[CallRecord],
        processor: &mut dyn VariantCallProcessor,
    ) -> Result<()> {
        processor.process_interval((variant.column_lo, variant.column_hi))?;
        for &idx in &variant.call_indices {
            let call = &calls[idx];
            let sample = self.metadata.row_to_sample(call.row)?;
            let genomic_interval = self
                .metadata
                .contigs()
                .genomic_interval(call.column, call.end)?;
            processor.process_call(
                sample,
                (call.row, call.column),
                &genomic_interval,
                &call.fields,
            )?;
        }
        Ok(())
    }
}

fn owned_record(scanner: &ScanIterator) -> Result<CallRecord> {
    let cell = scanner.current()?;
    Ok(CallRecord {
        row: cell.header.row,
        column: cell.header.column,
        end: cell.header.end,
        fields: cell.fields.iter().map(GenomicField::from_slice).collect(),
    })
}

fn resolve_path(workspace: &str, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        Path::new(workspace).join(candidate)
    }
}
