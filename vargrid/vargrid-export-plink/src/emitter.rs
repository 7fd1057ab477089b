//! Two-pass PLINK/BGEN emission.
//!
//! The scan delivers cells column-major, but every PLINK-family format
//! wants a dense variants × samples matrix. Pass 0 enumerates participating
//! samples and variant sites into ordered maps; `advance_state` freezes
//! them, assigns dense indices and writes everything that depends on the
//! sample list (TFAM/FAM, the BGEN sample identifier block). Pass 1 walks
//! the same query again and emits one matrix row per site, filling missing
//! samples. `finalize` is a distinct terminal transition: it flushes the
//! last row and backpatches the BGEN counts, so no state can patch twice.
//!
//! State machine: `Init → Phase0Scan → Phase1Scan → Finalize → Closed`.
//!
//! Malformed cells (ploidy 0, no alleles) are skipped with a warning and
//! surface as missing genotypes.

use crate::bed::{code_for_slots, BedWriter};
use crate::bgen::{BgenCompression, BgenWriter};
use crate::maps::{SampleGenotype, SampleMap, SiteInfo, VariantMap};
use crate::tped::{bim_line, site_id, write_pedigree, TpedWriter};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use vargrid_core::{GenomicInterval, Metadata, Result, VarGridError};
use vargrid_query::cell::{decode_alt_list, decode_genotype, GenomicField, NON_REF_ALLELE};
use vargrid_query::processor::VariantCallProcessor;

/// Emitter life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    /// Constructed, no scan started.
    Init,
    /// First pass: enumerating samples and sites.
    Phase0Scan,
    /// Second pass: emitting matrix rows.
    Phase1Scan,
    /// Terminal bookkeeping in progress.
    Finalize,
    /// All outputs finalized.
    Closed,
}

/// Which sibling artifacts to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlinkFormats {
    /// TPED + TFAM transposed text.
    pub tped: bool,
    /// BED + BIM + FAM bit-packed matrix.
    pub bed: bool,
    /// BGEN v1.2.
    pub bgen: bool,
}

impl Default for PlinkFormats {
    fn default() -> Self {
        PlinkFormats {
            tped: true,
            bed: true,
            bgen: true,
        }
    }
}

/// Options for [`crate::generate_ped_map`].
#[derive(Debug, Clone, Default)]
pub struct PedMapOptions {
    /// Artifacts to produce.
    pub formats: PlinkFormats,
    /// Fraction of the expected cell total between progress reports;
    /// 0 disables reporting.
    pub progress_interval: f64,
    /// Optional FAM override file (six columns, keyed by individual id).
    pub fam_list: Option<PathBuf>,
    /// BGEN genotype-block compression.
    pub bgen_compression: BgenCompression,
}

struct OutputFiles {
    tped: Option<TpedWriter>,
    tfam_path: Option<PathBuf>,
    bed: Option<BedWriter>,
    bim: Option<BufWriter<File>>,
    fam_path: Option<PathBuf>,
    bgen: Option<BgenWriter>,
}

/// Two-pass processor producing TPED/TFAM, BED/BIM/FAM and BGEN.
pub struct PlinkEmitter {
    metadata: Metadata,
    state: EmitterState,
    samples: SampleMap,
    sites: VariantMap,
    files: OutputFiles,
    fam_overrides: HashMap<String, String>,
    current_site: Option<u64>,
    row: Vec<Option<SampleGenotype>>,
    total_cells: u64,
    processed_cells: u64,
    progress_interval: f64,
    next_report: u64,
    skipped_cells: u64,
}

impl PlinkEmitter {
    /// Creates the emitter and its output files.
    ///
    /// `prefix` gains a `.{rank}` infix when `rank > 0` so that cooperating
    /// ranks write disjoint files. `total_cells` is the approximate upper
    /// bound the progress reports are measured against.
    pub fn new(
        metadata: Metadata,
        prefix: &Path,
        rank: usize,
        total_cells: u64,
        options: PedMapOptions,
    ) -> Result<Self> {
        let prefix = if rank > 0 {
            PathBuf::from(format!("{}.{rank}", prefix.display()))
        } else {
            prefix.to_path_buf()
        };
        let fam_overrides = match &options.fam_list {
            Some(path) => crate::tped::load_fam_overrides(path)?,
            None => HashMap::new(),
        };
        // Appends rather than with_extension: a rank-suffixed prefix like
        // "out.1" must keep its suffix.
        let with_ext = |ext: &str| PathBuf::from(format!("{}.{ext}", prefix.display()));
        let files = OutputFiles {
            tped: options
                .formats
                .tped
                .then(|| TpedWriter::create(&with_ext("tped")))
                .transpose()?,
            tfam_path: options.formats.tped.then(|| with_ext("tfam")),
            bed: options
                .formats
                .bed
                .then(|| BedWriter::create(&with_ext("bed")))
                .transpose()?,
            bim: options
                .formats
                .bed
                .then(|| File::create(with_ext("bim")).map(BufWriter::new))
                .transpose()?,
            fam_path: options.formats.bed.then(|| with_ext("fam")),
            bgen: options
                .formats
                .bgen
                .then(|| BgenWriter::create(&with_ext("bgen"), options.bgen_compression))
                .transpose()?,
        };
        let next_report = report_step(total_cells, options.progress_interval);
        Ok(PlinkEmitter {
            metadata,
            state: EmitterState::Init,
            samples: SampleMap::new(),
            sites: VariantMap::new(),
            files,
            fam_overrides,
            current_site: None,
            row: Vec::new(),
            total_cells,
            processed_cells: 0,
            progress_interval: options.progress_interval,
            next_report,
            skipped_cells: 0,
        })
    }

    /// Current life-cycle state.
    pub fn state(&self) -> EmitterState {
        self.state
    }

    /// Cells skipped as malformed, across both passes.
    pub fn skipped_cells(&self) -> u64 {
        self.skipped_cells
    }

    /// Transitions from the enumeration pass to the emission pass:
    /// freezes both maps and writes the sample-dependent prologues.
    ///
    /// # Errors
    ///
    /// `State` unless the emitter is in `Phase0Scan`.
    pub fn advance_state(&mut self) -> Result<()> {
        if self.state != EmitterState::Phase0Scan {
            return Err(VarGridError::State(format!(
                "advance_state in {:?}",
                self.state
            )));
        }
        self.samples.freeze();
        self.sites.freeze();
        debug!(
            "phase 0 enumerated {} samples, {} variant sites",
            self.samples.len(),
            self.sites.len()
        );
        if let Some(path) = &self.files.tfam_path {
            write_pedigree(path, self.samples.dense(), &self.fam_overrides)?;
        }
        if let Some(path) = &self.files.fam_path {
            write_pedigree(path, self.samples.dense(), &self.fam_overrides)?;
        }
        if let Some(bgen) = self.files.bgen.as_mut() {
            bgen.write_sample_block(self.samples.dense())?;
        }
        self.processed_cells = 0;
        self.next_report = report_step(self.total_cells, self.progress_interval);
        self.state = EmitterState::Phase1Scan;
        Ok(())
    }

    /// Flushes the last matrix row, backpatches headers and closes every
    /// output.
    ///
    /// # Errors
    ///
    /// `State` unless the emitter is in `Phase1Scan`.
    pub fn finalize(mut self) -> Result<()> {
        if self.state != EmitterState::Phase1Scan {
            return Err(VarGridError::State(format!("finalize in {:?}", self.state)));
        }
        self.state = EmitterState::Finalize;
        self.flush_row()?;
        if let Some(tped) = self.files.tped.take() {
            tped.finish()?;
        }
        if let Some(bed) = self.files.bed.take() {
            bed.finish()?;
        }
        if let Some(mut bim) = self.files.bim.take() {
            bim.flush()?;
        }
        if let Some(bgen) = self.files.bgen.take() {
            bgen.finalize(self.samples.len() as u32)?;
        }
        if self.skipped_cells > 0 {
            warn!("{} malformed cells were skipped", self.skipped_cells);
        }
        self.state = EmitterState::Closed;
        Ok(())
    }

    fn count_cell(&mut self) {
        self.processed_cells += 1;
        if self.next_report > 0 && self.processed_cells >= self.next_report {
            let percent =
                (self.processed_cells as f64 / self.total_cells.max(1) as f64) * 100.0;
            info!(
                "processed {} of ~{} cells ({percent:.0}%)",
                self.processed_cells, self.total_cells
            );
            self.next_report += report_step(self.total_cells, self.progress_interval);
        }
    }

    // Pulls id/REF/ALT/GT out of one call's field bag.
    fn observation(
        &self,
        fields: &[GenomicField],
    ) -> (
        Option<String>,
        Option<String>,
        Vec<String>,
        Option<vargrid_query::cell::Genotype>,
    ) {
        let registry = self.metadata.fields();
        let string_of = |name: &str| -> Option<String> {
            let field = fields.iter().find(|f| f.name() == name)?;
            let ty = registry.field_type(name).ok()?;
            field.str_value(ty).ok().map(str::to_string)
        };
        let id = string_of("ID").filter(|v| !v.is_empty());
        let reference = string_of("REF").filter(|v| !v.is_empty());
        let alts = string_of("ALT")
            .map(|raw| decode_alt_list(&raw))
            .unwrap_or_default();
        let genotype = fields
            .iter()
            .find(|f| f.name() == "GT")
            .and_then(|field| {
                let ty = registry.field_type("GT").ok()?;
                let values = field.int_values(ty).ok()?;
                decode_genotype(&values, ty.contains_phase).ok()
            });
        (id, reference, alts, genotype)
    }

    fn flush_row(&mut self) -> Result<()> {
        let Some(column) = self.current_site.take() else {
            return Ok(());
        };
        let site = self
            .sites
            .site(column)
            .ok_or_else(|| {
                VarGridError::Data(format!(
                    "phase 1 saw column {column} that phase 0 never enumerated"
                ))
            })?
            .clone();
        let (contig, position) = self.metadata.contigs().column_to_genomic(column)?;
        let chrom = contig.name.clone();

        if let Some(tped) = self.files.tped.as_mut() {
            tped.begin_row(&chrom, position, &site)?;
            for genotype in &self.row {
                tped.push_genotype(&site, genotype.as_ref().map(|g| g.slots.as_slice()));
            }
            tped.end_row()?;
        }
        if let Some(bed) = self.files.bed.as_mut() {
            for genotype in &self.row {
                bed.push(code_for_slots(
                    genotype.as_ref().map(|g| g.slots.as_slice()),
                ))?;
            }
            bed.end_row()?;
        }
        if let Some(bim) = self.files.bim.as_mut() {
            bim.write_all(bim_line(&chrom, position, &site).as_bytes())?;
            bim.write_all(b"\n")?;
        }
        if let Some(bgen) = self.files.bgen.as_mut() {
            bgen.write_variant(
                &chrom,
                position,
                &site_id(&chrom, position, &site),
                &site,
                &self.row,
            )?;
        }
        Ok(())
    }
}

impl VariantCallProcessor for PlinkEmitter {
    fn initialize(&mut self, _field_types: &vargrid_core::FieldRegistry) -> Result<()> {
        match self.state {
            EmitterState::Init => {
                self.state = EmitterState::Phase0Scan;
                Ok(())
            }
            // The second pass re-initializes the same emitter.
            EmitterState::Phase1Scan => Ok(()),
            state => Err(VarGridError::State(format!(
                "scan started while emitter is in {state:?}"
            ))),
        }
    }

    fn process_interval(&mut self, interval: (u64, u64)) -> Result<()> {
        match self.state {
            EmitterState::Phase0Scan => {
                self.current_site = Some(interval.0);
                Ok(())
            }
            EmitterState::Phase1Scan => {
                self.flush_row()?;
                self.current_site = Some(interval.0);
                self.row = vec![None; self.samples.len()];
                Ok(())
            }
            state => Err(VarGridError::State(format!(
                "process_interval while emitter is in {state:?}"
            ))),
        }
    }

    fn process_call(
        &mut self,
        sample_name: &str,
        coordinates: (u64, u64),
        _genomic_interval: &GenomicInterval,
        fields: &[GenomicField],
    ) -> Result<()> {
        self.count_cell();
        let column = self.current_site.ok_or_else(|| {
            VarGridError::State("process_call before process_interval".into())
        })?;
        let (row, _) = coordinates;
        let (id, reference, alts, genotype) = self.observation(fields);
        match self.state {
            EmitterState::Phase0Scan => {
                self.samples.observe(row, sample_name)?;
                let (phased, ploidy) = genotype
                    .as_ref()
                    .map(|g| (g.phased, g.ploidy()))
                    .unwrap_or((false, 0));
                if ploidy == 0 {
                    warn!(
                        "skipping malformed cell ({row}, {}): no genotype",
                        coordinates.1
                    );
                    self.skipped_cells += 1;
                }
                self.sites
                    .observe(column, id.as_deref(), reference.as_deref(), &alts, phased)
            }
            EmitterState::Phase1Scan => {
                let Some(dense) = self.samples.dense_index(row) else {
                    return Err(VarGridError::Data(format!(
                        "phase 1 saw row {row} that phase 0 never enumerated"
                    )));
                };
                let Some(site) = self.sites.site(column) else {
                    return Err(VarGridError::Data(format!(
                        "phase 1 saw column {column} that phase 0 never enumerated"
                    )));
                };
                match genotype {
                    Some(genotype) if genotype.ploidy() > 0 => {
                        self.row[dense] = Some(remap_genotype(&genotype, &alts, site));
                    }
                    // Stays None: part of the missing mask.
                    _ => {
                        self.skipped_cells += 1;
                    }
                }
                Ok(())
            }
            state => Err(VarGridError::State(format!(
                "process_call while emitter is in {state:?}"
            ))),
        }
    }
}

// Remaps a call's own allele indices onto the site's merged allele list.
fn remap_genotype(
    genotype: &vargrid_query::cell::Genotype,
    call_alts: &[String],
    site: &SiteInfo,
) -> SampleGenotype {
    let site_alleles = site.alleles();
    let slots = genotype
        .alleles
        .iter()
        .map(|slot| match slot {
            None => None,
            Some(0) => Some(0u16),
            Some(idx) => call_alts
                .get(*idx as usize - 1)
                .filter(|allele| allele.as_str() != NON_REF_ALLELE)
                .and_then(|allele| {
                    site_alleles
                        .iter()
                        .position(|a| a == allele)
                        .map(|p| p as u16)
                }),
        })
        .collect();
    SampleGenotype {
        slots,
        phased: genotype.phased,
    }
}

fn report_step(total_cells: u64, progress_interval: f64) -> u64 {
    if progress_interval > 0.0 {
        ((total_cells as f64 * progress_interval) as u64).max(1)
    } else {
        0
    }
}
