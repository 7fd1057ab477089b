//! BGEN v1.2 writer (layout 2, bit depth 8).
//!
//! File shape: a 4-byte offset to the first variant block, the 20-byte
//! header (length, variant count M, sample count N, magic, flags), the
//! sample identifier block, then one block per variant. M, N and the offset
//! depend on content produced later, so they are written as placeholders and
//! backpatched by [`BgenWriter::finalize`].
//!
//! Each variant's genotype probabilities are built in a buffer first: min
//! and max ploidy land at fixed offsets once every sample has been seen,
//! then the whole buffer runs through the configured codec.

use crate::maps::{SampleGenotype, SiteInfo};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use vargrid_core::{Result, VarGridError};
use vargrid_query::storage::{create_codec, CodecKind};

/// BGEN magic bytes.
pub const BGEN_MAGIC: [u8; 4] = *b"bgen";

const HEADER_LENGTH: u32 = 20;
const LAYOUT_VERSION: u32 = 2;
const BIT_DEPTH: u8 = 8;
const PROBABILITY_ONE: u8 = u8::MAX;
const MISSING_BIT: u8 = 0x80;
const DEFAULT_PLOIDY: usize = 2;
const ZLIB_LEVEL: u32 = 6;
const ZSTD_LEVEL: u32 = 3;

// Byte offsets of the min/max ploidy fields inside a probability buffer.
const MIN_PLOIDY_OFFSET: usize = 6;
const MAX_PLOIDY_OFFSET: usize = 7;

/// Genotype-block compression, encoded in header flag bits 0–1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BgenCompression {
    /// Raw probability blocks.
    None,
    /// zlib-compressed blocks.
    #[default]
    Zlib,
    /// Zstandard-compressed blocks.
    Zstd,
}

impl BgenCompression {
    fn flag_bits(&self) -> u32 {
        match self {
            BgenCompression::None => 0,
            BgenCompression::Zlib => 1,
            BgenCompression::Zstd => 2,
        }
    }

    fn codec_kind(&self) -> Option<CodecKind> {
        match self {
            BgenCompression::None => None,
            BgenCompression::Zlib => Some(CodecKind::Zlib),
            BgenCompression::Zstd => Some(CodecKind::Zstd),
        }
    }

    fn level(&self) -> u32 {
        match self {
            BgenCompression::Zstd => ZSTD_LEVEL,
            _ => ZLIB_LEVEL,
        }
    }
}

/// Enumerates allele-count vectors `(a_1, …, a_K)` with `Σ a_i = ploidy` in
/// colex order: the order downstream BGEN consumers expect unphased
/// probability slots in.
pub fn genotype_count_vectors(ploidy: usize, num_alleles: usize) -> Vec<Vec<u8>> {
    fn tuples(ploidy: usize, max_allele: usize) -> Vec<Vec<u16>> {
        if ploidy == 0 {
            return vec![Vec::new()];
        }
        let mut out = Vec::new();
        for top in 0..max_allele {
            for mut rest in tuples(ploidy - 1, top + 1) {
                rest.push(top as u16);
                out.push(rest);
            }
        }
        out
    }
    tuples(ploidy, num_alleles)
        .into_iter()
        .map(|tuple| {
            let mut counts = vec![0u8; num_alleles];
            for allele in tuple {
                counts[allele as usize] += 1;
            }
            counts
        })
        .collect()
}

/// Number of stored probability values for one unphased sample: one per
/// genotype minus the dropped last slot.
pub fn unphased_slot_count(ploidy: usize, num_alleles: usize) -> usize {
    genotype_count_vectors(ploidy, num_alleles).len().saturating_sub(1)
}

/// Number of stored probability values for one phased sample.
pub fn phased_slot_count(ploidy: usize, num_alleles: usize) -> usize {
    ploidy * num_alleles.saturating_sub(1)
}

/// Streaming BGEN writer.
pub struct BgenWriter {
    out: BufWriter<File>,
    compression: BgenCompression,
    sample_block_length: u32,
    variants_written: u32,
}

impl BgenWriter {
    /// Creates the file and writes the header with M/N/offset placeholders.
    pub fn create(path: &Path, compression: BgenCompression) -> Result<Self> {
        let mut out = BufWriter::new(File::create(path)?);
        let flags = compression.flag_bits() | (LAYOUT_VERSION << 2) | (1 << 31);
        out.write_all(&0u32.to_le_bytes())?; // offset, backpatched
        out.write_all(&HEADER_LENGTH.to_le_bytes())?;
        out.write_all(&0u32.to_le_bytes())?; // M, backpatched
        out.write_all(&0u32.to_le_bytes())?; // N, backpatched
        out.write_all(&BGEN_MAGIC)?;
        out.write_all(&flags.to_le_bytes())?;
        Ok(BgenWriter {
            out,
            compression,
            sample_block_length: 0,
            variants_written: 0,
        })
    }

    /// Writes the sample identifier block; must precede any variant block.
    pub fn write_sample_block(&mut self, samples: &[(u64, String)]) -> Result<()> {
        if self.variants_written > 0 || self.sample_block_length > 0 {
            return Err(VarGridError::State(
                "sample identifier block must be written exactly once, before variants".into(),
            ));
        }
        let names_length: u32 = samples
            .iter()
            .map(|(_, name)| 2 + name.len() as u32)
            .sum();
        let block_length = 8 + names_length;
        self.out.write_all(&block_length.to_le_bytes())?;
        self.out
            .write_all(&(samples.len() as u32).to_le_bytes())?;
        for (_, name) in samples {
            self.out.write_all(&(name.len() as u16).to_le_bytes())?;
            self.out.write_all(name.as_bytes())?;
        }
        self.sample_block_length = block_length;
        Ok(())
    }

    /// Writes one variant block with its genotype probability data.
    ///
    /// `genotypes` is indexed by dense sample index; `None` entries are
    /// missing samples.
    pub fn write_variant(
        &mut self,
        chrom: &str,
        position: u64,
        id: &str,
        site: &SiteInfo,
        genotypes: &[Option<SampleGenotype>],
    ) -> Result<()> {
        let alleles = site.alleles();
        // Variant id and rsid carry the same identifier.
        for _ in 0..2 {
            self.out.write_all(&(id.len() as u16).to_le_bytes())?;
            self.out.write_all(id.as_bytes())?;
        }
        self.out.write_all(&(chrom.len() as u16).to_le_bytes())?;
        self.out.write_all(chrom.as_bytes())?;
        self.out.write_all(&(position as u32).to_le_bytes())?;
        self.out
            .write_all(&(alleles.len() as u16).to_le_bytes())?;
        for allele in &alleles {
            self.out.write_all(&(allele.len() as u32).to_le_bytes())?;
            self.out.write_all(allele.as_bytes())?;
        }

        let buffer = probability_buffer(site, genotypes);
        match self.compression.codec_kind() {
            Some(kind) => {
                let mut compressed = Vec::new();
                create_codec(kind, self.compression.level())
                    .compress(&buffer, &mut compressed)?;
                self.out
                    .write_all(&((4 + compressed.len()) as u32).to_le_bytes())?;
                self.out.write_all(&(buffer.len() as u32).to_le_bytes())?;
                self.out.write_all(&compressed)?;
            }
            None => {
                self.out.write_all(&(buffer.len() as u32).to_le_bytes())?;
                self.out.write_all(&buffer)?;
            }
        }
        self.variants_written += 1;
        Ok(())
    }

    /// Backpatches the offset, M and N fields and closes the file.
    pub fn finalize(mut self, num_samples: u32) -> Result<()> {
        self.out.flush()?;
        let offset = HEADER_LENGTH + self.sample_block_length;
        self.out.seek(SeekFrom::Start(0))?;
        self.out.write_all(&offset.to_le_bytes())?;
        self.out.seek(SeekFrom::Start(8))?;
        self.out.write_all(&self.variants_written.to_le_bytes())?;
        self.out.write_all(&num_samples.to_le_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

// Builds one uncompressed layout-2 probability buffer:
// N (4), K (2), min ploidy (1), max ploidy (1), N ploidy bytes (top bit =
// missing), phased (1), bit depth (1), then the probability payload.
fn probability_buffer(site: &SiteInfo, genotypes: &[Option<SampleGenotype>]) -> Vec<u8> {
    let num_alleles = site.num_alleles();
    let mut buffer = Vec::new();
    buffer.extend_from_slice(&(genotypes.len() as u32).to_le_bytes());
    buffer.extend_from_slice(&(num_alleles as u16).to_le_bytes());
    buffer.push(0); // min ploidy, patched below
    buffer.push(0); // max ploidy, patched below

    let mut min_ploidy = u8::MAX;
    let mut max_ploidy = 0u8;
    for genotype in genotypes {
        let (ploidy, missing) = match genotype {
            Some(g) => (g.slots.len(), g.slots.iter().any(Option::is_none)),
            None => (DEFAULT_PLOIDY, true),
        };
        let ploidy = ploidy.min(0x3F) as u8;
        min_ploidy = min_ploidy.min(ploidy);
        max_ploidy = max_ploidy.max(ploidy);
        buffer.push(if missing { MISSING_BIT | ploidy } else { ploidy });
    }
    if genotypes.is_empty() {
        min_ploidy = 0;
    }
    buffer[MIN_PLOIDY_OFFSET] = min_ploidy;
    buffer[MAX_PLOIDY_OFFSET] = max_ploidy;

    buffer.push(site.phased as u8);
    buffer.push(BIT_DEPTH);

    for genotype in genotypes {
        let (ploidy, slots) = match genotype {
            Some(g) => (g.slots.len(), Some(&g.slots)),
            None => (DEFAULT_PLOIDY, None),
        };
        if site.phased {
            let mut payload = vec![0u8; phased_slot_count(ploidy, num_alleles)];
            if let Some(slots) = slots {
                if slots.iter().all(Option::is_some) {
                    for (haplotype, slot) in slots.iter().enumerate() {
                        let allele = slot.expect("checked") as usize;
                        if allele < num_alleles - 1 {
                            payload[haplotype * (num_alleles - 1) + allele] = PROBABILITY_ONE;
                        }
                    }
                }
            }
            buffer.extend_from_slice(&payload);
        } else {
            let vectors = genotype_count_vectors(ploidy, num_alleles);
            let mut payload = vec![0u8; vectors.len().saturating_sub(1)];
            if let Some(slots) = slots {
                if slots.iter().all(Option::is_some) {
                    let mut counts = vec![0u8; num_alleles];
                    let mut in_range = true;
                    for slot in slots {
                        let allele = slot.expect("checked") as usize;
                        if allele < num_alleles {
                            counts[allele] += 1;
                        } else {
                            in_range = false;
                        }
                    }
                    if in_range {
                        if let Some(index) = vectors.iter().position(|v| *v == counts) {
                            if index < payload.len() {
                                payload[index] = PROBABILITY_ONE;
                            }
                            // The dropped last slot is implied by the zeros.
                        }
                    }
                }
            }
            buffer.extend_from_slice(&payload);
        }
    }
    buffer
}
