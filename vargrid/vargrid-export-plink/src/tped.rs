//! Transposed-text genotypes and the tabular sidecar rows.
//!
//! TPED rows are variant-major: `chr rsid cM pos` followed by two allele
//! spellings per sample (`0 0` when missing). TFAM and FAM share the same
//! six-column pedigree shape; BIM describes one variant per line for the
//! BED matrix.

use crate::maps::SiteInfo;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use vargrid_core::Result;

/// Renders one pedigree row: `FID IID PID MID SEX PHEN`.
///
/// Without an override the family id doubles as the individual id and the
/// remaining columns are 0.
pub fn fam_line(sample: &str, overrides: &HashMap<String, String>) -> String {
    match overrides.get(sample) {
        Some(line) => line.clone(),
        None => format!("{sample}\t{sample}\t0\t0\t0\t0"),
    }
}

/// Parses a FAM override file: six whitespace-separated columns per line,
/// keyed by the individual id (second column). Short lines are ignored.
pub fn load_fam_overrides(path: &Path) -> Result<HashMap<String, String>> {
    let text = std::fs::read_to_string(path)?;
    let mut overrides = HashMap::new();
    for line in text.lines() {
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() >= 6 {
            overrides.insert(columns[1].to_string(), columns.join("\t"));
        }
    }
    Ok(overrides)
}

/// Renders one BIM row: `chr rsid cM pos A1 A2`.
///
/// A1 is the first alternate allele (`0` when the site has none), A2 the
/// reference.
pub fn bim_line(chrom: &str, position: u64, site: &SiteInfo) -> String {
    let alleles = site.alleles();
    let a1 = alleles.get(1).map(String::as_str).unwrap_or("0");
    let a2 = alleles[0].as_str();
    format!(
        "{chrom}\t{}\t0\t{position}\t{a1}\t{a2}",
        site_id(chrom, position, site)
    )
}

/// The variant identifier: an explicit `ID` field, else `<contig>:<pos>`.
pub fn site_id(chrom: &str, position: u64, site: &SiteInfo) -> String {
    site.id
        .clone()
        .unwrap_or_else(|| format!("{chrom}:{position}"))
}

/// Streaming TPED writer.
pub struct TpedWriter {
    out: BufWriter<File>,
    row: Option<String>,
}

impl TpedWriter {
    /// Creates the output file.
    pub fn create(path: &Path) -> Result<Self> {
        Ok(TpedWriter {
            out: BufWriter::new(File::create(path)?),
            row: None,
        })
    }

    /// Starts a variant row with its locus columns.
    pub fn begin_row(&mut self, chrom: &str, position: u64, site: &SiteInfo) -> Result<()> {
        self.flush_row()?;
        self.row = Some(format!(
            "{chrom}\t{}\t0\t{position}",
            site_id(chrom, position, site)
        ));
        Ok(())
    }

    /// Appends one sample's two allele spellings to the current row.
    pub fn push_genotype(&mut self, site: &SiteInfo, slots: Option<&[Option<u16>]>) {
        let row = self.row.as_mut().expect("begin_row before push_genotype");
        let alleles = site.alleles();
        let spelled = |slot: Option<u16>| -> String {
            slot.and_then(|idx| alleles.get(idx as usize).cloned())
                .unwrap_or_else(|| "0".to_string())
        };
        match slots {
            Some(slots) if slots.len() == 2 => {
                row.push('\t');
                row.push_str(&spelled(slots[0]));
                row.push('\t');
                row.push_str(&spelled(slots[1]));
            }
            _ => row.push_str("\t0\t0"),
        }
    }

    /// Ends the current variant row.
    pub fn end_row(&mut self) -> Result<()> {
        self.flush_row()
    }

    /// Flushes and closes the file.
    pub fn finish(mut self) -> Result<()> {
        self.flush_row()?;
        self.out.flush()?;
        Ok(())
    }

    fn flush_row(&mut self) -> Result<()> {
        if let Some(row) = self.row.take() {
            self.out.write_all(row.as_bytes())?;
            self.out.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Writes a whole pedigree file (TFAM or FAM) for the dense sample list.
pub fn write_pedigree(
    path: &Path,
    samples: &[(u64, String)],
    overrides: &HashMap<String, String>,
) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for (_, sample) in samples {
        out.write_all(fam_line(sample, overrides).as_bytes())?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteInfo {
        SiteInfo {
            column: 100,
            id: None,
            ref_allele: Some("A".to_string()),
            alts: vec!["C".to_string()],
            phased: false,
        }
    }

    #[test]
    fn test_bim_line_layout() {
        assert_eq!(bim_line("1", 101, &site()), "1\t1:101\t0\t101\tC\tA");
    }

    #[test]
    fn test_fam_line_defaults_and_override() {
        let mut overrides = HashMap::new();
        assert_eq!(fam_line("s1", &overrides), "s1\ts1\t0\t0\t0\t0");
        overrides.insert("s1".to_string(), "fam1\ts1\tp\tm\t1\t2".to_string());
        assert_eq!(fam_line("s1", &overrides), "fam1\ts1\tp\tm\t1\t2");
    }
}
