//! Phase-0 sample and variant maps.
//!
//! PLINK and BGEN need a matrix layout (variants × samples) that the
//! column-major scan does not provide directly. The first pass enumerates
//! the participating samples and variant sites into ordered maps; freezing
//! a map assigns dense indices by walking it in ascending key order, which
//! makes "first sight" order and ascending order coincide globally.

use std::collections::BTreeMap;
use vargrid_core::{Result, VarGridError};
use vargrid_query::cell::NON_REF_ALLELE;

/// One sample's genotype at a site, remapped onto the site's allele list.
///
/// Slot values index [`SiteInfo::alleles`]; `None` marks a missing slot
/// (including alleles the site elided, such as `<NON_REF>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleGenotype {
    /// Site-allele index per ploidy slot.
    pub slots: Vec<Option<u16>>,
    /// True when the originating call was phased.
    pub phased: bool,
}

/// Ordered row → (dense index, sample name) map.
#[derive(Debug, Default)]
pub struct SampleMap {
    rows: BTreeMap<u64, String>,
    dense: Vec<(u64, String)>,
    frozen: bool,
}

impl SampleMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        SampleMap::default()
    }

    /// Records a sample sighting during phase 0.
    pub fn observe(&mut self, row: u64, sample: &str) -> Result<()> {
        if self.frozen {
            return Err(VarGridError::State("sample map is frozen".into()));
        }
        self.rows.entry(row).or_insert_with(|| sample.to_string());
        Ok(())
    }

    /// Assigns dense indices in ascending row order.
    pub fn freeze(&mut self) {
        if !self.frozen {
            self.dense = self
                .rows
                .iter()
                .map(|(row, name)| (*row, name.clone()))
                .collect();
            self.frozen = true;
        }
    }

    /// Number of participating samples.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no sample was observed.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Dense index of a row; `None` for rows never observed.
    pub fn dense_index(&self, row: u64) -> Option<usize> {
        debug_assert!(self.frozen, "dense indices exist after freeze");
        self.dense.binary_search_by_key(&row, |(r, _)| *r).ok()
    }

    /// `(row, sample)` pairs in dense order.
    pub fn dense(&self) -> &[(u64, String)] {
        debug_assert!(self.frozen, "dense indices exist after freeze");
        &self.dense
    }
}

/// One variant site on the matrix: alleles, identifiers, phase verdict.
#[derive(Debug, Clone)]
pub struct SiteInfo {
    /// Site column (the reconciled variant's start).
    pub column: u64,
    /// Explicit variant id, when some call carried one.
    pub id: Option<String>,
    /// Reference allele spelling.
    pub ref_allele: Option<String>,
    /// Distinct alternate alleles in observation order, `<NON_REF>` elided.
    pub alts: Vec<String>,
    /// Pessimistic phase flag: true only while every observed call is
    /// phased.
    pub phased: bool,
}

impl SiteInfo {
    /// All allele spellings: reference first, then alternates.
    ///
    /// An unknown reference renders as `0`, the PLINK missing-allele code.
    pub fn alleles(&self) -> Vec<String> {
        let mut alleles = vec![self
            .ref_allele
            .clone()
            .unwrap_or_else(|| "0".to_string())];
        alleles.extend(self.alts.iter().cloned());
        alleles
    }

    /// Number of alleles including the reference.
    pub fn num_alleles(&self) -> usize {
        1 + self.alts.len()
    }
}

/// Ordered column → (dense index, site info) map.
#[derive(Debug, Default)]
pub struct VariantMap {
    sites: BTreeMap<u64, SiteInfo>,
    columns: Vec<u64>,
    frozen: bool,
}

impl VariantMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        VariantMap::default()
    }

    /// Records one call's contribution to a site during phase 0.
    pub fn observe(
        &mut self,
        column: u64,
        id: Option<&str>,
        ref_allele: Option<&str>,
        alt_alleles: &[String],
        call_phased: bool,
    ) -> Result<()> {
        if self.frozen {
            return Err(VarGridError::State("variant map is frozen".into()));
        }
        let site = self.sites.entry(column).or_insert_with(|| SiteInfo {
            column,
            id: None,
            ref_allele: None,
            alts: Vec::new(),
            phased: true,
        });
        if site.id.is_none() {
            site.id = id.map(str::to_string);
        }
        if site.ref_allele.is_none() {
            site.ref_allele = ref_allele
                .filter(|r| !r.is_empty())
                .map(str::to_string);
        }
        for allele in alt_alleles {
            if allele != NON_REF_ALLELE && !site.alts.iter().any(|a| a == allele) {
                site.alts.push(allele.clone());
            }
        }
        site.phased &= call_phased;
        Ok(())
    }

    /// Assigns dense indices in ascending column order.
    pub fn freeze(&mut self) {
        if !self.frozen {
            self.columns = self.sites.keys().copied().collect();
            self.frozen = true;
        }
    }

    /// Number of sites.
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// True when no site was observed.
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Site info for a column.
    pub fn site(&self, column: u64) -> Option<&SiteInfo> {
        self.sites.get(&column)
    }

    /// Dense index of a column.
    pub fn dense_index(&self, column: u64) -> Option<usize> {
        debug_assert!(self.frozen, "dense indices exist after freeze");
        self.columns.binary_search(&column).ok()
    }

    /// Site columns in dense order.
    pub fn columns(&self) -> &[u64] {
        debug_assert!(self.frozen, "dense indices exist after freeze");
        &self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_map_dense_order_is_row_order() {
        let mut map = SampleMap::new();
        // Later columns may introduce smaller rows; dense order is by row.
        map.observe(5, "s5").unwrap();
        map.observe(1, "s1").unwrap();
        map.observe(3, "s3").unwrap();
        map.observe(1, "s1").unwrap();
        map.freeze();
        assert_eq!(map.len(), 3);
        assert_eq!(map.dense_index(1), Some(0));
        assert_eq!(map.dense_index(3), Some(1));
        assert_eq!(map.dense_index(5), Some(2));
        assert_eq!(map.dense_index(2), None);
    }

    #[test]
    fn test_variant_map_merges_site_observations() {
        let mut map = VariantMap::new();
        map.observe(100, None, Some("A"), &["T".to_string()], true)
            .unwrap();
        map.observe(
            100,
            None,
            Some("A"),
            &["C".to_string(), NON_REF_ALLELE.to_string()],
            false,
        )
        .unwrap();
        map.freeze();
        let site = map.site(100).unwrap();
        assert_eq!(site.alleles(), vec!["A", "T", "C"], "<NON_REF> is elided");
        assert!(!site.phased, "one unphased call makes the site unphased");
    }

    #[test]
    fn test_frozen_map_rejects_observations() {
        let mut map = SampleMap::new();
        map.freeze();
        assert!(matches!(
            map.observe(0, "s").unwrap_err(),
            VarGridError::State(_)
        ));
    }
}
