//! Cell views and genomic field values.
//!
//! The scan layer hands out [`Cell`] views whose field buffers borrow the
//! backend's decode window; they are valid only until the next cell is
//! pulled. The reconciler copies them into owned [`GenomicField`] values,
//! which the result surface and the emitters consume.
//!
//! Two store-level encodings live here because every consumer needs them:
//!
//! - `ALT` is a `|`-delimited allele string where the token `&` stands for
//!   the symbolic `<NON_REF>` allele.
//! - `GT` with phase information interleaves separators with allele indices
//!   (`allele, sep, allele, …`); a separator of 1 is a phased `|`, 0 is an
//!   unphased `/`. `-1` is the missing-allele sentinel.

use vargrid_core::fields::FieldType;
use vargrid_core::{Result, VarGridError};

/// Store token for the symbolic non-reference allele.
pub const NON_REF_TOKEN: &str = "&";
/// VCF spelling of the symbolic non-reference allele.
pub const NON_REF_ALLELE: &str = "<NON_REF>";
/// Missing-allele sentinel inside `GT` buffers.
pub const MISSING_ALLELE: i32 = -1;

/// Identifying coordinates of a cell, separate from its borrowed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellHeader {
    /// Row (callset) coordinate.
    pub row: u64,
    /// Start column of the call interval.
    pub column: u64,
    /// Inclusive end column of the call interval.
    pub end: u64,
}

/// One attribute of a borrowed cell.
#[derive(Debug, Clone, Copy)]
pub struct FieldSlice<'a> {
    /// Attribute name.
    pub name: &'a str,
    /// Raw little-endian element buffer.
    pub bytes: &'a [u8],
    /// Number of elements in the buffer.
    pub elements: usize,
}

/// A borrowed cell: coordinates plus zero-copy field slices.
#[derive(Debug, Clone)]
pub struct Cell<'a> {
    /// Cell coordinates.
    pub header: CellHeader,
    /// Projected attributes in storage order.
    pub fields: Vec<FieldSlice<'a>>,
}

/// An owned, typed field value with offset-validated accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct GenomicField {
    name: String,
    bytes: Vec<u8>,
    elements: usize,
}

impl GenomicField {
    /// Builds a field value from raw parts.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>, elements: usize) -> Self {
        GenomicField {
            name: name.into(),
            bytes,
            elements,
        }
    }

    /// Copies a borrowed field slice.
    pub fn from_slice(slice: &FieldSlice<'_>) -> Self {
        GenomicField {
            name: slice.name.to_string(),
            bytes: slice.bytes.to_vec(),
            elements: slice.elements,
        }
    }

    /// Attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw element buffer.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of elements.
    pub fn elements(&self) -> usize {
        self.elements
    }

    /// The `i`-th int32 element.
    ///
    /// # Errors
    ///
    /// `Schema` when the field is not int32, `Data` when the buffer is too
    /// short for the element.
    pub fn int_value_at(&self, i: usize, field_type: &FieldType) -> Result<i32> {
        if !field_type.is_int() {
            return Err(VarGridError::Schema(format!(
                "field '{}' is not int32",
                self.name
            )));
        }
        let bytes = self.element_bytes(i, 4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// The `i`-th float32 element.
    pub fn float_value_at(&self, i: usize, field_type: &FieldType) -> Result<f32> {
        if !field_type.is_float() {
            return Err(VarGridError::Schema(format!(
                "field '{}' is not float32",
                self.name
            )));
        }
        let bytes = self.element_bytes(i, 4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// All int32 elements.
    pub fn int_values(&self, field_type: &FieldType) -> Result<Vec<i32>> {
        (0..self.elements)
            .map(|i| self.int_value_at(i, field_type))
            .collect()
    }

    /// The field as UTF-8 text.
    ///
    /// # Errors
    ///
    /// `Schema` when the field is not a string, `Data` on malformed UTF-8 or
    /// an element count larger than the buffer.
    pub fn str_value(&self, field_type: &FieldType) -> Result<&str> {
        if !field_type.is_string() {
            return Err(VarGridError::Schema(format!(
                "field '{}' is not a string",
                self.name
            )));
        }
        if self.elements > self.bytes.len() {
            return Err(VarGridError::Data(format!(
                "field '{}': {} elements exceed buffer of {} bytes",
                self.name,
                self.elements,
                self.bytes.len()
            )));
        }
        std::str::from_utf8(&self.bytes[..self.elements])
            .map_err(|e| VarGridError::Data(format!("field '{}': {e}", self.name)))
    }

    /// Renders the value for diagnostics: strings verbatim (`ALT` expanded
    /// to its allele list), numerics comma-joined.
    pub fn to_display(&self, field_type: &FieldType) -> String {
        if field_type.is_string() {
            let raw = match self.str_value(field_type) {
                Ok(raw) => raw,
                Err(_) => return String::from("?"),
            };
            if self.name == "ALT" {
                format!("[{}]", decode_alt_list(raw).join(", "))
            } else {
                raw.to_string()
            }
        } else if field_type.is_int() {
            match self.int_values(field_type) {
                Ok(values) => values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
                Err(_) => String::from("?"),
            }
        } else {
            (0..self.elements)
                .map(|i| match self.float_value_at(i, field_type) {
                    Ok(v) => format!("{v}"),
                    Err(_) => String::from("?"),
                })
                .collect::<Vec<_>>()
                .join(",")
        }
    }

    fn element_bytes(&self, i: usize, size: usize) -> Result<&[u8]> {
        let start = i
            .checked_mul(size)
            .ok_or_else(|| VarGridError::Data(format!("field '{}': offset overflow", self.name)))?;
        let end = start + size;
        if i >= self.elements || end > self.bytes.len() {
            return Err(VarGridError::Data(format!(
                "field '{}': element {i} out of bounds ({} elements, {} bytes)",
                self.name,
                self.elements,
                self.bytes.len()
            )));
        }
        Ok(&self.bytes[start..end])
    }
}

/// Splits a stored `ALT` string into allele spellings, expanding the
/// `&` token to `<NON_REF>`.
pub fn decode_alt_list(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split('|')
        .map(|allele| {
            if allele == NON_REF_TOKEN {
                NON_REF_ALLELE.to_string()
            } else {
                allele.to_string()
            }
        })
        .collect()
}

/// A decoded genotype: per-slot allele indices and the phase verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genotype {
    /// Allele index per ploidy slot; `None` is missing.
    pub alleles: Vec<Option<u32>>,
    /// True when every separator in the buffer was phased.
    pub phased: bool,
}

impl Genotype {
    /// Number of allele slots.
    pub fn ploidy(&self) -> usize {
        self.alleles.len()
    }
}

/// Decodes a `GT` buffer.
///
/// With `contains_phase` the buffer interleaves separators
/// (`allele, sep, allele, …`, `2·ploidy − 1` values); without it the buffer
/// holds plain allele indices and the genotype counts as unphased.
///
/// # Errors
///
/// `Data` when an interleaved buffer has even length or a separator is
/// neither 0 nor 1.
pub fn decode_genotype(values: &[i32], contains_phase: bool) -> Result<Genotype> {
    if !contains_phase {
        return Ok(Genotype {
            alleles: values.iter().map(|&v| allele_index(v)).collect(),
            phased: false,
        });
    }
    if values.is_empty() {
        return Ok(Genotype {
            alleles: Vec::new(),
            phased: false,
        });
    }
    if values.len() % 2 == 0 {
        return Err(VarGridError::Data(format!(
            "interleaved genotype buffer has even length {}",
            values.len()
        )));
    }
    let mut alleles = Vec::with_capacity(values.len() / 2 + 1);
    let mut phased = true;
    for (i, &value) in values.iter().enumerate() {
        if i % 2 == 0 {
            alleles.push(allele_index(value));
        } else {
            match value {
                1 => {}
                0 => phased = false,
                other => {
                    return Err(VarGridError::Data(format!(
                        "genotype separator {other} is neither phased nor unphased"
                    )))
                }
            }
        }
    }
    Ok(Genotype { alleles, phased })
}

fn allele_index(value: i32) -> Option<u32> {
    (value >= 0).then_some(value as u32)
}
