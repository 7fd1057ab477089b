//! The processor-mode VCF emitter.
//!
//! One reconciled variant becomes one VCF record. Merge rules across the
//! participating calls are deterministic:
//!
//! - REF comes from the first call (row order) carrying one
//! - ALT is the union of distinct ALT alleles in row order, `<NON_REF>` last
//! - QUAL is the first non-missing QUAL, FILTER the `;`-joined union
//! - INFO takes the first value per key
//! - FORMAT columns follow the registry's field ordering; genotypes are
//!   remapped from per-call allele indices onto the merged allele list

use crate::writer::VcfLocalWriter;
use log::debug;
use vargrid_core::fields::FieldType;
use vargrid_core::{FieldRegistry, GenomicInterval, Metadata, Result, VarGridError};
use vargrid_query::cell::{decode_alt_list, decode_genotype, GenomicField, NON_REF_ALLELE};
use vargrid_query::processor::VariantCallProcessor;

/// Formats a float for VCF output, matching C's `%g` (6 significant digits,
/// trailing zeros trimmed, `NaN` → `.`).
fn format_vcf_float(v: f32) -> String {
    if v.is_nan() {
        return ".".to_string();
    }
    let formatted = format!("{v:.5e}");
    let (mantissa_str, exp_str) = formatted.split_once('e').expect("exponent form");
    let exp: i32 = exp_str.parse().expect("numeric exponent");

    if (-4..6).contains(&exp) {
        let decimal_places = if exp >= 0 {
            (5 - exp).max(0) as usize
        } else {
            (5 - exp) as usize
        };
        let fixed = format!("{v:.decimal_places$}");
        if fixed.contains('.') {
            let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
            if trimmed.is_empty() || trimmed == "-" {
                "0".to_string()
            } else {
                trimmed.to_string()
            }
        } else {
            fixed
        }
    } else {
        let mantissa_trimmed = mantissa_str.trim_end_matches('0').trim_end_matches('.');
        if exp >= 0 {
            format!("{mantissa_trimmed}e+{exp:02}")
        } else {
            format!("{mantissa_trimmed}e-{exp_abs:02}", exp_abs = exp.unsigned_abs())
        }
    }
}

struct PendingCall {
    row: u64,
    fields: Vec<GenomicField>,
}

struct PendingVariant {
    column_lo: u64,
    calls: Vec<PendingCall>,
}

/// Streams reconciled variants into VCF text.
pub struct VcfEmitter {
    metadata: Metadata,
    writer: Option<VcfLocalWriter>,
    pending: Option<PendingVariant>,
    records_written: u64,
}

impl VcfEmitter {
    /// Creates an emitter over an open writer.
    pub fn new(metadata: Metadata, writer: VcfLocalWriter) -> Self {
        VcfEmitter {
            metadata,
            writer: Some(writer),
            pending: None,
            records_written: 0,
        }
    }

    /// Flushes the last pending record and finalizes the output stream.
    pub fn finish(mut self) -> Result<()> {
        self.flush_pending()?;
        let writer = self
            .writer
            .take()
            .ok_or_else(|| VarGridError::State("vcf emitter finished twice".into()))?;
        debug!("vcf emitter wrote {} records", self.records_written);
        writer.finish()
    }

    fn writer(&mut self) -> Result<&mut VcfLocalWriter> {
        self.writer
            .as_mut()
            .ok_or_else(|| VarGridError::State("vcf emitter used after finish".into()))
    }

    fn write_header(&mut self) -> Result<()> {
        let mut lines = vec!["##fileformat=VCFv4.3".to_string()];
        for contig in self.metadata.contigs().contigs() {
            lines.push(format!(
                "##contig=<ID={},length={}>",
                contig.name, contig.length
            ));
        }
        let fields = self.metadata.fields().clone();
        for name in fields.ordering() {
            let field_type = fields.field_type(name)?;
            if fields.is_info(name) {
                lines.push(format!(
                    "##INFO=<ID={},Number={},Type={},Description=\"{} field\">",
                    name,
                    vcf_number(name, field_type),
                    vcf_type(name, field_type),
                    name
                ));
            }
            if fields.is_format(name) {
                let description = if name == "GT" {
                    "Genotype".to_string()
                } else {
                    format!("{name} field")
                };
                lines.push(format!(
                    "##FORMAT=<ID={},Number={},Type={},Description=\"{}\">",
                    name,
                    vcf_number(name, field_type),
                    vcf_type(name, field_type),
                    description
                ));
            }
        }
        let mut column_header =
            String::from("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT");
        for (_, sample) in self.metadata.samples() {
            column_header.push('\t');
            column_header.push_str(sample);
        }
        lines.push(column_header);
        let writer = self.writer()?;
        for line in &lines {
            writer.write_line(line)?;
        }
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        let Some(variant) = self.pending.take() else {
            return Ok(());
        };
        let line = self.compose_record(&variant)?;
        self.writer()?.write_line(&line)?;
        self.records_written += 1;
        Ok(())
    }

    fn compose_record(&self, variant: &PendingVariant) -> Result<String> {
        let fields = self.metadata.fields();
        let (contig, pos) = self
            .metadata
            .contigs()
            .column_to_genomic(variant.column_lo)?;

        let id = first_string_value(&variant.calls, "ID", fields).unwrap_or_else(|| ".".into());
        let reference =
            first_string_value(&variant.calls, "REF", fields).unwrap_or_else(|| ".".into());
        let merged_alts = merge_alt_lists(&variant.calls, fields);
        let alt = if merged_alts.is_empty() {
            ".".to_string()
        } else {
            merged_alts.join(",")
        };

        let qual = variant
            .calls
            .iter()
            .find_map(|call| {
                let field = call.fields.iter().find(|f| f.name() == "QUAL")?;
                let ty = fields.field_type("QUAL").ok()?;
                field.float_value_at(0, ty).ok().map(format_vcf_float)
            })
            .unwrap_or_else(|| ".".into());

        let mut filters: Vec<String> = Vec::new();
        for call in &variant.calls {
            if let Some(value) = string_value(call, "FILTER", fields) {
                for token in value.split(';') {
                    if !token.is_empty() && !filters.iter().any(|f| f == token) {
                        filters.push(token.to_string());
                    }
                }
            }
        }
        let filter = if filters.is_empty() {
            ".".to_string()
        } else {
            filters.join(";")
        };

        let mut info_parts: Vec<String> = Vec::new();
        for name in fields.ordering() {
            if !fields.is_info(name) {
                continue;
            }
            let ty = fields.field_type(name)?;
            if let Some(value) = variant
                .calls
                .iter()
                .find_map(|call| render_value(call, name, ty))
            {
                info_parts.push(format!("{name}={value}"));
            }
        }
        let info = if info_parts.is_empty() {
            ".".to_string()
        } else {
            info_parts.join(";")
        };

        // FORMAT keys: format-class fields present in any participating call.
        let format_keys: Vec<&str> = fields
            .ordering()
            .iter()
            .filter(|name| fields.is_format(name))
            .filter(|name| {
                variant
                    .calls
                    .iter()
                    .any(|call| call.fields.iter().any(|f| f.name() == name.as_str()))
            })
            .map(|name| name.as_str())
            .collect();
        let format = if format_keys.is_empty() {
            ".".to_string()
        } else {
            format_keys.join(":")
        };

        let mut record = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            contig.name, pos, id, reference, alt, qual, filter, info, format
        );
        for (row, _) in self.metadata.samples() {
            record.push('\t');
            let call = variant.calls.iter().find(|c| c.row == *row);
            record.push_str(&sample_column(call, &format_keys, &merged_alts, fields));
        }
        Ok(record)
    }
}

impl VariantCallProcessor for VcfEmitter {
    fn initialize(&mut self, _field_types: &FieldRegistry) -> Result<()> {
        self.write_header()
    }

    fn process_interval(&mut self, interval: (u64, u64)) -> Result<()> {
        self.flush_pending()?;
        self.pending = Some(PendingVariant {
            column_lo: interval.0,
            calls: Vec::new(),
        });
        Ok(())
    }

    fn process_call(
        &mut self,
        _sample_name: &str,
        coordinates: (u64, u64),
        _genomic_interval: &GenomicInterval,
        fields: &[GenomicField],
    ) -> Result<()> {
        let pending = self.pending.as_mut().ok_or_else(|| {
            VarGridError::State("process_call before process_interval".into())
        })?;
        pending.calls.push(PendingCall {
            row: coordinates.0,
            fields: fields.to_vec(),
        });
        Ok(())
    }
}

fn string_value(call: &PendingCall, name: &str, fields: &FieldRegistry) -> Option<String> {
    let field = call.fields.iter().find(|f| f.name() == name)?;
    let ty = fields.field_type(name).ok()?;
    field.str_value(ty).ok().map(str::to_string)
}

fn first_string_value(
    calls: &[PendingCall],
    name: &str,
    fields: &FieldRegistry,
) -> Option<String> {
    calls
        .iter()
        .find_map(|call| string_value(call, name, fields).filter(|v| !v.is_empty()))
}

// Union of distinct ALT alleles in row order, `<NON_REF>` forced last.
fn merge_alt_lists(calls: &[PendingCall], fields: &FieldRegistry) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    let mut has_non_ref = false;
    for call in calls {
        let Some(raw) = string_value(call, "ALT", fields) else {
            continue;
        };
        for allele in decode_alt_list(&raw) {
            if allele == NON_REF_ALLELE {
                has_non_ref = true;
            } else if !merged.iter().any(|a| a == &allele) {
                merged.push(allele);
            }
        }
    }
    if has_non_ref {
        merged.push(NON_REF_ALLELE.to_string());
    }
    merged
}

fn render_value(call: &PendingCall, name: &str, ty: &FieldType) -> Option<String> {
    let field = call.fields.iter().find(|f| f.name() == name)?;
    if ty.is_string() {
        field.str_value(ty).ok().map(str::to_string)
    } else if ty.is_int() {
        field.int_values(ty).ok().map(|values| {
            values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        })
    } else {
        let values: Option<Vec<String>> = (0..field.elements())
            .map(|i| field.float_value_at(i, ty).ok().map(format_vcf_float))
            .collect();
        values.map(|v| v.join(","))
    }
}

// One sample's FORMAT column; a sample without a call gets missing markers.
fn sample_column(
    call: Option<&PendingCall>,
    format_keys: &[&str],
    merged_alts: &[String],
    fields: &FieldRegistry,
) -> String {
    if format_keys.is_empty() {
        return ".".to_string();
    }
    let mut parts: Vec<String> = Vec::with_capacity(format_keys.len());
    for &key in format_keys {
        let rendered = call.and_then(|call| {
            let ty = fields.field_type(key).ok()?;
            if key == "GT" {
                render_genotype(call, merged_alts, ty, fields)
            } else {
                render_value(call, key, ty)
            }
        });
        parts.push(rendered.unwrap_or_else(|| {
            if key == "GT" {
                "./.".to_string()
            } else {
                ".".to_string()
            }
        }));
    }
    parts.join(":")
}

// Remaps the call's allele indices onto the merged allele list and renders
// the genotype with the call's own phasing.
fn render_genotype(
    call: &PendingCall,
    merged_alts: &[String],
    gt_type: &FieldType,
    fields: &FieldRegistry,
) -> Option<String> {
    let field = call.fields.iter().find(|f| f.name() == "GT")?;
    let values = field.int_values(gt_type).ok()?;
    let genotype = decode_genotype(&values, gt_type.contains_phase).ok()?;
    if genotype.alleles.is_empty() {
        return None;
    }
    let call_alts = string_value(call, "ALT", fields)
        .map(|raw| decode_alt_list(&raw))
        .unwrap_or_default();
    let separator = if genotype.phased { "|" } else { "/" };
    let rendered: Vec<String> = genotype
        .alleles
        .iter()
        .map(|slot| match slot {
            None => ".".to_string(),
            Some(0) => "0".to_string(),
            Some(idx) => call_alts
                .get(*idx as usize - 1)
                .and_then(|allele| merged_alts.iter().position(|a| a == allele))
                .map(|merged_idx| (merged_idx + 1).to_string())
                .unwrap_or_else(|| ".".to_string()),
        })
        .collect();
    Some(rendered.join(separator))
}

fn vcf_type(name: &str, field_type: &FieldType) -> &'static str {
    if name == "GT" || field_type.is_string() {
        "String"
    } else if field_type.is_int() {
        "Integer"
    } else if field_type.is_float() {
        "Float"
    } else {
        "Character"
    }
}

fn vcf_number(name: &str, field_type: &FieldType) -> String {
    if name == "GT" {
        return "1".to_string();
    }
    match field_type.fixed_count {
        Some(n) => n.to_string(),
        None => ".".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vargrid_core::FieldType as FT;

    #[test]
    fn test_float_formatting_matches_percent_g() {
        assert_eq!(format_vcf_float(0.5), "0.5");
        assert_eq!(format_vcf_float(29.6), "29.6");
        assert_eq!(format_vcf_float(1.0), "1");
        assert_eq!(format_vcf_float(f32::NAN), ".");
        assert_eq!(format_vcf_float(0.0), "0");
    }

    fn pending_call(row: u64, fields: Vec<GenomicField>) -> PendingCall {
        PendingCall { row, fields }
    }

    fn registry() -> FieldRegistry {
        FieldRegistry::new(vec![
            ("REF".to_string(), FT::string()),
            ("ALT".to_string(), FT::string()),
            ("GT".to_string(), FT::genotype()),
        ])
    }

    #[test]
    fn test_merge_alts_puts_non_ref_last() {
        let fields = registry();
        let calls = vec![
            pending_call(0, vec![GenomicField::new("ALT", b"T|&".to_vec(), 3)]),
            pending_call(1, vec![GenomicField::new("ALT", b"C".to_vec(), 1)]),
        ];
        assert_eq!(merge_alt_lists(&calls, &fields), vec!["T", "C", "<NON_REF>"]);
    }

    #[test]
    fn test_genotype_remap_onto_merged_alleles() {
        let fields = registry();
        // Call's own ALT list is [C]; merged list is [T, C]: index 1 → 2.
        let call = pending_call(
            1,
            vec![
                GenomicField::new("ALT", b"C".to_vec(), 1),
                {
                    let mut bytes = Vec::new();
                    for v in [0i32, 0, 1] {
                        bytes.extend_from_slice(&v.to_le_bytes());
                    }
                    GenomicField::new("GT", bytes, 3)
                },
            ],
        );
        let merged = vec!["T".to_string(), "C".to_string()];
        let gt_type = fields.field_type("GT").unwrap();
        assert_eq!(
            render_genotype(&call, &merged, gt_type, &fields).unwrap(),
            "0/2"
        );
    }
}
