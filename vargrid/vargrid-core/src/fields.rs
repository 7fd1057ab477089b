//! Field type descriptors and the name → type registry.
//!
//! Each attribute stored with a cell has a declared element kind, arity and
//! dimensionality. A `char` field with fixed arity 1 is a scalar character;
//! a `char` field with variable arity is a string. The `GT` field carries
//! phase information when its descriptor says so (see
//! [`crate::metadata`] for the on-disk document shape).

use crate::error::{Result, VarGridError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Element kind of a field buffer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// 32-bit signed integers.
    #[serde(alias = "int")]
    Int32,
    /// 32-bit floats.
    #[serde(alias = "float")]
    Float32,
    /// Bytes; a variable-arity char field is a string.
    Char,
}

impl FieldKind {
    /// Size in bytes of one element of this kind.
    pub fn element_size(&self) -> usize {
        match self {
            FieldKind::Int32 | FieldKind::Float32 => 4,
            FieldKind::Char => 1,
        }
    }
}

/// Type descriptor for a cell attribute.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldType {
    /// Element kind.
    pub kind: FieldKind,
    /// Fixed element count, or `None` for variable arity.
    pub fixed_count: Option<usize>,
    /// Number of dimensions (1 for flat vectors).
    pub dimensions: usize,
    /// True when values interleave phase separators (genotype layout).
    pub contains_phase: bool,
}

impl FieldType {
    /// A variable-arity string field.
    pub fn string() -> Self {
        FieldType {
            kind: FieldKind::Char,
            fixed_count: None,
            dimensions: 1,
            contains_phase: false,
        }
    }

    /// A fixed-arity int32 field with `count` elements.
    pub fn int32(count: usize) -> Self {
        FieldType {
            kind: FieldKind::Int32,
            fixed_count: Some(count),
            dimensions: 1,
            contains_phase: false,
        }
    }

    /// A variable-arity int32 field.
    pub fn int32_var() -> Self {
        FieldType {
            kind: FieldKind::Int32,
            fixed_count: None,
            dimensions: 1,
            contains_phase: false,
        }
    }

    /// A variable-arity int32 genotype field carrying phase separators.
    pub fn genotype() -> Self {
        FieldType {
            kind: FieldKind::Int32,
            fixed_count: None,
            dimensions: 1,
            contains_phase: true,
        }
    }

    /// A fixed-arity float32 field with `count` elements.
    pub fn float32(count: usize) -> Self {
        FieldType {
            kind: FieldKind::Float32,
            fixed_count: Some(count),
            dimensions: 1,
            contains_phase: false,
        }
    }

    /// True for variable-arity char fields.
    pub fn is_string(&self) -> bool {
        self.kind == FieldKind::Char && self.fixed_count.is_none()
    }

    /// True for int32 fields.
    pub fn is_int(&self) -> bool {
        self.kind == FieldKind::Int32
    }

    /// True for float32 fields.
    pub fn is_float(&self) -> bool {
        self.kind == FieldKind::Float32
    }
}

/// VCF column class of a field, for the emitters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldClass {
    /// Site-level INFO column.
    Info,
    /// Per-sample FORMAT column.
    Format,
}

// Core fields every emitter consumes, in emission order.
const CORE_FIELD_ORDER: [&str; 3] = ["REF", "ALT", "GT"];

// Fields that feed dedicated VCF columns rather than INFO/FORMAT.
const RESERVED_COLUMNS: [&str; 5] = ["REF", "ALT", "QUAL", "FILTER", "ID"];

/// Immutable name → type registry with a deterministic emitter ordering.
///
/// The ordering places the core fields (`REF`, `ALT`, `GT`) first, followed
/// by the remaining fields sorted by name.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    types: HashMap<String, FieldType>,
    classes: HashMap<String, Vec<FieldClass>>,
    ordering: Vec<String>,
}

impl FieldRegistry {
    /// Builds a registry from name/type pairs.
    ///
    /// Fields default to the FORMAT class; use
    /// [`with_classes`](FieldRegistry::with_classes) to override.
    pub fn new(entries: Vec<(String, FieldType)>) -> Self {
        let mut types = HashMap::with_capacity(entries.len());
        for (name, field_type) in entries {
            types.insert(name, field_type);
        }
        let mut rest: Vec<String> = types
            .keys()
            .filter(|name| !CORE_FIELD_ORDER.contains(&name.as_str()))
            .cloned()
            .collect();
        rest.sort();
        let mut ordering: Vec<String> = CORE_FIELD_ORDER
            .iter()
            .filter(|name| types.contains_key(**name))
            .map(|name| name.to_string())
            .collect();
        ordering.extend(rest);
        FieldRegistry {
            types,
            classes: HashMap::new(),
            ordering,
        }
    }

    /// Replaces the class assignment of one field.
    pub fn with_classes(mut self, name: &str, classes: Vec<FieldClass>) -> Self {
        self.classes.insert(name.to_string(), classes);
        self
    }

    /// True when the field feeds the INFO column.
    pub fn is_info(&self, name: &str) -> bool {
        self.classes
            .get(name)
            .map(|classes| classes.contains(&FieldClass::Info))
            .unwrap_or(false)
    }

    /// True when the field feeds a per-sample FORMAT column.
    ///
    /// Fields with a dedicated VCF column (`REF`, `ALT`, `QUAL`, `FILTER`,
    /// `ID`) are never FORMAT; fields without an explicit class default to
    /// FORMAT.
    pub fn is_format(&self, name: &str) -> bool {
        if RESERVED_COLUMNS.contains(&name) {
            return false;
        }
        match self.classes.get(name) {
            Some(classes) => classes.contains(&FieldClass::Format),
            None => true,
        }
    }

    /// Looks up the type of a field.
    ///
    /// # Errors
    ///
    /// Returns a `Schema` error for unknown field names.
    pub fn field_type(&self, name: &str) -> Result<&FieldType> {
        self.types
            .get(name)
            .ok_or_else(|| VarGridError::Schema(format!("unknown field '{name}'")))
    }

    /// True when the registry knows the field.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Emitter field ordering: core fields first, the rest sorted by name.
    pub fn ordering(&self) -> &[String] {
        &self.ordering
    }

    /// Number of registered fields.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True when no fields are registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
