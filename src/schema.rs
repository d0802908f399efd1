//! Schema catalog (C1): column/table definitions, fixed record layout, and
//! on-disk persistence of the catalog.
//!
//! Grounded on the teacher's `table.rs` (`ColInfo`/`Table` hold the type
//! information the rest of the engine closes over) but reworked: the
//! teacher's `ColInfo` backs a B-tree `SortedFile`; ours backs a fixed-width
//! C struct that a generated kernel reads directly, so `record_size` here
//! must agree bit-for-bit with `pagegen::emit_record_struct`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::DataType;

/// The well-known index of the mandatory `uuid` column (spec section 3).
pub const UUID_COLUMN_INDEX: usize = 0;
pub const UUID_COLUMN_NAME: &str = "uuid";
pub const UUID_LEN: u16 = 36;

/// One column's definition (spec section 3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub has_default: bool,
    pub default_value_text: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        ColumnDef {
            name: name.into(),
            data_type,
            nullable: true,
            is_primary_key: false,
            has_default: false,
            default_value_text: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, text: impl Into<String>) -> Self {
        self.has_default = true;
        self.default_value_text = Some(text.into());
        self
    }
}

/// An index recorded by `CREATE INDEX`; catalog-only (spec section 9's Open
/// Question: no planning ever reads this back).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
}

/// A table's schema: ordered columns plus primary key indices (spec
/// section 3). Column order determines record layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key_column_indices: Vec<usize>,
    #[serde(default)]
    pub indices: Vec<IndexDef>,
    pub page_size: usize,
}

/// Records (default) up to this many rows per page (spec section 3).
pub const DEFAULT_PAGE_SIZE: usize = 65_535;

impl TableSchema {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    /// Byte offset of column `i` within a record: a plain cumulative sum of
    /// preceding columns' widths, since generated structs are packed (no
    /// compiler-inserted padding to track).
    pub fn column_offset(&self, i: usize) -> usize {
        record_layout(self).offsets[i]
    }

    /// Deterministic, schema-derived byte width of one record. MUST be
    /// computed the same way by the synthesizer and the page generator
    /// (spec section 3).
    pub fn record_size(&self) -> usize {
        record_layout(self).size
    }

    /// Stable, schema-derived hash used as the ABI version embedded in
    /// generated pages and kernels (spec section 4.5/6: "abi_version").
    pub fn schema_hash(&self) -> u32 {
        use std::hash::{Hash, Hasher};
        let mut h = rustc_hash::FxHasher::default();
        self.name.hash(&mut h);
        for c in &self.columns {
            c.name.hash(&mut h);
            format!("{:?}", c.data_type).hash(&mut h);
            c.nullable.hash(&mut h);
        }
        h.finish() as u32
    }
}

/// The record layout: per-column byte offset plus total (aligned) size.
pub struct RecordLayout {
    pub offsets: Vec<usize>,
    pub size: usize,
}

/// Computes the fixed concatenation of column storage in schema order
/// (spec section 3). Generated structs are emitted `__attribute__((packed))`
/// (see `codegen::emit_record_struct`) specifically so this cumulative,
/// no-padding computation is the single source of truth the synthesizer
/// (`synth`) and the page emitter (`pagegen`) both call — there is no
/// separate alignment computation to keep in sync with the C compiler's.
pub fn record_layout(schema: &TableSchema) -> RecordLayout {
    let mut offsets = Vec::with_capacity(schema.columns.len());
    let mut off = 0usize;
    for c in &schema.columns {
        offsets.push(off);
        off += c.data_type.byte_width();
    }
    RecordLayout { offsets, size: off }
}

/// Validate a freshly parsed/constructed schema (spec section 4.1).
pub fn validate(schema: &TableSchema) -> Result<()> {
    if schema.columns.is_empty() {
        return Err(Error::Semantic(format!(
            "table {} must have at least one column",
            schema.name
        )));
    }
    let mut seen = std::collections::HashSet::new();
    for c in &schema.columns {
        if !seen.insert(c.name.to_ascii_lowercase()) {
            return Err(Error::Semantic(format!("duplicate column name {}", c.name)));
        }
        if c.is_primary_key && c.nullable {
            return Err(Error::Semantic(format!(
                "primary key column {} must not be nullable",
                c.name
            )));
        }
        if let DataType::Varchar(n) = c.data_type {
            if !(1..=65535).contains(&n) {
                return Err(Error::Semantic(format!(
                    "varchar length for {} must be in [1, 65535]",
                    c.name
                )));
            }
        }
    }
    match schema.column(UUID_COLUMN_NAME) {
        Some(c) if c.data_type == DataType::Varchar(UUID_LEN) => {}
        Some(_) => {
            return Err(Error::Semantic(format!(
                "column {UUID_COLUMN_NAME} must be VARCHAR({UUID_LEN})"
            )))
        }
        None => {
            return Err(Error::Semantic(format!(
                "table {} is missing the mandatory {UUID_COLUMN_NAME} column",
                schema.name
            )))
        }
    }
    if schema.column_index(UUID_COLUMN_NAME) != Some(UUID_COLUMN_INDEX) {
        return Err(Error::Semantic(format!(
            "column {UUID_COLUMN_NAME} must be at index {UUID_COLUMN_INDEX}"
        )));
    }
    Ok(())
}

fn table_dir(base_dir: &Path, name: &str) -> PathBuf {
    base_dir.join("tables").join(name)
}

pub fn schema_path(base_dir: &Path, name: &str) -> PathBuf {
    table_dir(base_dir, name).join(format!("{name}.schema"))
}

/// Persist a schema under `<base_dir>/tables/<name>/<name>.schema` (spec
/// section 6). The format is self-describing JSON: enough to reconstruct
/// the in-memory `TableSchema` without re-parsing the original `CREATE
/// TABLE` SQL (spec section 4.1).
pub fn save_schema(schema: &TableSchema, base_dir: &Path) -> Result<()> {
    let dir = table_dir(base_dir, &schema.name);
    fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
    fs::create_dir_all(dir.join("src")).map_err(|e| Error::io(&dir, e))?;
    fs::create_dir_all(dir.join("metadata")).map_err(|e| Error::io(&dir, e))?;
    let path = schema_path(base_dir, &schema.name);
    let text = serde_json::to_string_pretty(schema)
        .map_err(|e| Error::Internal(format!("schema serialization failed: {e}")))?;
    fs::write(&path, text).map_err(|e| Error::io(&path, e))
}

pub fn load_schema(name: &str, base_dir: &Path) -> Result<TableSchema> {
    let path = schema_path(base_dir, name);
    let text = fs::read_to_string(&path)
        .map_err(|_| Error::SchemaNotFound(name.to_string()))?;
    serde_json::from_str(&text)
        .map_err(|e| Error::Internal(format!("schema {name} is corrupt: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> TableSchema {
        TableSchema {
            name: "users".into(),
            columns: vec![
                ColumnDef::new(UUID_COLUMN_NAME, DataType::Varchar(UUID_LEN)),
                ColumnDef::new("id", DataType::Int32),
                ColumnDef::new("name", DataType::Varchar(64)),
                ColumnDef::new("age", DataType::Int32),
            ],
            primary_key_column_indices: vec![],
            indices: vec![],
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[test]
    fn validate_requires_uuid_at_index_zero() {
        let mut s = sample_schema();
        s.columns.swap(0, 1);
        assert!(validate(&s).is_err());
    }

    #[test]
    fn record_size_is_deterministic() {
        let s = sample_schema();
        let a = s.record_size();
        let b = s.record_size();
        assert_eq!(a, b);
        assert!(a >= 37 + 4 + 65 + 4);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let s = sample_schema();
        save_schema(&s, dir.path()).unwrap();
        let loaded = load_schema("users", dir.path()).unwrap();
        assert_eq!(s, loaded);
    }
}
