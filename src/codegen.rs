//! Shared C source-generation helpers used by both `pagegen` (page bodies)
//! and `synth` (kernel bodies), so the two stay byte-for-byte agreed on the
//! record layout (spec section 3's central invariant).
//!
//! The teacher has no direct analogue (its pages are B-tree byte blobs, not
//! compiled C), but this mirrors the *shape* of `value.rs`'s
//! `Value::load`/`Value::save`: one function per concern, switching on
//! `DataType`, kept deliberately low-level because its output is text fed
//! to a C compiler rather than a value manipulated in-process.

use crate::schema::TableSchema;
use crate::value::DataType;

/// Deterministic identifier for a schema's record struct.
pub fn record_struct_name(schema: &TableSchema) -> String {
    format!("Rec_{}", sanitize(&schema.name))
}

pub fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Emit the `#[repr(C)]`-equivalent struct (a plain C `struct`) for
/// `schema`, field order and widths exactly matching
/// `schema::record_layout`.
pub fn emit_record_struct(schema: &TableSchema) -> String {
    let name = record_struct_name(schema);
    let mut out = String::from("typedef struct __attribute__((packed)) {\n");
    for c in &schema.columns {
        match c.data_type {
            DataType::Varchar(_) | DataType::Text => {
                out.push_str(&format!(
                    "    char col_{}[{}];\n",
                    sanitize(&c.name),
                    c.data_type.byte_width()
                ));
            }
            _ => {
                out.push_str(&format!(
                    "    {} col_{};\n",
                    c.data_type.c_type(),
                    sanitize(&c.name)
                ));
            }
        }
    }
    out.push_str(&format!("}} {name};\n"));
    out
}

/// C preamble shared by every generated translation unit: includes plus the
/// `abi_version` constant the loader checks against the schema hash (spec
/// section 6).
pub fn abi_preamble(schema: &TableSchema) -> String {
    format!(
        "#include <stdint.h>\n#include <string.h>\n#include <stddef.h>\n\n{}\nunsigned int abi_version = {}u;\n\n",
        emit_record_struct(schema),
        schema.schema_hash()
    )
}

/// A projection record struct containing only the selected columns, in
/// source column order (spec section 4.5 point 4).
pub fn emit_projection_struct(name: &str, columns: &[(&str, DataType)]) -> String {
    let mut out = String::from("typedef struct __attribute__((packed)) {\n");
    for (cname, dt) in columns {
        match dt {
            DataType::Varchar(_) | DataType::Text => {
                out.push_str(&format!(
                    "    char col_{}[{}];\n",
                    sanitize(cname),
                    dt.byte_width()
                ));
            }
            _ => out.push_str(&format!("    {} col_{};\n", dt.c_type(), sanitize(cname))),
        }
    }
    out.push_str(&format!("}} {name};\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, TableSchema, DEFAULT_PAGE_SIZE};

    #[test]
    fn struct_has_one_field_per_column() {
        let schema = TableSchema {
            name: "t".into(),
            columns: vec![
                ColumnDef::new("uuid", DataType::Varchar(36)),
                ColumnDef::new("age", DataType::Int32),
            ],
            primary_key_column_indices: vec![],
            indices: vec![],
            page_size: DEFAULT_PAGE_SIZE,
        };
        let src = emit_record_struct(&schema);
        assert!(src.contains("col_uuid[37]"));
        assert!(src.contains("int32_t col_age;"));
    }
}
