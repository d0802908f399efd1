//! Page source generation (C2, spec section 4.2). A page is a static array
//! of records plus `count()`/`read()`; this module only produces the C
//! text. Compiling it and tracking the resulting library is `compiler`
//! and `loader`'s job, and deciding *when* to regenerate a page is
//! `page_store`'s.

use crate::codegen::{abi_preamble, record_struct_name};
use crate::schema::TableSchema;
use crate::value::Value;

/// Render one page's source: the table's record struct (via
/// `codegen::abi_preamble`, so the ABI version matches what the kernel
/// expects), a static initializer holding `records`, and the page ABI
/// (`count`/`read`) from spec section 6.
pub fn emit_page_source(schema: &TableSchema, records: &[Vec<Value>]) -> String {
    let rec_struct = record_struct_name(schema);
    let mut src = abi_preamble(schema);

    // A zero-length array is a GCC/Clang extension, not portable C; keep a
    // one-element placeholder so `count() == 0` tables still compile.
    let len = records.len().max(1);
    src.push_str(&format!("static const {rec_struct} PAGE_DATA[{len}] = {{\n"));
    for row in records {
        src.push_str("    { ");
        let parts: Vec<String> = row
            .iter()
            .zip(schema.columns.iter())
            .map(|(v, c)| v.c_literal(c.data_type))
            .collect();
        src.push_str(&parts.join(", "));
        src.push_str(" },\n");
    }
    if records.is_empty() {
        let zeros: Vec<String> =
            schema.columns.iter().map(|c| Value::sentinel(c.data_type).c_literal(c.data_type)).collect();
        src.push_str(&format!("    {{ {} }},\n", zeros.join(", ")));
    }
    src.push_str("};\n\n");

    src.push_str(&format!(
        "int count(void) {{ return {}; }}\n\n",
        records.len()
    ));
    src.push_str(&format!(
        "const {rec_struct}* read(int pos) {{\n    if (pos < 0 || pos >= {}) return 0;\n    return &PAGE_DATA[pos];\n}}\n",
        records.len()
    ));
    src
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, DEFAULT_PAGE_SIZE};
    use crate::value::DataType;

    #[test]
    fn empty_page_still_compiles_conceptually() {
        let schema = TableSchema {
            name: "t".into(),
            columns: vec![ColumnDef::new("uuid", DataType::Varchar(36))],
            primary_key_column_indices: vec![],
            indices: vec![],
            page_size: DEFAULT_PAGE_SIZE,
        };
        let src = emit_page_source(&schema, &[]);
        assert!(src.contains("int count(void) { return 0; }"));
        assert!(src.contains("PAGE_DATA[1]"));
    }

    #[test]
    fn page_with_rows_emits_one_initializer_per_record() {
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
        let rows = vec![
            vec![Value::Str("a".repeat(36)), Value::Int32(1)],
            vec![Value::Str("b".repeat(36)), Value::Int32(2)],
        ];
        let src = emit_page_source(&schema, &rows);
        assert!(src.contains("int count(void) { return 2; }"));
        assert_eq!(src.matches("},\n").count(), 2);
    }
}
