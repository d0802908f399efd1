//! Kernel synthesizer (C5, spec section 4.5). Given a checked `SelectStmt`
//! (or the synthetic SELECT the mutation engine fabricates, spec section
//! 9) and its table's `TableSchema`, emits C source for a `kernel()`
//! function matching the ABI in spec section 6.
//!
//! Grounded on the teacher's `compile.rs`/`cexp.rs` (which lower an `Expr`
//! tree into a `CExp` closure tree for its own VM) — the tree-walk shape is
//! the same, but the leaves here emit C text rather than building a
//! closure, since the target of this compiler is an external C toolchain
//! rather than an in-process bytecode interpreter.

use crate::ast::{BinOp, Expr, SelectItem, SelectStmt};
use crate::codegen::{abi_preamble, emit_projection_struct, record_struct_name, sanitize};
use crate::error::{Error, Result};
use crate::fingerprint::{fingerprint, Fingerprint, FingerprintInput};
use crate::schema::TableSchema;
use crate::value::DataType;

/// What the generated kernel writes into `results`, needed by the executor
/// to size the output buffer and interpret it (spec section 4.7 point 2).
#[derive(Debug, Clone)]
pub enum ResultShape {
    /// `results` is `RecordT*`; full source schema rows.
    FullRecord,
    /// `results` is `int*`; a single `COUNT(*)` row.
    Count,
    /// `results` is `ProjectionT*`; only the named columns, in source
    /// column order.
    Projection(Vec<(String, DataType)>),
}

impl ResultShape {
    pub fn row_size(&self, schema: &TableSchema) -> usize {
        match self {
            ResultShape::FullRecord => schema.record_size(),
            ResultShape::Count => 4,
            ResultShape::Projection(cols) => cols.iter().map(|(_, t)| t.byte_width()).sum(),
        }
    }
}

/// A synthesized kernel: its C source, exported symbol name, fingerprint,
/// and the shape of the rows it writes.
pub struct Kernel {
    pub fingerprint: Fingerprint,
    pub symbol: String,
    pub source: String,
    pub result_shape: ResultShape,
}

/// Synthesize the kernel for `stmt` against `schema`. Callers must have
/// already run `semantic::check_select` so column references and operator
/// types are known to be valid; this function panics (a programmer error,
/// not a user one) only on inputs that checking should have rejected.
pub fn synthesize(stmt: &SelectStmt, schema: &TableSchema) -> Result<Kernel> {
    let fp = fingerprint(&FingerprintInput {
        table: &stmt.from_table,
        schema,
        predicate: stmt.r#where.as_ref(),
        select_list: &stmt.select_list,
        order_by: &stmt.order_by,
    });
    let symbol = format!("kernel_{:016x}", fp);

    let result_shape = classify_select_list(&stmt.select_list, schema)?;
    let rec_struct = record_struct_name(schema);

    let mut src = abi_preamble(schema);

    if let ResultShape::Projection(cols) = &result_shape {
        let refs: Vec<(&str, DataType)> = cols.iter().map(|(n, t)| (n.as_str(), *t)).collect();
        src.push_str(&emit_projection_struct("Proj", &refs));
        src.push('\n');
    }

    if let Some(pred) = &stmt.r#where {
        src.push_str(&format!(
            "static inline int pred_{fp:016x}(const {rec_struct}* r) {{\n    return {};\n}}\n\n",
            render_bool(pred, schema)?
        ));
    }

    src.push_str(&format!(
        "int {symbol}(const {rec_struct}* data, int count, void* results, int max_results) {{\n"
    ));

    match &result_shape {
        ResultShape::Count => {
            src.push_str("    int n = 0;\n");
            src.push_str("    for (int i = 0; i < count; i++) {\n");
            if stmt.r#where.is_some() {
                src.push_str(&format!("        if (!pred_{fp:016x}(&data[i])) continue;\n"));
            }
            src.push_str("        n++;\n    }\n");
            src.push_str("    ((int*)results)[0] = n;\n    return 1;\n}\n");
        }
        ResultShape::FullRecord => {
            src.push_str(&format!("    {rec_struct}* out = ({rec_struct}*)results;\n"));
            src.push_str("    int n = 0;\n");
            src.push_str("    for (int i = 0; i < count && n < max_results; i++) {\n");
            if stmt.r#where.is_some() {
                src.push_str(&format!("        if (!pred_{fp:016x}(&data[i])) continue;\n"));
            }
            src.push_str("        out[n] = data[i];\n        n++;\n    }\n");
            src.push_str("    return n;\n}\n");
        }
        ResultShape::Projection(cols) => {
            src.push_str("    Proj* out = (Proj*)results;\n");
            src.push_str("    int n = 0;\n");
            src.push_str("    for (int i = 0; i < count && n < max_results; i++) {\n");
            if stmt.r#where.is_some() {
                src.push_str(&format!("        if (!pred_{fp:016x}(&data[i])) continue;\n"));
            }
            for (name, dt) in cols {
                let field = sanitize(name);
                if dt.is_string() {
                    src.push_str(&format!(
                        "        memcpy(out[n].col_{field}, data[i].col_{field}, sizeof(out[n].col_{field}));\n"
                    ));
                } else {
                    src.push_str(&format!("        out[n].col_{field} = data[i].col_{field};\n"));
                }
            }
            src.push_str("        n++;\n    }\n");
            src.push_str("    return n;\n}\n");
        }
    }

    Ok(Kernel { fingerprint: fp, symbol, source: src, result_shape })
}

fn classify_select_list(list: &[SelectItem], schema: &TableSchema) -> Result<ResultShape> {
    if list.len() == 1 && matches!(list[0], SelectItem::Star) {
        return Ok(ResultShape::FullRecord);
    }
    if list.len() == 1 && matches!(list[0], SelectItem::CountStar) {
        return Ok(ResultShape::Count);
    }
    let mut cols = Vec::with_capacity(list.len());
    for item in list {
        match item {
            SelectItem::Column(name) => {
                let c = schema.column(name).ok_or_else(|| Error::ColumnNotFound(name.clone()))?;
                cols.push((c.name.clone(), c.data_type));
            }
            SelectItem::Star | SelectItem::CountStar => {
                return Err(Error::Semantic(
                    "'*' and COUNT(*) cannot be combined with other select items".into(),
                ))
            }
        }
    }
    Ok(ResultShape::Projection(cols))
}

fn render_bool(e: &Expr, schema: &TableSchema) -> Result<String> {
    match e {
        Expr::Not(inner) => Ok(format!("(!{})", render_bool(inner, schema)?)),
        Expr::BinOp(op, l, r) if op.is_logical() => {
            let cop = match op {
                BinOp::And => "&&",
                BinOp::Or => "||",
                _ => unreachable!(),
            };
            Ok(format!("({} {} {})", render_bool(l, schema)?, cop, render_bool(r, schema)?))
        }
        Expr::BinOp(op, l, r) if op.is_comparison() => render_comparison(*op, l, r, schema),
        _ => Err(Error::Internal("expected a boolean expression in predicate position".into())),
    }
}

fn render_comparison(op: BinOp, l: &Expr, r: &Expr, schema: &TableSchema) -> Result<String> {
    let lt = expr_data_type(l, schema)?;
    let rt = expr_data_type(r, schema)?;
    if lt.is_string() || rt.is_string() {
        let lhs = render_string_ptr(l, schema)?;
        let rhs = render_string_ptr(r, schema)?;
        return Ok(match op {
            BinOp::Eq => format!("(strcmp({lhs}, {rhs}) == 0)"),
            BinOp::NotEq => format!("(strcmp({lhs}, {rhs}) != 0)"),
            _ => return Err(Error::Internal("non-equality string comparison reached codegen".into())),
        });
    }
    let lhs = render_value(l, schema)?;
    let rhs = render_value(r, schema)?;
    let cop = match op {
        BinOp::Eq => "==",
        BinOp::NotEq => "!=",
        BinOp::Lt => "<",
        BinOp::LtEq => "<=",
        BinOp::Gt => ">",
        BinOp::GtEq => ">=",
        _ => unreachable!(),
    };
    Ok(format!("({lhs} {cop} {rhs})"))
}

fn render_string_ptr(e: &Expr, schema: &TableSchema) -> Result<String> {
    match e {
        Expr::Column(name) => {
            let c = schema.column(name).ok_or_else(|| Error::ColumnNotFound(name.clone()))?;
            Ok(format!("r->col_{}", sanitize(&c.name)))
        }
        Expr::Literal(crate::value::Value::Str(s)) => Ok(crate::value::c_string_initializer(s)),
        _ => Err(Error::Internal("expected a string column or literal".into())),
    }
}

fn render_value(e: &Expr, schema: &TableSchema) -> Result<String> {
    match e {
        Expr::Column(name) => {
            let c = schema.column(name).ok_or_else(|| Error::ColumnNotFound(name.clone()))?;
            Ok(format!("r->col_{}", sanitize(&c.name)))
        }
        Expr::Literal(v) => Ok(v.c_literal(v.data_type().unwrap_or(DataType::Int32))),
        Expr::BinOp(op, l, r) if !op.is_comparison() && !op.is_logical() => {
            let cop = match op {
                BinOp::Add => "+",
                BinOp::Sub => "-",
                BinOp::Mul => "*",
                BinOp::Div => "/",
                _ => unreachable!(),
            };
            Ok(format!("({} {} {})", render_value(l, schema)?, cop, render_value(r, schema)?))
        }
        _ => Err(Error::Internal("expected a scalar value expression".into())),
    }
}

fn expr_data_type(e: &Expr, schema: &TableSchema) -> Result<DataType> {
    match e {
        Expr::Column(name) => {
            Ok(schema.column(name).ok_or_else(|| Error::ColumnNotFound(name.clone()))?.data_type)
        }
        Expr::Literal(v) => Ok(v.data_type().unwrap_or_else(|| {
            if let crate::value::Value::Str(_) = v {
                DataType::Text
            } else {
                DataType::Int32
            }
        })),
        Expr::BinOp(_, l, _) => expr_data_type(l, schema),
        _ => Ok(DataType::Int32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SelectItem;
    use crate::schema::{ColumnDef, UUID_COLUMN_NAME, UUID_LEN, DEFAULT_PAGE_SIZE};

    fn schema() -> TableSchema {
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
    fn count_star_kernel_writes_one_int() {
        let stmt = SelectStmt {
            select_list: vec![SelectItem::CountStar],
            from_table: "users".into(),
            r#where: Some(Expr::BinOp(
                BinOp::GtEq,
                Box::new(Expr::Column("age".into())),
                Box::new(Expr::Literal(crate::value::Value::Int32(21))),
            )),
            order_by: vec![],
            limit: None,
        };
        let k = synthesize(&stmt, &schema()).unwrap();
        assert!(matches!(k.result_shape, ResultShape::Count));
        assert!(k.source.contains("((int*)results)[0] = n;"));
    }

    #[test]
    fn two_statements_with_same_ast_share_fingerprint() {
        let s1 = SelectStmt {
            select_list: vec![SelectItem::Column("name".into())],
            from_table: "users".into(),
            r#where: None,
            order_by: vec![],
            limit: None,
        };
        let s2 = s1.clone();
        let k1 = synthesize(&s1, &schema()).unwrap();
        let k2 = synthesize(&s2, &schema()).unwrap();
        assert_eq!(k1.fingerprint, k2.fingerprint);
        assert_eq!(k1.source, k2.source);
    }
}
