//! Kernel fingerprinting (spec section 4.5/8, invariant 2): a stable hash
//! over (table name, schema hash, predicate AST canonical form, projection
//! list canonical form), used as the kernel cache key. Two statements with
//! equal fingerprints MUST produce byte-identical kernel source, so this
//! hashes a canonical textual form of the statement rather than the
//! statement's `Debug` output (whose format is not a stability contract).

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::ast::{BinOp, Expr, OrderKey, SelectItem, SortDir};
use crate::schema::TableSchema;
use crate::value::Value;

pub type Fingerprint = u64;

/// Canonical text form of an expression, stable across equal ASTs
/// regardless of how they were parsed.
pub fn canonical_expr(e: &Expr) -> String {
    match e {
        Expr::Star => "*".to_string(),
        Expr::CountStar => "COUNT(*)".to_string(),
        Expr::Column(c) => format!("col:{}", c.to_ascii_lowercase()),
        Expr::Literal(v) => format!("lit:{}", canonical_value(v)),
        Expr::Not(inner) => format!("NOT({})", canonical_expr(inner)),
        Expr::BinOp(op, l, r) => {
            format!("({} {} {})", canonical_expr(l), canonical_op(*op), canonical_expr(r))
        }
    }
}

fn canonical_op(op: BinOp) -> &'static str {
    match op {
        BinOp::And => "AND",
        BinOp::Or => "OR",
        BinOp::Eq => "=",
        BinOp::NotEq => "!=",
        BinOp::Lt => "<",
        BinOp::LtEq => "<=",
        BinOp::Gt => ">",
        BinOp::GtEq => ">=",
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
    }
}

fn canonical_value(v: &Value) -> String {
    match v {
        Value::Int32(n) => format!("i{n}"),
        Value::Float64(n) => format!("f{n:?}"),
        Value::Bool(b) => format!("b{b}"),
        Value::Date(d) => format!("d{d}"),
        Value::Str(s) => format!("s{s:?}"),
        Value::Null => "null".to_string(),
    }
}

fn canonical_select_item(item: &SelectItem) -> String {
    match item {
        SelectItem::Star => "*".to_string(),
        SelectItem::CountStar => "COUNT(*)".to_string(),
        SelectItem::Column(c) => format!("col:{}", c.to_ascii_lowercase()),
    }
}

fn canonical_order_key(k: &OrderKey) -> String {
    format!(
        "{}{}",
        canonical_expr(&k.expr),
        if k.dir == SortDir::Desc { " DESC" } else { " ASC" }
    )
}

/// One statement's canonical fingerprint inputs, shared by SELECT and the
/// synthetic SELECT the mutation engine fabricates for UPDATE/DELETE (spec
/// section 9: "Synthetic SELECT used by UPDATE/DELETE").
pub struct FingerprintInput<'a> {
    pub table: &'a str,
    pub schema: &'a TableSchema,
    pub predicate: Option<&'a Expr>,
    pub select_list: &'a [SelectItem],
    pub order_by: &'a [OrderKey],
}

pub fn fingerprint(input: &FingerprintInput) -> Fingerprint {
    let mut h = FxHasher::default();
    input.table.to_ascii_lowercase().hash(&mut h);
    input.schema.schema_hash().hash(&mut h);
    match input.predicate {
        Some(e) => canonical_expr(e).hash(&mut h),
        None => "no-predicate".hash(&mut h),
    }
    for item in input.select_list {
        canonical_select_item(item).hash(&mut h);
    }
    for key in input.order_by {
        canonical_order_key(key).hash(&mut h);
    }
    h.finish()
}

/// Render the fingerprint as the `<K>` component of the on-disk kernel
/// paths in spec section 6 (`<base_dir>/kernels/<K>_<T>...`).
pub fn fingerprint_name(fp: Fingerprint) -> String {
    format!("k{fp:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, DEFAULT_PAGE_SIZE};
    use crate::value::DataType;

    fn schema() -> TableSchema {
        TableSchema {
            name: "users".into(),
            columns: vec![ColumnDef::new("uuid", DataType::Varchar(36))],
            primary_key_column_indices: vec![],
            indices: vec![],
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[test]
    fn equal_statements_fingerprint_equal() {
        let schema = schema();
        let pred_a = Expr::BinOp(
            BinOp::Gt,
            Box::new(Expr::Column("age".into())),
            Box::new(Expr::Literal(Value::Int32(21))),
        );
        let pred_b = pred_a.clone();
        let list = vec![SelectItem::Column("name".into())];
        let fp_a = fingerprint(&FingerprintInput {
            table: "users",
            schema: &schema,
            predicate: Some(&pred_a),
            select_list: &list,
            order_by: &[],
        });
        let fp_b = fingerprint(&FingerprintInput {
            table: "USERS",
            schema: &schema,
            predicate: Some(&pred_b),
            select_list: &list,
            order_by: &[],
        });
        assert_eq!(fp_a, fp_b);
    }
}
