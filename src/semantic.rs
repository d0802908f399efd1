//! Semantic validation (C4, spec section 4.4): resolves column references
//! against a schema, checks that literal/column comparisons are type-
//! compatible, and works out the defaulted row for `INSERT`.
//!
//! Grounded on the teacher's `compile.rs::c_check`, which walks an `Expr`
//! tree assigning `data_type`/`is_constant` before code generation; we do
//! the same walk here but return a `Result` instead of `panic!`king, and we
//! stop one step short of code generation (that is `synth`'s job).

use crate::ast::*;
use crate::error::{Error, Result};
use crate::schema::TableSchema;
use crate::value::{DataType, Value};

/// The result type a checked expression produces, so the synthesizer knows
/// how to render it (spec section 4.5 point 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckedType {
    Bool,
    Value(DataType),
}

/// Walk `expr`, resolving column references against `schema` and checking
/// that every operator's operands are type-compatible. Returns the
/// expression's result type.
pub fn check_expr(expr: &Expr, schema: &TableSchema) -> Result<CheckedType> {
    match expr {
        Expr::Star => Err(Error::Semantic("'*' is not valid in this position".into())),
        Expr::CountStar => Ok(CheckedType::Value(DataType::Int32)),
        Expr::Literal(v) => Ok(CheckedType::Value(literal_probe_type(v))),
        Expr::Column(name) => {
            let col = schema
                .column(name)
                .ok_or_else(|| Error::ColumnNotFound(name.clone()))?;
            Ok(CheckedType::Value(col.data_type))
        }
        Expr::Not(inner) => {
            require_bool(check_expr(inner, schema)?)?;
            Ok(CheckedType::Bool)
        }
        Expr::BinOp(op, l, r) => {
            let lt = check_expr(l, schema)?;
            let rt = check_expr(r, schema)?;
            if op.is_logical() {
                require_bool(lt)?;
                require_bool(rt)?;
                return Ok(CheckedType::Bool);
            }
            let (lt, rt) = (require_value(lt)?, require_value(rt)?);
            if op.is_comparison() {
                check_comparable(*op, lt, rt)?;
                Ok(CheckedType::Bool)
            } else {
                if lt.is_string() || rt.is_string() {
                    return Err(Error::TypeMismatch(
                        "arithmetic operators do not apply to string columns".into(),
                    ));
                }
                if lt != rt && !(lt.is_numeric() && rt.is_numeric()) {
                    return Err(Error::TypeMismatch(format!(
                        "cannot apply arithmetic between {lt} and {rt}"
                    )));
                }
                Ok(CheckedType::Value(if lt == DataType::Float64 || rt == DataType::Float64 {
                    DataType::Float64
                } else {
                    lt
                }))
            }
        }
    }
}

fn literal_probe_type(v: &Value) -> DataType {
    match v {
        Value::Int32(_) => DataType::Int32,
        Value::Float64(_) => DataType::Float64,
        Value::Bool(_) => DataType::Bool,
        Value::Date(_) => DataType::Date,
        // A string literal's concrete width is only known once matched
        // against a column; treat it as the widest fixed string for type
        // checking purposes (equality-only with real varchars anyway).
        Value::Str(_) => DataType::Text,
        Value::Null => DataType::Int32,
    }
}

fn require_bool(t: CheckedType) -> Result<()> {
    match t {
        CheckedType::Bool => Ok(()),
        CheckedType::Value(DataType::Bool) => Ok(()),
        CheckedType::Value(dt) => Err(Error::TypeMismatch(format!(
            "expected boolean expression, found {dt}"
        ))),
    }
}

fn require_value(t: CheckedType) -> Result<DataType> {
    match t {
        CheckedType::Value(dt) => Ok(dt),
        CheckedType::Bool => Ok(DataType::Bool),
    }
}

/// Spec section 4.4: "string compared only by `=` / `!=`".
fn check_comparable(op: BinOp, lt: DataType, rt: DataType) -> Result<()> {
    if lt.is_string() || rt.is_string() {
        if !lt.is_string() || !rt.is_string() {
            return Err(Error::TypeMismatch(format!(
                "cannot compare {lt} with {rt}"
            )));
        }
        if !matches!(op, BinOp::Eq | BinOp::NotEq) {
            return Err(Error::TypeMismatch(
                "string columns only support '=' and '!='".into(),
            ));
        }
        return Ok(());
    }
    if lt == DataType::Bool || rt == DataType::Bool {
        if lt != rt {
            return Err(Error::TypeMismatch(format!("cannot compare {lt} with {rt}")));
        }
        if !matches!(op, BinOp::Eq | BinOp::NotEq) {
            return Err(Error::TypeMismatch("bool only supports '=' and '!='".into()));
        }
        return Ok(());
    }
    if !lt.is_numeric() || !rt.is_numeric() {
        return Err(Error::TypeMismatch(format!("cannot compare {lt} with {rt}")));
    }
    Ok(())
}

/// Resolve the select list against `schema`, rejecting unknown columns and
/// mixtures the executor cannot express (e.g. `COUNT(*)` with other items).
pub fn check_select(stmt: &SelectStmt, schema: &TableSchema) -> Result<()> {
    if stmt.select_list.iter().any(|i| matches!(i, SelectItem::CountStar)) && stmt.select_list.len() > 1
    {
        return Err(Error::Semantic("COUNT(*) cannot be combined with other select items".into()));
    }
    for item in &stmt.select_list {
        if let SelectItem::Column(name) = item {
            schema.column(name).ok_or_else(|| Error::ColumnNotFound(name.clone()))?;
        }
    }
    if let Some(w) = &stmt.r#where {
        require_bool(check_expr(w, schema)?)?;
    }
    for key in &stmt.order_by {
        check_expr(&key.expr, schema)?;
    }
    Ok(())
}

pub fn check_update(stmt: &UpdateStmt, schema: &TableSchema) -> Result<()> {
    for (col, val) in &stmt.assignments {
        let c = schema.column(col).ok_or_else(|| Error::ColumnNotFound(col.clone()))?;
        if col.eq_ignore_ascii_case(crate::schema::UUID_COLUMN_NAME) {
            return Err(Error::Semantic("the uuid column cannot be updated".into()));
        }
        let vt = check_expr(val, schema)?;
        let vt = require_value(vt)?;
        if !types_compatible(vt, c.data_type) {
            return Err(Error::TypeMismatch(format!(
                "cannot assign {vt} to column {col} of type {}",
                c.data_type
            )));
        }
    }
    if let Some(w) = &stmt.r#where {
        require_bool(check_expr(w, schema)?)?;
    }
    Ok(())
}

pub fn check_delete(stmt: &DeleteStmt, schema: &TableSchema) -> Result<()> {
    if let Some(w) = &stmt.r#where {
        require_bool(check_expr(w, schema)?)?;
    }
    Ok(())
}

fn types_compatible(value_ty: DataType, column_ty: DataType) -> bool {
    if value_ty.is_string() && column_ty.is_string() {
        return true;
    }
    if value_ty.is_numeric() && column_ty.is_numeric() {
        return true;
    }
    value_ty == column_ty
}

/// Resolve an `INSERT`'s values into one row of `Value`s in schema column
/// order, filling defaults for omitted columns and erroring when a
/// non-nullable, default-less column is missing (spec section 4.4).
pub fn resolve_insert_row(stmt: &InsertStmt, schema: &TableSchema) -> Result<Vec<Value>> {
    let provided: Vec<(String, &Expr)> = match &stmt.columns {
        Some(cols) => cols.iter().cloned().zip(stmt.values.iter()).collect(),
        None => {
            if stmt.values.len() != schema.columns.len() {
                return Err(Error::Semantic(format!(
                    "INSERT INTO {} expects {} values, found {}",
                    stmt.table,
                    schema.columns.len(),
                    stmt.values.len()
                )));
            }
            schema
                .columns
                .iter()
                .map(|c| c.name.clone())
                .zip(stmt.values.iter())
                .collect()
        }
    };

    let mut row = vec![None; schema.columns.len()];
    for (name, expr) in &provided {
        let idx = schema.column_index(name).ok_or_else(|| Error::ColumnNotFound(name.clone()))?;
        let v = eval_literal(expr)?;
        row[idx] = Some(v.coerce(schema.columns[idx].data_type)?);
    }

    let mut out = Vec::with_capacity(row.len());
    for (i, slot) in row.into_iter().enumerate() {
        let col = &schema.columns[i];
        let v = match slot {
            Some(v) => v,
            None if col.has_default => {
                let text = col.default_value_text.clone().unwrap_or_default();
                eval_default_literal(&text)?.coerce(col.data_type)?
            }
            None if !col.nullable => {
                return Err(Error::Semantic(format!(
                    "column {} is required and has no default",
                    col.name
                )))
            }
            None => Value::sentinel(col.data_type),
        };
        out.push(v);
    }
    Ok(out)
}

/// Evaluate a constant expression (spec's "evaluate literal expressions").
/// Only literals and literal arithmetic are constant in this grammar; a
/// bare column reference cannot appear in an INSERT VALUES list.
pub fn eval_literal(expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::BinOp(op, l, r) if !op.is_comparison() && !op.is_logical() => {
            let lv = eval_literal(l)?;
            let rv = eval_literal(r)?;
            eval_arith(*op, lv, rv)
        }
        Expr::Not(_) | Expr::BinOp(..) => {
            Err(Error::Semantic("INSERT values must be constant".into()))
        }
        Expr::Column(_) | Expr::CountStar | Expr::Star => {
            Err(Error::Semantic("INSERT values must be constant".into()))
        }
    }
}

pub(crate) fn eval_arith(op: BinOp, l: Value, r: Value) -> Result<Value> {
    use BinOp::*;
    match (op, l, r) {
        (Add, Value::Int32(a), Value::Int32(b)) => Ok(Value::Int32(a + b)),
        (Sub, Value::Int32(a), Value::Int32(b)) => Ok(Value::Int32(a - b)),
        (Mul, Value::Int32(a), Value::Int32(b)) => Ok(Value::Int32(a * b)),
        (Div, Value::Int32(a), Value::Int32(b)) => Ok(Value::Int32(a / b)),
        (Add, a, b) => Ok(Value::Float64(as_f64(a)? + as_f64(b)?)),
        (Sub, a, b) => Ok(Value::Float64(as_f64(a)? - as_f64(b)?)),
        (Mul, a, b) => Ok(Value::Float64(as_f64(a)? * as_f64(b)?)),
        (Div, a, b) => Ok(Value::Float64(as_f64(a)? / as_f64(b)?)),
        _ => Err(Error::Semantic("invalid constant arithmetic".into())),
    }
}

fn as_f64(v: Value) -> Result<f64> {
    match v {
        Value::Int32(n) => Ok(n as f64),
        Value::Float64(n) => Ok(n),
        _ => Err(Error::TypeMismatch("expected a number".into())),
    }
}

fn eval_default_literal(text: &str) -> Result<Value> {
    eval_literal(&crate::parser::Parser::parse_expr(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn rejects_string_ordering_comparison() {
        let e = Expr::BinOp(
            BinOp::Lt,
            Box::new(Expr::Column("name".into())),
            Box::new(Expr::Literal(Value::Str("z".into()))),
        );
        assert!(check_expr(&e, &schema()).is_err());
    }

    #[test]
    fn allows_string_equality() {
        let e = Expr::BinOp(
            BinOp::Eq,
            Box::new(Expr::Column("name".into())),
            Box::new(Expr::Literal(Value::Str("bob".into()))),
        );
        assert!(check_expr(&e, &schema()).is_ok());
    }

    #[test]
    fn insert_fills_defaults_and_rejects_missing_required() {
        let mut s = schema();
        s.columns[3].has_default = true;
        s.columns[3].default_value_text = Some("0".into());
        let stmt = InsertStmt {
            table: "users".into(),
            columns: Some(vec!["id".into(), "name".into()]),
            values: vec![Expr::Literal(Value::Int32(1)), Expr::Literal(Value::Str("ann".into()))],
        };
        let row = resolve_insert_row(&stmt, &s).unwrap();
        assert_eq!(row[3], Value::Int32(0));
    }
}
