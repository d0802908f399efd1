//! Mutation engine (C8, spec section 4.8). INSERT appends to the
//! best-fit page and recompiles it; UPDATE and DELETE synthesize a
//! selector kernel equivalent to `SELECT * FROM t WHERE <pred>` (spec
//! section 9's design note: "preserves one predicate path") and match its
//! results back to specific records by `uuid`, since the kernel ABI
//! returns copies of matching records rather than their positions.
//!
//! Grounded on the teacher's `compact.rs` (read-modify-rewrite of a whole
//! page under a new layout) for the regenerate-and-swap shape.

use std::collections::HashSet;

use uuid::Uuid;

use crate::ast::{DeleteStmt, Expr, InsertStmt, UpdateStmt};
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::kernel_cache::KernelCache;
use crate::page_store::{decode_record, PageHandle, PageStore};
use crate::schema::{TableSchema, UUID_COLUMN_INDEX};
use crate::semantic;
use crate::synth::{self, ResultShape};
use crate::value::Value;

type KernelFn = unsafe extern "C" fn(*const u8, i32, *mut u8, i32) -> i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationResult {
    pub rows_affected: u64,
}

pub fn execute_insert(
    stmt: &InsertStmt,
    catalog: &Catalog,
    page_store: &PageStore,
) -> Result<MutationResult> {
    let schema = catalog.load_schema(&stmt.table)?;
    let mut row = semantic::resolve_insert_row(stmt, &schema)?;
    // The engine owns row identity; any user-supplied uuid is discarded
    // (spec section 4.8: "synthesize a fresh UUID ... overriding any
    // provided value").
    row[UUID_COLUMN_INDEX] = Value::Str(Uuid::new_v4().to_string());

    let mut metadata = catalog.load_metadata(&stmt.table)?;
    let page_id =
        page_store.find_best_page_for_insert(catalog.base_dir(), &schema, &stmt.table, metadata.page_count)?;
    page_store.append_record(catalog.base_dir(), &schema, &stmt.table, page_id, row)?;

    if page_id >= metadata.page_count {
        metadata.page_count = page_id + 1;
    }
    metadata.record_count += 1;
    metadata.touch();
    catalog.save_metadata(&metadata)?;

    Ok(MutationResult { rows_affected: 1 })
}

pub fn execute_update(
    stmt: &UpdateStmt,
    catalog: &Catalog,
    page_store: &PageStore,
    kernel_cache: &KernelCache,
) -> Result<MutationResult> {
    let schema = catalog.load_schema(&stmt.table)?;
    semantic::check_update(stmt, &schema)?;

    let mut metadata = catalog.load_metadata(&stmt.table)?;
    let mut rows_affected = 0u64;

    for page_id in 0..metadata.page_count {
        let result = mutate_page(&stmt.table, &schema, stmt.r#where.as_ref(), catalog, page_store, kernel_cache, page_id, |all_rows, matched| {
            let mut touched = 0u64;
            for row in all_rows.iter_mut() {
                let uuid = match &row[UUID_COLUMN_INDEX] {
                    Value::Str(s) => s.clone(),
                    _ => unreachable!("uuid column is always a string"),
                };
                if matched.contains(&uuid) {
                    for (col, expr) in &stmt.assignments {
                        let idx = schema.column_index(col).ok_or_else(|| Error::ColumnNotFound(col.clone()))?;
                        let v = eval_against_row(expr, &schema, row)?;
                        row[idx] = v.coerce(schema.columns[idx].data_type)?;
                    }
                    touched += 1;
                }
            }
            Ok(touched)
        })?;
        rows_affected += result;
    }

    if rows_affected > 0 {
        metadata.touch();
        catalog.save_metadata(&metadata)?;
    }
    Ok(MutationResult { rows_affected })
}

pub fn execute_delete(
    stmt: &DeleteStmt,
    catalog: &Catalog,
    page_store: &PageStore,
    kernel_cache: &KernelCache,
) -> Result<MutationResult> {
    let schema = catalog.load_schema(&stmt.table)?;
    semantic::check_delete(stmt, &schema)?;

    let mut metadata = catalog.load_metadata(&stmt.table)?;
    let mut rows_affected = 0u64;

    for page_id in 0..metadata.page_count {
        let removed = mutate_page_filter(
            &stmt.table,
            &schema,
            stmt.r#where.as_ref(),
            catalog,
            page_store,
            kernel_cache,
            page_id,
        )?;
        rows_affected += removed;
    }

    if rows_affected > 0 {
        metadata.record_count = metadata.record_count.saturating_sub(rows_affected);
        metadata.touch();
        catalog.save_metadata(&metadata)?;
    }
    Ok(MutationResult { rows_affected })
}

/// Run the fabricated `SELECT * WHERE <pred>` selector against one page,
/// apply `f` to the fully decoded page (mutating rows in place), and
/// regenerate the page if `f` reports any row touched.
fn mutate_page(
    table: &str,
    schema: &TableSchema,
    predicate: Option<&Expr>,
    catalog: &Catalog,
    page_store: &PageStore,
    kernel_cache: &KernelCache,
    page_id: u32,
    f: impl FnOnce(&mut Vec<Vec<Value>>, &HashSet<String>) -> Result<u64>,
) -> Result<u64> {
    let page = page_store.load_page(catalog.base_dir(), schema, table, page_id)?;
    let matched = matched_uuids(table, predicate, catalog, schema, kernel_cache, &page)?;
    if matched.is_empty() {
        return Ok(0);
    }
    let mut rows = page.decode_all(schema)?;
    let touched = f(&mut rows, &matched)?;
    if touched > 0 {
        page_store.regenerate_page(catalog.base_dir(), schema, table, page_id, &rows)?;
    }
    Ok(touched)
}

fn mutate_page_filter(
    table: &str,
    schema: &TableSchema,
    predicate: Option<&Expr>,
    catalog: &Catalog,
    page_store: &PageStore,
    kernel_cache: &KernelCache,
    page_id: u32,
) -> Result<u64> {
    let page = page_store.load_page(catalog.base_dir(), schema, table, page_id)?;
    let matched = matched_uuids(table, predicate, catalog, schema, kernel_cache, &page)?;
    if matched.is_empty() {
        return Ok(0);
    }
    let rows = page.decode_all(schema)?;
    let kept: Vec<Vec<Value>> = rows
        .iter()
        .filter(|r| !matches!(&r[UUID_COLUMN_INDEX], Value::Str(s) if matched.contains(s)))
        .cloned()
        .collect();
    let removed = (rows.len() - kept.len()) as u64;
    if removed > 0 {
        page_store.regenerate_page(catalog.base_dir(), schema, table, page_id, &kept)?;
    }
    Ok(removed)
}

/// Synthesize and invoke the `SELECT * FROM <table> WHERE <predicate>`
/// selector kernel against one page, returning the `uuid` of every
/// matching record.
fn matched_uuids(
    table: &str,
    predicate: Option<&Expr>,
    catalog: &Catalog,
    schema: &TableSchema,
    kernel_cache: &KernelCache,
    page: &PageHandle,
) -> Result<HashSet<String>> {
    let selector = crate::ast::SelectStmt {
        select_list: vec![crate::ast::SelectItem::Star],
        from_table: table.to_string(),
        r#where: predicate.cloned(),
        order_by: vec![],
        limit: None,
    };
    let kernel = synth::synthesize(&selector, schema)?;
    debug_assert!(matches!(kernel.result_shape, ResultShape::FullRecord));
    let handle = kernel_cache.get_or_build(&kernel, table, catalog.base_dir())?;
    let symbol = format!("{}\0", kernel.symbol);
    let kernel_fn = unsafe { handle.lib.resolve::<KernelFn>(symbol.as_bytes())? };

    let count = page.count()?;
    let base = if count > 0 {
        page.record_ptr(0)?.ok_or_else(|| Error::Internal("nonzero count but read(0) is null".into()))?
    } else {
        return Ok(HashSet::new());
    };

    let record_size = schema.record_size();
    let mut buffer = vec![0u8; record_size * count as usize];
    let written = unsafe { kernel_fn(base, count, buffer.as_mut_ptr(), count) };

    let mut uuids = HashSet::with_capacity(written.max(0) as usize);
    for i in 0..written.max(0) as usize {
        let row = unsafe { decode_record(schema, buffer.as_ptr().add(i * record_size)) };
        if let Value::Str(s) = &row[UUID_COLUMN_INDEX] {
            uuids.insert(s.clone());
        }
    }
    Ok(uuids)
}

/// Evaluate an assignment expression against one already-decoded row,
/// unlike `semantic::eval_literal`, which only folds constants for
/// `INSERT` — `UPDATE ... SET x = x + 1` needs the current row's values.
fn eval_against_row(expr: &Expr, schema: &TableSchema, row: &[Value]) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Column(name) => {
            let idx = schema.column_index(name).ok_or_else(|| Error::ColumnNotFound(name.clone()))?;
            Ok(row[idx].clone())
        }
        Expr::BinOp(op, l, r) if !op.is_comparison() && !op.is_logical() => {
            let lv = eval_against_row(l, schema, row)?;
            let rv = eval_against_row(r, schema, row)?;
            semantic::eval_arith(*op, lv, rv)
        }
        _ => Err(Error::Semantic("assignment must be a value expression".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_result_rows_affected_is_plain_data() {
        let r = MutationResult { rows_affected: 3 };
        assert_eq!(r.rows_affected, 3);
    }
}
