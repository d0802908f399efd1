//! Query executor (C7, spec section 4.7). Loads a table's pages in
//! ascending `page_id` order, invokes the synthesized kernel against each,
//! and accumulates a result set; ordering and `LIMIT` are applied once
//! every page has been scanned (spec section 4.7: "applied after all pages
//! have produced results").
//!
//! Grounded on the teacher's `exec.rs`, which drives a similar
//! load-page/run-step/collect loop over its own storage, though there the
//! "step" is a VM instruction rather than an FFI call into generated code.

use std::cmp::Ordering;

use log::warn;

use crate::ast::{OrderKey, SelectStmt, SortDir};
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::fingerprint::canonical_expr;
use crate::kernel_cache::KernelCache;
use crate::page_store::PageStore;
use crate::schema::TableSchema;
use crate::semantic;
use crate::synth::{self, ResultShape};
use crate::value::{DataType, Value};

type KernelFn = unsafe extern "C" fn(*const u8, i32, *mut u8, i32) -> i32;

/// A SELECT's output: column names (for `COUNT(*)` a single synthetic
/// `COUNT(*)` column) plus the decoded rows, already ordered and truncated.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

pub fn execute_select(
    stmt: &SelectStmt,
    catalog: &Catalog,
    page_store: &PageStore,
    kernel_cache: &KernelCache,
    config: &EngineConfig,
) -> Result<ResultSet> {
    let schema = catalog.load_schema(&stmt.from_table)?;
    semantic::check_select(stmt, &schema)?;

    let kernel = synth::synthesize(stmt, &schema)?;
    let handle = kernel_cache.get_or_build(&kernel, &stmt.from_table, catalog.base_dir())?;
    let symbol = format!("{}\0", kernel.symbol);
    let kernel_fn = unsafe { handle.lib.resolve::<KernelFn>(symbol.as_bytes())? };

    let row_size = kernel.result_shape.row_size(&schema);
    let max_results = config.max_results;
    let mut buffer = vec![0u8; row_size * max_results];

    let metadata = catalog.load_metadata(&stmt.from_table)?;
    let early_stop_on_limit = stmt.limit.is_some() && stmt.order_by.is_empty();
    let is_count = matches!(kernel.result_shape, ResultShape::Count);

    let mut used = 0usize;
    let mut count_total: i64 = 0;
    for page_id in 0..metadata.page_count {
        let page = match page_store.load_page(catalog.base_dir(), &schema, &stmt.from_table, page_id) {
            Ok(p) => p,
            Err(e) if config.tolerate_page_loss => {
                warn!("skipping page {page_id} of {}: {e}", stmt.from_table);
                continue;
            }
            Err(e) => return Err(e),
        };

        let count = page.count()?;
        let base = if count > 0 {
            page.record_ptr(0)?.ok_or_else(|| {
                Error::Internal("page reported nonzero count but read(0) is null".into())
            })?
        } else {
            std::ptr::null()
        };

        if is_count {
            // Every page's kernel writes its own count into slot 0; each
            // page's contribution has to be accumulated, not appended as a
            // separate output row (spec section 8: count law holds across
            // page boundaries, not per page).
            let mut scratch = [0u8; 4];
            let written = unsafe { kernel_fn(base, count, scratch.as_mut_ptr(), 1) };
            if written > 0 {
                count_total += i32::from_ne_bytes(scratch) as i64;
            }
            continue;
        }

        let remaining = max_results - used;
        if remaining == 0 {
            break;
        }
        let out_ptr = unsafe { buffer.as_mut_ptr().add(used * row_size) };
        let written = unsafe { kernel_fn(base, count, out_ptr, remaining as i32) };
        used += written.max(0) as usize;

        if early_stop_on_limit && used >= stmt.limit.unwrap() {
            break;
        }
    }

    if is_count {
        buffer[0..4].copy_from_slice(&(count_total as i32).to_ne_bytes());
        used = 1;
    }

    let columns = result_columns(&kernel.result_shape, &schema);
    let mut rows = decode_rows(&kernel.result_shape, &schema, &buffer, used);

    apply_order_by(&mut rows, &columns, &stmt.order_by)?;
    if let Some(limit) = stmt.limit {
        rows.truncate(limit as usize);
    }

    Ok(ResultSet { columns, rows })
}

fn result_columns(shape: &ResultShape, schema: &TableSchema) -> Vec<String> {
    match shape {
        ResultShape::FullRecord => schema.columns.iter().map(|c| c.name.clone()).collect(),
        ResultShape::Count => vec!["COUNT(*)".to_string()],
        ResultShape::Projection(cols) => cols.iter().map(|(n, _)| n.clone()).collect(),
    }
}

fn decode_rows(shape: &ResultShape, schema: &TableSchema, buffer: &[u8], used: usize) -> Vec<Vec<Value>> {
    match shape {
        ResultShape::FullRecord => {
            let size = schema.record_size();
            (0..used)
                .map(|i| unsafe { crate::page_store::decode_record(schema, buffer.as_ptr().add(i * size)) })
                .collect()
        }
        ResultShape::Count => {
            let n = i32::from_ne_bytes(buffer[0..4].try_into().unwrap());
            vec![vec![Value::Int32(n)]]
        }
        ResultShape::Projection(cols) => {
            let offsets = projection_offsets(cols);
            let size: usize = cols.iter().map(|(_, t)| t.byte_width()).sum();
            (0..used)
                .map(|i| unsafe { decode_projection_row(cols, &offsets, buffer.as_ptr().add(i * size)) })
                .collect()
        }
    }
}

fn projection_offsets(cols: &[(String, DataType)]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(cols.len());
    let mut off = 0;
    for (_, t) in cols {
        offsets.push(off);
        off += t.byte_width();
    }
    offsets
}

unsafe fn decode_projection_row(cols: &[(String, DataType)], offsets: &[usize], ptr: *const u8) -> Vec<Value> {
    cols.iter()
        .zip(offsets)
        .map(|((_, t), &off)| decode_scalar(*t, ptr.add(off)))
        .collect()
}

unsafe fn decode_scalar(t: DataType, field: *const u8) -> Value {
    match t {
        DataType::Int32 => {
            let mut buf = [0u8; 4];
            std::ptr::copy_nonoverlapping(field, buf.as_mut_ptr(), 4);
            Value::Int32(i32::from_ne_bytes(buf))
        }
        DataType::Float64 => {
            let mut buf = [0u8; 8];
            std::ptr::copy_nonoverlapping(field, buf.as_mut_ptr(), 8);
            Value::Float64(f64::from_ne_bytes(buf))
        }
        DataType::Bool => Value::Bool(*field != 0),
        DataType::Date => {
            let mut buf = [0u8; 8];
            std::ptr::copy_nonoverlapping(field, buf.as_mut_ptr(), 8);
            Value::Date(i64::from_ne_bytes(buf))
        }
        DataType::Varchar(_) | DataType::Text => {
            let width = t.byte_width();
            let bytes = std::slice::from_raw_parts(field, width);
            let nul = bytes.iter().position(|&b| b == 0).unwrap_or(width);
            Value::Str(String::from_utf8_lossy(&bytes[..nul]).into_owned())
        }
    }
}

/// Stable sort on the ORDER BY keys (spec section 4.7). Only plain column
/// references are supported as sort keys here — an expression sort key
/// would require re-evaluating arithmetic over decoded `Value`s, which the
/// kernel's projection path has already done the fast way for the common
/// case of sorting by an output column.
fn apply_order_by(rows: &mut [Vec<Value>], columns: &[String], order_by: &[OrderKey]) -> Result<()> {
    if order_by.is_empty() {
        return Ok(());
    }
    let mut keys = Vec::with_capacity(order_by.len());
    for k in order_by {
        let crate::ast::Expr::Column(name) = &k.expr else {
            return Err(Error::Semantic(format!(
                "ORDER BY {} is not a plain column reference",
                canonical_expr(&k.expr)
            )));
        };
        let idx = columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::ColumnNotFound(name.clone()))?;
        keys.push((idx, k.dir));
    }
    rows.sort_by(|a, b| {
        for &(idx, dir) in &keys {
            let ord = compare_values(&a[idx], &b[idx]);
            let ord = if dir == SortDir::Desc { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int32(x), Value::Int32(y)) => x.cmp(y),
        (Value::Float64(x), Value::Float64(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
