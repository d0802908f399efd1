//! Page store (C2, spec section 4.2). A page is a compiled shared library
//! holding a static array of one table's records plus `count()`/`read()`.
//! This module owns the on-disk page paths, page compilation, and the
//! refcounted handle cache; decoding raw record bytes back into `Value`s
//! (needed by the mutation path's read-modify-write) also lives here since
//! it is the mirror image of `pagegen::emit_page_source`.
//!
//! Grounded on the teacher's `blockpagestg.rs`/`stgwin.rs` (page/buffer
//! management with a cache of live handles keyed by id) and `wmap.rs`'s
//! memory-mapped-page-as-bytes idea, reworked around compiled artifacts
//! instead of a storage file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::debug;

use crate::compiler::{compile_shared_object, shared_object_extension};
use crate::error::{Error, Result};
use crate::loader::{LoadedLibrary, Loader};
use crate::pagegen::emit_page_source;
use crate::schema::TableSchema;
use crate::value::{DataType, Value};

type CountFn = unsafe extern "C" fn() -> i32;
type ReadFn = unsafe extern "C" fn(i32) -> *const u8;

/// A loaded page: its compiled library plus the page id it represents.
pub struct PageHandle {
    lib: Arc<LoadedLibrary>,
    pub page_id: u32,
}

impl PageHandle {
    pub fn count(&self) -> Result<i32> {
        unsafe {
            let f = self.lib.resolve::<CountFn>(b"count\0")?;
            Ok(f())
        }
    }

    /// Raw pointer to the record at `pos`, or `None` past the end (spec
    /// section 6: "`read(count(P))` is null").
    ///
    /// # Safety
    /// The returned pointer is valid only as long as `self.lib` (and hence
    /// this `PageHandle`'s `Arc`) is alive; callers must not let it outlive
    /// the handle.
    pub fn record_ptr(&self, pos: i32) -> Result<Option<*const u8>> {
        unsafe {
            let f = self.lib.resolve::<ReadFn>(b"read\0")?;
            let p = f(pos);
            Ok(if p.is_null() { None } else { Some(p) })
        }
    }

    pub fn decode(&self, schema: &TableSchema, pos: i32) -> Result<Option<Vec<Value>>> {
        match self.record_ptr(pos)? {
            None => Ok(None),
            Some(ptr) => Ok(Some(unsafe { decode_record(schema, ptr) })),
        }
    }

    pub fn decode_all(&self, schema: &TableSchema) -> Result<Vec<Vec<Value>>> {
        let n = self.count()?;
        let mut rows = Vec::with_capacity(n.max(0) as usize);
        for pos in 0..n {
            if let Some(row) = self.decode(schema, pos)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

/// Read one record's fields out of raw bytes at `ptr`, using the same
/// cumulative, no-padding offsets `schema::record_layout` computes for the
/// compiled (packed) struct.
///
/// # Safety
/// `ptr` must point to at least `schema.record_size()` readable bytes laid
/// out per `schema::record_layout`.
pub unsafe fn decode_record(schema: &TableSchema, ptr: *const u8) -> Vec<Value> {
    let layout = crate::schema::record_layout(schema);
    let mut values = Vec::with_capacity(schema.columns.len());
    for (i, col) in schema.columns.iter().enumerate() {
        let off = layout.offsets[i];
        let field = ptr.add(off);
        let value = match col.data_type {
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
                let width = col.data_type.byte_width();
                let bytes = std::slice::from_raw_parts(field, width);
                let nul = bytes.iter().position(|&b| b == 0).unwrap_or(width);
                Value::Str(String::from_utf8_lossy(&bytes[..nul]).into_owned())
            }
        };
        values.push(value);
    }
    values
}

fn page_src_path(base_dir: &Path, table: &str, page_id: u32) -> PathBuf {
    base_dir.join("tables").join(table).join("src").join(format!("page_{page_id}.src"))
}

fn page_so_path(base_dir: &Path, table: &str, page_id: u32) -> PathBuf {
    base_dir
        .join("compiled")
        .join(format!("{table}Data_{page_id}.{}", shared_object_extension()))
}

pub struct PageStore {
    loader: Arc<Loader>,
    cc_program: String,
    handles: Mutex<HashMap<(String, u32), Arc<PageHandle>>>,
}

impl PageStore {
    pub fn new(loader: Arc<Loader>, cc_program: impl Into<String>) -> Self {
        PageStore { loader, cc_program: cc_program.into(), handles: Mutex::new(HashMap::new()) }
    }

    /// Load (or reuse) the compiled page library for `(table, page_id)`.
    pub fn load_page(
        &self,
        base_dir: &Path,
        schema: &TableSchema,
        table: &str,
        page_id: u32,
    ) -> Result<Arc<PageHandle>> {
        let key = (table.to_string(), page_id);
        if let Some(h) = self.handles.lock().unwrap().get(&key) {
            return Ok(h.clone());
        }
        let so_path = page_so_path(base_dir, table, page_id);
        let lib = self.loader.open(&so_path, schema.schema_hash())?;
        let handle = Arc::new(PageHandle { lib, page_id });
        self.handles.lock().unwrap().insert(key, handle.clone());
        Ok(handle)
    }

    pub fn page_count(&self, handle: &PageHandle) -> Result<i32> {
        handle.count()
    }

    /// Drop this store's reference to a page; the underlying library stays
    /// mapped as long as any other `Arc<PageHandle>`/`Arc<LoadedLibrary>` a
    /// running scan holds is still alive (spec section 5: shared resources
    /// are refcounted, not force-unmapped).
    pub fn unload(&self, table: &str, page_id: u32) {
        self.handles.lock().unwrap().remove(&(table.to_string(), page_id));
    }

    /// Regenerate a page's compiled artifact from `records`, atomically
    /// replacing the previous one (spec section 4.2: "replaced atomically
    /// on every mutation that targets it" via rename of a freshly compiled
    /// file over the old path).
    pub fn regenerate_page(
        &self,
        base_dir: &Path,
        schema: &TableSchema,
        table: &str,
        page_id: u32,
        records: &[Vec<Value>],
    ) -> Result<Arc<PageHandle>> {
        let src_path = page_src_path(base_dir, table, page_id);
        let so_path = page_so_path(base_dir, table, page_id);
        let src_dir = src_path.parent().unwrap();
        let compiled_dir = so_path.parent().unwrap();
        std::fs::create_dir_all(src_dir).map_err(|e| Error::io(src_dir, e))?;
        std::fs::create_dir_all(compiled_dir).map_err(|e| Error::io(compiled_dir, e))?;

        let source = emit_page_source(schema, records);
        std::fs::write(&src_path, &source).map_err(|e| Error::io(&src_path, e))?;

        let tmp_path = compiled_dir.join(format!(
            "{table}Data_{page_id}.tmp.{}",
            shared_object_extension()
        ));
        debug!("regenerating page {table}:{page_id} ({} records)", records.len());
        compile_shared_object(&self.cc_program, &src_path, &tmp_path)?;
        std::fs::rename(&tmp_path, &so_path).map_err(|e| Error::io(&so_path, e))?;

        self.loader.invalidate(&so_path);
        self.handles.lock().unwrap().remove(&(table.to_string(), page_id));
        self.load_page(base_dir, schema, table, page_id)
    }

    /// Append one record to page `page_id`'s in-memory image and
    /// regenerate it. The caller (the mutation engine) is responsible for
    /// knowing whether `page_id` exists yet and for deciding, via
    /// `find_best_page_for_insert`, which page to target.
    pub fn append_record(
        &self,
        base_dir: &Path,
        schema: &TableSchema,
        table: &str,
        page_id: u32,
        row: Vec<Value>,
    ) -> Result<Arc<PageHandle>> {
        let mut records = if page_so_path(base_dir, table, page_id).exists() {
            let handle = self.load_page(base_dir, schema, table, page_id)?;
            handle.decode_all(schema)?
        } else {
            Vec::new()
        };
        records.push(row);
        self.regenerate_page(base_dir, schema, table, page_id, &records)
    }

    /// Pick the page to insert into, given how many pages already exist and
    /// how full the last one is (spec section 4.2): the last page if it has
    /// spare capacity, otherwise the next page id (a page split).
    pub fn find_best_page_for_insert(
        &self,
        base_dir: &Path,
        schema: &TableSchema,
        table: &str,
        existing_page_count: u32,
    ) -> Result<u32> {
        if existing_page_count == 0 {
            return Ok(0);
        }
        let last = existing_page_count - 1;
        let handle = self.load_page(base_dir, schema, table, last)?;
        let count = handle.count()? as usize;
        if count < schema.page_size {
            Ok(last)
        } else {
            Ok(existing_page_count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, DEFAULT_PAGE_SIZE, UUID_COLUMN_NAME, UUID_LEN};
    use crate::value::DataType;

    fn schema() -> TableSchema {
        TableSchema {
            name: "t".into(),
            columns: vec![
                ColumnDef::new(UUID_COLUMN_NAME, DataType::Varchar(UUID_LEN)),
                ColumnDef::new("age", DataType::Int32),
            ],
            primary_key_column_indices: vec![],
            indices: vec![],
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[test]
    fn paths_follow_on_disk_layout() {
        let base = Path::new("/tmp/umbra_base");
        assert_eq!(
            page_src_path(base, "users", 3),
            base.join("tables/users/src/page_3.src")
        );
        assert_eq!(
            page_so_path(base, "users", 3),
            base.join(format!("compiled/usersData_3.{}", shared_object_extension()))
        );
    }

    #[test]
    #[ignore = "requires a host C compiler; exercised by integration tests in environments that have one"]
    fn regenerate_then_decode_roundtrips_values() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Arc::new(Loader::new());
        let store = PageStore::new(loader, "cc");
        let s = schema();
        let rows = vec![
            vec![Value::Str("u".repeat(36)), Value::Int32(42)],
        ];
        let handle = store.regenerate_page(dir.path(), &s, "t", 0, &rows).unwrap();
        assert_eq!(handle.count().unwrap(), 1);
        let decoded = handle.decode_all(&s).unwrap();
        assert_eq!(decoded[0][1], Value::Int32(42));
    }
}
