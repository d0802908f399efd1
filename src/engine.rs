//! Top-level engine API. Parses and runs one SQL statement end to end,
//! owning the catalog, page store, and kernel cache a real embedding
//! application would construct once and reuse across many statements.
//!
//! Grounded on the teacher's `Database` (in `lib.rs`), which bundles a
//! `Storage`/`SaveOp` pair behind a handful of `run`/`query` entry points;
//! here the equivalent bundle is catalog + page_store + kernel_cache.

use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::ast::Stmt;
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::executor::{execute_select, ResultSet};
use crate::kernel_cache::KernelCache;
use crate::loader::Loader;
use crate::mutation::{execute_delete, execute_insert, execute_update, MutationResult};
use crate::parser::Parser;
use crate::schema::{ColumnDef, IndexDef, TableSchema};
use crate::value::{DataType, Value};

/// What running one statement produced; the CLI and any other embedder
/// formats this however it likes.
#[derive(Debug)]
pub enum Outcome {
    Rows(ResultSet),
    Mutation(MutationResult),
    SchemaChanged,
}

pub struct Database {
    catalog: Catalog,
    page_store: PageStoreHandle,
    kernel_cache: KernelCache,
    config: EngineConfig,
}

/// `PageStore` by value, but named so `Database`'s field list reads like
/// the rest of the engine's "one owner per concern" layout.
type PageStoreHandle = crate::page_store::PageStore;

impl Database {
    pub fn open(config: EngineConfig) -> Self {
        let loader = Arc::new(Loader::new());
        let catalog = Catalog::new(config.base_dir.clone());
        let page_store = PageStoreHandle::new(loader.clone(), config.cc_program.clone());
        let kernel_cache = KernelCache::new(loader, config.cc_program.clone(), config.kernel_cache_capacity);
        Database { catalog, page_store, kernel_cache, config }
    }

    pub fn base_dir(&self) -> &Path {
        self.catalog.base_dir()
    }

    /// Parse and execute one SQL statement (spec section 6: SQL surface).
    pub fn execute(&self, sql: &str) -> Result<Outcome> {
        let stmt = Parser::parse_statement(sql)?;
        self.run(stmt)
    }

    pub fn run(&self, stmt: Stmt) -> Result<Outcome> {
        match stmt {
            Stmt::Select(s) => {
                let rows =
                    execute_select(&s, &self.catalog, &self.page_store, &self.kernel_cache, &self.config)?;
                Ok(Outcome::Rows(rows))
            }
            Stmt::Insert(s) => {
                let r = execute_insert(&s, &self.catalog, &self.page_store)?;
                Ok(Outcome::Mutation(r))
            }
            Stmt::Update(s) => {
                let r = execute_update(&s, &self.catalog, &self.page_store, &self.kernel_cache)?;
                Ok(Outcome::Mutation(r))
            }
            Stmt::Delete(s) => {
                let r = execute_delete(&s, &self.catalog, &self.page_store, &self.kernel_cache)?;
                Ok(Outcome::Mutation(r))
            }
            Stmt::CreateTable(s) => {
                let schema = build_schema(&s, self.config.default_page_size)?;
                info!("creating table {}", schema.name);
                self.catalog.create_table(schema)?;
                Ok(Outcome::SchemaChanged)
            }
            Stmt::CreateIndex(s) => {
                self.catalog.create_index(
                    &s.table,
                    IndexDef { name: s.index_name, columns: s.columns },
                )?;
                Ok(Outcome::SchemaChanged)
            }
        }
    }

    pub fn describe_table(&self, name: &str) -> Result<TableSchema> {
        self.catalog.load_schema(name)
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        self.catalog.list_tables()
    }
}

fn build_schema(stmt: &crate::ast::CreateTableStmt, default_page_size: usize) -> Result<TableSchema> {
    let mut columns = Vec::with_capacity(stmt.columns.len());
    let mut pk_indices = Vec::new();
    for (i, spec) in stmt.columns.iter().enumerate() {
        let data_type = resolve_type(&spec.type_name, spec.length)?;
        let mut col = ColumnDef::new(&spec.name, data_type);
        col.nullable = spec.nullable;
        if spec.primary_key {
            col = col.primary_key();
            pk_indices.push(i);
        }
        if let Some(default) = &spec.default {
            col = col.with_default(default_literal_text(default)?);
        }
        columns.push(col);
    }
    let schema = TableSchema {
        name: stmt.table.clone(),
        columns,
        primary_key_column_indices: pk_indices,
        indices: vec![],
        page_size: default_page_size,
    };
    crate::schema::validate(&schema)?;
    Ok(schema)
}

/// Render a `DEFAULT` clause's literal back into SQL text, since
/// `ColumnDef::default_value_text` is re-parsed (via
/// `semantic::eval_default_literal`) every time a row needs it filled in.
/// The grammar only accepts a literal here (spec section 4.4), never a
/// general expression, so this only needs to handle `Expr::Literal`.
fn default_literal_text(expr: &crate::ast::Expr) -> Result<String> {
    let crate::ast::Expr::Literal(v) = expr else {
        return Err(Error::Semantic("DEFAULT must be a literal".into()));
    };
    Ok(match v {
        Value::Int32(n) => n.to_string(),
        Value::Float64(n) => format!("{n:?}"),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Date(n) => n.to_string(),
        Value::Str(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Null => "NULL".to_string(),
    })
}

fn resolve_type(name: &str, length: Option<u16>) -> Result<DataType> {
    match name.to_ascii_uppercase().as_str() {
        "INT" | "INTEGER" | "INT32" => Ok(DataType::Int32),
        "FLOAT" | "DOUBLE" | "FLOAT64" => Ok(DataType::Float64),
        "BOOL" | "BOOLEAN" => Ok(DataType::Bool),
        "DATE" => Ok(DataType::Date),
        "TEXT" => Ok(DataType::Text),
        "VARCHAR" => {
            let n = length.ok_or_else(|| Error::Semantic("VARCHAR requires a length".into()))?;
            Ok(DataType::Varchar(n))
        }
        other => Err(Error::Semantic(format!("unknown column type {other}"))),
    }
}

