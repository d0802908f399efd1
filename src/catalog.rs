//! Schema catalog orchestration (C1, spec section 4.1): ties `schema`'s
//! validation/persistence and `metadata`'s bootstrap together behind one
//! `CREATE TABLE` / `CREATE INDEX` entry point, and answers "does this
//! table exist" / "what's its schema" for every other component.

use std::path::Path;

use crate::error::{Error, Result};
use crate::metadata::TableMetadata;
use crate::schema::{self, IndexDef, TableSchema};

pub struct Catalog {
    base_dir: std::path::PathBuf,
}

impl Catalog {
    pub fn new(base_dir: impl Into<std::path::PathBuf>) -> Self {
        Catalog { base_dir: base_dir.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn table_exists(&self, name: &str) -> bool {
        schema::schema_path(&self.base_dir, name).exists()
    }

    pub fn load_schema(&self, name: &str) -> Result<TableSchema> {
        schema::load_schema(name, &self.base_dir)
    }

    /// Validate and persist a new table's schema plus its initial metadata
    /// record (spec section 4.1). Errors with `DuplicateTable` if the name
    /// is already taken, matching the teacher's "create fails loudly"
    /// convention rather than silently overwriting.
    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        if self.table_exists(&schema.name) {
            return Err(Error::DuplicateTable(schema.name.clone()));
        }
        schema::validate(&schema)?;
        schema::save_schema(&schema, &self.base_dir)?;
        TableMetadata::new(&schema.name, "umbra", schema.page_size).save(&self.base_dir)?;
        Ok(())
    }

    /// Record a `CREATE INDEX` in the owning table's schema. Catalog-only:
    /// nothing in the executor ever reads `indices` back to plan a scan
    /// (spec section 9's open question resolves this as out of scope for
    /// this version).
    pub fn create_index(&self, table: &str, index: IndexDef) -> Result<()> {
        let mut schema = self.load_schema(table)?;
        if schema.indices.iter().any(|i| i.name.eq_ignore_ascii_case(&index.name)) {
            return Err(Error::DuplicateTable(format!("index {}", index.name)));
        }
        for col in &index.columns {
            if schema.column(col).is_none() {
                return Err(Error::ColumnNotFound(col.clone()));
            }
        }
        schema.indices.push(index);
        schema::save_schema(&schema, &self.base_dir)
    }

    pub fn load_metadata(&self, table: &str) -> Result<TableMetadata> {
        TableMetadata::load(&self.base_dir, table)
    }

    pub fn save_metadata(&self, metadata: &TableMetadata) -> Result<()> {
        metadata.save(&self.base_dir)
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        let dir = self.base_dir.join("tables");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| Error::io(&dir, e))? {
            let entry = entry.map_err(|e| Error::io(&dir, e))?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, DEFAULT_PAGE_SIZE, UUID_COLUMN_NAME, UUID_LEN};
    use crate::value::DataType;

    fn sample() -> TableSchema {
        TableSchema {
            name: "users".into(),
            columns: vec![ColumnDef::new(UUID_COLUMN_NAME, DataType::Varchar(UUID_LEN))],
            primary_key_column_indices: vec![],
            indices: vec![],
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[test]
    fn create_table_then_duplicate_fails() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path());
        catalog.create_table(sample()).unwrap();
        assert!(matches!(catalog.create_table(sample()), Err(Error::DuplicateTable(_))));
    }

    #[test]
    fn create_index_records_into_schema() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path());
        catalog.create_table(sample()).unwrap();
        catalog
            .create_index("users", IndexDef { name: "idx_uuid".into(), columns: vec!["uuid".into()] })
            .unwrap();
        let schema = catalog.load_schema("users").unwrap();
        assert_eq!(schema.indices.len(), 1);
    }

    #[test]
    fn list_tables_reflects_creations() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path());
        catalog.create_table(sample()).unwrap();
        assert_eq!(catalog.list_tables().unwrap(), vec!["users".to_string()]);
    }
}
