//! Table metadata (spec section 3/6): `{name, created_at, modified_at,
//! creator, page_count, record_count, page_size}`, persisted as a
//! fixed-width binary record at
//! `<base_dir>/tables/<T>/metadata/table_metadata.dat` — deliberately not
//! JSON like the schema file, since the spec calls this one out
//! specifically as fixed-width, and the mutation engine bumps it on every
//! write and doesn't need self-description for it.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

const NAME_FIELD_LEN: usize = 64;
const CREATOR_FIELD_LEN: usize = 64;
pub const RECORD_LEN: usize = NAME_FIELD_LEN + 8 + 8 + CREATOR_FIELD_LEN + 4 + 8 + 8;

#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    pub name: String,
    pub created_at: i64,
    pub modified_at: i64,
    pub creator: String,
    pub page_count: u32,
    pub record_count: u64,
    pub page_size: u64,
}

impl TableMetadata {
    pub fn new(name: impl Into<String>, creator: impl Into<String>, page_size: usize) -> Self {
        let now = now_unix();
        TableMetadata {
            name: name.into(),
            created_at: now,
            modified_at: now,
            creator: creator.into(),
            page_count: 0,
            record_count: 0,
            page_size: page_size as u64,
        }
    }

    pub fn touch(&mut self) {
        self.modified_at = now_unix();
    }

    fn encode(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        let mut off = 0;
        write_str_field(&mut buf[off..off + NAME_FIELD_LEN], &self.name);
        off += NAME_FIELD_LEN;
        buf[off..off + 8].copy_from_slice(&self.created_at.to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.modified_at.to_le_bytes());
        off += 8;
        write_str_field(&mut buf[off..off + CREATOR_FIELD_LEN], &self.creator);
        off += CREATOR_FIELD_LEN;
        buf[off..off + 4].copy_from_slice(&self.page_count.to_le_bytes());
        off += 4;
        buf[off..off + 8].copy_from_slice(&self.record_count.to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.page_size.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != RECORD_LEN {
            return Err(Error::Internal(format!(
                "table metadata record is {} bytes, expected {RECORD_LEN}",
                buf.len()
            )));
        }
        let mut off = 0;
        let name = read_str_field(&buf[off..off + NAME_FIELD_LEN]);
        off += NAME_FIELD_LEN;
        let created_at = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let modified_at = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let creator = read_str_field(&buf[off..off + CREATOR_FIELD_LEN]);
        off += CREATOR_FIELD_LEN;
        let page_count = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let record_count = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let page_size = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        Ok(TableMetadata { name, created_at, modified_at, creator, page_count, record_count, page_size })
    }

    pub fn save(&self, base_dir: &Path) -> Result<()> {
        let path = metadata_path(base_dir, &self.name);
        let dir = path.parent().unwrap();
        std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        std::fs::write(&path, self.encode()).map_err(|e| Error::io(&path, e))
    }

    pub fn load(base_dir: &Path, table: &str) -> Result<Self> {
        let path = metadata_path(base_dir, table);
        let bytes = std::fs::read(&path).map_err(|_| Error::SchemaNotFound(table.to_string()))?;
        Self::decode(&bytes)
    }
}

fn write_str_field(dst: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(dst.len());
    dst[..n].copy_from_slice(&bytes[..n]);
}

fn read_str_field(src: &[u8]) -> String {
    let nul = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..nul]).into_owned()
}

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

pub fn metadata_path(base_dir: &Path, table: &str) -> PathBuf {
    base_dir.join("tables").join(table).join("metadata").join("table_metadata.dat")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_bytes() {
        let mut m = TableMetadata::new("users", "umbra", 65_535);
        m.page_count = 3;
        m.record_count = 128;
        let decoded = TableMetadata::decode(&m.encode()).unwrap();
        assert_eq!(m, decoded);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let m = TableMetadata::new("users", "umbra", 65_535);
        m.save(dir.path()).unwrap();
        let loaded = TableMetadata::load(dir.path(), "users").unwrap();
        assert_eq!(m, loaded);
    }
}
