use crate::error::StoreError;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

/// Browser-localStorage sized default.
pub const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;

pub trait BlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

fn check_quota(key: &str, value: &str, limit: usize) -> Result<(), StoreError> {
    if value.len() > limit {
        return Err(StoreError::QuotaExceeded {
            key: key.to_string(),
            size: value.len(),
            limit,
        });
    }
    Ok(())
}

pub struct SqliteBlobStore {
    conn: Connection,
    max_bytes: usize,
}

impl SqliteBlobStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
             )",
            [],
        )?;
        Ok(SqliteBlobStore {
            conn,
            max_bytes: DEFAULT_MAX_BYTES,
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl BlobStore for SqliteBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        check_quota(key, value, self.max_bytes)?;
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, String>,
    max_bytes: usize,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        MemoryBlobStore::new(DEFAULT_MAX_BYTES)
    }
}

impl MemoryBlobStore {
    pub fn new(max_bytes: usize) -> Self {
        MemoryBlobStore {
            blobs: HashMap::new(),
            max_bytes,
        }
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.blobs.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        check_quota(key, value, self.max_bytes)?;
        self.blobs.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
