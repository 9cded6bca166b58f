//! Durable metadata store
//!
//! An ordered key-value accessor with prefix scans. Two backends:
//! - `RocksStore`: RocksDB, used by the server
//! - `MemStore`: in-memory ordered map, used by tests and ephemeral nodes
//!
//! Retries for transient failures are the backend's business; callers
//! surface every error as-is.

use crate::common::Result;
use parking_lot::RwLock;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Ordered key-value store holding the persisted metadata
pub trait MetadataStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    /// Delete one key, returning how many entries were removed (0 or 1).
    fn remove(&self, key: &[u8]) -> Result<u64>;
    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
    fn remove_by_prefix(&self, prefix: &[u8]) -> Result<u64>;
}

/// Typed access on top of any [`MetadataStore`]
pub trait RecordStore {
    fn get_record<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>>;
    fn put_record<T: Serialize>(&self, key: &[u8], record: &T) -> Result<()>;
    fn scan_records<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<T>>;
}

impl<S: MetadataStore + ?Sized> RecordStore for S {
    fn get_record<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_record<T: Serialize>(&self, key: &[u8], record: &T) -> Result<()> {
        let value = bincode::serialize(record)
            .map_err(|e| crate::Error::Internal(format!("Serialize error: {}", e)))?;
        self.put(key, &value)
    }

    fn scan_records<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<T>> {
        self.scan_prefix(prefix)?
            .into_iter()
            .map(|(_, value)| bincode::deserialize(&value).map_err(Into::into))
            .collect()
    }
}

/// RocksDB-backed store
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create the store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }
}

impl MetadataStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<u64> {
        if self.db.get_pinned(key)?.is_none() {
            return Ok(0);
        }
        self.db.delete(key)?;
        Ok(1)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    fn remove_by_prefix(&self, prefix: &[u8]) -> Result<u64> {
        let keys = self.scan_prefix(prefix)?;
        let mut batch = WriteBatch::default();
        for (key, _) in &keys {
            batch.delete(key);
        }
        self.db.write(batch)?;
        Ok(keys.len() as u64)
    }
}

/// In-memory store
#[derive(Default)]
pub struct MemStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl MetadataStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<u64> {
        Ok(self.map.write().remove(key).map_or(0, |_| 1))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .map
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn remove_by_prefix(&self, prefix: &[u8]) -> Result<u64> {
        let mut map = self.map.write();
        let keys: Vec<Vec<u8>> = map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            map.remove(key);
        }
        Ok(keys.len() as u64)
    }
}
