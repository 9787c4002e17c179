//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Result, StoreError};
use crate::traits::{prefix_upper_bound, Entry, Store, Transaction};

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<Map>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> Result<usize> {
        Ok(self.inner.read().map_err(|_| StoreError::LockPoisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn execute_sync<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let mut guard = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut tx = MemoryTransaction {
            base: &guard,
            writes: BTreeMap::new(),
        };
        let value = f(&mut tx)?;

        let writes = tx.writes;
        for (key, write) in writes {
            match write {
                Some(value) => guard.insert(key, value),
                None => guard.remove(&key),
            };
        }
        Ok(value)
    }

    fn snapshot_sync<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&dyn Transaction) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let guard = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        let tx = MemoryTransaction {
            base: &guard,
            writes: BTreeMap::new(),
        };
        f(&tx)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn execute<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        self.execute_sync(f)
    }

    async fn snapshot<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&dyn Transaction) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        self.snapshot_sync(f)
    }
}

/// Buffered writes over the committed map. `None` marks a deletion.
struct MemoryTransaction<'a> {
    base: &'a Map,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl Transaction for MemoryTransaction<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(write) => Ok(write.clone()),
            None => Ok(self.base.get(key).cloned()),
        }
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Entry>> {
        let upper = match prefix_upper_bound(prefix) {
            Some(bound) => Bound::Excluded(bound),
            None => Bound::Unbounded,
        };
        let range = (Bound::Included(prefix.to_vec()), upper);

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .base
            .range::<Vec<u8>, _>(range.clone())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, write) in self.writes.range::<Vec<u8>, _>(range) {
            match write {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }
        Ok(merged.into_iter().collect())
    }
}
