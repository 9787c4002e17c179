//! Store trait: the abstract interface for transactional persistence.
//!
//! The file system keeps all of its state in an ordered key-value space.
//! Every mutation runs inside [`Store::execute`], so a commit is either
//! applied completely or not at all. Implementations include SQLite
//! (primary) and in-memory (for tests).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};

/// A key-value pair returned by [`Transaction::scan_prefix`].
pub type Entry = (Vec<u8>, Vec<u8>);

/// A view of the store inside one transaction.
///
/// Reads observe the transaction's own writes.
pub trait Transaction {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Entry>>;
}

/// The Store trait: async interface for transactional persistence.
///
/// The closures are synchronous and run to completion while the
/// implementation holds its write lock (memory) or an immediate transaction
/// (SQLite), which serializes writers.
#[async_trait]
pub trait Store: Send + Sync {
    /// Run `f` against a read/write transaction. Writes become visible iff
    /// `f` returns `Ok`.
    async fn execute<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static;

    /// Run `f` against a consistent read-only view.
    async fn snapshot<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&dyn Transaction) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static;
}

/// Typed record helpers: values are CBOR-encoded with serde.
pub trait TransactionExt: Transaction {
    fn get_record<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => ciborium::from_reader(bytes.as_slice())
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn put_record<T: Serialize>(&mut self, key: &[u8], value: &T) -> Result<()> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put(key, &buf)
    }
}

impl<X: Transaction + ?Sized> TransactionExt for X {}

/// Smallest key greater than every key starting with `prefix`, or `None` if
/// no such key exists (empty or all-`0xff` prefix).
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut bound = prefix.to_vec();
    while let Some(last) = bound.pop() {
        if last < u8::MAX {
            bound.push(last + 1);
            return Some(bound);
        }
    }
    None
}
