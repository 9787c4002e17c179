//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for indifs. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{prefix_upper_bound, Entry, Store, Transaction};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn execute<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> std::result::Result<T, E> {
            let mut conn = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StoreError::from)?;

            let value = f(&mut SqliteTransaction { conn: &tx })?;
            tx.commit().map_err(StoreError::from)?;
            Ok(value)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn snapshot<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&dyn Transaction) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> std::result::Result<T, E> {
            let mut conn = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            // Dropped without commit: rolled back.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Deferred)
                .map_err(StoreError::from)?;
            f(&SqliteTransaction { conn: &tx })
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Statements against an open rusqlite transaction.
struct SqliteTransaction<'a> {
    conn: &'a Connection,
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entry> {
    Ok((row.get(0)?, row.get(1)?))
}

impl Transaction for SqliteTransaction<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(StoreError::from)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Entry>> {
        let rows = match prefix_upper_bound(prefix) {
            Some(upper) => {
                let mut stmt = self.conn.prepare_cached(
                    "SELECT key, value FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key",
                )?;
                let rows = stmt
                    .query_map(params![prefix, upper], entry_from_row)?
                    .collect::<rusqlite::Result<Vec<Entry>>>()?;
                rows
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare_cached("SELECT key, value FROM kv WHERE key >= ?1 ORDER BY key")?;
                let rows = stmt
                    .query_map(params![prefix], entry_from_row)?
                    .collect::<rusqlite::Result<Vec<Entry>>>()?;
                rows
            }
        };
        Ok(rows)
    }
}
