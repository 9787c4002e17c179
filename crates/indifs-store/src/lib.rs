//! # indifs store
//!
//! Storage abstraction for indifs. Provides a trait-based interface for
//! transactional key-value persistence with SQLite and in-memory
//! implementations.
//!
//! ## Overview
//!
//! The file system keeps its header set, commit log and content chunks in an
//! ordered key-value space behind the [`Store`] trait. Every commit runs in a
//! single [`Store::execute`] call; reads use [`Store::snapshot`].
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for transactional access
//! - [`Transaction`] - get / put / delete / prefix scan inside one transaction
//! - [`TransactionExt`] - CBOR-encoded typed records on top of raw values
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use indifs_store::{SqliteStore, Store, StoreError, Transaction};
//!
//! async fn example() -> Result<(), StoreError> {
//!     let store = SqliteStore::open("indifs.db")?;
//!
//!     store
//!         .execute(|tx| -> Result<(), StoreError> { tx.put(b"key", b"value") })
//!         .await?;
//!
//!     let value = store
//!         .snapshot(|tx| -> Result<_, StoreError> { tx.get(b"key") })
//!         .await?;
//!     assert_eq!(value.as_deref(), Some(&b"value"[..]));
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{prefix_upper_bound, Entry, Store, Transaction, TransactionExt};
