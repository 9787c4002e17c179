//! Error types for the file system.

use indifs_core::{CoreError, ValidationError};
use indifs_store::StoreError;
use thiserror::Error;

/// Errors that can occur during file system operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// A commit was rejected. The tree is unchanged.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Encoding or key error outside commit validation.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// No live header at the path, or the path names no file.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("version {requested} is beyond the current version {current}")]
    VersionOutOfRange { requested: u64, current: u64 },

    /// A new commit must be stamped after the current one.
    #[error("timestamp {requested} is not after the current Updated {current}")]
    InvalidTimestamp { current: i64, requested: i64 },

    /// The candidate tree handed to the builder is not a valid tree.
    #[error("invalid tree: {0}")]
    InvalidTree(String),

    /// Reading candidate content failed.
    #[error("source error: {0}")]
    Source(#[from] std::io::Error),

    /// A fork cannot be applied on top of the state this replica can
    /// restore, because its head was reached through a snapshot or a gap.
    /// Fetch a snapshot with `get_commit(0)` instead.
    #[error("fork of version {ver} builds on version {base}, but undoing the head reaches version {reachable}; resync from a snapshot")]
    ResyncRequired { ver: u64, base: u64, reachable: u64 },

    #[error("store already holds a tree")]
    AlreadyInitialized,

    #[error("store holds no tree")]
    NotInitialized,

    /// The stored tree belongs to a different key.
    #[error("stored tree is owned by a different key")]
    OwnerMismatch,

    /// Stored state is inconsistent with itself.
    #[error("corrupt store: {0}")]
    Corrupt(String),
}

impl FsError {
    /// Whether this error rejected a commit (as opposed to a local failure).
    pub fn is_rejection(&self) -> bool {
        matches!(self, FsError::Validation(_) | FsError::ResyncRequired { .. })
    }
}

/// Result type for file system operations.
pub type Result<T> = std::result::Result<T, FsError>;
