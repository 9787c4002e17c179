//! # indifs
//!
//! A content-addressed, versioned, signed file system tree with Merkle
//! proofs for every header.
//!
//! ## Overview
//!
//! A tree belongs to one Ed25519 key. Each change is a [`Commit`]: a signed
//! root header, the headers that changed and the concatenated content of the
//! changed files. Replicas apply commits in any order and converge:
//!
//! - **Headers**: Open-schema field maps with a canonical CBOR encoding
//! - **Merkle trees**: One over each file's chunks, one over all headers
//! - **Commits**: Validated and applied atomically, or not at all
//! - **Sync**: [`FileSystem::get_commit`] aggregates history for a replica
//!
//! ## Key Concepts
//!
//! - **Root header**: Version, timestamp, owner key, part size and the
//!   header-tree root, signed by the owner.
//! - **Tombstone**: A header with `Deleted = true`; a directory tombstone
//!   hides everything beneath it.
//! - **Fork**: Two commits with the same version and timestamp; the one with
//!   the higher root hash wins everywhere.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use indifs::{FileSystem, FsConfig, MemoryTree, DEFAULT_PART_SIZE};
//! use indifs::core::Keypair;
//! use indifs::store::SqliteStore;
//!
//! async fn example() -> indifs::Result<()> {
//!     let keypair = Keypair::generate();
//!     let store = SqliteStore::open("tree.db")?;
//!     let fs = FileSystem::create(
//!         store,
//!         keypair.public_key(),
//!         DEFAULT_PART_SIZE,
//!         1_730_764_800_000,
//!         FsConfig::default(),
//!     )
//!     .await?;
//!
//!     let tree = MemoryTree::new()
//!         .with_dir("/docs/")
//!         .with_file("/docs/readme.txt", "hello");
//!     let commit = fs.make_commit(&keypair, tree, 1_730_764_801_000).await?;
//!     fs.commit(&commit).await?;
//!
//!     let parts = fs.file_parts("/docs/readme.txt").await?;
//!     assert_eq!(parts.concat(), b"hello");
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `indifs::core` - Headers, commits, Merkle engine, validation rules
//! - `indifs::store` - Storage abstraction, SQLite and in-memory stores

pub mod builder;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod source;
pub mod state;

pub use indifs_core as core;
pub use indifs_store as store;

pub use builder::build_commit;
pub use config::{FsConfig, DEFAULT_PART_SIZE};
pub use error::{FsError, Result};
pub use filesystem::{FileSystem, PruneStats};
pub use source::{MemoryTree, TreeEntry};
pub use state::TreeState;

pub use indifs_core::{
    Blake3Hash, Commit, Header, Keypair, MerkleWitness, PublicKey, Succession, ValidationError,
};
