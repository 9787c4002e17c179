//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a deterministic owner, the
//! three sample trees used across the suite and shortcuts for committing
//! them.

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use indifs::{Commit, FileSystem, FsConfig, MemoryTree, Result};
use indifs_core::{Keypair, PublicKey};
use indifs_store::{MemoryStore, Store};

/// Genesis timestamp of every fixture tree: 2024-11-05T00:00:00Z.
pub const T0: i64 = 1_730_764_800_000;

/// Part size of every fixture tree.
pub const PART_SIZE: u64 = 1024;

/// Seed of the default owner key.
pub const OWNER_SEED: [u8; 32] = [0x42; 32];

/// Gap between consecutive fixture commits, in milliseconds.
pub const COMMIT_STEP: i64 = 1000;

/// A test fixture with an owner keypair.
#[derive(Debug, Clone)]
pub struct TestFixture {
    pub keypair: Keypair,
}

impl TestFixture {
    /// Fixture with the deterministic default owner.
    pub fn new() -> Self {
        Self::with_seed(OWNER_SEED)
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            keypair: Keypair::from_seed(&seed),
        }
    }

    /// Fixture with a random owner.
    pub fn random() -> Self {
        Self {
            keypair: Keypair::generate(),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// A fresh tree at genesis over `store`.
    pub async fn create_fs<S: Store>(&self, store: S) -> Result<FileSystem<S>> {
        FileSystem::create(store, self.public_key(), PART_SIZE, T0, FsConfig::default()).await
    }

    /// A fresh tree at genesis in memory.
    pub async fn memory_fs(&self) -> Result<FileSystem<MemoryStore>> {
        self.create_fs(MemoryStore::new()).await
    }

    /// Build (without applying) the commit that moves `fs` to `tree`,
    /// stamped one step after the current root.
    pub async fn make_next<S: Store>(&self, fs: &FileSystem<S>, tree: &MemoryTree) -> Result<Commit> {
        let updated = fs.root().await?.updated() + COMMIT_STEP;
        fs.make_commit(&self.keypair, tree, updated).await
    }

    /// Build and apply the commit that moves `fs` to `tree`.
    pub async fn commit_tree<S: Store>(
        &self,
        fs: &FileSystem<S>,
        tree: &MemoryTree,
    ) -> Result<Commit> {
        let commit = self.make_next(fs, tree).await?;
        fs.commit(&commit).await?;
        Ok(commit)
    }

    /// A fresh in-memory tree with `trees` committed in order.
    pub async fn fs_with(&self, trees: &[MemoryTree]) -> Result<FileSystem<MemoryStore>> {
        let fs = self.memory_fs().await?;
        for tree in trees {
            self.commit_tree(&fs, tree).await?;
        }
        Ok(fs)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic pseudo-random content.
pub fn random_content(len: usize, seed: u64) -> Bytes {
    let mut buf = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill_bytes(&mut buf);
    Bytes::from(buf)
}

/// Initial tree: two directories, a nested directory and a readme.
pub fn commit1_tree() -> MemoryTree {
    MemoryTree::new()
        .with_dir("/A/")
        .with_file("/A/a.txt", "file a, first revision\n")
        .with_file("/A/b.txt", "file b\n")
        .with_dir("/B/")
        .with_file("/B/1.txt", "one\n")
        .with_dir("/B/2/")
        .with_file("/B/2/x.txt", "x marks the spot\n")
        .with_file("/readme.txt", "readme, first revision\n")
}

/// Second tree: edits `/A/a.txt`, adds `/C/` with a multi-part binary file
/// and rewrites the readme.
pub fn commit2_tree() -> MemoryTree {
    commit1_tree()
        .with_file("/A/a.txt", "file a, second revision\n")
        .with_dir("/C/")
        .with_file("/C/c.bin", random_content(3000, 7))
        .with_file("/readme.txt", "readme, second revision\n")
}

/// Third tree: drops `/B/` with everything beneath it and rewrites the
/// readme, which is the last path in the tree.
pub fn commit3_tree() -> MemoryTree {
    commit2_tree()
        .without("/B/")
        .with_file("/readme.txt", "readme, third revision\n")
}

/// The sample trees in commit order.
pub fn sample_trees() -> Vec<MemoryTree> {
    vec![commit1_tree(), commit2_tree(), commit3_tree()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_trees_shape() {
        let t1 = commit1_tree();
        let t3 = commit3_tree();
        assert_eq!(t1.len(), 8);
        assert!(t3.paths().all(|p| !p.starts_with("/B/")));
        assert_eq!(t3.paths().last(), Some("/readme.txt"));
        assert_eq!(commit2_tree().get("/C/c.bin").map(Bytes::len), Some(3000));
    }

    #[test]
    fn test_random_content_is_deterministic() {
        assert_eq!(random_content(64, 1), random_content(64, 1));
        assert_ne!(random_content(64, 1), random_content(64, 2));
    }

    #[tokio::test]
    async fn test_fs_with_commits_in_order() {
        let fixture = TestFixture::new();
        let fs = fixture.fs_with(&sample_trees()).await.unwrap();
        assert_eq!(fs.version().await.unwrap(), 3);
        assert_eq!(fs.root().await.unwrap().updated(), T0 + 3 * COMMIT_STEP);
    }
}
