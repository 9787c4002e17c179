//! Persisted tree state: the live header set, the commit log and content.
//!
//! Key layout in the store:
//!
//! | Key                 | Value                                          |
//! |---------------------|------------------------------------------------|
//! | `headers`           | root header first, then the live set           |
//! | `log/<be u64 ver>`  | [`LogEntry`] for the commit at `ver`           |
//! | `file/<merkle>`     | [`FileManifest`]: chunk hashes of one file     |
//! | `part/<hash>`       | raw chunk bytes                                |
//!
//! The live set never contains tombstones. Tombstones survive only in the
//! log, which is what incremental synchronization reads.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use indifs_core::{
    header_tree_root, merkle_witness, parent_dir, Blake3Hash, Header, MerkleWitness, PublicKey,
    ROOT_PATH,
};
use indifs_store::{Transaction, TransactionExt};

use crate::error::{FsError, Result};

pub(crate) mod keys {
    use indifs_core::Blake3Hash;

    pub const HEADERS: &[u8] = b"headers";
    pub const LOG_PREFIX: &[u8] = b"log/";
    pub const FILE_PREFIX: &[u8] = b"file/";
    pub const PART_PREFIX: &[u8] = b"part/";

    pub fn log(ver: u64) -> Vec<u8> {
        [LOG_PREFIX, &ver.to_be_bytes()[..]].concat()
    }

    pub fn file(merkle: &Blake3Hash) -> Vec<u8> {
        [FILE_PREFIX, &merkle.as_bytes()[..]].concat()
    }

    pub fn part(hash: &Blake3Hash) -> Vec<u8> {
        [PART_PREFIX, &hash.as_bytes()[..]].concat()
    }

    /// Version encoded in a `log/` key.
    pub fn log_version(key: &[u8]) -> Option<u64> {
        let raw = key.strip_prefix(LOG_PREFIX)?;
        Some(u64::from_be_bytes(raw.try_into().ok()?))
    }

    /// Digest encoded in a `file/` or `part/` key.
    pub fn digest(key: &[u8], prefix: &[u8]) -> Option<Blake3Hash> {
        Blake3Hash::from_slice(key.strip_prefix(prefix)?)
    }
}

/// Stored form of the current header set.
#[derive(Debug, Serialize, Deserialize)]
struct HeaderSetRecord {
    headers: Vec<Bytes>,
}

/// One applied commit, kept for fork replacement and synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub ver: u64,
    pub base: u64,
    /// Applied with replace semantics (a full snapshot).
    pub snapshot: bool,
    root: Bytes,
    prev_root: Bytes,
    /// The commit's non-root headers, tombstones included.
    changes: Vec<Bytes>,
    /// Live headers the commit replaced or removed.
    displaced: Vec<Bytes>,
}

impl LogEntry {
    pub fn root(&self) -> Result<Header> {
        Ok(Header::from_canonical_bytes(&self.root)?)
    }

    pub fn prev_root(&self) -> Result<Header> {
        Ok(Header::from_canonical_bytes(&self.prev_root)?)
    }

    pub fn changes(&self) -> Result<Vec<Header>> {
        decode_all(&self.changes)
    }

    pub fn displaced(&self) -> Result<Vec<Header>> {
        decode_all(&self.displaced)
    }
}

/// Chunk list of one stored file, keyed by the file's Merkle root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileManifest {
    pub size: u64,
    pub chunks: Vec<Blake3Hash>,
}

/// The current root header and live header set of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeState {
    root: Header,
    live: BTreeMap<String, Header>,
}

impl TreeState {
    /// A tree with no headers besides the root.
    pub fn new(root: Header) -> Self {
        Self {
            root,
            live: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Header {
        &self.root
    }

    pub fn version(&self) -> u64 {
        self.root.ver()
    }

    pub fn updated(&self) -> i64 {
        self.root.updated()
    }

    pub fn owner(&self) -> Option<PublicKey> {
        self.root.public_key()
    }

    pub fn part_size(&self) -> Option<u64> {
        self.root.part_size()
    }

    /// Live header at `path`. The root is not part of the live set.
    pub fn get(&self, path: &str) -> Option<&Header> {
        self.live.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.live.contains_key(path)
    }

    /// Live non-root headers in path order.
    pub fn live(&self) -> impl Iterator<Item = &Header> {
        self.live.values()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Root first, then every live header.
    pub fn headers(&self) -> Vec<Header> {
        std::iter::once(&self.root)
            .chain(self.live.values())
            .cloned()
            .collect()
    }

    /// Header-tree root over the live set.
    pub fn tree_merkle(&self) -> Blake3Hash {
        header_tree_root(self.live.values())
    }

    /// Inclusion proof of the live header at `path`.
    pub fn witness(&self, path: &str) -> Option<(Blake3Hash, MerkleWitness)> {
        let index = self.live.keys().position(|p| p == path)?;
        let leaves: Vec<Blake3Hash> = self.live.values().map(Header::hash).collect();
        let witness = merkle_witness(index, &leaves)?;
        Some((leaves[index], witness))
    }

    pub(crate) fn set_root(&mut self, root: Header) {
        self.root = root;
    }

    /// Merge `changes` into the live set and return the headers displaced.
    ///
    /// With `replace`, the previous live set is dropped first.
    pub(crate) fn apply(&mut self, changes: &[Header], replace: bool) -> Vec<Header> {
        let mut displaced = Vec::new();
        if replace {
            displaced.extend(std::mem::take(&mut self.live).into_values());
        }

        for header in changes {
            let path = header.path();
            if header.deleted() {
                if let Some(old) = self.live.remove(path) {
                    displaced.push(old);
                }
                if header.is_dir() {
                    let descendants: Vec<String> = self
                        .live
                        .range::<str, _>((Bound::Excluded(path), Bound::Unbounded))
                        .take_while(|(p, _)| p.starts_with(path))
                        .map(|(p, _)| p.clone())
                        .collect();
                    for p in descendants {
                        if let Some(old) = self.live.remove(&p) {
                            displaced.push(old);
                        }
                    }
                }
            } else if let Some(old) = self.live.insert(path.to_string(), header.clone()) {
                displaced.push(old);
            }
        }
        displaced
    }

    /// Roll back the commit recorded in `entry`.
    pub(crate) fn undo(&mut self, entry: &LogEntry) -> Result<()> {
        for header in entry.changes()? {
            if !header.deleted() {
                self.live.remove(header.path());
            }
        }
        for header in entry.displaced()? {
            self.live.insert(header.path().to_string(), header);
        }
        self.root = entry.prev_root()?;
        Ok(())
    }

    /// First live header whose parent directory is not live.
    pub(crate) fn orphan(&self) -> Option<&Header> {
        self.live.values().find(|h| match parent_dir(h.path()) {
            Some(ROOT_PATH) | None => false,
            Some(parent) => !self.live.contains_key(parent),
        })
    }

    /// Content roots of every live file.
    pub(crate) fn file_merkles(&self) -> BTreeSet<Blake3Hash> {
        self.live
            .values()
            .filter(|h| h.is_file())
            .filter_map(Header::file_merkle)
            .collect()
    }
}

fn decode_all(encoded: &[Bytes]) -> Result<Vec<Header>> {
    encoded
        .iter()
        .map(|b| Header::from_canonical_bytes(b).map_err(FsError::from))
        .collect()
}

fn encode(header: &Header) -> Bytes {
    Bytes::from(header.canonical_bytes())
}

// ─────────────────────────────────────────────────────────────────────────────
// Store access
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn load_state(tx: &dyn Transaction) -> Result<Option<TreeState>> {
    let Some(record) = tx.get_record::<HeaderSetRecord>(keys::HEADERS)? else {
        return Ok(None);
    };
    let mut headers = decode_all(&record.headers)?.into_iter();
    let root = headers
        .next()
        .filter(Header::is_root)
        .ok_or_else(|| FsError::Corrupt("stored header set has no root".into()))?;

    let mut state = TreeState::new(root);
    for header in headers {
        state.live.insert(header.path().to_string(), header);
    }
    Ok(Some(state))
}

pub(crate) fn require_state(tx: &dyn Transaction) -> Result<TreeState> {
    load_state(tx)?.ok_or(FsError::NotInitialized)
}

pub(crate) fn store_state(tx: &mut dyn Transaction, state: &TreeState) -> Result<()> {
    let record = HeaderSetRecord {
        headers: std::iter::once(&state.root)
            .chain(state.live.values())
            .map(encode)
            .collect(),
    };
    tx.put_record(keys::HEADERS, &record)?;
    Ok(())
}

pub(crate) fn new_log_entry(
    root: &Header,
    prev_root: &Header,
    base: u64,
    snapshot: bool,
    changes: &[Header],
    displaced: &[Header],
) -> LogEntry {
    LogEntry {
        ver: root.ver(),
        base,
        snapshot,
        root: encode(root),
        prev_root: encode(prev_root),
        changes: changes.iter().map(encode).collect(),
        displaced: displaced.iter().map(encode).collect(),
    }
}

pub(crate) fn load_log_entry(tx: &dyn Transaction, ver: u64) -> Result<Option<LogEntry>> {
    Ok(tx.get_record(&keys::log(ver))?)
}

pub(crate) fn store_log_entry(tx: &mut dyn Transaction, entry: &LogEntry) -> Result<()> {
    tx.put_record(&keys::log(entry.ver), entry)?;
    Ok(())
}

/// Versions of every retained log entry, ascending.
pub(crate) fn log_versions(tx: &dyn Transaction) -> Result<Vec<u64>> {
    Ok(tx
        .scan_prefix(keys::LOG_PREFIX)?
        .iter()
        .filter_map(|(key, _)| keys::log_version(key))
        .collect())
}

/// Store the chunks of one verified file.
pub(crate) fn store_content(
    tx: &mut dyn Transaction,
    merkle: &Blake3Hash,
    chunks: &[Bytes],
) -> Result<()> {
    let mut hashes = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let hash = Blake3Hash::hash(chunk);
        tx.put(&keys::part(&hash), chunk)?;
        hashes.push(hash);
    }
    let manifest = FileManifest {
        size: chunks.iter().map(|c| c.len() as u64).sum(),
        chunks: hashes,
    };
    tx.put_record(&keys::file(merkle), &manifest)?;
    Ok(())
}

/// Load the chunks of the file with content root `merkle`.
pub(crate) fn load_content(
    tx: &dyn Transaction,
    path: &str,
    merkle: &Blake3Hash,
) -> Result<Vec<Bytes>> {
    let manifest: FileManifest = tx
        .get_record(&keys::file(merkle))?
        .ok_or_else(|| FsError::Corrupt(format!("no content stored for {}", path)))?;

    manifest
        .chunks
        .iter()
        .map(|hash| {
            tx.get(&keys::part(hash))?
                .map(Bytes::from)
                .ok_or_else(|| FsError::Corrupt(format!("missing chunk {} of {}", hash, path)))
        })
        .collect()
}
