//! Commit validation: structure, the version/fork rule, signatures and body
//! reconciliation.
//!
//! Everything here is pure. The state machine in the `indifs` crate runs
//! these checks in order inside a store transaction and adds the checks that
//! need the current tree (merging and the header-tree root).

use std::cmp::Ordering;

use bytes::Bytes;

use crate::commit::Commit;
use crate::crypto::Blake3Hash;
use crate::error::ValidationError;
use crate::header::{fields, is_descendant, is_valid_path, Header};
use crate::merkle::{chunk_merkle_root, header_tree_root, split_chunks};

/// A position in a tree's history.
///
/// Ordered by `(ver, updated, hash)`; the hash only decides between forks of
/// the same predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CommitPoint {
    pub ver: u64,
    pub updated: i64,
    pub hash: Blake3Hash,
}

impl CommitPoint {
    pub fn of_root(root: &Header) -> Self {
        Self {
            ver: root.ver(),
            updated: root.updated(),
            hash: root.hash(),
        }
    }

    pub fn of_commit(commit: &Commit) -> Self {
        Self {
            ver: commit.ver(),
            updated: commit.updated(),
            hash: commit.hash(),
        }
    }
}

/// How an accepted commit relates to the current head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Succession {
    /// `ver == current + 1`.
    Next,
    /// Same version and timestamp as the head, higher hash: replaces the head.
    Fork,
    /// Skips versions; only synchronization commits based at or below the
    /// head may do this.
    Gap,
}

/// Apply the version/fork rule.
pub fn succession(
    current: &CommitPoint,
    incoming: &CommitPoint,
    base: u64,
) -> Result<Succession, ValidationError> {
    let stale = || ValidationError::StaleCommit {
        current: current.ver,
        got: incoming.ver,
    };

    match incoming.ver.cmp(&current.ver) {
        Ordering::Less => Err(stale()),
        Ordering::Equal if incoming.updated != current.updated => {
            Err(ValidationError::MalformedCommit(format!(
                "version {} already exists with a different timestamp",
                incoming.ver
            )))
        }
        Ordering::Equal if incoming.hash > current.hash => Ok(Succession::Fork),
        Ordering::Equal => Err(stale()),
        Ordering::Greater if incoming.updated <= current.updated => Err(stale()),
        Ordering::Greater if incoming.ver == current.ver + 1 => Ok(Succession::Next),
        Ordering::Greater if base <= current.ver => Ok(Succession::Gap),
        Ordering::Greater => Err(ValidationError::MalformedCommit(format!(
            "commit based on version {} cannot follow version {}",
            base, current.ver
        ))),
    }
}

/// Structural checks that need nothing but the commit itself.
pub fn validate_structure(commit: &Commit) -> Result<(), ValidationError> {
    let root = commit
        .root()
        .ok_or_else(|| malformed("commit has no headers"))?;
    if !root.is_root() {
        return Err(malformed("first header is not the root"));
    }
    if !has_version(root) || root.get_int(fields::UPDATED).is_none() {
        return Err(malformed("root header lacks Ver or Updated"));
    }
    let ver = root.ver();
    if commit.base() >= ver {
        return Err(malformed(format!(
            "base {} is not below version {}",
            commit.base(),
            ver
        )));
    }

    let mut prev: Option<&str> = None;
    let mut tombstoned_dir: Option<&str> = None;
    for header in commit.changes() {
        let path = header.path();
        if !is_valid_path(path) || header.is_root() {
            return Err(malformed(format!("invalid header path {:?}", path)));
        }
        if prev.is_some_and(|p| p >= path) {
            return Err(malformed(format!("header {} is out of order", path)));
        }
        prev = Some(path);

        if !has_version(header) || header.ver() <= commit.base() || header.ver() > ver {
            return Err(malformed(format!(
                "header {} has version outside ({}, {}]",
                path,
                commit.base(),
                ver
            )));
        }
        if header.is_file()
            && !header.deleted()
            && !header.get_int(fields::SIZE).is_some_and(|n| n >= 0)
        {
            return Err(malformed(format!("file header {} has no valid Size", path)));
        }

        match tombstoned_dir {
            Some(dir) if is_descendant(path, dir) => {
                if !header.deleted() {
                    return Err(malformed(format!(
                        "{} is live beneath tombstoned directory {}",
                        path, dir
                    )));
                }
                continue;
            }
            _ => tombstoned_dir = None,
        }
        if header.deleted() && header.is_dir() {
            tombstoned_dir = Some(path);
        }
    }

    let layout = commit.body_layout();
    if layout.surplus > 0 {
        return Err(malformed(format!(
            "body has {} bytes beyond the declared file sizes",
            layout.surplus
        )));
    }
    Ok(())
}

/// `Pub` and `PartSize` must match the tree's genesis values.
pub fn check_immutable_root_fields(
    current: &Header,
    incoming: &Header,
) -> Result<(), ValidationError> {
    if incoming.get(fields::PUB) != current.get(fields::PUB) {
        return Err(ValidationError::RootFieldChanged(fields::PUB));
    }
    if incoming.get(fields::PART_SIZE) != current.get(fields::PART_SIZE) {
        return Err(ValidationError::RootFieldChanged(fields::PART_SIZE));
    }
    Ok(())
}

/// Verify the owner signature on a root header.
pub fn verify_root_signature(root: &Header) -> Result<(), ValidationError> {
    root.verify_signature()
        .map_err(|_| ValidationError::InvalidSignature)
}

/// Compare the root's `Merkle` with the header-tree root over `live`
/// (non-root live headers in path order).
pub fn check_tree_merkle<'a>(
    root: &Header,
    live: impl IntoIterator<Item = &'a Header>,
) -> Result<(), ValidationError> {
    let actual = header_tree_root(live);
    match root.merkle() {
        Some(expected) if expected == actual => Ok(()),
        expected => Err(ValidationError::TreeMerkleMismatch {
            expected: expected.map(|h| h.to_hex()).unwrap_or_else(|| "none".into()),
            actual: actual.to_hex(),
        }),
    }
}

/// Verified content of one file in a commit body.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub header_index: usize,
    pub merkle: Blake3Hash,
    pub chunks: Vec<Bytes>,
}

/// Walk the body and check every live file against its header.
pub fn reconcile_body(
    commit: &Commit,
    part_size: usize,
) -> Result<Vec<FileContent>, ValidationError> {
    let headers = commit.headers();
    let layout = commit.body_layout();
    let mut files = Vec::with_capacity(layout.segments.len());

    for segment in &layout.segments {
        let header = &headers[segment.header_index];
        if !segment.is_complete() {
            return Err(ValidationError::SizeMismatch {
                path: header.path().to_string(),
                declared: segment.declared,
                available: segment.available,
            });
        }
        let chunks = split_chunks(&commit.segment_content(segment), part_size);
        let computed = chunk_merkle_root(&chunks);
        match header.file_merkle() {
            Some(merkle) if merkle == computed => files.push(FileContent {
                header_index: segment.header_index,
                merkle,
                chunks,
            }),
            _ => {
                return Err(ValidationError::ContentMerkleMismatch {
                    path: header.path().to_string(),
                })
            }
        }
    }

    if layout.surplus > 0 {
        return Err(malformed("body longer than declared file sizes"));
    }
    Ok(files)
}

fn has_version(header: &Header) -> bool {
    header.get_int(fields::VER).is_some_and(|v| v >= 0)
}

fn malformed(msg: impl Into<String>) -> ValidationError {
    ValidationError::MalformedCommit(msg.into())
}
