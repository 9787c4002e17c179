//! The file system: a versioned, signed tree of headers over a store.
//!
//! Every mutating operation runs inside one [`Store::execute`] transaction,
//! so a rejected commit leaves the tree exactly as it was. Queries run
//! against [`Store::snapshot`].

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, warn};

use indifs_core::header::is_descendant;
use indifs_core::{
    check_immutable_root_fields, check_tree_merkle, empty_root, reconcile_body, succession,
    validate_structure, verify_root_signature, Blake3Hash, Commit, CommitPoint, CoreError, Header,
    Keypair, MerkleWitness, PublicKey, Succession, ValidationError, ROOT_PATH,
};
use indifs_store::{Store, Transaction, TransactionExt};

use crate::builder::build_commit;
use crate::config::FsConfig;
use crate::error::{FsError, Result};
use crate::source::TreeEntry;
use crate::state::{self, keys, FileManifest, TreeState};

/// What [`FileSystem::prune_history`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub log_entries: usize,
    pub manifests: usize,
    pub parts: usize,
}

/// A single-owner file system tree.
///
/// Holds no state of its own besides configuration; the root header, the
/// live header set, the commit log and file content all live in the store.
pub struct FileSystem<S: Store> {
    store: Arc<S>,
    owner: PublicKey,
    config: FsConfig,
}

impl<S: Store> FileSystem<S> {
    /// Initialize a new tree in an empty store.
    ///
    /// The genesis root is at version 0 and carries no signature; the
    /// first commit is version 1.
    pub async fn create(
        store: S,
        owner: PublicKey,
        part_size: u64,
        created_at: i64,
        config: FsConfig,
    ) -> Result<Self> {
        if part_size == 0 {
            return Err(CoreError::UnsupportedValue("part size must be positive".into()).into());
        }
        let store = Arc::new(store);
        store
            .execute(move |tx| -> Result<()> {
                if state::load_state(tx)?.is_some() {
                    return Err(FsError::AlreadyInitialized);
                }
                let root = Header::new_root(&owner, part_size, created_at, empty_root());
                state::store_state(tx, &TreeState::new(root))
            })
            .await?;

        info!(owner = %owner.to_hex(), part_size, "created tree");
        Ok(Self {
            store,
            owner,
            config,
        })
    }

    /// Open the tree already held by `store`.
    pub async fn open(store: S, owner: PublicKey, config: FsConfig) -> Result<Self> {
        let store = Arc::new(store);
        let stored_owner = store
            .snapshot(|tx| -> Result<Option<PublicKey>> { Ok(state::require_state(tx)?.owner()) })
            .await?;
        if stored_owner != Some(owner) {
            return Err(FsError::OwnerMismatch);
        }
        Ok(Self {
            store,
            owner,
            config,
        })
    }

    pub fn owner(&self) -> &PublicKey {
        &self.owner
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commits
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate `commit` and apply it.
    ///
    /// Returns how the commit relates to the previous head.
    pub async fn commit(&self, commit: &Commit) -> Result<Succession> {
        let config = self.config.clone();
        let commit = commit.clone();

        let result = self
            .store
            .execute(move |tx| apply_commit(tx, &commit, &config))
            .await;

        match &result {
            Ok(Succession::Fork) => warn!("replaced head with a higher-hash fork"),
            Ok(_) => {}
            Err(e) if e.is_rejection() => debug!(error = %e, "rejected commit"),
            Err(e) => warn!(error = %e, "commit failed"),
        }
        result
    }

    /// Build and sign the commit that turns the current tree into `tree`.
    ///
    /// The commit is not applied.
    pub async fn make_commit<I>(&self, keypair: &Keypair, tree: I, updated: i64) -> Result<Commit>
    where
        I: IntoIterator<Item = io::Result<TreeEntry>>,
    {
        let state = self.state().await?;
        build_commit(&state, keypair, tree, updated)
    }

    /// Commit covering every change after `from_ver`, for a replica at that
    /// version. `from_ver == 0` always yields a full snapshot.
    ///
    /// At the current version the result carries the root alone with
    /// `base == ver`. It only tells the caller it is up to date; applying it
    /// is rejected as malformed and leaves the tree unchanged.
    pub async fn get_commit(&self, from_ver: u64) -> Result<Commit> {
        self.store
            .snapshot(move |tx| aggregate_commit(tx, from_ver))
            .await
    }

    /// Delete log entries below `before_ver` and content no longer
    /// referenced. The head entry is always kept.
    pub async fn prune_history(&self, before_ver: u64) -> Result<PruneStats> {
        let stats = self
            .store
            .execute(move |tx| prune(tx, before_ver))
            .await?;
        info!(
            before_ver,
            log_entries = stats.log_entries,
            manifests = stats.manifests,
            parts = stats.parts,
            "pruned history"
        );
        Ok(stats)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// The current root header and live set.
    pub async fn state(&self) -> Result<TreeState> {
        self.store.snapshot(|tx| state::require_state(tx)).await
    }

    pub async fn root(&self) -> Result<Header> {
        Ok(self.state().await?.root().clone())
    }

    pub async fn version(&self) -> Result<u64> {
        Ok(self.state().await?.version())
    }

    /// Root first, then every live header in path order.
    pub async fn headers(&self) -> Result<Vec<Header>> {
        Ok(self.state().await?.headers())
    }

    /// The live header at `path`.
    pub async fn file_header(&self, path: &str) -> Result<Header> {
        let state = self.state().await?;
        if path == ROOT_PATH {
            return Ok(state.root().clone());
        }
        state
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    /// Content chunks of the live file at `path`.
    pub async fn file_parts(&self, path: &str) -> Result<Vec<Bytes>> {
        let path = path.to_string();
        self.store
            .snapshot(move |tx| -> Result<Vec<Bytes>> {
                let state = state::require_state(tx)?;
                let merkle = state
                    .get(&path)
                    .filter(|h| h.is_file())
                    .and_then(Header::file_merkle)
                    .ok_or_else(|| FsError::NotFound(path.clone()))?;
                state::load_content(tx, &path, &merkle)
            })
            .await
    }

    /// Leaf hash and inclusion proof of the live header at `path` under the
    /// root's `Merkle`.
    pub async fn file_merkle_witness(&self, path: &str) -> Result<(Blake3Hash, MerkleWitness)> {
        self.state()
            .await?
            .witness(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transaction bodies
// ─────────────────────────────────────────────────────────────────────────────

fn apply_commit(tx: &mut dyn Transaction, commit: &Commit, config: &FsConfig) -> Result<Succession> {
    if commit.headers().len() > config.max_headers {
        return Err(malformed(format!(
            "{} headers exceed the limit of {}",
            commit.headers().len(),
            config.max_headers
        )));
    }
    if commit.body().len() as u64 > config.max_body_size {
        return Err(malformed(format!(
            "body of {} bytes exceeds the limit of {}",
            commit.body().len(),
            config.max_body_size
        )));
    }
    validate_structure(commit)?;
    let root = commit
        .root()
        .ok_or_else(|| malformed("commit has no headers".to_string()))?;

    let current = state::require_state(tx)?;
    let kind = succession(
        &CommitPoint::of_root(current.root()),
        &CommitPoint::of_commit(commit),
        commit.base(),
    )?;
    check_immutable_root_fields(current.root(), root)?;
    verify_root_signature(root)?;

    let mut next = match kind {
        Succession::Fork => {
            let head = state::load_log_entry(tx, current.version())?.ok_or_else(|| {
                FsError::Corrupt(format!("no log entry for head version {}", current.version()))
            })?;
            let mut parent = current.clone();
            parent.undo(&head)?;
            // Undoing a snapshot or gap entry lands below the fork's parent.
            if !commit.is_snapshot() && commit.base() != parent.version() {
                return Err(FsError::ResyncRequired {
                    ver: commit.ver(),
                    base: commit.base(),
                    reachable: parent.version(),
                });
            }
            parent
        }
        Succession::Next | Succession::Gap => current.clone(),
    };
    let prev_root = next.root().clone();

    let displaced = next.apply(commit.changes(), commit.is_snapshot());
    if let Some(orphan) = next.orphan() {
        return Err(malformed(format!(
            "{} has no live parent directory",
            orphan.path()
        )));
    }
    check_tree_merkle(root, next.live())?;

    let part_size = current
        .part_size()
        .ok_or(CoreError::MissingField(indifs_core::fields::PART_SIZE))?;
    let files = reconcile_body(commit, usize::try_from(part_size).unwrap_or(usize::MAX))?;

    for file in &files {
        state::store_content(tx, &file.merkle, &file.chunks)?;
    }
    next.set_root(root.clone());
    state::store_state(tx, &next)?;
    let entry = state::new_log_entry(
        root,
        &prev_root,
        commit.base(),
        commit.is_snapshot(),
        commit.changes(),
        &displaced,
    );
    state::store_log_entry(tx, &entry)?;

    info!(
        ver = commit.ver(),
        base = commit.base(),
        kind = ?kind,
        changes = commit.changes().len(),
        files = files.len(),
        "applied commit"
    );
    Ok(kind)
}

fn aggregate_commit(tx: &dyn Transaction, from_ver: u64) -> Result<Commit> {
    let state = state::require_state(tx)?;
    let current = state.version();
    if from_ver > current {
        return Err(FsError::VersionOutOfRange {
            requested: from_ver,
            current,
        });
    }
    if from_ver == 0 {
        return snapshot_commit(tx, &state);
    }

    // Newest entry first, so the first sighting of a path is its last change.
    let mut touched: BTreeMap<String, (u64, i64)> = BTreeMap::new();
    let mut ver = current;
    while ver > from_ver {
        let Some(entry) = state::load_log_entry(tx, ver)? else {
            debug!(from_ver, missing = ver, "history pruned, sending snapshot");
            return snapshot_commit(tx, &state);
        };
        if entry.snapshot {
            debug!(from_ver, at = ver, "history crosses a snapshot, sending snapshot");
            return snapshot_commit(tx, &state);
        }
        if entry.base >= ver {
            return Err(FsError::Corrupt(format!(
                "log entry {} has base {}",
                ver, entry.base
            )));
        }

        let updated = entry.root()?.updated();
        let changes = entry.changes()?;
        let displaced = entry.displaced()?;
        for header in changes.iter().chain(&displaced) {
            touched
                .entry(header.path().to_string())
                .or_insert((entry.ver, updated));
        }
        ver = entry.base;
    }

    let mut headers = vec![state.root().clone()];
    let mut removed_dir: Option<String> = None;
    for (path, (ver, updated)) in touched {
        if let Some(live) = state.get(&path) {
            if live.ver() > from_ver {
                headers.push(live.clone());
            }
            continue;
        }
        if removed_dir
            .as_deref()
            .is_some_and(|dir| is_descendant(&path, dir))
        {
            continue;
        }
        if path.ends_with('/') {
            removed_dir = Some(path.clone());
        }
        headers.push(Header::tombstone(path, ver, updated));
    }

    let body = collect_body(tx, &headers)?;
    debug!(
        from_ver,
        ver = current,
        headers = headers.len(),
        body = body.len(),
        "assembled incremental commit"
    );
    Ok(Commit::new(headers, body, from_ver))
}

fn snapshot_commit(tx: &dyn Transaction, state: &TreeState) -> Result<Commit> {
    let headers = state.headers();
    let body = collect_body(tx, &headers)?;
    Ok(Commit::new(headers, body, 0))
}

/// Concatenated content of the live files among `headers[1..]`.
fn collect_body(tx: &dyn Transaction, headers: &[Header]) -> Result<Bytes> {
    let mut body = BytesMut::new();
    for header in headers.iter().skip(1) {
        if !header.is_file() || header.deleted() {
            continue;
        }
        let merkle = header
            .file_merkle()
            .ok_or_else(|| FsError::Corrupt(format!("{} has no content root", header.path())))?;
        for chunk in state::load_content(tx, header.path(), &merkle)? {
            body.extend_from_slice(&chunk);
        }
    }
    Ok(body.freeze())
}

fn prune(tx: &mut dyn Transaction, before_ver: u64) -> Result<PruneStats> {
    let state = state::require_state(tx)?;
    let head = state.version();
    let mut stats = PruneStats::default();

    for ver in state::log_versions(tx)? {
        if ver < before_ver && ver != head {
            tx.delete(&keys::log(ver))?;
            stats.log_entries += 1;
        }
    }

    // Content stays while the live set or a retained entry refers to it.
    let mut referenced = state.file_merkles();
    for ver in state::log_versions(tx)? {
        if let Some(entry) = state::load_log_entry(tx, ver)? {
            let changes = entry.changes()?;
            let displaced = entry.displaced()?;
            referenced.extend(
                changes
                    .iter()
                    .chain(&displaced)
                    .filter(|h| h.is_file() && !h.deleted())
                    .filter_map(Header::file_merkle),
            );
        }
    }

    let mut chunks = BTreeSet::new();
    for (key, _) in tx.scan_prefix(keys::FILE_PREFIX)? {
        match keys::digest(&key, keys::FILE_PREFIX) {
            Some(merkle) if referenced.contains(&merkle) => {
                if let Some(manifest) = tx.get_record::<FileManifest>(&key)? {
                    chunks.extend(manifest.chunks);
                }
            }
            _ => {
                tx.delete(&key)?;
                stats.manifests += 1;
            }
        }
    }
    for (key, _) in tx.scan_prefix(keys::PART_PREFIX)? {
        let keep = keys::digest(&key, keys::PART_PREFIX).is_some_and(|h| chunks.contains(&h));
        if !keep {
            tx.delete(&key)?;
            stats.parts += 1;
        }
    }
    Ok(stats)
}

fn malformed(msg: String) -> FsError {
    ValidationError::MalformedCommit(msg).into()
}
