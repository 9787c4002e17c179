//! Commit construction: diff a candidate tree against the current state.

use std::collections::BTreeMap;
use std::io::{self, Read};

use bytes::{Bytes, BytesMut};
use tracing::debug;

use indifs_core::header::is_descendant;
use indifs_core::{
    chunk_merkle_root, fields, is_valid_path, parent_dir, split_chunks, Commit, CoreError, Header,
    Keypair, ROOT_PATH,
};

use crate::error::{FsError, Result};
use crate::source::TreeEntry;
use crate::state::TreeState;

/// Build and sign the commit that turns `state` into `tree`.
///
/// Only entries whose content, size or presence changed get a header. A
/// removed directory is tombstoned once; nothing beneath it is listed. If
/// nothing changed the commit carries the root alone.
pub fn build_commit<I>(state: &TreeState, keypair: &Keypair, tree: I, updated: i64) -> Result<Commit>
where
    I: IntoIterator<Item = io::Result<TreeEntry>>,
{
    if updated <= state.updated() {
        return Err(FsError::InvalidTimestamp {
            current: state.updated(),
            requested: updated,
        });
    }
    let part_size = state
        .part_size()
        .filter(|&n| n > 0)
        .ok_or(CoreError::MissingField(fields::PART_SIZE))?;
    let part_size = usize::try_from(part_size).unwrap_or(usize::MAX);
    let ver = state.version() + 1;

    let mut changes: BTreeMap<String, Header> = BTreeMap::new();
    let mut contents: BTreeMap<String, Bytes> = BTreeMap::new();
    let mut present: BTreeMap<String, bool> = BTreeMap::new();
    let mut prev: Option<String> = None;

    for entry in tree {
        let TreeEntry { path, content } = entry?;
        if path == ROOT_PATH && content.is_none() {
            continue;
        }
        check_entry(&path, content.is_none(), prev.as_deref(), &present)?;
        prev = Some(path.clone());
        present.insert(path.clone(), content.is_none());

        let current = state.get(&path);
        match content {
            None => {
                if current.is_none() {
                    changes.insert(path.clone(), Header::new_dir(path, ver, updated));
                }
            }
            Some(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                let data = Bytes::from(buf);
                let merkle = chunk_merkle_root(&split_chunks(&data, part_size));
                let size = data.len() as u64;

                let unchanged = current.is_some_and(|h| {
                    h.file_size() == size && h.file_merkle() == Some(merkle)
                });
                if !unchanged {
                    changes.insert(path.clone(), Header::new_file(&path, ver, updated, size, merkle));
                    contents.insert(path, data);
                }
            }
        }
    }

    // Tombstone the topmost paths that disappeared.
    let mut removed_dir: Option<&str> = None;
    for header in state.live() {
        let path = header.path();
        if present.contains_key(path) {
            continue;
        }
        if removed_dir.is_some_and(|dir| is_descendant(path, dir)) {
            continue;
        }
        changes.insert(path.to_string(), Header::tombstone(path, ver, updated));
        removed_dir = header.is_dir().then_some(path);
    }

    let changes: Vec<Header> = changes.into_values().collect();
    let mut body = BytesMut::with_capacity(contents.values().map(Bytes::len).sum());
    for header in &changes {
        if let Some(data) = contents.get(header.path()) {
            body.extend_from_slice(data);
        }
    }

    let mut next = state.clone();
    next.apply(&changes, false);

    let mut root = state.root().clone();
    root.remove(fields::SIG);
    root.set_int(fields::VER, i64::try_from(ver).unwrap_or(i64::MAX));
    root.set_int(fields::UPDATED, updated);
    root.set_bytes(fields::MERKLE, next.tree_merkle().as_bytes());
    root.sign(keypair);

    debug!(ver, changes = changes.len(), body = body.len(), "built commit");

    let headers = std::iter::once(root).chain(changes).collect();
    Ok(Commit::new(headers, body.freeze(), state.version()))
}

fn check_entry(
    path: &str,
    is_dir: bool,
    prev: Option<&str>,
    present: &BTreeMap<String, bool>,
) -> Result<()> {
    if !is_valid_path(path) || path == ROOT_PATH {
        return Err(FsError::InvalidTree(format!("invalid path {:?}", path)));
    }
    if is_dir != path.ends_with('/') {
        let kind = if is_dir { "directory" } else { "file" };
        return Err(FsError::InvalidTree(format!("{} path {} has the wrong form", kind, path)));
    }
    if prev.is_some_and(|p| p >= path) {
        return Err(FsError::InvalidTree(format!("{} is out of order", path)));
    }
    match parent_dir(path) {
        Some(ROOT_PATH) => Ok(()),
        Some(parent) if present.get(parent) == Some(&true) => Ok(()),
        _ => Err(FsError::InvalidTree(format!(
            "{} has no parent directory in the tree",
            path
        ))),
    }
}
