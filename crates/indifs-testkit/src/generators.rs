//! Proptest generators for property-based testing.

use proptest::prelude::*;

use indifs::MemoryTree;
use indifs_core::header::is_valid_path;
use indifs_core::{parent_dir, Blake3Hash, Header, Keypair, ROOT_PATH};

/// Directories candidate trees draw from.
const DIRS: &[&str] = &["/", "/docs/", "/docs/old/", "/src/", "/src/bin/"];

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random Blake3Hash.
pub fn blake3_hash() -> impl Strategy<Value = Blake3Hash> {
    any::<[u8; 32]>().prop_map(Blake3Hash)
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=i64::MAX / 2
}

/// Generate file content of up to `max_len` bytes.
pub fn content(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a valid file path under one of a few fixed directories.
pub fn file_path() -> impl Strategy<Value = String> {
    (prop::sample::select(DIRS), "[a-e]{1,2}(\\.txt)?")
        .prop_map(|(dir, name)| format!("{}{}", dir, name))
}

/// Generate a live file header with arbitrary metadata.
pub fn file_header() -> impl Strategy<Value = Header> {
    (file_path(), 1u64..1000, timestamp(), 0u64..1 << 20, blake3_hash())
        .prop_map(|(path, ver, updated, size, merkle)| {
            Header::new_file(path, ver, updated, size, merkle)
        })
}

/// Generate a well-formed candidate tree of up to `max_files` files.
///
/// Every ancestor directory of a file is present, and a few empty
/// directories appear on their own.
pub fn tree(max_files: usize) -> impl Strategy<Value = MemoryTree> {
    (
        prop::collection::btree_map(file_path(), content(2500), 0..=max_files),
        prop::collection::vec(prop::sample::select(DIRS), 0..3),
    )
        .prop_map(|(files, dirs)| {
            let mut tree = MemoryTree::new();
            for dir in dirs {
                add_dir_with_parents(&mut tree, dir);
            }
            for (path, data) in files {
                if let Some(parent) = parent_dir(&path) {
                    add_dir_with_parents(&mut tree, parent);
                }
                tree.add_file(path, data);
            }
            tree
        })
}

/// Generate a sequence of `1..=max_len` candidate trees.
pub fn tree_history(max_len: usize, max_files: usize) -> impl Strategy<Value = Vec<MemoryTree>> {
    prop::collection::vec(tree(max_files), 1..=max_len)
}

fn add_dir_with_parents(tree: &mut MemoryTree, dir: &str) {
    let mut current = dir;
    while current != ROOT_PATH && is_valid_path(current) {
        tree.add_dir(current);
        match parent_dir(current) {
            Some(parent) => current = parent,
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_trees_have_parents(tree in tree(8)) {
            for path in tree.paths() {
                let parent = parent_dir(path).unwrap();
                prop_assert!(parent == ROOT_PATH || tree.contains(parent));
            }
        }

        #[test]
        fn generated_paths_are_valid(path in file_path()) {
            prop_assert!(is_valid_path(&path));
            prop_assert!(!path.ends_with('/'));
        }
    }
}
