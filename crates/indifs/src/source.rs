//! Candidate trees handed to the commit builder.
//!
//! A source is any `IntoIterator<Item = io::Result<TreeEntry>>` yielding
//! entries in strictly ascending path order. Directories have no content;
//! files carry a reader that is consumed once.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Cursor, Read};

use bytes::Bytes;

use indifs_core::header::is_descendant;

/// One entry of a candidate tree.
pub struct TreeEntry {
    pub path: String,
    pub content: Option<Box<dyn Read + Send>>,
}

impl TreeEntry {
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
        }
    }

    pub fn file(path: impl Into<String>, content: impl Read + Send + 'static) -> Self {
        Self {
            path: path.into(),
            content: Some(Box::new(content)),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.content.is_none()
    }
}

impl fmt::Debug for TreeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeEntry")
            .field("path", &self.path)
            .field("dir", &self.is_dir())
            .finish()
    }
}

/// An in-memory candidate tree.
///
/// Paths are kept sorted, so iteration always yields a valid order. Parent
/// directories are not created implicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryTree {
    entries: BTreeMap<String, Option<Bytes>>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir(&mut self, path: impl Into<String>) -> &mut Self {
        self.entries.insert(path.into(), None);
        self
    }

    pub fn add_file(&mut self, path: impl Into<String>, content: impl Into<Bytes>) -> &mut Self {
        self.entries.insert(path.into(), Some(content.into()));
        self
    }

    pub fn with_dir(mut self, path: impl Into<String>) -> Self {
        self.add_dir(path);
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        self.add_file(path, content);
        self
    }

    /// Remove `path`, and everything beneath it when it is a directory.
    pub fn remove(&mut self, path: &str) -> &mut Self {
        self.entries.remove(path);
        self.entries.retain(|p, _| !is_descendant(p, path));
        self
    }

    pub fn without(mut self, path: &str) -> Self {
        self.remove(path);
        self
    }

    pub fn get(&self, path: &str) -> Option<&Bytes> {
        self.entries.get(path).and_then(Option::as_ref)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(path: &str, content: Option<&Bytes>) -> io::Result<TreeEntry> {
        Ok(match content {
            Some(bytes) => TreeEntry::file(path, Cursor::new(bytes.clone())),
            None => TreeEntry::dir(path),
        })
    }
}

impl IntoIterator for MemoryTree {
    type Item = io::Result<TreeEntry>;
    type IntoIter = std::vec::IntoIter<io::Result<TreeEntry>>;

    fn into_iter(self) -> Self::IntoIter {
        (&self).into_iter()
    }
}

impl<'a> IntoIterator for &'a MemoryTree {
    type Item = io::Result<TreeEntry>;
    type IntoIter = std::vec::IntoIter<io::Result<TreeEntry>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries
            .iter()
            .map(|(path, content)| MemoryTree::entry(path, content.as_ref()))
            .collect::<Vec<_>>()
            .into_iter()
    }
}
