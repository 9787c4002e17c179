//! Header: the versioned metadata record for one path.
//!
//! A header is an open-schema map from field name to value. Well-known fields
//! carry the path, version, timestamps, size and digests; anything else is an
//! extension field that still participates in hashing and signing.
//!
//! The root header (`Path = "/"`) additionally carries the owner key, the
//! chunk size and the owner's signature over every other root field.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::canonical::{decode_fields, encode_fields};
use crate::crypto::{Blake3Hash, Keypair, PublicKey, Signature};
use crate::error::CoreError;

/// Path of the root header.
pub const ROOT_PATH: &str = "/";

/// Well-known field names.
pub mod fields {
    pub const PATH: &str = "Path";
    pub const VER: &str = "Ver";
    pub const UPDATED: &str = "Updated";
    pub const CREATED: &str = "Created";
    pub const SIZE: &str = "Size";
    pub const MERKLE: &str = "Merkle";
    pub const DELETED: &str = "Deleted";
    pub const PUB: &str = "Pub";
    pub const PART_SIZE: &str = "PartSize";
    pub const SIG: &str = "Sig";
}

const HEADER_HASH_DOMAIN: &[u8] = b"indifs:header:v1:";
const ROOT_SIG_DOMAIN: &[u8] = b"indifs:root-sig:v1:";

/// A typed header value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Int(i64),
    Bytes(Vec<u8>),
    Text(String),
    Bool(bool),
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Int(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(b: Vec<u8>) -> Self {
        FieldValue::Bytes(b)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(b: &[u8]) -> Self {
        FieldValue::Bytes(b.to_vec())
    }
}

/// Metadata for one path, root or non-root.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Header {
    fields: BTreeMap<String, FieldValue>,
}

impl Header {
    /// An empty header at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        let path: String = path.into();
        let mut header = Self::default();
        header.set(fields::PATH, path);
        header
    }

    /// The genesis root header of a new tree.
    ///
    /// `tree_merkle` is the header-tree root of the (empty) initial tree.
    pub fn new_root(
        owner: &PublicKey,
        part_size: u64,
        created_at: i64,
        tree_merkle: Blake3Hash,
    ) -> Self {
        let mut header = Self::new(ROOT_PATH);
        header.set_int(fields::VER, 0);
        header.set_int(fields::CREATED, created_at);
        header.set_int(fields::UPDATED, created_at);
        header.set_bytes(fields::PUB, owner.as_bytes());
        header.set_int(fields::PART_SIZE, clamp_i64(part_size));
        header.set_bytes(fields::MERKLE, tree_merkle.as_bytes());
        header
    }

    /// A live file header.
    pub fn new_file(
        path: impl Into<String>,
        ver: u64,
        updated: i64,
        size: u64,
        merkle: Blake3Hash,
    ) -> Self {
        let mut header = Self::new(path);
        header.set_int(fields::VER, clamp_i64(ver));
        header.set_int(fields::UPDATED, updated);
        header.set_int(fields::SIZE, clamp_i64(size));
        header.set_bytes(fields::MERKLE, merkle.as_bytes());
        header
    }

    /// A live directory header.
    pub fn new_dir(path: impl Into<String>, ver: u64, updated: i64) -> Self {
        let mut header = Self::new(path);
        header.set_int(fields::VER, clamp_i64(ver));
        header.set_int(fields::UPDATED, updated);
        header
    }

    /// A tombstone for `path`.
    pub fn tombstone(path: impl Into<String>, ver: u64, updated: i64) -> Self {
        let mut header = Self::new(path);
        header.set_int(fields::VER, clamp_i64(ver));
        header.set_int(fields::UPDATED, updated);
        header.set_bool(fields::DELETED, true);
        header
    }

    /// Decode a header from its canonical encoding.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(Self {
            fields: decode_fields(bytes)?,
        })
    }

    // ---- generic access ----

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterate over fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.fields.get(name) {
            Some(FieldValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_bytes(&self, name: &str) -> Option<&[u8]> {
        match self.fields.get(name) {
            Some(FieldValue::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.fields.get(name) {
            Some(FieldValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn set_int(&mut self, name: &str, value: i64) {
        self.set(name, value);
    }

    pub fn set_bytes(&mut self, name: &str, value: &[u8]) {
        self.set(name, value);
    }

    pub fn set_text(&mut self, name: &str, value: &str) {
        self.set(name, value);
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.set(name, value);
    }

    // ---- well-known fields ----

    /// The path, or `""` if the header has none.
    pub fn path(&self) -> &str {
        self.get_text(fields::PATH).unwrap_or("")
    }

    /// Version at which this entry last changed. Missing or negative reads as 0.
    pub fn ver(&self) -> u64 {
        self.get_int(fields::VER)
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(0)
    }

    /// Unix milliseconds of the last change.
    pub fn updated(&self) -> i64 {
        self.get_int(fields::UPDATED).unwrap_or(0)
    }

    pub fn created(&self) -> Option<i64> {
        self.get_int(fields::CREATED)
    }

    /// Declared file size. Missing or negative reads as 0.
    pub fn file_size(&self) -> u64 {
        self.get_int(fields::SIZE)
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(0)
    }

    /// The `Merkle` field, if it is a 32-byte digest.
    ///
    /// For files this is the chunk-tree root; for the root header it is the
    /// header-tree root.
    pub fn merkle(&self) -> Option<Blake3Hash> {
        self.get_bytes(fields::MERKLE).and_then(Blake3Hash::from_slice)
    }

    /// Alias for [`Header::merkle`] on file headers.
    pub fn file_merkle(&self) -> Option<Blake3Hash> {
        self.merkle()
    }

    pub fn deleted(&self) -> bool {
        self.get_bool(fields::DELETED).unwrap_or(false)
    }

    pub fn is_root(&self) -> bool {
        self.path() == ROOT_PATH
    }

    pub fn is_dir(&self) -> bool {
        self.path().ends_with('/')
    }

    pub fn is_file(&self) -> bool {
        !self.path().is_empty() && !self.is_dir()
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        self.get_bytes(fields::PUB).and_then(PublicKey::from_slice)
    }

    pub fn part_size(&self) -> Option<u64> {
        self.get_int(fields::PART_SIZE)
            .and_then(|v| u64::try_from(v).ok())
    }

    pub fn signature(&self) -> Option<Signature> {
        self.get_bytes(fields::SIG).and_then(Signature::from_slice)
    }

    // ---- hashing and signing ----

    /// Canonical CBOR encoding of every field.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        encode_fields(&self.fields)
    }

    /// Digest of the canonical encoding. This is the leaf of the header tree.
    pub fn hash(&self) -> Blake3Hash {
        Blake3Hash::tagged(HEADER_HASH_DOMAIN, &self.canonical_bytes())
    }

    /// The message the owner signs: every field except `Sig`.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut unsigned = self.fields.clone();
        unsigned.remove(fields::SIG);
        let mut message = Vec::with_capacity(ROOT_SIG_DOMAIN.len() + 256);
        message.extend_from_slice(ROOT_SIG_DOMAIN);
        message.extend_from_slice(&encode_fields(&unsigned));
        message
    }

    /// Sign the header, replacing any previous `Sig`.
    pub fn sign(&mut self, keypair: &Keypair) {
        let signature = keypair.sign(&self.signing_bytes());
        self.set_bytes(fields::SIG, signature.as_bytes());
    }

    /// Verify `Sig` against the header's own `Pub`.
    pub fn verify_signature(&self) -> Result<(), CoreError> {
        let public_key = self
            .public_key()
            .ok_or(CoreError::MissingField(fields::PUB))?;
        let signature = self
            .signature()
            .ok_or(CoreError::MissingField(fields::SIG))?;
        public_key.verify(&self.signing_bytes(), &signature)
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.fields {
            match value {
                FieldValue::Int(n) => map.entry(name, n),
                FieldValue::Bytes(b) => {
                    let shown = if b.len() > 8 {
                        format!("0x{}..", hex::encode(&b[..8]))
                    } else {
                        format!("0x{}", hex::encode(b))
                    };
                    map.entry(name, &shown)
                }
                FieldValue::Text(s) => map.entry(name, s),
                FieldValue::Bool(b) => map.entry(name, b),
            };
        }
        map.finish()
    }
}

/// Check that `path` is absolute and well formed.
///
/// Segments must be non-empty and may not be `.` or `..`; directories end
/// with `/`. The root `/` is valid.
pub fn is_valid_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    rest.split('/').all(|segment| {
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && !segment.chars().any(char::is_control)
    })
}

/// Parent directory of `path`, or `None` for the root.
pub fn parent_dir(path: &str) -> Option<&str> {
    if path == ROOT_PATH {
        return None;
    }
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    trimmed.rfind('/').map(|i| &path[..=i])
}

/// Whether `path` lies strictly beneath the directory `dir`.
pub fn is_descendant(path: &str, dir: &str) -> bool {
    dir.ends_with('/') && path.len() > dir.len() && path.starts_with(dir)
}

fn clamp_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Keypair {
        Keypair::from_seed(&[0x42; 32])
    }

    fn signed_root() -> Header {
        let keypair = owner();
        let mut root = Header::new_root(
            &keypair.public_key(),
            1024,
            1_730_764_800_000,
            Blake3Hash::ZERO,
        );
        root.set_int(fields::VER, 1);
        root.sign(&keypair);
        root
    }

    #[test]
    fn test_hash_independent_of_insertion_order() {
        let mut a = Header::new("/a.txt");
        a.set_int(fields::SIZE, 3);
        a.set_text("Mime", "text/plain");

        let mut b = Header::default();
        b.set_text("Mime", "text/plain");
        b.set_int(fields::SIZE, 3);
        b.set_text(fields::PATH, "/a.txt");

        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_extension_field_changes_hash() {
        let plain = Header::new_dir("/docs/", 1, 10);
        let mut tagged = plain.clone();
        tagged.set_text("Owner", "ops");
        assert_ne!(plain.hash(), tagged.hash());
    }

    #[test]
    fn test_sign_and_verify() {
        let root = signed_root();
        assert!(root.verify_signature().is_ok());
        assert_eq!(root.public_key(), Some(owner().public_key()));
        assert_eq!(root.part_size(), Some(1024));
    }

    #[test]
    fn test_mutation_after_signing_invalidates() {
        let mut root = signed_root();
        root.set_int(fields::UPDATED, root.updated() + 1);
        assert!(matches!(
            root.verify_signature(),
            Err(CoreError::InvalidSignature)
        ));
    }

    #[test]
    fn test_unsigned_root_reports_missing_sig() {
        let root = Header::new_root(&owner().public_key(), 1024, 0, Blake3Hash::ZERO);
        assert!(matches!(
            root.verify_signature(),
            Err(CoreError::MissingField(fields::SIG))
        ));
    }

    #[test]
    fn test_signature_covers_extension_fields() {
        let keypair = owner();
        let mut root = signed_root();
        root.set_text("X", "x");
        assert!(root.verify_signature().is_err());
        root.sign(&keypair);
        assert!(root.verify_signature().is_ok());
    }

    #[test]
    fn test_canonical_roundtrip() {
        let root = signed_root();
        let decoded = Header::from_canonical_bytes(&root.canonical_bytes()).unwrap();
        assert_eq!(decoded, root);
        assert_eq!(decoded.hash(), root.hash());
    }

    #[test]
    fn test_kind_readers() {
        let file = Header::new_file("/a/b.txt", 2, 5, 10, Blake3Hash::hash(b"x"));
        assert!(file.is_file());
        assert!(!file.is_dir());
        assert_eq!(file.file_size(), 10);
        assert!(file.file_merkle().is_some());

        let dir = Header::new_dir("/a/", 2, 5);
        assert!(dir.is_dir());
        assert!(!dir.is_root());

        let gone = Header::tombstone("/a/", 3, 6);
        assert!(gone.deleted());
    }

    #[test]
    fn test_short_merkle_reads_as_none() {
        let mut file = Header::new_file("/f", 1, 1, 0, Blake3Hash::ZERO);
        let mut merkle = file.get_bytes(fields::MERKLE).unwrap().to_vec();
        merkle.push(0);
        file.set_bytes(fields::MERKLE, &merkle);
        assert!(file.file_merkle().is_none());
    }

    #[test]
    fn test_path_rules() {
        assert!(is_valid_path("/"));
        assert!(is_valid_path("/a.txt"));
        assert!(is_valid_path("/a/b/"));
        assert!(!is_valid_path(""));
        assert!(!is_valid_path("a.txt"));
        assert!(!is_valid_path("//"));
        assert!(!is_valid_path("/a//b"));
        assert!(!is_valid_path("/a/../b"));
        assert!(!is_valid_path("/a/./b"));
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("/"), None);
        assert_eq!(parent_dir("/a.txt"), Some("/"));
        assert_eq!(parent_dir("/a/"), Some("/"));
        assert_eq!(parent_dir("/a/b/c.txt"), Some("/a/b/"));
        assert_eq!(parent_dir("/a/b/"), Some("/a/"));
    }

    #[test]
    fn test_descendant() {
        assert!(is_descendant("/B/2/x.txt", "/B/"));
        assert!(is_descendant("/B/2/", "/B/"));
        assert!(!is_descendant("/B/", "/B/"));
        assert!(!is_descendant("/Bee.txt", "/B/"));
        assert!(!is_descendant("/B/x", "/B"));
    }
}
