//! Commit: a signed proposal to move the tree to a new version.
//!
//! `headers[0]` is the new root header; `headers[1..]` are the changed or
//! removed non-root headers in strict path order. `body` is the concatenated
//! content of every included live file, in header order.

use std::fmt;
use std::ops::Range;

use bytes::Bytes;
use ciborium::value::Value;

use crate::canonical::{canonical_value_bytes, decode_value};
use crate::crypto::Blake3Hash;
use crate::error::CoreError;
use crate::header::Header;

const KEY_BASE: u64 = 0;
const KEY_HEADERS: u64 = 1;
const KEY_BODY: u64 = 2;

/// An immutable commit.
#[derive(Clone, PartialEq, Eq)]
pub struct Commit {
    headers: Vec<Header>,
    body: Bytes,
    base: u64,
}

/// Where one live file's content sits in a commit body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodySegment {
    /// Index into [`Commit::headers`].
    pub header_index: usize,
    /// Start offset in the body.
    pub offset: usize,
    /// Size the header declares.
    pub declared: u64,
    /// Bytes actually left in the body for this file (at most `declared`).
    pub available: u64,
}

impl BodySegment {
    pub fn is_complete(&self) -> bool {
        self.available == self.declared
    }

    /// Byte range of the available content.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.available as usize
    }
}

/// Result of walking the body against declared sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyLayout {
    pub segments: Vec<BodySegment>,
    /// Bytes left over after every declared file was consumed.
    pub surplus: usize,
}

impl Commit {
    /// Assemble a commit.
    ///
    /// `base` is the version the commit was derived from; `0` marks a full
    /// snapshot that replaces the receiver's state instead of merging.
    pub fn new(headers: Vec<Header>, body: Bytes, base: u64) -> Self {
        Self {
            headers,
            body,
            base,
        }
    }

    pub fn into_parts(self) -> (Vec<Header>, Bytes, u64) {
        (self.headers, self.body, self.base)
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Non-root headers.
    pub fn changes(&self) -> &[Header] {
        self.headers.get(1..).unwrap_or(&[])
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn is_snapshot(&self) -> bool {
        self.base == 0
    }

    pub fn root(&self) -> Option<&Header> {
        self.headers.first()
    }

    /// Version of the root header, 0 if there is none.
    pub fn ver(&self) -> u64 {
        self.root().map(Header::ver).unwrap_or(0)
    }

    pub fn updated(&self) -> i64 {
        self.root().map(Header::updated).unwrap_or(0)
    }

    /// Hash of the root header including `Sig`. Only used to break ties
    /// between forks.
    pub fn hash(&self) -> Blake3Hash {
        self.root().map(Header::hash).unwrap_or(Blake3Hash::ZERO)
    }

    /// Walk the body, assigning each live file header its byte range.
    ///
    /// A file whose declared size exceeds what remains gets a short segment;
    /// later files then get nothing. Leftover bytes are reported as surplus.
    pub fn body_layout(&self) -> BodyLayout {
        let mut segments = Vec::new();
        let mut cursor = 0usize;
        for (header_index, header) in self.headers.iter().enumerate().skip(1) {
            if header.deleted() || !header.is_file() {
                continue;
            }
            let declared = header.file_size();
            let remaining = (self.body.len() - cursor) as u64;
            let available = declared.min(remaining);
            segments.push(BodySegment {
                header_index,
                offset: cursor,
                declared,
                available,
            });
            cursor += available as usize;
        }
        BodyLayout {
            segments,
            surplus: self.body.len() - cursor,
        }
    }

    /// Content of one segment (zero-copy).
    pub fn segment_content(&self, segment: &BodySegment) -> Bytes {
        self.body.slice(segment.range())
    }

    /// Wire encoding: `{0: base, 1: [header bytes...], 2: body}`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let headers = self
            .headers
            .iter()
            .map(|h| Value::Bytes(h.canonical_bytes()))
            .collect();
        let value = Value::Map(vec![
            (Value::Integer(KEY_BASE.into()), Value::Integer(self.base.into())),
            (Value::Integer(KEY_HEADERS.into()), Value::Array(headers)),
            (Value::Integer(KEY_BODY.into()), Value::Bytes(self.body.to_vec())),
        ]);
        canonical_value_bytes(&value)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        let entries = match decode_value(bytes)? {
            Value::Map(entries) => entries,
            _ => return Err(CoreError::DecodingError("commit is not a map".into())),
        };

        let mut base = None;
        let mut headers = None;
        let mut body = None;
        for (key, value) in entries {
            let key = match key {
                Value::Integer(i) => u64::try_from(i).ok(),
                _ => None,
            };
            match (key, value) {
                (Some(KEY_BASE), Value::Integer(i)) if base.is_none() => {
                    base = Some(u64::try_from(i).map_err(|_| {
                        CoreError::DecodingError("commit base out of range".into())
                    })?);
                }
                (Some(KEY_HEADERS), Value::Array(items)) if headers.is_none() => {
                    let mut decoded = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::Bytes(b) => decoded.push(Header::from_canonical_bytes(&b)?),
                            _ => {
                                return Err(CoreError::DecodingError(
                                    "commit header is not a byte string".into(),
                                ))
                            }
                        }
                    }
                    headers = Some(decoded);
                }
                (Some(KEY_BODY), Value::Bytes(b)) if body.is_none() => {
                    body = Some(Bytes::from(b));
                }
                _ => {
                    return Err(CoreError::DecodingError(
                        "unexpected or duplicate commit field".into(),
                    ))
                }
            }
        }

        Ok(Self {
            base: base.ok_or_else(|| CoreError::DecodingError("commit missing base".into()))?,
            headers: headers
                .ok_or_else(|| CoreError::DecodingError("commit missing headers".into()))?,
            body: body.ok_or_else(|| CoreError::DecodingError("commit missing body".into()))?,
        })
    }
}

impl fmt::Debug for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commit")
            .field("ver", &self.ver())
            .field("base", &self.base)
            .field("updated", &self.updated())
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::header::fields;
    use crate::merkle::empty_root;

    fn sample() -> Commit {
        let keypair = Keypair::from_seed(&[9; 32]);
        let mut root = Header::new_root(&keypair.public_key(), 4, 100, empty_root());
        root.set_int(fields::VER, 1);
        root.set_int(fields::UPDATED, 200);
        root.sign(&keypair);

        let headers = vec![
            root,
            Header::new_file("/a", 1, 200, 3, Blake3Hash::ZERO),
            Header::tombstone("/old/", 1, 200),
            Header::new_dir("/z/", 1, 200),
            Header::new_file("/z/b", 1, 200, 5, Blake3Hash::ZERO),
        ];
        Commit::new(headers, Bytes::from_static(b"abcdefgh"), 0)
    }

    #[test]
    fn test_accessors() {
        let commit = sample();
        assert_eq!(commit.ver(), 1);
        assert_eq!(commit.updated(), 200);
        assert_eq!(commit.changes().len(), 4);
        assert!(commit.is_snapshot());
        assert_eq!(commit.hash(), commit.root().unwrap().hash());
    }

    #[test]
    fn test_body_layout_exact() {
        let commit = sample();
        let layout = commit.body_layout();
        assert_eq!(layout.surplus, 0);
        assert_eq!(layout.segments.len(), 2);
        assert_eq!(layout.segments[0].header_index, 1);
        assert_eq!(commit.segment_content(&layout.segments[0]).as_ref(), b"abc");
        assert_eq!(layout.segments[1].header_index, 4);
        assert_eq!(commit.segment_content(&layout.segments[1]).as_ref(), b"defgh");
        assert!(layout.segments.iter().all(BodySegment::is_complete));
    }

    #[test]
    fn test_body_layout_short_and_surplus() {
        let (headers, _, base) = sample().into_parts();

        let short = Commit::new(headers.clone(), Bytes::from_static(b"abcde"), base);
        let layout = short.body_layout();
        assert_eq!(layout.segments[1].declared, 5);
        assert_eq!(layout.segments[1].available, 2);
        assert!(!layout.segments[1].is_complete());

        let long = Commit::new(headers, Bytes::from_static(b"abcdefghij"), base);
        assert_eq!(long.body_layout().surplus, 2);
    }

    #[test]
    fn test_wire_roundtrip() {
        let commit = sample();
        let bytes = commit.to_bytes().unwrap();
        assert_eq!(Commit::from_bytes(&bytes).unwrap(), commit);
    }

    #[test]
    fn test_wire_rejects_garbage() {
        assert!(Commit::from_bytes(&[0xa0]).is_err());
        assert!(Commit::from_bytes(b"not cbor at all").is_err());
    }

    #[test]
    fn test_empty_commit_defaults() {
        let commit = Commit::new(Vec::new(), Bytes::new(), 0);
        assert!(commit.root().is_none());
        assert_eq!(commit.ver(), 0);
        assert_eq!(commit.hash(), Blake3Hash::ZERO);
    }
}
