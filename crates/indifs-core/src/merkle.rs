//! Binary Merkle trees over Blake3 digests.
//!
//! One construction serves both the header tree (leaves are header hashes in
//! path order) and per-file chunk trees (leaves are chunk hashes).
//!
//! - Chunk leaf: `H(0x00 || chunk)`
//! - Inner node: `H(0x01 || left || right)`
//! - An odd node at any level is paired with [`Blake3Hash::ZERO`].
//! - A single leaf is still hashed once, so every leaf has a non-empty witness.
//! - The empty tree has a fixed root, [`empty_root`].

use std::fmt;

use bytes::Bytes;

use crate::crypto::Blake3Hash;
use crate::error::CoreError;
use crate::header::Header;

const CHUNK_LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;
const EMPTY_TREE_DOMAIN: &[u8] = b"indifs:merkle:empty:v1";

/// Length of one witness record: 32-byte sibling plus a side flag.
pub const WITNESS_ENTRY_LEN: usize = 33;

/// Sibling sits on the right: parent = `H(current, sibling)`.
const SIBLING_RIGHT: u8 = 0;
/// Sibling sits on the left: parent = `H(sibling, current)`.
const SIBLING_LEFT: u8 = 1;

/// Inclusion proof: ordered 33-byte records from the leaf level upward.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct MerkleWitness(Vec<u8>);

impl MerkleWitness {
    /// Wrap raw witness bytes. The length must be a multiple of 33.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CoreError> {
        if bytes.len() % WITNESS_ENTRY_LEN != 0 {
            return Err(CoreError::DecodingError(format!(
                "witness length {} is not a multiple of {}",
                bytes.len(),
                WITNESS_ENTRY_LEN
            )));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Byte length (a multiple of 33).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of tree levels the witness climbs.
    pub fn depth(&self) -> usize {
        self.0.len() / WITNESS_ENTRY_LEN
    }

    fn push(&mut self, sibling: &Blake3Hash, flag: u8) {
        self.0.extend_from_slice(sibling.as_bytes());
        self.0.push(flag);
    }

    fn entries(&self) -> impl Iterator<Item = (Blake3Hash, u8)> + '_ {
        self.0.chunks_exact(WITNESS_ENTRY_LEN).map(|record| {
            let mut sibling = [0u8; 32];
            sibling.copy_from_slice(&record[..32]);
            (Blake3Hash(sibling), record[32])
        })
    }
}

impl fmt::Debug for MerkleWitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MerkleWitness(depth={})", self.depth())
    }
}

impl AsRef<[u8]> for MerkleWitness {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Root of the tree with no leaves.
pub fn empty_root() -> Blake3Hash {
    Blake3Hash::tagged(EMPTY_TREE_DOMAIN, &[])
}

/// Leaf digest for one content chunk.
pub fn chunk_hash(chunk: &[u8]) -> Blake3Hash {
    Blake3Hash::tagged(&[CHUNK_LEAF_PREFIX], chunk)
}

fn node_hash(left: &Blake3Hash, right: &Blake3Hash) -> Blake3Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Blake3Hash(*hasher.finalize().as_bytes())
}

fn next_level(level: &[Blake3Hash]) -> Vec<Blake3Hash> {
    level
        .chunks(2)
        .map(|pair| node_hash(&pair[0], pair.get(1).unwrap_or(&Blake3Hash::ZERO)))
        .collect()
}

/// Merkle root over leaf digests.
pub fn merkle_root(leaves: &[Blake3Hash]) -> Blake3Hash {
    if leaves.is_empty() {
        return empty_root();
    }
    let mut level = next_level(leaves);
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Inclusion proof for the leaf at `index`, or `None` if out of range.
pub fn merkle_witness(index: usize, leaves: &[Blake3Hash]) -> Option<MerkleWitness> {
    if index >= leaves.len() {
        return None;
    }

    let mut witness = MerkleWitness::default();
    let mut level = leaves.to_vec();
    let mut idx = index;
    loop {
        if idx % 2 == 0 {
            let sibling = level.get(idx + 1).unwrap_or(&Blake3Hash::ZERO);
            witness.push(sibling, SIBLING_RIGHT);
        } else {
            witness.push(&level[idx - 1], SIBLING_LEFT);
        }
        level = next_level(&level);
        idx /= 2;
        if level.len() == 1 {
            break;
        }
    }
    Some(witness)
}

/// Check that `leaf` is included under `root`.
///
/// An empty witness never verifies.
pub fn verify_witness(leaf: &Blake3Hash, root: &Blake3Hash, witness: &MerkleWitness) -> bool {
    if witness.is_empty() || witness.len() % WITNESS_ENTRY_LEN != 0 {
        return false;
    }
    let mut current = *leaf;
    for (sibling, flag) in witness.entries() {
        current = match flag {
            SIBLING_RIGHT => node_hash(&current, &sibling),
            SIBLING_LEFT => node_hash(&sibling, &current),
            _ => return false,
        };
    }
    current == *root
}

/// Merkle root over content chunks.
pub fn chunk_merkle_root<C: AsRef<[u8]>>(chunks: &[C]) -> Blake3Hash {
    let leaves: Vec<Blake3Hash> = chunks.iter().map(|c| chunk_hash(c.as_ref())).collect();
    merkle_root(&leaves)
}

/// Split content into `part_size` chunks without copying. Empty content has
/// no chunks.
pub fn split_chunks(content: &Bytes, part_size: usize) -> Vec<Bytes> {
    let part_size = part_size.max(1);
    let mut chunks = Vec::with_capacity(content.len().div_ceil(part_size));
    let mut offset = 0;
    while offset < content.len() {
        let end = (offset + part_size).min(content.len());
        chunks.push(content.slice(offset..end));
        offset = end;
    }
    chunks
}

/// Header-tree root over `headers` (already in path order).
pub fn header_tree_root<'a>(headers: impl IntoIterator<Item = &'a Header>) -> Blake3Hash {
    let leaves: Vec<Blake3Hash> = headers.into_iter().map(Header::hash).collect();
    merkle_root(&leaves)
}
