//! # indifs core
//!
//! Pure primitives for indifs: headers, commits, Merkle proofs and
//! canonicalization.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Header`] - Open-schema metadata record for one path
//! - [`Commit`] - Signed root header + changed headers + concatenated body
//! - [`MerkleWitness`] - Inclusion proof into a header or chunk tree
//! - [`CommitPoint`] - `(ver, updated, hash)` position used by the fork rule
//!
//! ## Canonicalization
//!
//! Headers are hashed and signed over deterministic CBOR. See [`canonical`].

pub mod canonical;
pub mod commit;
pub mod crypto;
pub mod error;
pub mod header;
pub mod merkle;
pub mod validation;

pub use commit::{BodyLayout, BodySegment, Commit};
pub use crypto::{Blake3Hash, Keypair, PublicKey, Signature};
pub use error::{CoreError, ValidationError};
pub use header::{fields, is_valid_path, parent_dir, FieldValue, Header, ROOT_PATH};
pub use merkle::{
    chunk_merkle_root, empty_root, header_tree_root, merkle_root, merkle_witness, split_chunks,
    verify_witness, MerkleWitness, WITNESS_ENTRY_LEN,
};
pub use validation::{
    check_immutable_root_fields, check_tree_merkle, reconcile_body, succession,
    validate_structure, verify_root_signature, CommitPoint, FileContent, Succession,
};
