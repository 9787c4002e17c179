//! # indifs testkit
//!
//! Testing utilities for indifs.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: A deterministic owner, sample trees and helpers that
//!   commit them
//! - **Generators**: Proptest strategies for candidate trees and headers
//!
//! ## Test Fixtures
//!
//! ```rust
//! use indifs_testkit::fixtures::{commit1_tree, TestFixture};
//!
//! # tokio_test_block(async {
//! let fixture = TestFixture::new();
//! let fs = fixture.memory_fs().await.unwrap();
//! fixture.commit_tree(&fs, &commit1_tree()).await.unwrap();
//! assert_eq!(fs.version().await.unwrap(), 1);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use indifs_testkit::generators::tree;
//!
//! proptest! {
//!     #[test]
//!     fn commits_any_tree(candidate in tree(8)) {
//!         // build and apply a commit for `candidate`
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    commit1_tree, commit2_tree, commit3_tree, random_content, sample_trees, TestFixture,
};
