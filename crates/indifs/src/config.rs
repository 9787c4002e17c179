//! File system configuration.

/// Part size used when a caller has no preference.
pub const DEFAULT_PART_SIZE: u64 = 1024;

/// Limits applied to incoming commits.
#[derive(Debug, Clone)]
pub struct FsConfig {
    /// Maximum number of headers in one commit, root included.
    pub max_headers: usize,
    /// Maximum body length of one commit, in bytes.
    pub max_body_size: u64,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            max_headers: 100_000,
            max_body_size: 1 << 30,
        }
    }
}
