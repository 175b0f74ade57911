//! Performance profiles
//!
//! Parameterizes chunk sizes, worker counts, and the memory budget used
//! by the commit history reader and the blame attribution engine. Holds
//! no business logic.

use serde::{Deserialize, Serialize};

/// Commit count above which the automatic probe picks the large-repo
/// profile.
const LARGE_REPO_COMMITS: usize = 10_000;
/// File count above which the automatic probe picks the large-repo
/// profile.
const LARGE_REPO_FILES: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfProfile {
    /// Commits fetched per chunk by the history reader
    pub commit_chunk_size: usize,
    /// Files dispatched per chunk to attribution workers
    pub blame_chunk_size: usize,
    /// Bounded worker pool size for per-file attribution
    pub workers: usize,
    /// Soft cap on retained attribution data; `None` means unenforced
    pub memory_budget_mb: Option<usize>,
}

impl PerfProfile {
    /// Single-threaded, small chunks.
    pub fn small_repo() -> Self {
        Self {
            commit_chunk_size: 100,
            blame_chunk_size: 20,
            workers: 1,
            memory_budget_mb: None,
        }
    }

    /// Bigger chunks, more workers, enforced memory budget.
    pub fn large_repo() -> Self {
        Self {
            commit_chunk_size: 1_000,
            blame_chunk_size: 64,
            workers: 6,
            memory_budget_mb: Some(2_048),
        }
    }

    /// Pick a profile from observed repository dimensions.
    pub fn auto_probe(commit_count: usize, file_count: usize) -> Self {
        if commit_count > LARGE_REPO_COMMITS || file_count > LARGE_REPO_FILES {
            Self::large_repo()
        } else {
            Self::small_repo()
        }
    }
}

impl Default for PerfProfile {
    fn default() -> Self {
        Self::small_repo()
    }
}
