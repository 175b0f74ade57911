//! Core data models for gitally
//!
//! Shared between the commit history reader, the blame attribution
//! engine, and the statistics aggregator.

use serde::{Deserialize, Serialize};

use crate::error::SkipReason;
use crate::identity::PersonId;

/// A commit yielded by the history reader. Created once per repository
/// run and read-only thereafter; line attributions reference commits by
/// sha rather than owning them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    /// Full commit sha (40 hex chars)
    pub sha: String,
    /// Resolved canonical author identity
    pub person: PersonId,
    /// Author name as recorded on the commit
    pub author_name: String,
    /// Author email as recorded on the commit
    pub author_email: String,
    /// Commit timestamp (seconds since epoch)
    pub timestamp: i64,
    /// First line of the commit message
    pub summary: String,
    /// Parent shas (first parent first)
    pub parents: Vec<String>,
    /// Total lines added across all changed files
    pub insertions: usize,
    /// Total lines deleted across all changed files
    pub deletions: usize,
    /// Per-file changes, rename-aware
    pub changes: Vec<FileChange>,
}

/// One changed file within a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    /// Path after this commit
    pub path: String,
    /// Path before this commit when the commit renamed or copied the file
    pub prior_path: Option<String>,
    pub insertions: usize,
    pub deletions: usize,
}

/// A node in a file's rename lineage, built while tracing history
/// backward. `prior` names the path the file had before `sha` and the
/// commit that performed the rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRevision {
    pub path: String,
    pub sha: String,
    pub prior: Option<PriorRevision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorRevision {
    pub path: String,
    pub renamed_by: String,
}

/// Line-level authorship for one line of a file's considered content
/// state. Exactly one record exists per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineAttribution {
    /// Path the line lives at in the target revision
    pub path: String,
    /// 1-indexed line number
    pub line_no: u32,
    pub person: PersonId,
    /// Commit that last changed the line
    pub sha: String,
    /// Timestamp of that commit (seconds since epoch)
    pub timestamp: i64,
    pub content: String,
    pub is_comment: bool,
    pub is_empty: bool,
    /// Excluded by file pattern or ignore-revision set
    pub excluded: bool,
}

/// Per-file attribution state machine. `Skipped` is reachable from any
/// state; `HistoryIndexed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Untracked,
    Blamed,
    RenameResolved,
    HistoryIndexed,
    Skipped(SkipReason),
}

impl FileState {
    pub fn is_skipped(&self) -> bool {
        matches!(self, FileState::Skipped(_))
    }
}

/// Result of attributing a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttribution {
    pub path: String,
    pub state: FileState,
    /// One record per line; empty when the file was skipped
    pub lines: Vec<LineAttribution>,
    /// Rename lineage nodes resolved while tracing line authorship,
    /// newest first; empty when no rename was crossed
    pub lineage: Vec<FileRevision>,
}

impl FileAttribution {
    pub fn skipped(path: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            path: path.into(),
            state: FileState::Skipped(reason),
            lines: Vec::new(),
            lineage: Vec::new(),
        }
    }
}

/// A tracked file candidate at the target revision.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub binary: bool,
}
