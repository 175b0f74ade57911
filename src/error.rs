//! Error taxonomy and structured diagnostics
//!
//! Only configuration validation fails fast. Repository-level failures
//! abort a single repository, file-level failures skip a single file,
//! and both are collected as diagnostics on the final result instead of
//! being thrown up the call stack.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Invalid patterns or settings. Fatal, surfaced before any repository
/// analysis begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid exclusion pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("cannot read ignore-revs file {path}: {reason}")]
    IgnoreRevsFile { path: PathBuf, reason: String },
}

/// Inaccessible or corrupted repository. Fatal for that repository only,
/// never aborts a multi-repository batch.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("cannot open git repository at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("repository has no commits reachable from the requested range")]
    EmptyHistory,

    #[error("{skipped} unreadable commits exceeded the limit of {limit}")]
    TooManySkippedCommits { skipped: usize, limit: usize },

    #[error("analysis cancelled")]
    Cancelled,

    #[error("cannot start worker pool: {0}")]
    WorkerPool(String),

    #[error(transparent)]
    Git(#[from] git2::Error),
}

/// Reason a file was skipped during attribution. Skipping a file never
/// aborts processing of other files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Binary,
    Deleted,
    Oversize { bytes: u64 },
    Permission,
    Timeout,
    Unreadable { reason: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Binary => write!(f, "binary content"),
            SkipReason::Deleted => write!(f, "deleted at target revision"),
            SkipReason::Oversize { bytes } => write!(f, "oversize ({bytes} bytes)"),
            SkipReason::Permission => write!(f, "permission denied"),
            SkipReason::Timeout => write!(f, "attribution timeout"),
            SkipReason::Unreadable { reason } => write!(f, "unreadable: {reason}"),
        }
    }
}

/// A structured, user-visible diagnostic attached to analysis results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Repository the diagnostic belongs to.
    pub repository: String,
    /// Affected file, when the diagnostic is file-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn repo(repository: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            file: None,
            message: message.into(),
        }
    }

    pub fn file(
        repository: impl Into<String>,
        file: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            file: Some(file.into()),
            message: message.into(),
        }
    }
}

/// Zero-division or empty-author-set conditions. Recovered locally and
/// surfaced as null/zero metrics plus one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationWarning {
    pub entity: String,
    pub message: String,
}
