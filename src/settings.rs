//! Analysis settings
//!
//! A validated, defaulted settings object supplying repository paths,
//! date range, exclusion patterns, rename-follow and history flags, and
//! performance knobs. The engine trusts that `validate` has been called
//! before a run starts; the CLI does this at the boundary.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::attribution::comments::BlockCommentPolicy;
use crate::error::ConfigError;
use crate::perf::PerfProfile;

/// File extensions considered for analysis by default.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "c", "cc", "cif", "cpp", "glsl", "h", "hh", "hpp", "java", "js", "py", "rb", "rs", "sql", "ts",
];

#[derive(Debug, Clone)]
pub struct Settings {
    pub repositories: Vec<PathBuf>,

    // Date range
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,

    // Exclusion patterns (glob, or `re:` regex)
    pub ex_authors: Vec<String>,
    pub ex_emails: Vec<String>,
    pub ex_messages: Vec<String>,
    pub ex_files: Vec<String>,
    pub ex_revisions: Vec<String>,
    /// Plain text file with one full sha per line
    pub ignore_revs_file: Option<PathBuf>,

    // File selection
    pub extensions: Vec<String>,
    pub include_files: Vec<String>,
    pub subfolder: String,
    /// Cap on analyzed files, largest first; 0 means no cap
    pub n_files: usize,

    // Attribution behavior
    pub follow_renames: bool,
    pub history: bool,
    pub count_comments: bool,
    pub count_empty_lines: bool,
    pub ignore_whitespace: bool,
    /// Copy/move detection aggressiveness, 0-4
    pub copy_move: u8,
    pub block_comment_policy: BlockCommentPolicy,

    // Failure handling
    pub max_commit_skips: usize,
    pub file_timeout: Duration,
    pub max_file_bytes: u64,
    /// Drop commits authored by excluded persons entirely, instead of
    /// only excluding them from percentage denominators
    pub exclude_commits_of_excluded_authors: bool,
    /// Return partially accumulated tables when a batch is cancelled
    pub partial_results: bool,

    pub perf: PerfProfile,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repositories: Vec::new(),
            since: None,
            until: None,
            ex_authors: Vec::new(),
            ex_emails: Vec::new(),
            ex_messages: Vec::new(),
            ex_files: Vec::new(),
            ex_revisions: Vec::new(),
            ignore_revs_file: None,
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            include_files: Vec::new(),
            subfolder: String::new(),
            n_files: 0,
            follow_renames: true,
            history: false,
            count_comments: false,
            count_empty_lines: false,
            ignore_whitespace: true,
            copy_move: 1,
            block_comment_policy: BlockCommentPolicy::default(),
            max_commit_skips: 10,
            file_timeout: Duration::from_secs(60),
            max_file_bytes: 8 * 1024 * 1024,
            exclude_commits_of_excluded_authors: false,
            partial_results: false,
            perf: PerfProfile::small_repo(),
        }
    }
}

impl Settings {
    /// Validate settings before any repository is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repositories.is_empty() {
            return Err(ConfigError::InvalidSetting(
                "at least one repository path is required".to_string(),
            ));
        }
        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err(ConfigError::InvalidSetting(format!(
                    "since ({since}) is after until ({until})"
                )));
            }
        }
        if self.copy_move > 4 {
            return Err(ConfigError::InvalidSetting(format!(
                "copy_move must be 0-4, got {}",
                self.copy_move
            )));
        }
        if self.perf.workers == 0 {
            return Err(ConfigError::InvalidSetting(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.perf.commit_chunk_size == 0 || self.perf.blame_chunk_size == 0 {
            return Err(ConfigError::InvalidSetting(
                "chunk sizes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load the external ignore-revisions list, one full sha per line.
    /// Blank lines and `#` comments are allowed.
    pub fn load_ignore_revs(&self) -> Result<FxHashSet<String>, ConfigError> {
        let Some(path) = &self.ignore_revs_file else {
            return Ok(FxHashSet::default());
        };
        let data =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IgnoreRevsFile {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        let mut shas = FxHashSet::default();
        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.len() != 40 || !line.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::IgnoreRevsFile {
                    path: path.clone(),
                    reason: format!("`{line}` is not a full commit sha"),
                });
            }
            shas.insert(line.to_string());
        }
        Ok(shas)
    }

    /// Whether a path passes the extension allow-list.
    pub fn extension_allowed(&self, path: &str) -> bool {
        if self.extensions.iter().any(|e| e == "*") {
            return true;
        }
        match path.rsplit_once('.') {
            Some((_, ext)) => self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}
