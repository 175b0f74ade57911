//! Analysis pipeline
//!
//! Orchestrates one full run per repository: open the source, select
//! candidate files at the target revision, stream commits into change
//! totals, attribute every file in parallel, and fold the results into
//! deterministic tables. A batch run processes repositories
//! independently; one failing repository becomes a diagnostic on the
//! batch result and never aborts the others.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::attribution::{BlameSnapshot, FileAttributor};
use crate::error::{ConfigError, Diagnostic, RepoError};
use crate::filters::{ExclusionFilter, RuleSet};
use crate::git::source::{CommitRange, GitSource, SourceOptions, VcsSource};
use crate::git::{stream_commits, StreamParams};
use crate::identity::{PersonRegistry, PersonView};
use crate::models::{FileAttribution, FileEntry};
use crate::perf::PerfProfile;
use crate::settings::Settings;
use crate::stats::{aggregate, AggregateTables, CommitGroups};

/// Everything produced for one repository.
#[derive(Debug)]
pub struct RepoResult {
    pub path: PathBuf,
    pub name: String,
    /// Revision the analysis was anchored at
    pub head: String,
    pub tables: AggregateTables,
    pub files: Vec<FileAttribution>,
    /// Resolved canonical identities, sorted by display name
    pub persons: Vec<PersonView>,
    /// Historical blame snapshots (history mode only)
    pub snapshots: Vec<BlameSnapshot>,
    pub diagnostics: Vec<Diagnostic>,
    pub commits_seen: usize,
    pub commits_skipped: usize,
}

/// Outcome of a multi-repository run. Every configured repository is
/// accounted for: either a result or a failure diagnostic.
#[derive(Debug)]
pub struct BatchResult {
    pub results: Vec<RepoResult>,
    pub failures: Vec<Diagnostic>,
    pub cancelled: bool,
}

pub struct RepoAnalyzer {
    settings: Settings,
    filter: Arc<ExclusionFilter>,
    includes: RuleSet,
    cancel: Arc<AtomicBool>,
}

impl RepoAnalyzer {
    /// Validate settings and compile every pattern up front, so a
    /// malformed configuration fails before any repository is touched.
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let filter = Arc::new(ExclusionFilter::from_settings(&settings)?);
        let includes = RuleSet::new(&settings.include_files)?;
        Ok(Self {
            settings,
            filter,
            includes,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shared flag observed between files and commit chunks. Setting it
    /// stops the run at the next boundary.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Analyze every configured repository. Cancellation mid-batch
    /// discards accumulated results unless `partial_results` is set.
    pub fn run_batch(&self) -> Result<BatchResult, RepoError> {
        let mut results = Vec::new();
        let mut failures = Vec::new();
        let mut cancelled = false;

        for repo in &self.settings.repositories {
            if self.cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }
            match self.run(repo) {
                Ok(result) => results.push(result),
                Err(RepoError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(repo = %repo.display(), error = %e, "repository failed");
                    failures.push(Diagnostic::repo(repo.display().to_string(), e.to_string()));
                }
            }
        }

        if cancelled && !self.settings.partial_results {
            return Err(RepoError::Cancelled);
        }
        Ok(BatchResult {
            results,
            failures,
            cancelled,
        })
    }

    /// Run the full pipeline for one repository.
    pub fn run(&self, path: &Path) -> Result<RepoResult, RepoError> {
        let name = repo_name(path);
        let options = SourceOptions {
            ignore_whitespace: self.settings.ignore_whitespace,
            copy_move: self.settings.copy_move,
        };
        let range = CommitRange {
            since: self.settings.since.map(|d| d.timestamp()),
            until: self.settings.until.map(|d| d.timestamp()),
        };

        let source = GitSource::open(path, options)?;
        let head = source.head_rev(range.until)?;
        let reference_timestamp = source.read_commit(&head)?.timestamp;
        let entries = self.select_files(source.tracked_files(&head)?);
        info!(repo = %name, rev = %head, files = entries.len(), "analysis started");

        let registry = Arc::new(Mutex::new(PersonRegistry::new(Arc::clone(&self.filter))));
        let mut groups = CommitGroups::default();
        let mut commits_seen = 0usize;

        let mut stream = stream_commits::<GitSource>(
            path.to_path_buf(),
            StreamParams {
                range,
                source_options: options,
                chunk_size: self.settings.perf.commit_chunk_size,
                max_skips: self.settings.max_commit_skips,
                drop_excluded_authors: self.settings.exclude_commits_of_excluded_authors,
            },
            Arc::clone(&self.filter),
            Arc::clone(&registry),
            Arc::clone(&self.cancel),
        );
        for commit in &mut stream {
            let commit = commit?;
            groups.record(&commit);
            commits_seen += 1;
        }
        let commits_skipped = stream.skipped_commits();
        drop(stream);

        // An explicitly configured profile wins; the default profile is
        // re-probed against the observed repository dimensions.
        let perf = if self.settings.perf == PerfProfile::default() {
            PerfProfile::auto_probe(commits_seen, entries.len())
        } else {
            self.settings.perf.clone()
        };
        debug!(workers = perf.workers, "attribution profile selected");

        let attributor = FileAttributor::new(
            &self.settings,
            &perf,
            Arc::clone(&self.filter),
            Arc::clone(&registry),
            Arc::clone(&self.cancel),
        );
        let files =
            attributor.attribute_all::<GitSource>(path, options, &entries, &head, &perf)?;

        let mut diagnostics = Vec::new();
        for file in &files {
            if let crate::models::FileState::Skipped(reason) = &file.state {
                diagnostics.push(Diagnostic::file(&name, &file.path, reason.to_string()));
            }
        }
        if commits_skipped > 0 {
            diagnostics.push(Diagnostic::repo(
                &name,
                format!("{commits_skipped} unreadable commits skipped"),
            ));
        }

        let snapshots = if self.settings.history {
            attributor.take_snapshots()
        } else {
            Vec::new()
        };

        let registry = registry.lock().expect("person registry lock poisoned");
        let tables = aggregate(&registry, &files, &groups, &self.settings, reference_timestamp);
        let persons = registry.persons().into_iter().map(|(_, v)| v).collect();
        info!(
            repo = %name,
            commits = commits_seen,
            authors = tables.authors.len(),
            "analysis finished"
        );

        Ok(RepoResult {
            path: path.to_path_buf(),
            name,
            head,
            tables,
            files,
            persons,
            snapshots,
            diagnostics,
            commits_seen,
            commits_skipped,
        })
    }

    /// Select candidate files at the target revision: extension
    /// allow-list, subfolder scope, include patterns, then the largest-N
    /// cap when one is configured.
    fn select_files(&self, mut entries: Vec<FileEntry>) -> Vec<FileEntry> {
        entries.retain(|e| {
            if !self.settings.subfolder.is_empty() && !e.path.starts_with(&self.settings.subfolder)
            {
                return false;
            }
            if !self.includes.is_empty() && !self.includes.is_match(&e.path) {
                return false;
            }
            self.settings.extension_allowed(&e.path)
        });
        if self.settings.n_files > 0 && entries.len() > self.settings.n_files {
            entries.sort_by(|a, b| b.size.cmp(&a.size).then(a.path.cmp(&b.path)));
            entries.truncate(self.settings.n_files);
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }
}

fn repo_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
