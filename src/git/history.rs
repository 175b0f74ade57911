//! Commit history reader
//!
//! Streams ordered commit metadata for one repository: lazy,
//! forward-only, strictly chronological oldest to newest. History is
//! retrieved in bounded chunks sized by the performance profile and
//! pushed through a bounded channel, so memory stays flat over
//! arbitrarily large histories. Message/revision exclusions are applied
//! before a commit is yielded; downstream stages never observe excluded
//! commits.

use crossbeam_channel::{bounded, Receiver};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, warn};

use crate::error::RepoError;
use crate::filters::ExclusionFilter;
use crate::git::source::{CommitRange, SourceOptions, VcsSource};
use crate::identity::PersonRegistry;
use crate::models::Commit;

#[derive(Debug, Clone)]
pub struct StreamParams {
    pub range: CommitRange,
    pub source_options: SourceOptions,
    pub chunk_size: usize,
    /// Unreadable-commit budget before the stream escalates to a
    /// repository error
    pub max_skips: usize,
    /// Commit-level exclusion of excluded authors (separately
    /// configured; by default excluded authors keep their raw counts)
    pub drop_excluded_authors: bool,
}

/// Lazy, forward-only commit sequence backed by a reader thread.
pub struct CommitStream {
    rx: Receiver<Result<Commit, RepoError>>,
    skipped: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl CommitStream {
    /// Unreadable commits skipped so far (final once the stream is
    /// drained).
    pub fn skipped_commits(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }
}

impl Iterator for CommitStream {
    type Item = Result<Commit, RepoError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

impl Drop for CommitStream {
    fn drop(&mut self) {
        // Dropping the receiver unblocks the reader thread.
        if let Some(handle) = self.handle.take() {
            drop(std::mem::replace(&mut self.rx, bounded(0).1));
            let _ = handle.join();
        }
    }
}

/// Start streaming commits for `repo_path`. Identities of every
/// observed commit are registered (excluded ones included, so raw alias
/// data stays complete); merge operations are serialized through the
/// registry lock.
pub fn stream_commits<S: VcsSource>(
    repo_path: PathBuf,
    params: StreamParams,
    filter: Arc<ExclusionFilter>,
    registry: Arc<Mutex<PersonRegistry>>,
    cancel: Arc<AtomicBool>,
) -> CommitStream {
    let (tx, rx) = bounded(params.chunk_size.max(1));
    let skipped = Arc::new(AtomicUsize::new(0));
    let skipped_in_thread = Arc::clone(&skipped);

    let handle = std::thread::spawn(move || {
        let source = match S::open(&repo_path, params.source_options) {
            Ok(source) => source,
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        };
        let ids = match source.commit_ids(&params.range) {
            Ok(ids) => ids,
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        };
        debug!(commits = ids.len(), "commit stream started");

        let mut skips = 0usize;
        for chunk in ids.chunks(params.chunk_size.max(1)) {
            if cancel.load(Ordering::Relaxed) {
                let _ = tx.send(Err(RepoError::Cancelled));
                return;
            }
            for sha in chunk {
                let raw = match source.read_commit(sha) {
                    Ok(raw) => raw,
                    Err(e) => {
                        skips += 1;
                        skipped_in_thread.store(skips, Ordering::Relaxed);
                        warn!(sha = %sha, error = %e, "skipping unreadable commit");
                        if skips > params.max_skips {
                            let _ = tx.send(Err(RepoError::TooManySkippedCommits {
                                skipped: skips,
                                limit: params.max_skips,
                            }));
                            return;
                        }
                        continue;
                    }
                };

                // Register the identity even for commits that end up
                // excluded, so alias data is complete for the run.
                let person = {
                    let mut registry = registry.lock().expect("person registry lock poisoned");
                    let id = registry.resolve(&raw.author_name, &raw.author_email);
                    if params.drop_excluded_authors && registry.is_excluded(id) {
                        None
                    } else {
                        Some(id)
                    }
                };
                let Some(person) = person else {
                    continue;
                };

                if filter.is_revision_excluded(&raw.sha) {
                    continue;
                }
                if filter.is_message_excluded(&raw.summary) {
                    continue;
                }

                let commit = Commit {
                    sha: raw.sha,
                    person,
                    author_name: raw.author_name,
                    author_email: raw.author_email,
                    timestamp: raw.timestamp,
                    summary: raw.summary,
                    parents: raw.parents,
                    insertions: raw.insertions,
                    deletions: raw.deletions,
                    changes: raw.changes,
                };
                if tx.send(Ok(commit)).is_err() {
                    return; // receiver dropped
                }
            }
        }
    });

    CommitStream {
        rx,
        skipped,
        handle: Some(handle),
    }
}
