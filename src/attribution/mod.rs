//! Blame attribution engine
//!
//! Turns raw blame hunks into exactly one `LineAttribution` per line of
//! each analyzed file at the target revision. Rename lineages are
//! resolved by re-blaming the prior path below each rename commit, so
//! lines carried across a rename keep their true author instead of
//! being credited to whoever performed the rename. Files are attributed
//! independently and in parallel; a failure or timeout on one file
//! skips that file only.

pub mod comments;

pub use comments::{BlockCommentPolicy, CommentRegistry, CommentSyntax};

use dashmap::DashMap;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{RepoError, SkipReason};
use crate::filters::ExclusionFilter;
use crate::git::source::{SourceOptions, VcsSource};
use crate::identity::PersonRegistry;
use crate::models::{
    FileAttribution, FileEntry, FileRevision, FileState, LineAttribution, PriorRevision,
};
use crate::perf::PerfProfile;
use crate::settings::Settings;

/// Rename chains longer than this are left attributed at the cutoff.
const MAX_RENAME_DEPTH: usize = 64;

/// Working record for one line while its lineage is being traced.
#[derive(Debug, Clone)]
struct WorkLine {
    /// 1-indexed line number at the target revision
    final_line: u32,
    /// Path the line currently blames to
    orig_path: String,
    /// 1-indexed line number in `orig_path` at `sha`
    orig_line: u32,
    sha: String,
    author_name: String,
    author_email: String,
    timestamp: i64,
}

/// A cached whole-file blame at one historical revision.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BlameSnapshot {
    pub path: String,
    pub sha: String,
    pub lines: Vec<LineAttribution>,
}

/// Per-run attribution engine. Shared across worker threads; each
/// worker opens its own source.
pub struct FileAttributor {
    follow_renames: bool,
    history: bool,
    max_file_bytes: u64,
    file_timeout: Duration,
    comments: CommentRegistry,
    filter: Arc<ExclusionFilter>,
    registry: Arc<Mutex<PersonRegistry>>,
    /// Append-only snapshot cache keyed by (path, sha)
    snapshots: DashMap<(String, String), Arc<Vec<LineAttribution>>>,
    /// Soft cap on retained snapshot data, from the perf profile
    memory_budget_bytes: Option<usize>,
    retained_bytes: AtomicUsize,
    budget_warned: AtomicBool,
    cancel: Arc<AtomicBool>,
}

impl FileAttributor {
    pub fn new(
        settings: &Settings,
        perf: &PerfProfile,
        filter: Arc<ExclusionFilter>,
        registry: Arc<Mutex<PersonRegistry>>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            follow_renames: settings.follow_renames,
            history: settings.history,
            max_file_bytes: settings.max_file_bytes,
            file_timeout: settings.file_timeout,
            comments: CommentRegistry::new(settings.block_comment_policy),
            filter,
            registry,
            snapshots: DashMap::new(),
            memory_budget_bytes: perf.memory_budget_mb.map(|mb| mb * 1024 * 1024),
            retained_bytes: AtomicUsize::new(0),
            budget_warned: AtomicBool::new(false),
            cancel,
        }
    }

    /// Attribute every candidate file at `rev`, in parallel. Output is
    /// sorted by path; exactly one `FileAttribution` exists per input
    /// entry.
    pub fn attribute_all<S: VcsSource>(
        &self,
        repo_path: &Path,
        options: SourceOptions,
        entries: &[FileEntry],
        rev: &str,
        perf: &PerfProfile,
    ) -> Result<Vec<FileAttribution>, RepoError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(perf.workers)
            .build()
            .map_err(|e| RepoError::WorkerPool(e.to_string()))?;

        let chunk_size = perf.blame_chunk_size.max(1);
        let chunks = pool.install(|| {
            entries
                .par_chunks(chunk_size)
                .map(|chunk| -> Result<Vec<FileAttribution>, RepoError> {
                    let source = S::open(repo_path, options)?;
                    let mut out = Vec::with_capacity(chunk.len());
                    for entry in chunk {
                        if self.cancel.load(Ordering::Relaxed) {
                            return Err(RepoError::Cancelled);
                        }
                        out.push(self.attribute_file(&source, entry, rev));
                    }
                    Ok(out)
                })
                .collect::<Result<Vec<_>, _>>()
        })?;

        let mut files: Vec<FileAttribution> = chunks.into_iter().flatten().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Attribute a single file. Never fails: unattributable files come
    /// back as `Skipped` with a reason.
    pub fn attribute_file<S: VcsSource>(
        &self,
        source: &S,
        entry: &FileEntry,
        rev: &str,
    ) -> FileAttribution {
        if entry.binary {
            return FileAttribution::skipped(&entry.path, SkipReason::Binary);
        }
        if entry.size > self.max_file_bytes {
            return FileAttribution::skipped(&entry.path, SkipReason::Oversize { bytes: entry.size });
        }

        let deadline = Instant::now() + self.file_timeout;
        match self.attribute_inner(source, &entry.path, rev, deadline) {
            Ok(attr) => attr,
            Err(AttributeFailure::Timeout) => {
                warn!(path = %entry.path, "attribution timed out");
                FileAttribution::skipped(&entry.path, SkipReason::Timeout)
            }
            Err(AttributeFailure::Repo(e)) => {
                debug!(path = %entry.path, error = %e, "skipping unattributable file");
                FileAttribution::skipped(
                    &entry.path,
                    SkipReason::Unreadable {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    fn attribute_inner<S: VcsSource>(
        &self,
        source: &S,
        path: &str,
        rev: &str,
        deadline: Instant,
    ) -> Result<FileAttribution, AttributeFailure> {
        let contents = source.read_lines(path, rev)?;
        let mut work = flatten_blame(source, path, rev)?;
        check_deadline(deadline)?;

        let mut lineage = Vec::new();
        if self.follow_renames {
            lineage = self.resolve_renames(source, path, &contents, &mut work, deadline)?;
        }

        let comment_flags = self.comments.classify(path, &contents);
        let lines = self.finalize(path, &contents, &comment_flags, &work);

        let mut state = if lineage.is_empty() {
            FileState::Blamed
        } else {
            FileState::RenameResolved
        };

        if self.history {
            self.index_history(source, path, &work, deadline)?;
            state = FileState::HistoryIndexed;
        }

        Ok(FileAttribution {
            path: path.to_string(),
            state,
            lines,
            lineage,
        })
    }

    /// Trace lines attributed to rename commits back through the rename
    /// lineage. A line moves to the prior revision only when its content
    /// there is identical, so lines genuinely edited by the rename
    /// commit stay attributed to it. Returns the lineage nodes crossed.
    fn resolve_renames<S: VcsSource>(
        &self,
        source: &S,
        path: &str,
        contents: &[String],
        work: &mut [WorkLine],
        deadline: Instant,
    ) -> Result<Vec<FileRevision>, AttributeFailure> {
        let mut visited: FxHashSet<(String, String)> = FxHashSet::default();
        let mut lineage = Vec::new();

        for _ in 0..MAX_RENAME_DEPTH {
            check_deadline(deadline)?;

            // Group unvisited (sha, path) pairs that performed a rename.
            let mut groups: FxHashMap<(String, String), String> = FxHashMap::default();
            for line in work.iter() {
                let key = (line.sha.clone(), line.orig_path.clone());
                if visited.contains(&key) || groups.contains_key(&key) {
                    continue;
                }
                if let Some(prior) = source.renamed_from(&line.sha, &line.orig_path)? {
                    groups.insert(key, prior);
                }
            }
            if groups.is_empty() {
                break;
            }

            for ((sha, orig_path), prior_path) in groups {
                visited.insert((sha.clone(), orig_path.clone()));
                lineage.push(FileRevision {
                    path: orig_path.clone(),
                    sha: sha.clone(),
                    prior: Some(PriorRevision {
                        path: prior_path.clone(),
                        renamed_by: sha.clone(),
                    }),
                });
                let Some(parent) = source.first_parent(&sha)? else {
                    continue;
                };

                let (prior_flat, prior_contents) =
                    match prior_blame(source, &prior_path, &parent) {
                        Ok(pair) => pair,
                        Err(e) => {
                            debug!(
                                path = %prior_path,
                                rev = %parent,
                                error = %e,
                                "cannot blame prior revision, lineage stops here"
                            );
                            continue;
                        }
                    };

                for line in work.iter_mut() {
                    if line.sha != sha || line.orig_path != orig_path {
                        continue;
                    }
                    let idx = line.orig_line as usize - 1;
                    let current = contents.get(line.final_line as usize - 1);
                    let matches_prior = prior_contents.get(idx).is_some_and(|prior| {
                        current.is_some_and(|c| c == prior)
                    });
                    if !matches_prior {
                        continue;
                    }
                    let Some(prior) = prior_flat.get(idx) else {
                        continue;
                    };
                    line.orig_path = prior.orig_path.clone();
                    line.orig_line = prior.orig_line;
                    line.sha = prior.sha.clone();
                    line.author_name = prior.author_name.clone();
                    line.author_email = prior.author_email.clone();
                    line.timestamp = prior.timestamp;
                }
            }
        }
        if !lineage.is_empty() {
            debug!(path, renames = lineage.len(), "resolved rename lineage");
        }
        Ok(lineage)
    }

    /// Resolve identities and classification flags into final records.
    fn finalize(
        &self,
        path: &str,
        contents: &[String],
        comment_flags: &[bool],
        work: &[WorkLine],
    ) -> Vec<LineAttribution> {
        let file_excluded = self.filter.is_file_excluded(path);
        let mut registry = self.registry.lock().expect("person registry lock poisoned");

        work.iter()
            .map(|line| {
                let idx = line.final_line as usize - 1;
                let content = contents.get(idx).cloned().unwrap_or_default();
                let person = registry.resolve(&line.author_name, &line.author_email);
                LineAttribution {
                    path: path.to_string(),
                    line_no: line.final_line,
                    person,
                    sha: line.sha.clone(),
                    timestamp: line.timestamp,
                    is_comment: comment_flags.get(idx).copied().unwrap_or(false),
                    is_empty: content.trim().is_empty(),
                    excluded: file_excluded || self.filter.is_ignored_rev(&line.sha),
                    content,
                }
            })
            .collect()
    }

    /// Blame the file at every revision that still owns one of its
    /// lines, populating the snapshot cache.
    fn index_history<S: VcsSource>(
        &self,
        source: &S,
        path: &str,
        work: &[WorkLine],
        deadline: Instant,
    ) -> Result<(), AttributeFailure> {
        let mut shas: Vec<&WorkLine> = work.iter().collect();
        shas.sort_by(|a, b| a.sha.cmp(&b.sha));
        shas.dedup_by(|a, b| a.sha == b.sha);

        for line in shas {
            check_deadline(deadline)?;
            let key = (line.orig_path.clone(), line.sha.clone());
            if self.snapshots.contains_key(&key) {
                continue;
            }
            let snapshot = match self.snapshot_at(source, &line.orig_path, &line.sha) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    debug!(path = %line.orig_path, sha = %line.sha, error = %e, "no snapshot");
                    continue;
                }
            };
            if !self.within_budget(&snapshot) {
                break;
            }
            self.snapshots.insert(key, Arc::new(snapshot));
        }
        debug!(path, snapshots = self.snapshots.len(), "history indexed");
        Ok(())
    }

    fn snapshot_at<S: VcsSource>(
        &self,
        source: &S,
        path: &str,
        rev: &str,
    ) -> Result<Vec<LineAttribution>, RepoError> {
        let contents = source.read_lines(path, rev)?;
        let work = flatten_blame(source, path, rev)?;
        let comment_flags = self.comments.classify(path, &contents);
        Ok(self.finalize(path, &contents, &comment_flags, &work))
    }

    /// Charge a snapshot against the memory budget. Once the budget is
    /// spent no further snapshots are cached; attribution itself is
    /// unaffected.
    fn within_budget(&self, snapshot: &[LineAttribution]) -> bool {
        let Some(budget) = self.memory_budget_bytes else {
            return true;
        };
        let estimated: usize = snapshot
            .iter()
            .map(|l| l.content.len() + l.path.len() + l.sha.len() + 64)
            .sum();
        let retained = self.retained_bytes.fetch_add(estimated, Ordering::Relaxed) + estimated;
        if retained <= budget {
            return true;
        }
        self.retained_bytes.fetch_sub(estimated, Ordering::Relaxed);
        if !self.budget_warned.swap(true, Ordering::Relaxed) {
            warn!(budget_mb = budget / (1024 * 1024), "snapshot cache memory budget reached");
        }
        false
    }

    /// Cached blame of `path` as of `sha`, when history mode indexed it.
    pub fn snapshot(&self, path: &str, sha: &str) -> Option<Arc<Vec<LineAttribution>>> {
        self.snapshots
            .get(&(path.to_string(), sha.to_string()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Drain the snapshot cache into serializable records, sorted by
    /// (path, sha).
    pub fn take_snapshots(&self) -> Vec<BlameSnapshot> {
        let mut out: Vec<BlameSnapshot> = self
            .snapshots
            .iter()
            .map(|entry| BlameSnapshot {
                path: entry.key().0.clone(),
                sha: entry.key().1.clone(),
                lines: entry.value().as_ref().clone(),
            })
            .collect();
        out.sort_by(|a, b| (&a.path, &a.sha).cmp(&(&b.path, &b.sha)));
        out
    }
}

enum AttributeFailure {
    Timeout,
    Repo(RepoError),
}

impl From<RepoError> for AttributeFailure {
    fn from(e: RepoError) -> Self {
        AttributeFailure::Repo(e)
    }
}

fn check_deadline(deadline: Instant) -> Result<(), AttributeFailure> {
    if Instant::now() > deadline {
        return Err(AttributeFailure::Timeout);
    }
    Ok(())
}

/// Blame `path` at `rev` and expand hunks into one record per line.
fn flatten_blame<S: VcsSource>(
    source: &S,
    path: &str,
    rev: &str,
) -> Result<Vec<WorkLine>, RepoError> {
    let hunks = source.blame(path, rev)?;
    let mut work = Vec::new();
    for hunk in hunks {
        for i in 0..hunk.lines {
            work.push(WorkLine {
                final_line: hunk.final_start_line + i,
                orig_path: hunk.orig_path.clone(),
                orig_line: hunk.orig_start_line + i,
                sha: hunk.sha.clone(),
                author_name: hunk.author_name.clone(),
                author_email: hunk.author_email.clone(),
                timestamp: hunk.timestamp,
            });
        }
    }
    work.sort_by_key(|l| l.final_line);
    Ok(work)
}

/// Blame of the prior path at the rename commit's parent, indexed by
/// line number, paired with that revision's contents.
fn prior_blame<S: VcsSource>(
    source: &S,
    path: &str,
    rev: &str,
) -> Result<(Vec<WorkLine>, Vec<String>), RepoError> {
    let contents = source.read_lines(path, rev)?;
    let flat = flatten_blame(source, path, rev)?;
    Ok((flat, contents))
}
