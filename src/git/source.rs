//! Version-control data source
//!
//! The engine consumes an abstract commit/blame source rather than a
//! specific transport; `GitSource` is the libgit2-backed implementation.
//! Workers open their own `GitSource` (a `git2::Repository` is not
//! thread-safe), so the trait exposes `open` instead of requiring
//! `Sync`.

use git2::{BlameOptions, DiffFindOptions, DiffOptions, Patch, Repository, Sort};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::RepoError;
use crate::models::{FileChange, FileEntry};

/// Behavior knobs applied to diffs and blames.
#[derive(Debug, Clone, Copy)]
pub struct SourceOptions {
    pub ignore_whitespace: bool,
    /// Copy/move detection aggressiveness, 0-4
    pub copy_move: u8,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            ignore_whitespace: true,
            copy_move: 1,
        }
    }
}

/// Commit timestamp bounds, seconds since epoch, both inclusive.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitRange {
    pub since: Option<i64>,
    pub until: Option<i64>,
}

impl CommitRange {
    pub fn contains(&self, timestamp: i64) -> bool {
        self.since.is_none_or(|s| timestamp >= s) && self.until.is_none_or(|u| timestamp <= u)
    }
}

/// Raw commit record before identity resolution.
#[derive(Debug, Clone)]
pub struct RawCommit {
    pub sha: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: i64,
    pub summary: String,
    pub parents: Vec<String>,
    pub insertions: usize,
    pub deletions: usize,
    pub changes: Vec<FileChange>,
}

/// One raw blame block: a run of consecutive lines last changed by the
/// same commit.
#[derive(Debug, Clone)]
pub struct BlameHunk {
    pub sha: String,
    /// Path the lines had in the blamed-to commit
    pub orig_path: String,
    /// 1-indexed first line in the blamed file
    pub final_start_line: u32,
    /// 1-indexed first line in the original file
    pub orig_start_line: u32,
    pub lines: u32,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: i64,
}

/// Abstract commit/blame data source. Any backing mechanism satisfying
/// this contract is acceptable.
pub trait VcsSource: Sized {
    fn open(path: &Path, options: SourceOptions) -> Result<Self, RepoError>;

    /// Target revision for analysis: HEAD, or the newest commit at or
    /// before `until`.
    fn head_rev(&self, until: Option<i64>) -> Result<String, RepoError>;

    /// All commit shas reachable from HEAD within the range, strictly
    /// chronological oldest to newest.
    fn commit_ids(&self, range: &CommitRange) -> Result<Vec<String>, RepoError>;

    fn read_commit(&self, sha: &str) -> Result<RawCommit, RepoError>;

    /// Blob entries of the tree at `rev`.
    fn tracked_files(&self, rev: &str) -> Result<Vec<FileEntry>, RepoError>;

    /// File content at `rev`, split into lines.
    fn read_lines(&self, path: &str, rev: &str) -> Result<Vec<String>, RepoError>;

    /// Raw line-attribution blocks for `path` as of `rev`.
    fn blame(&self, path: &str, rev: &str) -> Result<Vec<BlameHunk>, RepoError>;

    /// The path `path` had before `sha`, when `sha` renamed or copied it.
    fn renamed_from(&self, sha: &str, path: &str) -> Result<Option<String>, RepoError>;

    fn first_parent(&self, sha: &str) -> Result<Option<String>, RepoError>;
}

/// libgit2-backed source.
pub struct GitSource {
    repo: Repository,
    options: SourceOptions,
}

impl std::fmt::Debug for GitSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitSource")
            .field("path", &self.repo.path())
            .field("options", &self.options)
            .finish()
    }
}

impl GitSource {
    fn commit(&self, sha: &str) -> Result<git2::Commit<'_>, RepoError> {
        let oid = git2::Oid::from_str(sha)?;
        Ok(self.repo.find_commit(oid)?)
    }

    fn diff_to_first_parent(&self, commit: &git2::Commit<'_>) -> Result<git2::Diff<'_>, RepoError> {
        let parent_tree = commit
            .parent(0)
            .ok()
            .map(|p| p.tree())
            .transpose()?;
        let tree = commit.tree()?;

        let mut opts = DiffOptions::new();
        if self.options.ignore_whitespace {
            opts.ignore_whitespace(true);
        }
        let mut diff =
            self.repo
                .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;

        let mut find = DiffFindOptions::new();
        find.renames(true);
        if self.options.copy_move >= 2 {
            find.copies(true);
        }
        diff.find_similar(Some(&mut find))?;
        Ok(diff)
    }
}

impl VcsSource for GitSource {
    fn open(path: &Path, options: SourceOptions) -> Result<Self, RepoError> {
        let repo = Repository::discover(path).map_err(|source| RepoError::Open {
            path: PathBuf::from(path),
            source,
        })?;
        debug!(repo = %repo.path().display(), "opened git repository");
        Ok(Self { repo, options })
    }

    fn head_rev(&self, until: Option<i64>) -> Result<String, RepoError> {
        let head = self
            .repo
            .head()
            .map_err(|_| RepoError::EmptyHistory)?
            .peel_to_commit()
            .map_err(|_| RepoError::EmptyHistory)?;

        let Some(until) = until else {
            return Ok(head.id().to_string());
        };

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TIME)?;
        revwalk.push(head.id())?;
        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;
            if commit.time().seconds() <= until {
                return Ok(commit.id().to_string());
            }
        }
        Err(RepoError::EmptyHistory)
    }

    fn commit_ids(&self, range: &CommitRange) -> Result<Vec<String>, RepoError> {
        let mut revwalk = self.repo.revwalk()?;
        // Oldest first: age/stability accumulate order-dependently.
        revwalk.set_sorting(Sort::TIME | Sort::REVERSE)?;
        revwalk.push_head().map_err(|_| RepoError::EmptyHistory)?;

        let mut ids = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            if range.contains(commit.time().seconds()) {
                ids.push(oid.to_string());
            }
        }
        Ok(ids)
    }

    fn read_commit(&self, sha: &str) -> Result<RawCommit, RepoError> {
        let commit = self.commit(sha)?;
        let author = commit.author();
        let diff = self.diff_to_first_parent(&commit)?;

        let mut changes = Vec::new();
        let mut insertions = 0usize;
        let mut deletions = 0usize;
        for (idx, delta) in diff.deltas().enumerate() {
            let Some(path) = delta.new_file().path() else {
                continue;
            };
            let (_, adds, dels) = match Patch::from_diff(&diff, idx)? {
                Some(patch) => patch.line_stats()?,
                None => (0, 0, 0),
            };
            let prior_path = match delta.status() {
                git2::Delta::Renamed | git2::Delta::Copied => delta
                    .old_file()
                    .path()
                    .map(|p| p.to_string_lossy().to_string()),
                _ => None,
            };
            insertions += adds;
            deletions += dels;
            changes.push(FileChange {
                path: path.to_string_lossy().to_string(),
                prior_path,
                insertions: adds,
                deletions: dels,
            });
        }

        Ok(RawCommit {
            sha: commit.id().to_string(),
            author_name: author.name().unwrap_or("").to_string(),
            author_email: author.email().unwrap_or("").to_string(),
            timestamp: commit.time().seconds(),
            summary: commit.summary().unwrap_or("").to_string(),
            parents: commit.parent_ids().map(|id| id.to_string()).collect(),
            insertions,
            deletions,
            changes,
        })
    }

    fn tracked_files(&self, rev: &str) -> Result<Vec<FileEntry>, RepoError> {
        let commit = self.commit(rev)?;
        let tree = commit.tree()?;

        let mut files = Vec::new();
        tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() == Some(git2::ObjectType::Blob) {
                let path = format!("{}{}", dir, entry.name().unwrap_or(""));
                if let Ok(object) = entry.to_object(&self.repo) {
                    if let Some(blob) = object.as_blob() {
                        files.push(FileEntry {
                            path,
                            size: blob.size() as u64,
                            binary: blob.is_binary(),
                        });
                    }
                }
            }
            git2::TreeWalkResult::Ok
        })?;

        Ok(files)
    }

    fn read_lines(&self, path: &str, rev: &str) -> Result<Vec<String>, RepoError> {
        let commit = self.commit(rev)?;
        let tree = commit.tree()?;
        let entry = tree.get_path(Path::new(path))?;
        let object = entry.to_object(&self.repo)?;
        let blob = object
            .as_blob()
            .ok_or_else(|| git2::Error::from_str("not a blob"))?;

        let content = String::from_utf8_lossy(blob.content());
        let mut lines: Vec<String> = content.split('\n').map(|l| l.to_string()).collect();
        // A trailing newline produces one phantom empty element.
        if lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        Ok(lines)
    }

    fn blame(&self, path: &str, rev: &str) -> Result<Vec<BlameHunk>, RepoError> {
        let mut opts = BlameOptions::new();
        opts.newest_commit(git2::Oid::from_str(rev)?);
        if self.options.ignore_whitespace {
            opts.ignore_whitespace(true);
        }
        if self.options.copy_move >= 1 {
            opts.track_copies_same_file(true);
        }
        if self.options.copy_move >= 2 {
            opts.track_copies_same_commit_moves(true);
        }
        if self.options.copy_move >= 3 {
            opts.track_copies_same_commit_copies(true);
        }
        if self.options.copy_move >= 4 {
            opts.track_copies_any_commit_copies(true);
        }

        let blame = self.repo.blame_file(Path::new(path), Some(&mut opts))?;

        let mut hunks = Vec::with_capacity(blame.len());
        for hunk in blame.iter() {
            let sha = hunk.final_commit_id().to_string();
            let sig = hunk.final_signature();
            let timestamp = self
                .repo
                .find_commit(hunk.final_commit_id())
                .map(|c| c.time().seconds())
                .unwrap_or(0);
            hunks.push(BlameHunk {
                sha,
                orig_path: hunk
                    .path()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.to_string()),
                final_start_line: hunk.final_start_line() as u32,
                orig_start_line: hunk.orig_start_line() as u32,
                lines: hunk.lines_in_hunk() as u32,
                author_name: sig.name().unwrap_or("").to_string(),
                author_email: sig.email().unwrap_or("").to_string(),
                timestamp,
            });
        }
        Ok(hunks)
    }

    fn renamed_from(&self, sha: &str, path: &str) -> Result<Option<String>, RepoError> {
        let commit = self.commit(sha)?;
        if commit.parent_count() == 0 {
            return Ok(None);
        }
        let diff = self.diff_to_first_parent(&commit)?;
        for delta in diff.deltas() {
            let is_rename = matches!(delta.status(), git2::Delta::Renamed | git2::Delta::Copied);
            if !is_rename {
                continue;
            }
            let new_path = delta.new_file().path().map(|p| p.to_string_lossy());
            if new_path.as_deref() == Some(path) {
                return Ok(delta
                    .old_file()
                    .path()
                    .map(|p| p.to_string_lossy().to_string()));
            }
        }
        Ok(None)
    }

    fn first_parent(&self, sha: &str) -> Result<Option<String>, RepoError> {
        let commit = self.commit(sha)?;
        Ok(commit.parent_ids().next().map(|id| id.to_string()))
    }
}
