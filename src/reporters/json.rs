//! JSON report

use serde::Serialize;
use std::io::{self, Write};

use crate::attribution::BlameSnapshot;
use crate::error::{AggregationWarning, Diagnostic};
use crate::identity::PersonView;
use crate::pipeline::{BatchResult, RepoResult};
use crate::stats::{AuthorFileRow, AuthorRow, FileRow};

#[derive(Serialize)]
struct Report<'a> {
    repositories: Vec<Repo<'a>>,
    failures: &'a [Diagnostic],
    cancelled: bool,
}

#[derive(Serialize)]
struct Repo<'a> {
    name: &'a str,
    path: String,
    head: &'a str,
    commits_seen: usize,
    commits_skipped: usize,
    total_lines: usize,
    total_insertions: usize,
    included_authors: usize,
    authors: &'a [AuthorRow],
    files: &'a [FileRow],
    author_files: &'a [AuthorFileRow],
    persons: &'a [PersonView],
    warnings: &'a [AggregationWarning],
    diagnostics: &'a [Diagnostic],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    snapshots: &'a [BlameSnapshot],
}

fn repo(result: &RepoResult) -> Repo<'_> {
    Repo {
        name: &result.name,
        path: result.path.display().to_string(),
        head: &result.head,
        commits_seen: result.commits_seen,
        commits_skipped: result.commits_skipped,
        total_lines: result.tables.total_lines,
        total_insertions: result.tables.total_insertions,
        included_authors: result.tables.included_authors,
        authors: &result.tables.authors,
        files: &result.tables.files,
        author_files: &result.tables.author_files,
        persons: &result.persons,
        warnings: &result.tables.warnings,
        diagnostics: &result.diagnostics,
        snapshots: &result.snapshots,
    }
}

pub fn render(batch: &BatchResult, out: &mut impl Write) -> io::Result<()> {
    let report = Report {
        repositories: batch.results.iter().map(repo).collect(),
        failures: &batch.failures,
        cancelled: batch.cancelled,
    };
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)
}
