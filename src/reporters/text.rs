//! Plain-text tables

use std::io::{self, Write};

use crate::pipeline::{BatchResult, RepoResult};
use crate::stats::AgeSpan;

pub fn render(batch: &BatchResult, out: &mut impl Write) -> io::Result<()> {
    for result in &batch.results {
        render_repo(result, out)?;
        writeln!(out)?;
    }
    for failure in &batch.failures {
        writeln!(out, "failed: {}: {}", failure.repository, failure.message)?;
    }
    if batch.cancelled {
        writeln!(out, "analysis cancelled; results above are partial")?;
    }
    Ok(())
}

fn render_repo(result: &RepoResult, out: &mut impl Write) -> io::Result<()> {
    let short = &result.head[..result.head.len().min(8)];
    writeln!(
        out,
        "{} @ {}  ({} commits, {} files)",
        result.name,
        short,
        result.commits_seen,
        result.files.len()
    )?;

    writeln!(
        out,
        "\n  {:<24} {:>7} {:>7} {:>7} {:>7} {:>6} {:>6} {:>9}",
        "author", "lines", "%", "ins", "del", "stab", "scaled", "age"
    )?;
    for row in &result.tables.authors {
        let name = if row.excluded {
            format!("{} (excluded)", row.name)
        } else {
            row.name.clone()
        };
        writeln!(
            out,
            "  {:<24} {:>7} {:>7} {:>7} {:>7} {:>6} {:>6} {:>9}",
            truncate(&name, 24),
            row.lines,
            percent(row.lines_percent),
            row.insertions,
            row.deletions,
            stability(row.stability),
            percent(row.scaled_percent),
            age(row.age),
        )?;
    }

    writeln!(
        out,
        "\n  {:<40} {:>7} {:>7} {:>7} {:>6} {:>9}",
        "file", "lines", "%", "ins%", "stab", "age"
    )?;
    for row in &result.tables.files {
        writeln!(
            out,
            "  {:<40} {:>7} {:>7} {:>7} {:>6} {:>9}",
            truncate(&row.path, 40),
            row.lines,
            percent(row.lines_percent),
            percent(row.insertions_percent),
            stability(row.stability),
            age(row.age),
        )?;
    }

    for warning in &result.tables.warnings {
        writeln!(out, "\n  warning [{}]: {}", warning.entity, warning.message)?;
    }
    for diag in &result.diagnostics {
        match &diag.file {
            Some(file) => writeln!(out, "  note: {file}: {}", diag.message)?,
            None => writeln!(out, "  note: {}", diag.message)?,
        }
    }
    Ok(())
}

fn percent(value: Option<f64>) -> String {
    match value {
        Some(p) => format!("{p:.1}"),
        None => "-".to_string(),
    }
}

fn stability(value: Option<u32>) -> String {
    match value {
        Some(s) => s.to_string(),
        None => "-".to_string(),
    }
}

fn age(value: Option<AgeSpan>) -> String {
    match value {
        Some(a) => a.to_string(),
        None => "-".to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max - 1).collect();
        format!("{cut}…")
    }
}
