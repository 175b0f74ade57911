//! Statistics aggregation
//!
//! Folds line attributions and per-commit change totals into
//! deterministic author, file, and author-per-file tables. All derived
//! metrics are exact integer or rational arithmetic over the collected
//! counts; aggregation is a pure function of its inputs, so re-running
//! it over the same attribution yields identical tables.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::AggregationWarning;
use crate::identity::{PersonId, PersonRegistry};
use crate::models::{Commit, FileAttribution};
use crate::settings::Settings;

const SECS_PER_DAY: f64 = 86_400.0;
const DAYS_IN_YEAR: f64 = 365.25;
const DAYS_IN_MONTH: f64 = 30.44;

/// A mean line age decomposed into calendar units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeSpan {
    pub years: u32,
    pub months: u32,
    pub days: u32,
}

impl AgeSpan {
    pub fn from_seconds(secs: f64) -> Self {
        let total_days = (secs / SECS_PER_DAY).max(0.0);
        let years = (total_days / DAYS_IN_YEAR).floor();
        let rem = total_days - years * DAYS_IN_YEAR;
        let months = (rem / DAYS_IN_MONTH).floor();
        let days = (rem - months * DAYS_IN_MONTH).floor();
        Self {
            years: years as u32,
            months: months as u32,
            days: days as u32,
        }
    }
}

impl std::fmt::Display for AgeSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.years > 0 {
            write!(f, "{}:{:02}:{:02}", self.years, self.months, self.days)
        } else {
            write!(f, "{:02}:{:02}", self.months, self.days)
        }
    }
}

/// Raw counters accumulated for one entity before derivation.
#[derive(Debug, Clone, Default)]
struct Stat {
    shas: BTreeSet<String>,
    insertions: usize,
    deletions: usize,
    lines: usize,
    age_sum_secs: i64,
}

impl Stat {
    fn add_line(&mut self, sha: &str, age_secs: i64) {
        self.shas.insert(sha.to_string());
        self.lines += 1;
        self.age_sum_secs += age_secs.max(0);
    }

    fn add_changes(&mut self, totals: &ChangeTotals) {
        self.insertions += totals.insertions;
        self.deletions += totals.deletions;
        self.shas.extend(totals.shas.iter().cloned());
    }

    fn age(&self) -> Option<AgeSpan> {
        if self.lines == 0 {
            return None;
        }
        Some(AgeSpan::from_seconds(
            self.age_sum_secs as f64 / self.lines as f64,
        ))
    }

    /// Surviving lines per inserted line, capped at 100. Undefined when
    /// nothing was inserted in range.
    fn stability(&self) -> Option<u32> {
        if self.insertions == 0 {
            return None;
        }
        let pct = (100.0 * self.lines as f64 / self.insertions as f64).round() as u32;
        Some(pct.min(100))
    }
}

/// Insertion/deletion totals for one (author, file) pair, accumulated
/// commit by commit from the history stream.
#[derive(Debug, Clone, Default)]
struct ChangeTotals {
    insertions: usize,
    deletions: usize,
    shas: BTreeSet<String>,
}

/// Per-run accumulator fed one commit at a time, in stream order.
#[derive(Debug, Default)]
pub struct CommitGroups {
    by_author_file: FxHashMap<(PersonId, String), ChangeTotals>,
}

impl CommitGroups {
    pub fn record(&mut self, commit: &Commit) {
        for change in &commit.changes {
            let totals = self
                .by_author_file
                .entry((commit.person, change.path.clone()))
                .or_default();
            totals.insertions += change.insertions;
            totals.deletions += change.deletions;
            totals.shas.insert(commit.sha.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_author_file.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorRow {
    pub name: String,
    pub email: String,
    pub excluded: bool,
    pub commits: usize,
    pub lines: usize,
    pub insertions: usize,
    pub deletions: usize,
    /// Share of all included lines; absent for excluded authors and when
    /// no included lines exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insertions_percent: Option<f64>,
    /// `lines_percent` scaled by the included author count, so an
    /// average contributor scores 100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaled_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<AgeSpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRow {
    pub path: String,
    pub commits: usize,
    pub lines: usize,
    pub insertions: usize,
    pub deletions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insertions_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<AgeSpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorFileRow {
    pub name: String,
    pub path: String,
    pub lines: usize,
    pub insertions: usize,
    pub deletions: usize,
    /// Share of all included counted lines. Every orientation divides by
    /// the same run-wide denominator, so rows are comparable across
    /// tables; absent for excluded authors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<AgeSpan>,
}

/// Final deterministic tables for one repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateTables {
    pub authors: Vec<AuthorRow>,
    pub files: Vec<FileRow>,
    pub author_files: Vec<AuthorFileRow>,
    /// Counted lines owned by included authors
    pub total_lines: usize,
    pub total_insertions: usize,
    /// Non-excluded authors owning at least one counted line or change
    pub included_authors: usize,
    pub warnings: Vec<AggregationWarning>,
}

impl AggregateTables {
    /// The author-per-file rows reordered by (path, author). Derived on
    /// demand from the same base counts as `author_files`.
    pub fn file_authors(&self) -> Vec<&AuthorFileRow> {
        let mut rows: Vec<&AuthorFileRow> = self.author_files.iter().collect();
        rows.sort_by(|a, b| (&a.path, &a.name).cmp(&(&b.path, &b.name)));
        rows
    }
}

fn divide_to_percentage(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(100.0 * numerator / denominator)
    }
}

/// Whether a line participates in counting under the current settings.
fn line_counted(settings: &Settings, is_comment: bool, is_empty: bool, excluded: bool) -> bool {
    if excluded {
        return false;
    }
    if is_comment && !settings.count_comments {
        return false;
    }
    if is_empty && !settings.count_empty_lines {
        return false;
    }
    true
}

/// Fold attribution and change data into the final tables.
/// `reference_timestamp` anchors line ages (the target revision's commit
/// time, so results do not depend on when the analysis runs).
pub fn aggregate(
    registry: &PersonRegistry,
    files: &[FileAttribution],
    groups: &CommitGroups,
    settings: &Settings,
    reference_timestamp: i64,
) -> AggregateTables {
    let mut warnings = Vec::new();

    let mut author_stats: FxHashMap<PersonId, Stat> = FxHashMap::default();
    let mut file_stats: FxHashMap<String, Stat> = FxHashMap::default();
    let mut pair_stats: FxHashMap<(PersonId, String), Stat> = FxHashMap::default();

    for file in files {
        for line in &file.lines {
            if !line_counted(settings, line.is_comment, line.is_empty, line.excluded) {
                continue;
            }
            let person = registry.canonical(line.person);
            let age = reference_timestamp - line.timestamp;
            author_stats
                .entry(person)
                .or_default()
                .add_line(&line.sha, age);
            file_stats
                .entry(file.path.clone())
                .or_default()
                .add_line(&line.sha, age);
            pair_stats
                .entry((person, file.path.clone()))
                .or_default()
                .add_line(&line.sha, age);
        }
    }

    // Insertions and deletions come from the commit stream, keyed by
    // the path each commit touched.
    for ((person, path), totals) in &groups.by_author_file {
        let person = registry.canonical(*person);
        author_stats.entry(person).or_default().add_changes(totals);
        file_stats.entry(path.clone()).or_default().add_changes(totals);
        pair_stats
            .entry((person, path.clone()))
            .or_default()
            .add_changes(totals);
    }

    // Scaling counts authors that actually earned a table row. The
    // registry can hold more identities than the tables show (authors
    // whose every commit was message-excluded, or who only touched
    // non-counted lines), and those must not dilute everyone's score.
    let included_authors = author_stats
        .keys()
        .filter(|id| !registry.is_excluded(**id))
        .count();

    // Denominators cover included authors only; excluded authors keep
    // raw counts but no percentages.
    let total_lines: usize = author_stats
        .iter()
        .filter(|(id, _)| !registry.is_excluded(**id))
        .map(|(_, s)| s.lines)
        .sum();
    let total_insertions: usize = author_stats
        .iter()
        .filter(|(id, _)| !registry.is_excluded(**id))
        .map(|(_, s)| s.insertions)
        .sum();

    if author_stats.is_empty() {
        warnings.push(AggregationWarning {
            entity: "repository".to_string(),
            message: "no attributable lines or commits in range".to_string(),
        });
    } else if total_lines == 0 {
        warnings.push(AggregationWarning {
            entity: "repository".to_string(),
            message: "no counted lines for included authors".to_string(),
        });
    }

    let mut authors: Vec<AuthorRow> = author_stats
        .iter()
        .map(|(id, stat)| {
            let view = registry.view(*id);
            let (lines_percent, insertions_percent, scaled_percent) = if view.excluded {
                (None, None, None)
            } else {
                let lines_percent =
                    divide_to_percentage(stat.lines as f64, total_lines as f64);
                let scaled = lines_percent.map(|p| p * included_authors as f64);
                (
                    lines_percent,
                    divide_to_percentage(stat.insertions as f64, total_insertions as f64),
                    scaled,
                )
            };
            AuthorRow {
                name: view.display_name,
                email: view.email,
                excluded: view.excluded,
                commits: stat.shas.len(),
                lines: stat.lines,
                insertions: stat.insertions,
                deletions: stat.deletions,
                lines_percent,
                insertions_percent,
                scaled_percent,
                stability: stat.stability(),
                age: stat.age(),
            }
        })
        .collect();
    authors.sort_by(|a, b| (&a.name, &a.email).cmp(&(&b.name, &b.email)));

    let mut file_rows: Vec<FileRow> = file_stats
        .iter()
        .map(|(path, stat)| FileRow {
            path: path.clone(),
            commits: stat.shas.len(),
            lines: stat.lines,
            insertions: stat.insertions,
            deletions: stat.deletions,
            lines_percent: divide_to_percentage(stat.lines as f64, total_lines as f64),
            insertions_percent: divide_to_percentage(
                stat.insertions as f64,
                total_insertions as f64,
            ),
            stability: stat.stability(),
            age: stat.age(),
        })
        .collect();
    file_rows.sort_by(|a, b| a.path.cmp(&b.path));

    let mut author_files: Vec<AuthorFileRow> = pair_stats
        .iter()
        .map(|((id, path), stat)| {
            let view = registry.view(*id);
            let lines_percent = if view.excluded {
                None
            } else {
                divide_to_percentage(stat.lines as f64, total_lines as f64)
            };
            AuthorFileRow {
                name: view.display_name,
                path: path.clone(),
                lines: stat.lines,
                insertions: stat.insertions,
                deletions: stat.deletions,
                lines_percent,
                stability: stat.stability(),
                age: stat.age(),
            }
        })
        .collect();
    author_files.sort_by(|a, b| (&a.name, &a.path).cmp(&(&b.name, &b.path)));

    AggregateTables {
        authors,
        files: file_rows,
        author_files,
        total_lines,
        total_insertions,
        included_authors,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::ExclusionFilter;
    use crate::models::{FileChange, FileState, LineAttribution};
    use std::sync::Arc;

    fn registry_with(settings: &Settings) -> PersonRegistry {
        let filter = ExclusionFilter::from_settings(settings).unwrap();
        PersonRegistry::new(Arc::new(filter))
    }

    fn line(path: &str, n: u32, person: PersonId, sha: &str, ts: i64) -> LineAttribution {
        LineAttribution {
            path: path.to_string(),
            line_no: n,
            person,
            sha: sha.to_string(),
            timestamp: ts,
            content: "code".to_string(),
            is_comment: false,
            is_empty: false,
            excluded: false,
        }
    }

    fn file(path: &str, lines: Vec<LineAttribution>) -> FileAttribution {
        FileAttribution {
            path: path.to_string(),
            state: FileState::Blamed,
            lines,
            lineage: Vec::new(),
        }
    }

    fn commit(person: PersonId, sha: &str, path: &str, ins: usize, del: usize) -> Commit {
        Commit {
            sha: sha.to_string(),
            person,
            author_name: String::new(),
            author_email: String::new(),
            timestamp: 0,
            summary: String::new(),
            parents: Vec::new(),
            insertions: ins,
            deletions: del,
            changes: vec![FileChange {
                path: path.to_string(),
                prior_path: None,
                insertions: ins,
                deletions: del,
            }],
        }
    }

    #[test]
    fn percentages_sum_to_one_hundred() {
        let settings = Settings::default();
        let mut reg = registry_with(&settings);
        let a = reg.resolve("Alice", "alice@example.com");
        let b = reg.resolve("Bob", "bob@example.com");

        let files = vec![file(
            "a.rs",
            vec![
                line("a.rs", 1, a, "s1", 0),
                line("a.rs", 2, a, "s1", 0),
                line("a.rs", 3, a, "s1", 0),
                line("a.rs", 4, b, "s2", 0),
            ],
        )];
        let tables = aggregate(&reg, &files, &CommitGroups::default(), &settings, 0);

        assert_eq!(tables.total_lines, 4);
        let sum: f64 = tables
            .authors
            .iter()
            .filter_map(|r| r.lines_percent)
            .sum();
        assert!((sum - 100.0).abs() < 1e-9);
        assert_eq!(tables.authors[0].name, "Alice");
        assert_eq!(tables.authors[0].lines_percent, Some(75.0));
        assert_eq!(tables.authors[0].scaled_percent, Some(150.0));
    }

    #[test]
    fn zero_insertions_yield_undefined_stability() {
        let settings = Settings::default();
        let mut reg = registry_with(&settings);
        let a = reg.resolve("Alice", "alice@example.com");

        let files = vec![file("a.rs", vec![line("a.rs", 1, a, "s1", 0)])];
        let tables = aggregate(&reg, &files, &CommitGroups::default(), &settings, 0);
        assert_eq!(tables.authors[0].stability, None);
    }

    #[test]
    fn stability_is_capped_at_one_hundred() {
        let settings = Settings::default();
        let mut reg = registry_with(&settings);
        let a = reg.resolve("Alice", "alice@example.com");

        let mut groups = CommitGroups::default();
        groups.record(&commit(a, "s1", "a.rs", 2, 0));
        let files = vec![file(
            "a.rs",
            vec![
                line("a.rs", 1, a, "s1", 0),
                line("a.rs", 2, a, "s1", 0),
                line("a.rs", 3, a, "s1", 0),
            ],
        )];
        let tables = aggregate(&reg, &files, &groups, &settings, 0);
        assert_eq!(tables.authors[0].stability, Some(100));
    }

    #[test]
    fn excluded_authors_keep_raw_counts_but_no_percent() {
        let mut settings = Settings::default();
        settings.ex_authors = vec!["*bot*".to_string()];
        let mut reg = registry_with(&settings);
        let bot = reg.resolve("deploy-bot", "bot@ci.example");
        let human = reg.resolve("Alice", "alice@example.com");

        let files = vec![file(
            "a.rs",
            vec![
                line("a.rs", 1, bot, "s1", 0),
                line("a.rs", 2, human, "s2", 0),
            ],
        )];
        let tables = aggregate(&reg, &files, &CommitGroups::default(), &settings, 0);

        let bot_row = tables.authors.iter().find(|r| r.excluded).unwrap();
        assert_eq!(bot_row.lines, 1);
        assert_eq!(bot_row.lines_percent, None);
        let human_row = tables.authors.iter().find(|r| !r.excluded).unwrap();
        assert_eq!(human_row.lines_percent, Some(100.0));
        assert_eq!(tables.total_lines, 1);
        assert_eq!(tables.included_authors, 1);
    }

    #[test]
    fn empty_input_produces_warning_not_panic() {
        let settings = Settings::default();
        let reg = registry_with(&settings);
        let tables = aggregate(&reg, &[], &CommitGroups::default(), &settings, 0);
        assert!(tables.authors.is_empty());
        assert_eq!(tables.warnings.len(), 1);
    }

    #[test]
    fn comment_and_empty_lines_follow_count_flags() {
        let mut settings = Settings::default();
        settings.count_comments = false;
        settings.count_empty_lines = false;
        let mut reg = registry_with(&settings);
        let a = reg.resolve("Alice", "alice@example.com");

        let mut comment = line("a.rs", 1, a, "s1", 0);
        comment.is_comment = true;
        let mut empty = line("a.rs", 2, a, "s1", 0);
        empty.is_empty = true;
        let code = line("a.rs", 3, a, "s1", 0);

        let files = vec![file("a.rs", vec![comment.clone(), empty.clone(), code.clone()])];
        let tables = aggregate(&reg, &files, &CommitGroups::default(), &settings, 0);
        assert_eq!(tables.total_lines, 1);

        settings.count_comments = true;
        settings.count_empty_lines = true;
        let files = vec![file("a.rs", vec![comment, empty, code])];
        let tables = aggregate(&reg, &files, &CommitGroups::default(), &settings, 0);
        assert_eq!(tables.total_lines, 3);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let settings = Settings::default();
        let mut reg = registry_with(&settings);
        let a = reg.resolve("Alice", "alice@example.com");
        let b = reg.resolve("Bob", "bob@example.com");
        let files = vec![
            file("b.rs", vec![line("b.rs", 1, b, "s2", 10)]),
            file("a.rs", vec![line("a.rs", 1, a, "s1", 20)]),
        ];
        let mut groups = CommitGroups::default();
        groups.record(&commit(a, "s1", "a.rs", 1, 0));
        groups.record(&commit(b, "s2", "b.rs", 1, 0));

        let t1 = aggregate(&reg, &files, &groups, &settings, 100);
        let t2 = aggregate(&reg, &files, &groups, &settings, 100);
        assert_eq!(serde_json::to_string(&t1).unwrap(), serde_json::to_string(&t2).unwrap());
        assert_eq!(t1.authors[0].name, "Alice");
        assert_eq!(t1.files[0].path, "a.rs");
    }

    #[test]
    fn scaled_percent_averages_one_hundred_for_many_authors() {
        let settings = Settings::default();
        let mut reg = registry_with(&settings);
        let mut lines = Vec::new();
        for i in 0..50 {
            let person = reg.resolve(
                &format!("Author {i:02}"),
                &format!("author{i:02}@example.com"),
            );
            lines.push(line("a.rs", 2 * i + 1, person, &format!("s{i}"), 0));
            lines.push(line("a.rs", 2 * i + 2, person, &format!("s{i}"), 0));
        }
        let files = vec![file("a.rs", lines)];
        let tables = aggregate(&reg, &files, &CommitGroups::default(), &settings, 0);

        assert_eq!(tables.included_authors, 50);
        let mean: f64 = tables
            .authors
            .iter()
            .filter_map(|r| r.scaled_percent)
            .sum::<f64>()
            / 50.0;
        assert!((mean - 100.0).abs() < 0.1);
    }

    #[test]
    fn rowless_registered_person_does_not_scale_percentages() {
        let settings = Settings::default();
        let mut reg = registry_with(&settings);
        let a = reg.resolve("Alice", "alice@example.com");
        // Registered from the commit stream but every commit excluded
        // and every line overwritten, so no row is earned.
        reg.resolve("Chore", "chore@ci.example");

        let files = vec![file("a.rs", vec![line("a.rs", 1, a, "s1", 0)])];
        let tables = aggregate(&reg, &files, &CommitGroups::default(), &settings, 0);

        assert_eq!(tables.included_authors, 1);
        assert_eq!(tables.authors.len(), 1);
        assert_eq!(tables.authors[0].lines_percent, Some(100.0));
        assert_eq!(tables.authors[0].scaled_percent, Some(100.0));
    }

    #[test]
    fn every_orientation_shares_the_global_denominator() {
        let settings = Settings::default();
        let mut reg = registry_with(&settings);
        let a = reg.resolve("Alice", "alice@example.com");
        let b = reg.resolve("Bob", "bob@example.com");

        let files = vec![
            file(
                "a.rs",
                vec![
                    line("a.rs", 1, a, "s1", 0),
                    line("a.rs", 2, a, "s1", 0),
                    line("a.rs", 3, a, "s1", 0),
                ],
            ),
            file("b.rs", vec![line("b.rs", 1, b, "s2", 0)]),
        ];
        let mut groups = CommitGroups::default();
        groups.record(&commit(a, "s1", "a.rs", 3, 0));
        groups.record(&commit(b, "s2", "b.rs", 1, 0));
        let tables = aggregate(&reg, &files, &groups, &settings, 0);

        // Bob owns all of b.rs but only a quarter of the counted lines.
        let bob = tables
            .author_files
            .iter()
            .find(|r| r.name == "Bob")
            .unwrap();
        assert_eq!(bob.lines_percent, Some(25.0));

        let b_file = tables.files.iter().find(|f| f.path == "b.rs").unwrap();
        assert_eq!(b_file.lines_percent, Some(25.0));
        assert_eq!(b_file.insertions_percent, Some(25.0));
    }

    #[test]
    fn file_authors_orientation_reorders_same_rows() {
        let settings = Settings::default();
        let mut reg = registry_with(&settings);
        let a = reg.resolve("Alice", "alice@example.com");
        let b = reg.resolve("Bob", "bob@example.com");
        let files = vec![
            file("a.rs", vec![line("a.rs", 1, b, "s2", 0)]),
            file("b.rs", vec![line("b.rs", 1, a, "s1", 0)]),
        ];
        let tables = aggregate(&reg, &files, &CommitGroups::default(), &settings, 0);

        let by_author: Vec<(&str, &str)> = tables
            .author_files
            .iter()
            .map(|r| (r.name.as_str(), r.path.as_str()))
            .collect();
        assert_eq!(by_author, vec![("Alice", "b.rs"), ("Bob", "a.rs")]);

        let by_file: Vec<(&str, &str)> = tables
            .file_authors()
            .iter()
            .map(|r| (r.path.as_str(), r.name.as_str()))
            .collect();
        assert_eq!(by_file, vec![("a.rs", "Bob"), ("b.rs", "Alice")]);
    }

    #[test]
    fn age_decomposes_calendar_units() {
        let span = AgeSpan::from_seconds(400.25 * SECS_PER_DAY);
        assert_eq!(span.years, 1);
        assert_eq!(span.months, 1);
        assert_eq!(format!("{span}"), "1:01:04");

        let fresh = AgeSpan::from_seconds(5.0 * SECS_PER_DAY);
        assert_eq!(format!("{fresh}"), "00:05");
    }
}
