//! Command-line interface

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use crate::attribution::BlockCommentPolicy;
use crate::perf::PerfProfile;
use crate::pipeline::RepoAnalyzer;
use crate::reporters::{json, text, OutputFormat};
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PerfChoice {
    /// Probe repository size and pick a profile
    #[default]
    Auto,
    Small,
    Large,
}

#[derive(Parser, Debug)]
#[command(
    name = "gitally",
    version,
    about = "Per-author and per-file git contribution statistics"
)]
pub struct Cli {
    /// Repositories to analyze
    #[arg(required = true)]
    pub repositories: Vec<PathBuf>,

    /// Only consider commits on or after this date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub since: Option<DateTime<Utc>>,
    /// Only consider commits on or before this date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub until: Option<DateTime<Utc>>,

    /// Exclude authors matching a glob (or `re:` regex); repeatable
    #[arg(long = "ex-author")]
    pub ex_authors: Vec<String>,
    /// Exclude author emails matching a pattern; repeatable
    #[arg(long = "ex-email")]
    pub ex_emails: Vec<String>,
    /// Exclude commits whose summary matches a pattern; repeatable
    #[arg(long = "ex-message")]
    pub ex_messages: Vec<String>,
    /// Mark files matching a pattern as excluded; repeatable
    #[arg(long = "ex-file")]
    pub ex_files: Vec<String>,
    /// Exclude revisions by sha prefix or pattern; repeatable
    #[arg(long = "ex-revision")]
    pub ex_revisions: Vec<String>,
    /// File of full shas to ignore during blame, one per line
    #[arg(long)]
    pub ignore_revs_file: Option<PathBuf>,

    /// File extensions to analyze (default: common source extensions,
    /// `*` for all)
    #[arg(long = "extension")]
    pub extensions: Vec<String>,
    /// Only analyze files matching a pattern; repeatable
    #[arg(long = "include-file")]
    pub include_files: Vec<String>,
    /// Restrict analysis to one subfolder
    #[arg(long, default_value = "")]
    pub subfolder: String,
    /// Analyze only the N largest files (0 = all)
    #[arg(long, default_value_t = 0)]
    pub n_files: usize,

    /// Do not trace line authorship across renames
    #[arg(long)]
    pub no_follow_renames: bool,
    /// Index blame snapshots at every owning revision
    #[arg(long)]
    pub history: bool,
    /// Count comment lines
    #[arg(long)]
    pub comments: bool,
    /// Count empty lines
    #[arg(long)]
    pub empty_lines: bool,
    /// Make whitespace-only changes count as changes
    #[arg(long)]
    pub no_ignore_whitespace: bool,
    /// Copy/move detection aggressiveness (0-4)
    #[arg(long, default_value_t = 1)]
    pub copy_move: u8,
    /// Block comment classification policy
    #[arg(long, value_enum, default_value = "line-prefix-only")]
    pub block_comments: BlockCommentPolicy,
    /// Drop commits of excluded authors entirely instead of keeping
    /// their raw counts
    #[arg(long)]
    pub drop_excluded_authors: bool,

    /// Performance profile
    #[arg(long, value_enum, default_value = "auto")]
    pub profile: PerfChoice,
    /// Override the worker count of the selected profile
    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
    /// Write the report to a file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

fn parse_date(s: &str) -> Result<DateTime<Utc>, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

impl Cli {
    pub fn to_settings(&self) -> Settings {
        let mut perf = match self.profile {
            PerfChoice::Auto => PerfProfile::default(),
            PerfChoice::Small => PerfProfile::small_repo(),
            PerfChoice::Large => PerfProfile::large_repo(),
        };
        if let Some(workers) = self.workers {
            perf.workers = workers;
        }

        let mut settings = Settings::default();
        settings.repositories = self.repositories.clone();
        settings.since = self.since;
        settings.until = self.until;
        settings.ex_authors = self.ex_authors.clone();
        settings.ex_emails = self.ex_emails.clone();
        settings.ex_messages = self.ex_messages.clone();
        settings.ex_files = self.ex_files.clone();
        settings.ex_revisions = self.ex_revisions.clone();
        settings.ignore_revs_file = self.ignore_revs_file.clone();
        if !self.extensions.is_empty() {
            settings.extensions = self.extensions.clone();
        }
        settings.include_files = self.include_files.clone();
        settings.subfolder = self.subfolder.clone();
        settings.n_files = self.n_files;
        settings.follow_renames = !self.no_follow_renames;
        settings.history = self.history;
        settings.count_comments = self.comments;
        settings.count_empty_lines = self.empty_lines;
        settings.ignore_whitespace = !self.no_ignore_whitespace;
        settings.copy_move = self.copy_move;
        settings.block_comment_policy = self.block_comments;
        settings.exclude_commits_of_excluded_authors = self.drop_excluded_authors;
        settings.perf = perf;
        settings
    }
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = cli.to_settings();
    let analyzer = RepoAnalyzer::new(settings).context("invalid configuration")?;
    let batch = analyzer.run_batch()?;

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    match cli.format {
        OutputFormat::Text => text::render(&batch, &mut out)?,
        OutputFormat::Json => json::render(&batch, &mut out)?,
    }
    out.flush()?;

    if batch.results.is_empty() && !batch.failures.is_empty() {
        anyhow::bail!("all repositories failed");
    }
    Ok(())
}
