//! Exclusion filter
//!
//! Compiled glob/regex rules over authors, emails, messages, files, and
//! revisions. Rules are case-insensitive globs by default; a `re:`
//! prefix switches a rule to a case-insensitive regex. All patterns are
//! compiled up front so a malformed rule surfaces as a
//! `ConfigError::InvalidPattern` before any repository is processed.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::{Regex, RegexBuilder};
use rustc_hash::FxHashSet;

use crate::error::ConfigError;
use crate::settings::Settings;

/// One compiled rule list (globs plus optional regexes).
#[derive(Debug)]
pub struct RuleSet {
    globs: GlobSet,
    regexes: Vec<Regex>,
    /// Raw glob patterns, kept for prefix matching on revisions
    raw_globs: Vec<String>,
    empty: bool,
}

impl RuleSet {
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        let mut regexes = Vec::new();
        let mut raw_globs = Vec::new();

        for pattern in patterns {
            if let Some(expr) = pattern.strip_prefix("re:") {
                let re = RegexBuilder::new(expr)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })?;
                regexes.push(re);
            } else {
                let glob = GlobBuilder::new(pattern)
                    .case_insensitive(true)
                    .literal_separator(false)
                    .build()
                    .map_err(|e| ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })?;
                builder.add(glob);
                raw_globs.push(pattern.clone());
            }
        }

        let globs = builder.build().map_err(|e| ConfigError::InvalidPattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })?;

        Ok(Self {
            globs,
            regexes,
            raw_globs,
            empty: patterns.is_empty(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Whole-value match against any rule.
    pub fn is_match(&self, text: &str) -> bool {
        if self.empty {
            return false;
        }
        self.globs.is_match(text) || self.regexes.iter().any(|re| re.is_match(text))
    }
}

/// Compiled exclusion rules consulted by every other component.
#[derive(Debug)]
pub struct ExclusionFilter {
    pub authors: RuleSet,
    pub emails: RuleSet,
    pub messages: RuleSet,
    pub files: RuleSet,
    revisions: RuleSet,
    /// External plain sha set (`--ignore-revs-file` style), exact full shas
    ignore_revs: FxHashSet<String>,
}

impl ExclusionFilter {
    /// Compile all rule sets from validated settings. Malformed patterns
    /// fail here, at setup time, never mid-run.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let ignore_revs = settings.load_ignore_revs()?;
        Ok(Self {
            authors: RuleSet::new(&settings.ex_authors)?,
            emails: RuleSet::new(&settings.ex_emails)?,
            messages: RuleSet::new(&settings.ex_messages)?,
            files: RuleSet::new(&settings.ex_files)?,
            revisions: RuleSet::new(&settings.ex_revisions)?,
            ignore_revs,
        })
    }

    pub fn is_message_excluded(&self, summary: &str) -> bool {
        self.messages.is_match(summary)
    }

    pub fn is_file_excluded(&self, path: &str) -> bool {
        self.files.is_match(path)
    }

    /// Revisions match by exact sha (ignore-revs set), sha prefix (plain
    /// hex rules), or glob/regex over the full sha.
    pub fn is_revision_excluded(&self, sha: &str) -> bool {
        if self.ignore_revs.contains(sha) {
            return true;
        }
        if self
            .raw_revision_prefixes()
            .any(|prefix| sha.starts_with(prefix))
        {
            return true;
        }
        self.revisions.is_match(sha)
    }

    /// Whether the commit should be dropped from blame regardless of
    /// author/message matching.
    pub fn is_ignored_rev(&self, sha: &str) -> bool {
        self.ignore_revs.contains(sha)
    }

    fn raw_revision_prefixes(&self) -> impl Iterator<Item = &str> {
        self.revisions
            .raw_globs
            .iter()
            .map(String::as_str)
            .filter(|p| p.chars().all(|c| c.is_ascii_hexdigit()))
    }
}
