//! Comment classification
//!
//! Pluggable per-file-extension heuristic deciding whether a line is a
//! comment. The handling of block comments spanning lines is an
//! explicit configuration choice (`BlockCommentPolicy`), not an assumed
//! default.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// How block comments spanning multiple lines are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BlockCommentPolicy {
    /// Only mark lines whose first non-blank characters open a comment.
    /// Interior lines of a block comment count as code.
    #[default]
    LinePrefixOnly,
    /// Track open/close delimiters so every line inside a block comment
    /// is classified as comment.
    TrackBlocks,
}

/// Comment delimiters for one language.
#[derive(Debug, Clone)]
pub struct CommentSyntax {
    pub line_prefixes: Vec<&'static str>,
    pub block: Option<(&'static str, &'static str)>,
}

impl CommentSyntax {
    fn line(prefixes: &[&'static str]) -> Self {
        Self {
            line_prefixes: prefixes.to_vec(),
            block: None,
        }
    }

    fn with_block(prefixes: &[&'static str], open: &'static str, close: &'static str) -> Self {
        Self {
            line_prefixes: prefixes.to_vec(),
            block: Some((open, close)),
        }
    }
}

/// Extension-keyed registry of comment syntaxes. Extensions without an
/// entry classify every line as code.
#[derive(Debug)]
pub struct CommentRegistry {
    by_extension: FxHashMap<&'static str, CommentSyntax>,
    policy: BlockCommentPolicy,
}

impl CommentRegistry {
    pub fn new(policy: BlockCommentPolicy) -> Self {
        let mut by_extension = FxHashMap::default();

        let c_like = || CommentSyntax::with_block(&["//"], "/*", "*/");
        for ext in [
            "c", "cc", "cpp", "cs", "glsl", "go", "h", "hh", "hpp", "java", "js", "kt", "rs",
            "scala", "swift", "ts", "tsx",
        ] {
            by_extension.insert(ext, c_like());
        }
        for ext in ["py", "rb", "sh", "toml", "yaml", "yml"] {
            by_extension.insert(ext, CommentSyntax::line(&["#"]));
        }
        by_extension.insert("sql", CommentSyntax::line(&["--"]));
        by_extension.insert("css", CommentSyntax::with_block(&[], "/*", "*/"));
        by_extension.insert("html", CommentSyntax::with_block(&[], "<!--", "-->"));
        by_extension.insert("xml", CommentSyntax::with_block(&[], "<!--", "-->"));

        Self {
            by_extension,
            policy,
        }
    }

    /// Register or replace the syntax for an extension.
    pub fn insert(&mut self, extension: &'static str, syntax: CommentSyntax) {
        self.by_extension.insert(extension, syntax);
    }

    /// Classify every line of a file. Returns one flag per input line.
    pub fn classify(&self, path: &str, lines: &[String]) -> Vec<bool> {
        let ext = path.rsplit_once('.').map(|(_, e)| e.to_lowercase());
        let syntax = ext.as_deref().and_then(|e| self.by_extension.get(e));
        let Some(syntax) = syntax else {
            return vec![false; lines.len()];
        };

        match self.policy {
            BlockCommentPolicy::LinePrefixOnly => lines
                .iter()
                .map(|line| starts_with_comment(line, syntax))
                .collect(),
            BlockCommentPolicy::TrackBlocks => classify_tracking_blocks(lines, syntax),
        }
    }
}

fn starts_with_comment(line: &str, syntax: &CommentSyntax) -> bool {
    let trimmed = line.trim_start();
    if syntax.line_prefixes.iter().any(|p| trimmed.starts_with(p)) {
        return true;
    }
    match syntax.block {
        Some((open, _)) => trimmed.starts_with(open),
        None => false,
    }
}

fn classify_tracking_blocks(lines: &[String], syntax: &CommentSyntax) -> Vec<bool> {
    let Some((open, close)) = syntax.block else {
        return lines
            .iter()
            .map(|line| starts_with_comment(line, syntax))
            .collect();
    };

    let mut flags = Vec::with_capacity(lines.len());
    let mut in_block = false;
    for line in lines {
        let trimmed = line.trim();
        if in_block {
            flags.push(true);
            if trimmed.contains(close) {
                in_block = false;
            }
            continue;
        }
        if syntax.line_prefixes.iter().any(|p| trimmed.starts_with(p)) {
            flags.push(true);
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix(open) {
            flags.push(true);
            in_block = !rest.contains(close);
            continue;
        }
        flags.push(false);
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn line_prefixes_per_extension() {
        let reg = CommentRegistry::new(BlockCommentPolicy::LinePrefixOnly);
        let flags = reg.classify("main.py", &lines(&["# a", "x = 1", "  # b"]));
        assert_eq!(flags, vec![true, false, true]);
        let flags = reg.classify("main.rs", &lines(&["// a", "fn x() {}"]));
        assert_eq!(flags, vec![true, false]);
    }

    #[test]
    fn unknown_extension_is_all_code() {
        let reg = CommentRegistry::new(BlockCommentPolicy::LinePrefixOnly);
        let flags = reg.classify("data.bin", &lines(&["# not a comment"]));
        assert_eq!(flags, vec![false]);
    }

    #[test]
    fn prefix_only_policy_ignores_block_interiors() {
        let reg = CommentRegistry::new(BlockCommentPolicy::LinePrefixOnly);
        let flags = reg.classify("x.c", &lines(&["/* start", "interior", "end */", "code;"]));
        assert_eq!(flags, vec![true, false, false, false]);
    }

    #[test]
    fn tracking_policy_marks_block_interiors() {
        let reg = CommentRegistry::new(BlockCommentPolicy::TrackBlocks);
        let flags = reg.classify("x.c", &lines(&["/* start", "interior", "end */", "code;"]));
        assert_eq!(flags, vec![true, true, true, false]);
    }

    #[test]
    fn single_line_block_does_not_leak() {
        let reg = CommentRegistry::new(BlockCommentPolicy::TrackBlocks);
        let flags = reg.classify("x.c", &lines(&["/* one */", "code;"]));
        assert_eq!(flags, vec![true, false]);
    }

    #[test]
    fn custom_extension_is_pluggable() {
        let mut reg = CommentRegistry::new(BlockCommentPolicy::LinePrefixOnly);
        reg.insert("cif", CommentSyntax::line(&["#"]));
        let flags = reg.classify("a.cif", &lines(&["# note", "loop_"]));
        assert_eq!(flags, vec![true, false]);
    }
}
