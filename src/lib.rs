//! Gitally - per-author and per-file git contribution statistics
//!
//! Attributes every line of tracked content to the commit/author that
//! last changed it, merges duplicate author identities, and derives
//! normalized metrics (percentages, age, stability) that stay
//! well-defined across renames, copies, and large histories.

pub mod attribution;
pub mod cli;
pub mod error;
pub mod filters;
pub mod git;
pub mod identity;
pub mod models;
pub mod perf;
pub mod pipeline;
pub mod reporters;
pub mod settings;
pub mod stats;

pub use error::{ConfigError, Diagnostic, RepoError};
pub use pipeline::{BatchResult, RepoAnalyzer, RepoResult};
pub use settings::Settings;
