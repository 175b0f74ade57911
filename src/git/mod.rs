//! Git access layer
//!
//! `source` defines the abstract commit/blame data source and its
//! git2-backed implementation; `history` streams ordered, chunked,
//! pre-filtered commit metadata on top of it.

pub mod history;
pub mod source;

pub use history::{stream_commits, CommitStream, StreamParams};
pub use source::{
    BlameHunk, CommitRange, GitSource, RawCommit, SourceOptions, VcsSource,
};
