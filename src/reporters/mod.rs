//! Output rendering
//!
//! Reporters consume a finished `BatchResult` and write it somewhere.
//! They never mutate analysis data; everything they print is derivable
//! from the tables.

pub mod json;
pub mod text;

use serde::{Deserialize, Serialize};

/// Output format selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
