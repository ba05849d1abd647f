//! Typed error kinds for per-file and per-record failures.
//! Stage entry points still return `anyhow::Result`; these are what gets collected into reports.

use std::path::PathBuf;
use thiserror::Error;

/// A compressed archive could not be opened or decoded. Aborts that file only.
#[derive(Debug, Error)]
#[error("archive read failure in {}: {source}", path.display())]
pub struct ArchiveError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A filtered line does not follow `<project> <title> <views> <bytes>|<filename>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing '|' filename separator")]
    MissingSeparator,
    #[error("expected 4 whitespace-separated fields, found {0}")]
    FieldCount(usize),
    #[error("filename {0:?} has no '-' delimited timestamp segment")]
    FilenameSchema(String),
    #[error("invalid date segment {0:?}")]
    InvalidDate(String),
    #[error("views field {0:?} is not an unsigned integer")]
    Views(String),
}

/// A title seen in the data has no entry in the title registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no registry entry for title {0:?}")]
pub struct MissingTitle(pub String);
