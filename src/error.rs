use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Inventory error: {0}")]
    Inventory(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Remote API error: {0}")]
    Remote(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

pub type Result<T> = std::result::Result<T, QaError>;

/// Handled failure kinds. None of these ever escapes the resolution engine;
/// they label trace steps and result errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionIssue {
    /// No usable entities were extracted from the question.
    ParseAmbiguity,
    /// The inventory had no descriptor for the intent.
    SourceNotFound,
    /// Network failure, non-2xx status or unparsable payload.
    RemoteUnavailable,
    /// A well-formed query returned zero rows.
    QueryEmpty,
    /// The query could not be carried out (missing columns, store failure, ...).
    QueryExecutionError(String),
}

impl fmt::Display for ResolutionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionIssue::ParseAmbiguity => write!(f, "ParseAmbiguity"),
            ResolutionIssue::SourceNotFound => write!(f, "SourceNotFound"),
            ResolutionIssue::RemoteUnavailable => write!(f, "RemoteUnavailable"),
            ResolutionIssue::QueryEmpty => write!(f, "QueryEmpty"),
            ResolutionIssue::QueryExecutionError(msg) => write!(f, "QueryExecutionError({})", msg),
        }
    }
}
