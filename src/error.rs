use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures surfaced by record loading and savings computation.
///
/// Degraded fields and zero denominators are recovered where they occur and
/// never show up here.
#[derive(Debug, Error)]
pub enum SavingsError {
    #[error("no billing record collection was supplied")]
    MissingRecords,

    #[error("unsupported cost export format: {} (expected .csv, .json, .jsonl or .ndjson)", .0.display())]
    UnsupportedInput(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("report period starts ({start}) after it ends ({end})")]
    InvalidPeriod {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

pub type Result<T> = std::result::Result<T, SavingsError>;
