use std::io;

use thiserror::Error;

/// Error type for configuration, transport, persistence, and delivery failures.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("seen store failure: {0}")]
    Store(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("notification failed: {0}")]
    Notify(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, WatchError>;
