//! Error taxonomy for the sync job.
//!
//! Three classes are fatal for a single tick (configuration, sheet access,
//! tracking service); per-field extraction problems are plain values that
//! never cross a tick boundary; anything else is unexpected and handled by
//! the scheduler's backoff.

use thiserror::Error;

/// Failure classes for one sync tick.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing/malformed configuration, or no resolvable tracking session.
    /// Raised before any sheet call.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("sheet access error: {0}")]
    Sheet(#[from] SheetError),

    #[error("tracking service error: {0}")]
    Tracking(#[from] TrackingError),

    /// Unexpected failure; the scheduler backs off before polling resumes.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures talking to the spreadsheet service.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("spreadsheet not found: {0}")]
    SpreadsheetNotFound(String),

    #[error("tab not found: {0}")]
    TabNotFound(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Failures talking to the experiment-tracking service.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("api error: {0}")]
    Api(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Per-field extraction failure.
///
/// Recovered locally: the failing field becomes an empty cell, the row and
/// the batch continue.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("field '{key}' holds a nested value that cannot be rendered as a cell")]
    Unrenderable { key: String },

    #[error("field '{key}' is not a valid timestamp")]
    BadTimestamp { key: String },
}
