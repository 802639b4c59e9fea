//! Error types for docferry-fetch.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("response stream failed: {0}")]
    Stream(String),

    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("server returned an empty body")]
    EmptyBody,

    #[error("file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Verify(#[from] docferry_verify::VerifyError),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },

    #[error(transparent)]
    Ledger(#[from] docferry_ledger::LedgerError),
}

impl FetchError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Network-level failures and overload/server-error statuses are
    /// transient; client errors, local I/O and integrity failures are not.
    /// An empty body counts as transient: the target class of server
    /// occasionally emits a zero-length placeholder for a document that
    /// exists.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout
            | FetchError::Connect(_)
            | FetchError::Stream(_)
            | FetchError::EmptyBody => true,
            FetchError::Status { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            FetchError::Io { .. }
            | FetchError::Verify(_)
            | FetchError::Cancelled
            | FetchError::RetriesExhausted { .. }
            | FetchError::Ledger(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
