//! Error taxonomy for a sync run.
//!
//! - [`SyncError::TransientFetch`] aborts the current run; the next scheduled
//!   run re-reads everything.
//! - [`SyncError::BatchTransport`] fails a single batch; earlier batches stay
//!   committed and later ones are still sent.
//! - Individually rejected operations are not errors on their own; they are
//!   collected as [`Rejection`]s and surfaced through [`SyncError::Incomplete`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetch from {url} failed: {reason}")]
    TransientFetch { url: String, reason: String },

    #[error("batch of {size} operations failed: {reason}")]
    BatchTransport { size: usize, reason: String },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("run incomplete: {rejected} operations rejected, {failed_batches} batches failed")]
    Incomplete {
        rejected: usize,
        failed_batches: usize,
    },
}

impl SyncError {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::TransientFetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the whole run was aborted by this error.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            SyncError::TransientFetch { .. } | SyncError::InvalidUrl(_) | SyncError::Config(_)
        )
    }
}

/// An operation the catalog refused inside an otherwise successful batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub id: String,
    pub status: u16,
    pub body: String,
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_errors_abort_the_run() {
        assert!(SyncError::fetch("http://x", "503").is_fatal_to_run());
        assert!(
            !SyncError::BatchTransport {
                size: 3,
                reason: "timeout".into()
            }
            .is_fatal_to_run()
        );
    }

    #[test]
    fn test_incomplete_message() {
        let err = SyncError::Incomplete {
            rejected: 2,
            failed_batches: 1,
        };
        assert_eq!(
            err.to_string(),
            "run incomplete: 2 operations rejected, 1 batches failed"
        );
    }
}
