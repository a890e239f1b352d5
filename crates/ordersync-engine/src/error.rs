//! Engine error types.

use thiserror::Error;

use ordersync_connector::ConnectorError;

/// Error raised by the reconciliation engine.
///
/// Per-order failures (a destination lookup or tag application going
/// wrong) are not represented here; they are recorded in the ledger and
/// counted in the pass statistics instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Startup or runtime configuration problem. Fatal to the process.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The issue tag does not exist on the fulfillment side. Fatal to
    /// the process; the operator must create the tag first.
    #[error("tag '{name}' not found in fulfillment service")]
    TagNotResolved { name: String },

    /// The commerce platform could not be scanned. Aborts the current
    /// pass without advancing the watermark.
    #[error("source scan failed: {0}")]
    SourceUnavailable(#[source] ConnectorError),

    /// Ledger persistence failure.
    #[error("ledger error: {0}")]
    Ledger(#[from] sqlx::Error),
}

impl SyncError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        SyncError::Configuration {
            message: message.into(),
        }
    }

    /// Whether the error should terminate the whole process rather than
    /// just the current pass.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Configuration { .. } | SyncError::TagNotResolved { .. }
        )
    }
}

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SyncError::configuration("missing base url").is_fatal());
        assert!(SyncError::TagNotResolved {
            name: "Address Issue".to_string()
        }
        .is_fatal());

        let scan_err =
            SyncError::SourceUnavailable(ConnectorError::connection_failed("refused"));
        assert!(!scan_err.is_fatal());
    }

    #[test]
    fn test_display() {
        let err = SyncError::TagNotResolved {
            name: "Address Issue".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "tag 'Address Issue' not found in fulfillment service"
        );
    }
}
