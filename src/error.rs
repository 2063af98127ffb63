/// Error types for the ledger and its persistence gateways.
use chrono::{DateTime, Local};
use rusqlite::ErrorCode;
use thiserror::Error;

/// Failures reported by a persistence gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{kind} '{id}' missing from storage")]
    Missing { kind: &'static str, id: String },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Whether the same write may succeed if tried again.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Unavailable(_) => true,
            GatewayError::Sqlite(err) => matches!(
                err.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            ),
            GatewayError::Missing { .. } => false,
        }
    }
}

/// Failures of a ledger operation. Everything except `PersistenceFailure`
/// is raised before any state is touched.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid range: end {end} is not after start {start}")]
    InvalidRange {
        start: DateTime<Local>,
        end: DateTime<Local>,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] GatewayError),
}

impl LedgerError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        LedgerError::ValidationFailed(message.into())
    }
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use rusqlite::ffi;

    use super::*;

    fn sqlite_failure(code: i32) -> GatewayError {
        GatewayError::Sqlite(rusqlite::Error::SqliteFailure(ffi::Error::new(code), None))
    }

    #[test]
    fn busy_and_outages_are_transient() {
        assert!(GatewayError::Unavailable("offline".to_string()).is_transient());
        assert!(sqlite_failure(ffi::SQLITE_BUSY).is_transient());
        assert!(sqlite_failure(ffi::SQLITE_LOCKED).is_transient());
    }

    #[test]
    fn permanent_failures_are_not_transient() {
        let missing = GatewayError::Missing {
            kind: "task",
            id: "42".to_string(),
        };
        assert!(!missing.is_transient());
        assert!(!sqlite_failure(ffi::SQLITE_CONSTRAINT).is_transient());
    }
}
