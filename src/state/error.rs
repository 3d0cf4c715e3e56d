//! Error types for the idempotency ledger.

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur while reading or writing the ledger.
#[derive(Error, Debug)]
pub enum StateError {
    /// Failed to open or create the database file.
    #[error("Failed to open ledger at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// A connection setting could not be applied after opening.
    #[error("Failed to set {setting} on the ledger connection: {source}")]
    Configure {
        setting: &'static str,
        source: rusqlite::Error,
    },

    /// Creating or versioning the table failed.
    #[error("Ledger schema setup failed: {0}")]
    Schema(#[source] rusqlite::Error),

    /// The schema on disk is newer than this binary understands.
    #[error("Ledger schema version {found} is newer than supported version {expected}")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },

    /// Another connection held the write lock past the busy timeout.
    #[error("Ledger is locked by another writer during {operation}")]
    Busy { operation: &'static str },

    #[error("Ledger {operation} failed: {source}")]
    Query {
        operation: &'static str,
        source: rusqlite::Error,
    },

    /// A thread panicked while holding the connection.
    #[error("Ledger connection is poisoned")]
    Poisoned,

    /// Failed to join the blocking open task.
    #[error("Failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),
}

impl StateError {
    /// Map a failed statement to `Busy` or `Query`, for use with `map_err`.
    pub(crate) fn query(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| {
            if is_lock_contention(&source) {
                Self::Busy { operation }
            } else {
                Self::Query { operation, source }
            }
        }
    }

    /// Whether retrying later could succeed.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

fn is_lock_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), None)
    }

    #[test]
    fn test_busy_and_locked_are_contention() {
        for code in [ffi::SQLITE_BUSY, ffi::SQLITE_LOCKED] {
            let err = StateError::query("mark-synced")(sqlite_failure(code));
            assert!(err.is_busy(), "{err:?}");
            assert_eq!(err.to_string(), "Ledger is locked by another writer during mark-synced");
        }
    }

    #[test]
    fn test_other_failures_stay_queries() {
        let err = StateError::query("check")(sqlite_failure(ffi::SQLITE_READONLY));
        assert!(!err.is_busy());
        assert!(matches!(err, StateError::Query { operation: "check", .. }));
        assert!(err.to_string().starts_with("Ledger check failed: "));
    }
}
