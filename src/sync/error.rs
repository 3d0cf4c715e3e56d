use thiserror::Error;

use crate::fetch::{FetchError, FetchFailed};
use crate::state::StateError;
use crate::upload::UploadError;

use super::SyncResult;

/// Stage of the per-item pipeline an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    List,
    Check,
    Fetch,
    Upload,
    MarkSynced,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::List => "list",
            Stage::Check => "check",
            Stage::Fetch => "fetch",
            Stage::Upload => "upload",
            Stage::MarkSynced => "mark-synced",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Listing channel {channel} failed: {source}")]
    List {
        channel: String,
        source: FetchError,
    },

    #[error("{source}")]
    Fetch {
        item_id: String,
        source: FetchFailed,
    },

    #[error("No files produced for {item_id}")]
    NoFilesProduced { item_id: String },

    #[error("Uploading {path} for {item_id} failed: {source}")]
    Upload {
        item_id: String,
        path: String,
        source: UploadError,
    },

    #[error("Ledger {stage} failed for {item_id}: {source}")]
    Store {
        item_id: String,
        stage: Stage,
        source: StateError,
    },

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// The pipeline stage that failed. Argument and cancellation errors carry
    /// no stage.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SyncError::InvalidArgument(_) | SyncError::Cancelled => None,
            SyncError::List { .. } => Some(Stage::List),
            SyncError::Fetch { .. } | SyncError::NoFilesProduced { .. } => Some(Stage::Fetch),
            SyncError::Upload { .. } => Some(Stage::Upload),
            SyncError::Store { stage, .. } => Some(*stage),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            SyncError::Cancelled => true,
            SyncError::List { source, .. } => matches!(source, FetchError::Cancelled),
            SyncError::Fetch { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// A failed sync together with the counters accumulated before the failure.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SyncFailure {
    pub result: SyncResult,
    #[source]
    pub error: SyncError,
}
