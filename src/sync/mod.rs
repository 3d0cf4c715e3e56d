//! Sync controller.
//!
//! Turns a channel or single-item request into a strictly sequential run of
//! the per-item pipeline (see [`item`]). A channel sync stops at the first
//! item that fails and hands back the counters accumulated so far; ledger
//! records written for earlier items stay in place.

pub mod error;
mod item;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::capability::{FormatSelection, RuntimeSelection};
use crate::fetch::Fetcher;
use crate::state::Ledger;
use crate::upload::Uploader;
use crate::urls;

pub use error::{Stage, SyncError, SyncFailure};
use item::ItemOutcome;

/// A sync request: one channel (bounded by `limit`) or one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    Channel { channel_id: String, limit: i64 },
    SingleItem { item_id: String },
}

/// Counters for one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub considered: usize,
    pub skipped: usize,
    /// Produced files, not items.
    pub downloaded: usize,
    pub uploaded: usize,
}

/// Process-wide fetch settings resolved at startup.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub output_dir: PathBuf,
    pub runtime: RuntimeSelection,
    pub format: FormatSelection,
}

#[derive(Clone)]
pub struct SyncController {
    fetcher: Arc<dyn Fetcher>,
    uploader: Arc<dyn Uploader>,
    ledger: Arc<dyn Ledger>,
    settings: Arc<SyncSettings>,
}

impl SyncController {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        uploader: Arc<dyn Uploader>,
        ledger: Arc<dyn Ledger>,
        settings: Arc<SyncSettings>,
    ) -> Self {
        Self {
            fetcher,
            uploader,
            ledger,
            settings,
        }
    }

    pub async fn run(
        &self,
        request: &SyncRequest,
        cancel: &CancellationToken,
    ) -> Result<SyncResult, SyncFailure> {
        match request {
            SyncRequest::Channel { channel_id, limit } => {
                self.sync_channel(channel_id, *limit, cancel).await
            }
            SyncRequest::SingleItem { item_id } => self.sync_item(item_id, cancel).await,
        }
    }

    /// Sync up to `limit` items of a channel, in the fetch tool's listing
    /// order.
    pub async fn sync_channel(
        &self,
        channel_id: &str,
        limit: i64,
        cancel: &CancellationToken,
    ) -> Result<SyncResult, SyncFailure> {
        let mut result = SyncResult::default();
        let fail = |result: SyncResult, error: SyncError| SyncFailure { result, error };

        let channel_id = channel_id.trim();
        if channel_id.is_empty() {
            return Err(fail(result, SyncError::InvalidArgument("channel id is empty".into())));
        }
        if limit <= 0 {
            return Err(fail(result, SyncError::InvalidArgument("limit must be > 0".into())));
        }
        if cancel.is_cancelled() {
            return Err(fail(result, SyncError::Cancelled));
        }

        let ids = self
            .fetcher
            .list_identifiers(
                &urls::channel_locator(channel_id),
                limit,
                &self.settings.runtime,
                cancel,
            )
            .await
            .map_err(|source| {
                fail(
                    result,
                    SyncError::List {
                        channel: channel_id.to_string(),
                        source,
                    },
                )
            })?;

        result.considered = ids.len();
        tracing::info!(channel_id, count = ids.len(), "Listed channel");

        for id in &ids {
            if cancel.is_cancelled() {
                return Err(fail(result, SyncError::Cancelled));
            }
            match item::run_item(self, id, Some(channel_id), &mut result, cancel).await {
                Ok(ItemOutcome::Skipped) => result.skipped += 1,
                Ok(ItemOutcome::Synced) => {}
                Err(error) => {
                    tracing::warn!(item_id = %id, stage = ?error.stage(), error = %error, "Item failed; stopping channel sync");
                    return Err(fail(result, error));
                }
            }
        }

        Ok(result)
    }

    /// Sync a single item. The item is recorded without a channel.
    pub async fn sync_item(
        &self,
        item_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SyncResult, SyncFailure> {
        let mut result = SyncResult::default();
        let item_id = item_id.trim();
        if item_id.is_empty() {
            return Err(SyncFailure {
                result,
                error: SyncError::InvalidArgument("item id is empty".into()),
            });
        }
        if cancel.is_cancelled() {
            return Err(SyncFailure {
                result,
                error: SyncError::Cancelled,
            });
        }

        result.considered = 1;
        match item::run_item(self, item_id, None, &mut result, cancel).await {
            Ok(_) => Ok(result),
            Err(error) => Err(SyncFailure { result, error }),
        }
    }
}
