//! Per-item pipeline: ledger check, fetch, upload each path, mark synced.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use super::error::{Stage, SyncError};
use super::{SyncController, SyncResult};
use crate::state::{ItemRecord, StateError};
use crate::urls;

#[derive(Debug)]
enum ItemState {
    NotStarted,
    Checked { already_synced: bool },
    Fetched { paths: Vec<PathBuf> },
    Uploading { paths: Vec<PathBuf>, next: usize },
    MarkedSynced,
    Skipped,
}

/// How an item left the pipeline when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemOutcome {
    Synced,
    Skipped,
}

/// Drive one item through the pipeline, adding downloaded/uploaded counts to
/// `result` as they happen.
///
/// The ledger is written only after every produced path uploaded. Any error
/// leaves the item unmarked; paths uploaded before the error are not
/// rolled back.
pub(crate) async fn run_item(
    controller: &SyncController,
    item_id: &str,
    channel_id: Option<&str>,
    result: &mut SyncResult,
    cancel: &CancellationToken,
) -> Result<ItemOutcome, SyncError> {
    let store_err = |stage: Stage| {
        move |source: StateError| {
            if source.is_busy() {
                tracing::warn!(item_id, %stage, "Ledger busy, another sync may be writing");
            }
            SyncError::Store {
                item_id: item_id.to_string(),
                stage,
                source,
            }
        }
    };

    let mut state = ItemState::NotStarted;
    loop {
        tracing::trace!(item_id, ?state, "Item state");
        state = match state {
            ItemState::NotStarted => {
                let already_synced = controller
                    .ledger
                    .is_synced(item_id)
                    .await
                    .map_err(store_err(Stage::Check))?;
                ItemState::Checked { already_synced }
            }

            ItemState::Checked {
                already_synced: true,
            } => ItemState::Skipped,

            ItemState::Checked {
                already_synced: false,
            } => {
                let settings = &controller.settings;
                let outcome = controller
                    .fetcher
                    .fetch_item(
                        &urls::item_locator(item_id),
                        &settings.output_dir,
                        &settings.runtime,
                        &settings.format,
                        cancel,
                    )
                    .await
                    .map_err(|source| {
                        if let Some(reason) = source.cause.diagnostics().and_then(last_line) {
                            tracing::warn!(item_id, attempts = source.attempts, reason, "Fetch tool failed");
                        }
                        SyncError::Fetch {
                            item_id: item_id.to_string(),
                            source,
                        }
                    })?;

                if !outcome.diagnostic_text.is_empty() {
                    tracing::debug!(item_id, diagnostics = %outcome.diagnostic_text.trim_end(), "Fetch tool diagnostics");
                }
                if outcome.produced_paths.is_empty() {
                    return Err(SyncError::NoFilesProduced {
                        item_id: item_id.to_string(),
                    });
                }
                result.downloaded += outcome.produced_paths.len();
                ItemState::Fetched {
                    paths: outcome.produced_paths,
                }
            }

            ItemState::Fetched { paths } => ItemState::Uploading { paths, next: 0 },

            ItemState::Uploading { paths, next } if next < paths.len() => {
                let path = &paths[next];
                // The uploader has no notion of the request deadline.
                let uploaded = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                    uploaded = controller.uploader.upload(path) => uploaded,
                };
                uploaded.map_err(|source| SyncError::Upload {
                    item_id: item_id.to_string(),
                    path: path.display().to_string(),
                    source,
                })?;
                result.uploaded += 1;
                ItemState::Uploading {
                    paths,
                    next: next + 1,
                }
            }

            ItemState::Uploading { .. } => {
                controller
                    .ledger
                    .mark_synced(item_id, channel_id)
                    .await
                    .map_err(store_err(Stage::MarkSynced))?;
                ItemState::MarkedSynced
            }

            ItemState::MarkedSynced => {
                tracing::info!(item_id, "Synced");
                return Ok(ItemOutcome::Synced);
            }

            ItemState::Skipped => {
                // Only read for the log line; a failure here doesn't undo the skip.
                let record = controller
                    .ledger
                    .get_record(item_id)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::debug!(item_id, error = %e, "Could not read ledger record");
                        None
                    });
                log_skip(item_id, record.as_ref());
                return Ok(ItemOutcome::Skipped);
            }
        };
    }
}

fn log_skip(item_id: &str, record: Option<&ItemRecord>) {
    match record {
        Some(record) => tracing::info!(
            item_id,
            channel = record.channel_id.as_deref().unwrap_or("-"),
            synced_at = %record.synced_at.to_rfc3339(),
            "Already synced, skipping"
        ),
        None => tracing::info!(item_id, "Already synced, skipping"),
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rfind(|l| !l.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_line_skips_trailing_blanks() {
        assert_eq!(
            last_line("[youtube] abc: Downloading\nERROR: HTTP Error 403: Forbidden\n\n"),
            Some("ERROR: HTTP Error 403: Forbidden")
        );
        assert_eq!(last_line("  \n"), None);
    }
}
