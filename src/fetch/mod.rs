//! Fetch adapter: enumerate a channel's items and fetch single items through
//! the external fetch tool.
//!
//! Fetching makes one attempt with the baseline arguments. When the tool's
//! diagnostics show a known streaming failure it gets exactly one more
//! attempt with the fallback arguments (see [`crate::retry`]); there is no
//! backoff loop beyond that.

pub(crate) mod args;
pub mod error;
pub mod process;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::capability::{Capabilities, FormatSelection, Postprocess, RuntimeSelection};
use crate::retry::{self, Attempt, RetryAction};

pub use error::{FetchError, FetchFailed};
pub use process::ToolCommand;

/// Result of a successful item fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Produced files in the order the tool reported them.
    pub produced_paths: Vec<PathBuf>,
    pub diagnostic_text: String,
}

/// Fetch operations the controller depends on.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Ids of the first `limit` items under a channel, in the tool's native
    /// order. `limit` must be positive.
    async fn list_identifiers(
        &self,
        channel_locator: &str,
        limit: i64,
        runtime: &RuntimeSelection,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, FetchError>;

    /// Fetch one item into `output_dir`.
    async fn fetch_item(
        &self,
        item_locator: &str,
        output_dir: &Path,
        runtime: &RuntimeSelection,
        format: &FormatSelection,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchFailed>;
}

/// [`Fetcher`] backed by yt-dlp (or a compatible tool).
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    tool: ToolCommand,
    postprocess: Postprocess,
    sleep: Option<Duration>,
}

impl YtDlpFetcher {
    pub fn new(caps: &Capabilities, sleep: Duration) -> Self {
        Self {
            tool: caps.tool.clone(),
            postprocess: caps.postprocess(),
            sleep: (!sleep.is_zero()).then_some(sleep),
        }
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn list_identifiers(
        &self,
        channel_locator: &str,
        limit: i64,
        runtime: &RuntimeSelection,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, FetchError> {
        if limit <= 0 {
            return Err(FetchError::InvalidArgument("limit must be > 0".into()));
        }
        // The tool can't address more items than this anyway.
        let limit = u32::try_from(limit).unwrap_or(u32::MAX);

        let args = args::list_args(channel_locator, limit, runtime);
        let output = process::run_tool(&self.tool, &args, cancel).await?;
        if let Some(e) = output.exit_error(&self.tool) {
            return Err(e);
        }

        let ids: Vec<String> = output
            .stdout_lines
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();
        tracing::debug!(channel = %channel_locator, count = ids.len(), "Listed channel items");
        Ok(ids)
    }

    async fn fetch_item(
        &self,
        item_locator: &str,
        output_dir: &Path,
        runtime: &RuntimeSelection,
        format: &FormatSelection,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchFailed> {
        let base = args::fetch_base_args(output_dir, runtime, format, self.postprocess, self.sleep);

        let (result, attempt) = retry::with_single_fallback(
            |result: &Result<process::ToolOutput, process::ToolInterrupted>| match result {
                Ok(output) => retry::classify_diagnostics(&output.diagnostics),
                Err(_) => RetryAction::Abort,
            },
            |attempt| {
                let mut args = base.clone();
                if attempt == Attempt::Fallback {
                    args.extend(args::FALLBACK_EXTRAS.iter().map(|s| s.to_string()));
                }
                args.push(item_locator.to_string());
                async move { process::run_tool(&self.tool, &args, cancel).await }
            },
        )
        .await;

        let failed = |partial: Vec<String>, cause: FetchError| FetchFailed {
            locator: item_locator.to_string(),
            attempts: attempt.number(),
            partial: partial.into_iter().map(PathBuf::from).collect(),
            cause,
        };

        match result {
            Ok(output) => match output.exit_error(&self.tool) {
                Some(cause) => Err(failed(output.stdout_lines, cause)),
                None => Ok(FetchOutcome {
                    produced_paths: output.stdout_lines.into_iter().map(PathBuf::from).collect(),
                    diagnostic_text: output.diagnostics,
                }),
            },
            Err(interrupted) => Err(failed(interrupted.stdout_lines, interrupted.cause)),
        }
    }
}
