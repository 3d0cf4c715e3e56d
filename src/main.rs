//! yttransfer: sync videos from a source channel to a destination platform.
//!
//! Items are enumerated and fetched with an external tool (yt-dlp), handed to
//! an uploader, and recorded in a SQLite ledger so repeated runs never
//! re-process an item that already synced. Runs once from the command line
//! or as a small HTTP controller.

#![warn(clippy::all)]

mod capability;
mod cli;
mod config;
mod fetch;
pub mod retry;
mod server;
mod shutdown;
mod state;
mod sync;
mod types;
mod upload;
mod urls;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use capability::Capabilities;
use config::RunMode;
use fetch::{Fetcher, YtDlpFetcher};
use state::{Ledger, SqliteLedger};
use sync::{Stage, SyncController, SyncSettings};
use upload::{HttpUploader, LogUploader, Uploader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let config = config::Config::from_cli(cli)?;
    tracing::debug!(?config, "Loaded configuration");

    let caps = Capabilities::probe(config.fetch_tool.clone()).await?;

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;

    let (runtime, warning) = capability::resolve_runtime(&config.js_runtime, &caps, |name| {
        capability::has_executable(name)
    })?;
    if let Some(warning) = warning {
        tracing::warn!("{}", warning);
    }
    let (format, warning) = capability::resolve_format(&config.format, &caps);
    if let Some(warning) = warning {
        tracing::warn!("{}", warning);
    }
    tracing::info!(
        tool = %caps.tool,
        runtime = runtime.as_arg().unwrap_or("<tool default>"),
        format = format.as_arg().unwrap_or("<tool default>"),
        postprocess = ?caps.postprocess(),
        "Fetch settings resolved"
    );

    let ledger = SqliteLedger::open(&config.db_path).await?;
    ledger.ensure_schema().await?;
    tracing::debug!(path = %ledger.path().display(), "Ledger ready");

    let fetcher: Arc<dyn Fetcher> = Arc::new(YtDlpFetcher::new(&caps, config.sleep));
    let uploader: Arc<dyn Uploader> = match &config.upload_endpoint {
        Some(endpoint) => {
            // No single upload may outlive a whole sync.
            let client = reqwest::Client::builder()
                .timeout(config.sync_timeout)
                .build()
                .context("Failed to build the upload HTTP client")?;
            Arc::new(HttpUploader::new(client, endpoint.clone(), config.platform))
        }
        None => Arc::new(LogUploader::new(config.platform)),
    };
    let settings = Arc::new(SyncSettings {
        output_dir: config.output_dir.clone(),
        runtime,
        format,
    });

    let shutdown_token = shutdown::install_signal_handler();

    match config.mode {
        RunMode::Serve { addr } => {
            // Requests open their own ledger connections.
            drop(ledger);
            let ctx = server::ServerContext {
                fetcher,
                uploader,
                settings,
                db_path: config.db_path,
                timeout: config.sync_timeout,
                shutdown: shutdown_token,
            };
            server::serve(&addr, ctx).await
        }
        RunMode::Once(request) => {
            let controller = SyncController::new(fetcher, uploader, Arc::new(ledger), settings);
            match controller.run(&request, &shutdown_token).await {
                Ok(result) => {
                    tracing::info!(
                        considered = result.considered,
                        skipped = result.skipped,
                        downloaded = result.downloaded,
                        uploaded = result.uploaded,
                        "Sync complete"
                    );
                    Ok(())
                }
                Err(failure) => {
                    tracing::error!(
                        considered = failure.result.considered,
                        skipped = failure.result.skipped,
                        downloaded = failure.result.downloaded,
                        uploaded = failure.result.uploaded,
                        stage = failure.error.stage().as_ref().map(Stage::as_str).unwrap_or("-"),
                        "Sync failed"
                    );
                    Err(failure.into())
                }
            }
        }
    }
}
