//! Long-lived trigger surface: `POST /sync` runs a channel sync and reports
//! its counters as JSON.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::fetch::Fetcher;
use crate::shutdown::RequestDeadline;
use crate::state::SqliteLedger;
use crate::sync::{SyncController, SyncResult, SyncSettings};
use crate::upload::Uploader;

/// Shared state for every request. Ledger connections are not shared: each
/// request opens its own.
pub struct ServerContext {
    pub fetcher: Arc<dyn Fetcher>,
    pub uploader: Arc<dyn Uploader>,
    pub settings: Arc<SyncSettings>,
    pub db_path: PathBuf,
    /// Upper bound on one request's channel sync.
    pub timeout: Duration,
    /// Cancelled on process shutdown; each request runs under a child token.
    pub shutdown: CancellationToken,
}

#[derive(Debug, Deserialize)]
struct SyncBody {
    channel_id: String,
    limit: i64,
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    #[serde(flatten)]
    result: SyncResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn router(ctx: Arc<ServerContext>) -> Router {
    Router::new()
        .route("/sync", post(handle_sync))
        .with_state(ctx)
}

/// Bind `addr` and serve until the shutdown token fires.
pub async fn serve(addr: &str, ctx: ServerContext) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %listener.local_addr()?, "Controller listening");

    let shutdown = ctx.shutdown.clone();
    axum::serve(listener, router(Arc::new(ctx)))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Controller stopped");
    Ok(())
}

fn respond(status: StatusCode, result: SyncResult, error: Option<String>) -> Response {
    (status, Json(SyncResponse { result, error })).into_response()
}

async fn handle_sync(State(ctx): State<Arc<ServerContext>>, body: Bytes) -> Response {
    let Ok(req) = serde_json::from_slice::<SyncBody>(&body) else {
        return (StatusCode::BAD_REQUEST, "invalid JSON body").into_response();
    };
    if req.channel_id.trim().is_empty() || req.limit <= 0 {
        return (
            StatusCode::BAD_REQUEST,
            "channel_id and positive limit required",
        )
            .into_response();
    }

    let ledger = match SqliteLedger::open(&ctx.db_path).await {
        Ok(ledger) => ledger,
        Err(e) => {
            // The detail names local paths; it stays in the log.
            tracing::error!(error = %e, "Failed to open ledger");
            return respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                SyncResult::default(),
                Some("ledger unavailable".to_string()),
            );
        }
    };
    let controller = SyncController::new(
        ctx.fetcher.clone(),
        ctx.uploader.clone(),
        Arc::new(ledger),
        ctx.settings.clone(),
    );

    let deadline = RequestDeadline::start(&ctx.shutdown, ctx.timeout);

    tracing::info!(channel_id = %req.channel_id, limit = req.limit, "Sync requested");
    let outcome = controller
        .sync_channel(&req.channel_id, req.limit, deadline.token())
        .await;

    match outcome {
        Ok(result) => {
            tracing::info!(?result, "Sync finished");
            respond(StatusCode::OK, result, None)
        }
        Err(failure) => {
            let timed_out = failure.error.is_cancelled() && deadline.expired();
            let message = if timed_out {
                format!(
                    "sync timed out after {}s: {}",
                    ctx.timeout.as_secs(),
                    failure.error
                )
            } else {
                failure.error.to_string()
            };
            tracing::error!(result = ?failure.result, error = %message, "Sync failed");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                failure.result,
                Some(message),
            )
        }
    }
}
