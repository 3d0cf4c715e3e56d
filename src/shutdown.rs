//! Cancellation: process signals and per-request deadlines.
//!
//! SIGINT (Ctrl+C), SIGTERM and SIGHUP cancel a [`CancellationToken`] that
//! the controller, the fetch adapter and the HTTP server all observe: the
//! in-flight fetch tool is killed, no further item is started and the
//! server stops accepting requests. A second signal force-exits.
//!
//! Each HTTP request runs under a [`RequestDeadline`], a child of that token
//! which also fires when the request's time budget runs out.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    Cancel,
    ForceExit,
}

/// The first signal cancels; every later one force-exits.
fn next_action(received: &AtomicU32) -> SignalAction {
    if received.fetch_add(1, Ordering::SeqCst) == 0 {
        SignalAction::Cancel
    } else {
        SignalAction::ForceExit
    }
}

#[cfg(unix)]
fn listen(kind: tokio::signal::unix::SignalKind, name: &str) -> Option<tokio::signal::unix::Signal> {
    tokio::signal::unix::signal(kind)
        .map_err(|e| tracing::warn!(signal = name, error = %e, "Cannot listen for signal"))
        .ok()
}

#[cfg(unix)]
async fn recv(signal: &mut Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(signal) => {
            signal.recv().await;
        }
        None => std::future::pending().await,
    }
}

/// Install signal handlers and return the process-wide shutdown token.
pub(crate) fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let received = AtomicU32::new(0);

    let handler_token = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let (mut sigterm, mut sighup) = {
            use tokio::signal::unix::SignalKind;
            (
                listen(SignalKind::terminate(), "SIGTERM"),
                listen(SignalKind::hangup(), "SIGHUP"),
            )
        };

        loop {
            #[cfg(unix)]
            {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = recv(&mut sigterm) => {}
                    _ = recv(&mut sighup) => {}
                }
            }

            #[cfg(not(unix))]
            {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Cannot listen for Ctrl+C");
                    return;
                }
            }

            match next_action(&received) {
                SignalAction::Cancel => {
                    tracing::info!("Received shutdown signal, cancelling the in-flight sync...");
                    tracing::info!("Press Ctrl+C again to force exit");
                    handler_token.cancel();
                }
                SignalAction::ForceExit => {
                    tracing::warn!("Force exit requested");
                    std::process::exit(130);
                }
            }
        }
    });

    token
}

/// Cancellation scope for one request.
///
/// The token fires on process shutdown or when `timeout` elapses, whichever
/// comes first. Cancelling it never touches the shutdown token. Dropping the
/// deadline stops its timer.
pub(crate) struct RequestDeadline {
    token: CancellationToken,
    expired: Arc<AtomicBool>,
    timer: JoinHandle<()>,
}

impl RequestDeadline {
    pub(crate) fn start(shutdown: &CancellationToken, timeout: Duration) -> Self {
        let token = shutdown.child_token();
        let expired = Arc::new(AtomicBool::new(false));
        let timer = tokio::spawn({
            let token = token.clone();
            let expired = expired.clone();
            async move {
                tokio::time::sleep(timeout).await;
                expired.store(true, Ordering::SeqCst);
                token.cancel();
            }
        });
        Self {
            token,
            expired,
            timer,
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True once the timer, rather than a shutdown, fired.
    pub(crate) fn expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }
}

impl Drop for RequestDeadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}
