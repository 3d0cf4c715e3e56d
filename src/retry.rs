use std::future::Future;

/// Diagnostic substrings that mark a known, recoverable streaming failure.
/// Any of them earns the fetch exactly one retry with the fallback arguments.
pub const FALLBACK_MARKERS: [&str; 5] = [
    "fragment not found",
    "Retrying fragment",
    "SABR streaming",
    "Some web client https formats have been skipped",
    "HTTP Error 403",
];

/// Retry decision returned by the classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Which argument set an attempt ran with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Baseline,
    Fallback,
}

impl Attempt {
    /// 1-based attempt number, for logs and error reports.
    pub fn number(self) -> u8 {
        match self {
            Attempt::Baseline => 1,
            Attempt::Fallback => 2,
        }
    }
}

/// Scan diagnostic text for a fallback marker.
pub fn classify_diagnostics(diagnostics: &str) -> RetryAction {
    if FALLBACK_MARKERS.iter().any(|m| diagnostics.contains(m)) {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

/// Run `operation` with the baseline arguments and, if `classifier` asks for
/// it, exactly once more with the fallback arguments.
///
/// There is no delay and no third attempt: whatever the fallback attempt
/// returns is final. Returns the final output together with the attempt that
/// produced it.
pub async fn with_single_fallback<F, Fut, T, C>(classifier: C, operation: F) -> (T, Attempt)
where
    F: Fn(Attempt) -> Fut,
    Fut: Future<Output = T>,
    C: Fn(&T) -> RetryAction,
{
    let first = operation(Attempt::Baseline).await;
    if classifier(&first) == RetryAction::Abort {
        return (first, Attempt::Baseline);
    }

    tracing::warn!(
        "Fetch tool reported a streaming failure; retrying once with \
         --allow-dynamic-mpd --concurrent-fragments 1"
    );
    (operation(Attempt::Fallback).await, Attempt::Fallback)
}
