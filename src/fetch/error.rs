use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors from a single fetch tool invocation.
///
/// Display output never includes the tool's diagnostic text; callers that
/// need it use [`FetchError::diagnostics`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}")]
    ToolExited {
        tool: String,
        status: ExitStatus,
        diagnostics: String,
    },

    #[error("I/O error reading fetch tool output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Diagnostic text captured from the tool, if the failure carries any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            FetchError::ToolExited { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}

/// A failed item fetch, after the fallback retry (if any) was spent.
///
/// `partial` holds every path the final attempt reported before failing so
/// callers can decide whether the output is salvageable.
#[derive(Debug, Error)]
#[error("Fetching {locator} failed after {attempts} attempt(s): {cause}")]
pub struct FetchFailed {
    pub locator: String,
    pub attempts: u8,
    pub partial: Vec<PathBuf>,
    #[source]
    pub cause: FetchError,
}

impl FetchFailed {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, FetchError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn exit_status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_exited_display_hides_diagnostics() {
        let e = FetchError::ToolExited {
            tool: "yt-dlp".into(),
            status: exit_status(1),
            diagnostics: "ERROR: secret detail".into(),
        };
        let shown = e.to_string();
        assert!(shown.starts_with("yt-dlp exited with"));
        assert!(!shown.contains("secret detail"));
        assert_eq!(e.diagnostics(), Some("ERROR: secret detail"));
    }

    #[test]
    fn test_fetch_failed_reports_attempts() {
        let e = FetchFailed {
            locator: "https://www.youtube.com/watch?v=abc".into(),
            attempts: 2,
            partial: vec![],
            cause: FetchError::Cancelled,
        };
        assert!(e.to_string().contains("after 2 attempt(s)"));
        assert!(e.is_cancelled());
    }
}
