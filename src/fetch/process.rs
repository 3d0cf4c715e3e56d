//! Running the external fetch tool.
//!
//! stdout and stderr are drained concurrently until both reach EOF, and only
//! then is the process awaited, so a chatty tool can never block on a full
//! pipe. The child is killed when the caller cancels or drops the future.

use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio_util::sync::CancellationToken;

use super::error::FetchError;

/// The fetch tool's command line: a program plus any fixed leading arguments
/// (e.g. `python3 -m yt_dlp`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    leading_args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn with_args(program: impl Into<String>, leading_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            leading_args,
        }
    }

    /// Split a shell-style command line. Returns `None` for empty or
    /// unbalanced input.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = shlex::split(line)?.into_iter();
        let mut tool = Self::new(words.next()?);
        tool.leading_args = words.collect();
        Some(tool)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// A fresh command with the leading arguments applied.
    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.leading_args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Everything observed from one finished invocation.
#[derive(Debug)]
pub(crate) struct ToolOutput {
    /// Non-empty, trimmed stdout lines in order.
    pub stdout_lines: Vec<String>,
    /// Raw stderr text.
    pub diagnostics: String,
    pub status: ExitStatus,
}

impl ToolOutput {
    /// Convert a non-zero exit into an error, keeping the diagnostics.
    pub fn exit_error(&self, tool: &ToolCommand) -> Option<FetchError> {
        (!self.status.success()).then(|| FetchError::ToolExited {
            tool: tool.to_string(),
            status: self.status,
            diagnostics: self.diagnostics.clone(),
        })
    }
}

/// An invocation that ended without an exit status (spawn failure, read
/// error or cancellation). `stdout_lines` holds what was read before that.
#[derive(Debug)]
pub(crate) struct ToolInterrupted {
    pub cause: FetchError,
    pub stdout_lines: Vec<String>,
}

impl From<FetchError> for ToolInterrupted {
    fn from(cause: FetchError) -> Self {
        Self {
            cause,
            stdout_lines: Vec::new(),
        }
    }
}

impl From<ToolInterrupted> for FetchError {
    fn from(interrupted: ToolInterrupted) -> Self {
        interrupted.cause
    }
}

/// Run the tool with `args` to completion or cancellation.
///
/// A non-zero exit is not an error at this level; callers inspect
/// [`ToolOutput::status`].
pub(crate) async fn run_tool(
    tool: &ToolCommand,
    args: &[String],
    cancel: &CancellationToken,
) -> Result<ToolOutput, ToolInterrupted> {
    if cancel.is_cancelled() {
        return Err(FetchError::Cancelled.into());
    }

    let mut child = tool
        .command()
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| FetchError::Spawn {
            tool: tool.to_string(),
            source,
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| FetchError::Io(io::Error::other("fetch tool stdout was not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| FetchError::Io(io::Error::other("fetch tool stderr was not captured")))?;

    let mut stdout_lines = Vec::new();
    let mut diagnostics = String::new();
    let finished = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = drain_and_wait(&mut child, stdout, stderr, &mut stdout_lines, &mut diagnostics) => Some(result),
    };

    match finished {
        Some(Ok(status)) => Ok(ToolOutput {
            stdout_lines,
            diagnostics,
            status,
        }),
        Some(Err(cause)) => Err(ToolInterrupted {
            cause,
            stdout_lines,
        }),
        None => {
            if let Err(e) = child.kill().await {
                tracing::warn!(tool = %tool, error = %e, "Failed to kill cancelled fetch tool");
            }
            Err(ToolInterrupted {
                cause: FetchError::Cancelled,
                stdout_lines,
            })
        }
    }
}

/// Drain both pipes to EOF, then reap the child. Lines land in the caller's
/// buffers as they arrive so a cancelled run still reports them.
async fn drain_and_wait(
    child: &mut Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    stdout_lines: &mut Vec<String>,
    diagnostics: &mut String,
) -> Result<ExitStatus, FetchError> {
    let read_stdout = for_each_line(stdout, |line| {
        let line = line.trim();
        if !line.is_empty() {
            stdout_lines.push(line.to_string());
        }
    });
    let read_stderr = for_each_line(stderr, |line| {
        tracing::debug!(target: "fetch_tool", "{}", line);
        diagnostics.push_str(line);
        diagnostics.push('\n');
    });

    let (out, err) = tokio::join!(read_stdout, read_stderr);
    out?;
    err?;
    Ok(child.wait().await?)
}

/// Feed each line (without its terminator) to `on_line`. Bytes that are not
/// UTF-8 are replaced rather than failing the read.
async fn for_each_line<R>(reader: R, mut on_line: impl FnMut(&str)) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        on_line(line.trim_end_matches(['\n', '\r']));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_program() {
        let tool = ToolCommand::parse("yt-dlp").unwrap();
        assert_eq!(tool, ToolCommand::new("yt-dlp"));
    }

    #[test]
    fn test_parse_with_leading_args() {
        let tool = ToolCommand::parse("python3 -m 'yt_dlp'").unwrap();
        assert_eq!(tool.program(), "python3");
        assert_eq!(tool.to_string(), "python3 -m yt_dlp");
    }

    #[test]
    fn test_parse_rejects_empty_and_unbalanced() {
        assert!(ToolCommand::parse("").is_none());
        assert!(ToolCommand::parse("   ").is_none());
        assert!(ToolCommand::parse("yt-dlp 'oops").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_separates_streams() {
        let tool = ToolCommand::with_args(
            "sh",
            vec![
                "-c".into(),
                "echo ' first '; echo; echo diag >&2; echo second; exit 3".into(),
            ],
        );
        let out = run_tool(&tool, &[], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.stdout_lines, vec!["first", "second"]);
        assert_eq!(out.diagnostics, "diag\n");
        assert_eq!(out.status.code(), Some(3));
        assert!(matches!(
            out.exit_error(&tool),
            Some(FetchError::ToolExited { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_drains_large_output() {
        // Far more than a pipe buffer on both streams.
        let tool = ToolCommand::with_args(
            "sh",
            vec![
                "-c".into(),
                "i=0; while [ $i -lt 20000 ]; do echo line$i; echo err$i >&2; i=$((i+1)); done"
                    .into(),
            ],
        );
        let out = run_tool(&tool, &[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout_lines.len(), 20000);
        assert!(out.exit_error(&tool).is_none());
    }

    #[tokio::test]
    async fn test_run_tool_spawn_failure() {
        let tool = ToolCommand::new("/nonexistent/fetch-tool");
        let err = run_tool(&tool, &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err.cause, FetchError::Spawn { .. }));
        assert!(err.stdout_lines.is_empty());
    }

    #[tokio::test]
    async fn test_run_tool_precancelled_does_not_spawn() {
        let token = CancellationToken::new();
        token.cancel();
        let tool = ToolCommand::new("/nonexistent/fetch-tool");
        let err = run_tool(&tool, &[], &token).await.unwrap_err();
        assert!(matches!(err.cause, FetchError::Cancelled));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_replaces_invalid_utf8() {
        let tool = ToolCommand::with_args(
            "sh",
            vec![
                "-c".into(),
                "printf '/out/a\\377.mp4\\n'; printf 'bad \\377 byte\\nHTTP Error 403\\n' >&2".into(),
            ],
        );
        let out = run_tool(&tool, &[], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.stdout_lines, vec!["/out/a\u{FFFD}.mp4"]);
        assert_eq!(out.diagnostics, "bad \u{FFFD} byte\nHTTP Error 403\n");
        assert!(out.status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_cancel_keeps_lines_read_so_far() {
        let tool = ToolCommand::with_args(
            "sh",
            vec!["-c".into(), "echo /out/a.mp4; exec sleep 30".into()],
        );
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            canceller.cancel();
        });

        let err = run_tool(&tool, &[], &token).await.unwrap_err();
        assert!(matches!(err.cause, FetchError::Cancelled));
        assert_eq!(err.stdout_lines, vec!["/out/a.mp4"]);
    }
}
