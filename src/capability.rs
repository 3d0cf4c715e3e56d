//! Capability probing and the per-process fetch selections derived from it.
//!
//! Everything here runs once at startup. The results are plain values that
//! get threaded into the fetch adapter and the controller; nothing is cached
//! behind a global.

use thiserror::Error;

use crate::fetch::process::ToolCommand;

/// Merge/remux helper the fetch tool shells out to.
pub const MERGE_TOOL: &str = "ffmpeg";

/// Tried in order when the runtime preference is `auto`.
const DEFAULT_RUNTIMES: [&str; 2] = ["node", "deno"];

/// Format used with `auto` when the merge tool is available.
const MERGED_FORMAT: &str = "bv*[ext=mp4]+ba[ext=m4a]/bv*[ext=mp4]/b[ext=mp4]/bv*+ba/b";

/// Format used with `auto` when only single-stream downloads are possible.
const SINGLE_STREAM_FORMAT: &str = "b[ext=mp4]/b";

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("{tool} not found in PATH; install it first")]
    ToolMissing { tool: String },

    #[error("Failed to run `{tool} --help`: {source}")]
    Probe {
        tool: String,
        source: std::io::Error,
    },

    #[error("--js-runtime requires yt-dlp 2024.04.09 or newer; update yt-dlp or remove the flag")]
    RuntimeFlagUnsupported,

    #[error("no supported JS runtime found (tried {tried})")]
    NoRuntime { tried: String },
}

/// How produced files are post-processed, decided by whether the merge tool
/// is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Postprocess {
    /// Merge separate streams and remux into mp4; report post-merge paths.
    MergeAndRemux,
    /// Accept single-stream output; report moved-file paths.
    SingleStream,
}

/// What the fetch tool and its environment can do.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub tool: ToolCommand,
    /// Whether the tool understands `--js-runtimes`.
    pub js_runtimes_flag: bool,
    /// Whether the merge tool is on PATH.
    pub merge_tool: bool,
}

impl Capabilities {
    /// Probe the fetch tool and the merge tool.
    pub async fn probe(tool: ToolCommand) -> Result<Self, CapabilityError> {
        if !has_executable(tool.program()) {
            return Err(CapabilityError::ToolMissing {
                tool: tool.program().to_string(),
            });
        }

        let help = tool
            .command()
            .arg("--help")
            .output()
            .await
            .map_err(|source| CapabilityError::Probe {
                tool: tool.to_string(),
                source,
            })?;
        let mut text = String::from_utf8_lossy(&help.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&help.stderr));
        let js_runtimes_flag = text.contains("--js-runtimes");

        let merge_tool = has_executable(MERGE_TOOL);
        tracing::debug!(js_runtimes_flag, merge_tool, tool = %tool, "Probed capabilities");

        Ok(Self {
            tool,
            js_runtimes_flag,
            merge_tool,
        })
    }

    pub fn postprocess(&self) -> Postprocess {
        if self.merge_tool {
            Postprocess::MergeAndRemux
        } else {
            Postprocess::SingleStream
        }
    }
}

/// JS runtime handed to the fetch tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RuntimeSelection {
    /// Let the tool pick (no flag passed).
    #[default]
    Unspecified,
    Named(String),
}

impl RuntimeSelection {
    pub fn as_arg(&self) -> Option<&str> {
        match self {
            Self::Unspecified => None,
            Self::Named(name) => Some(name),
        }
    }
}

/// Format selector handed to the fetch tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatSelection(String);

impl FormatSelection {
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn as_arg(&self) -> Option<&str> {
        if self.0.is_empty() {
            None
        } else {
            Some(&self.0)
        }
    }
}

/// Whether `name` resolves to an executable on PATH.
pub fn has_executable(name: &str) -> bool {
    !name.is_empty() && which::which(name).is_ok()
}

fn pref_is_auto(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    v.is_empty() || v == "auto"
}

/// Resolve the `--js-runtime` preference against the probe.
///
/// Returns the selection and an optional warning to log.
pub fn resolve_runtime(
    pref: &str,
    caps: &Capabilities,
    is_installed: impl Fn(&str) -> bool,
) -> Result<(RuntimeSelection, Option<String>), CapabilityError> {
    if !caps.js_runtimes_flag {
        if pref_is_auto(pref) {
            return Ok((
                RuntimeSelection::Unspecified,
                Some(
                    "yt-dlp in PATH does not support --js-runtimes; \
                     continuing without explicit JS runtime"
                        .to_string(),
                ),
            ));
        }
        return Err(CapabilityError::RuntimeFlagUnsupported);
    }

    let lowered = pref.trim().to_ascii_lowercase();
    let mut candidates: Vec<&str> = lowered
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty() && *part != "auto")
        .collect();
    if candidates.is_empty() {
        candidates = DEFAULT_RUNTIMES.to_vec();
    }

    candidates
        .iter()
        .copied()
        .find(|candidate| is_installed(candidate))
        .map(|found| (RuntimeSelection::Named(found.to_string()), None))
        .ok_or_else(|| CapabilityError::NoRuntime {
            tried: candidates.join(", "),
        })
}

/// Resolve the `--format` preference. Returns the selection and an optional
/// warning to log.
pub fn resolve_format(pref: &str, caps: &Capabilities) -> (FormatSelection, Option<String>) {
    let value = pref.trim();
    if !pref_is_auto(value) {
        let warning = (value.contains('+') && !caps.merge_tool).then(|| {
            "ffmpeg not found; yt-dlp may fail to merge formats requested via --format"
                .to_string()
        });
        return (FormatSelection::new(value), warning);
    }

    if caps.merge_tool {
        (FormatSelection::new(MERGED_FORMAT), None)
    } else {
        (
            FormatSelection::new(SINGLE_STREAM_FORMAT),
            Some(
                "ffmpeg not found; falling back to single-stream downloads. \
                 Install ffmpeg for merged video+audio output."
                    .to_string(),
            ),
        )
    }
}
