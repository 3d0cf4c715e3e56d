use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::ToolCommand;
use crate::sync::SyncRequest;
use crate::types::Platform;

/// What the process does once configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Long-lived HTTP trigger.
    Serve { addr: String },
    /// One sync, then exit.
    Once(SyncRequest),
}

/// Validated application configuration.
#[derive(Debug)]
pub struct Config {
    pub mode: RunMode,
    pub output_dir: PathBuf,
    pub db_path: PathBuf,
    pub js_runtime: String,
    pub format: String,
    pub fetch_tool: ToolCommand,
    pub upload_endpoint: Option<String>,
    pub sleep: Duration,
    pub sync_timeout: Duration,
    pub platform: Platform,
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Accept the bare `:port` form as "all interfaces".
fn listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

/// Empty or whitespace-only flag values count as absent.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_cli(cli: crate::cli::Cli) -> anyhow::Result<Self> {
        let channel_id = non_empty(cli.channel_id);
        let video_id = non_empty(cli.video_id);
        let http_addr = non_empty(cli.http_addr);

        if http_addr.is_none() && channel_id.is_none() && video_id.is_none() {
            anyhow::bail!("provide either --channel-id or --video-id");
        }
        if http_addr.is_none() && channel_id.is_some() && video_id.is_some() {
            anyhow::bail!("provide only one of --channel-id or --video-id");
        }
        if channel_id.is_some() && cli.limit <= 0 {
            anyhow::bail!("--limit must be > 0 for channel downloads");
        }
        if cli.sleep_seconds < 0 {
            anyhow::bail!("--sleep-seconds must be >= 0");
        }
        let Some(platform) = Platform::parse(&cli.platform) else {
            anyhow::bail!("--platform must be bilibili or tiktok");
        };
        if cli.sync_timeout_secs <= 0 {
            anyhow::bail!("--sync-timeout-secs must be > 0");
        }
        let Some(fetch_tool) = ToolCommand::parse(&cli.fetch_tool) else {
            anyhow::bail!("--fetch-tool must be a non-empty command line");
        };

        let mode = match (http_addr, channel_id, video_id) {
            (Some(addr), _, _) => RunMode::Serve {
                addr: listen_addr(&addr),
            },
            (None, Some(channel_id), _) => RunMode::Once(SyncRequest::Channel {
                channel_id,
                limit: cli.limit,
            }),
            (None, None, Some(item_id)) => RunMode::Once(SyncRequest::SingleItem { item_id }),
            (None, None, None) => anyhow::bail!("provide either --channel-id or --video-id"),
        };

        Ok(Self {
            mode,
            output_dir: expand_tilde(&cli.output),
            db_path: expand_tilde(&cli.db_path),
            js_runtime: cli.js_runtime,
            format: cli.format,
            fetch_tool,
            upload_endpoint: non_empty(cli.upload_endpoint),
            sleep: Duration::from_secs(cli.sleep_seconds.unsigned_abs()),
            sync_timeout: Duration::from_secs(cli.sync_timeout_secs.unsigned_abs()),
            platform,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> anyhow::Result<Config> {
        let mut argv = vec!["yttransfer"];
        argv.extend_from_slice(args);
        Config::from_cli(crate::cli::Cli::try_parse_from(argv).unwrap())
    }

    fn err(args: &[&str]) -> String {
        parse(args).unwrap_err().to_string()
    }

    #[test]
    fn test_expand_tilde_with_home() {
        let result = expand_tilde("~/Videos");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(result, home.join("Videos"));
        }
    }

    #[test]
    fn test_expand_tilde_no_prefix() {
        assert_eq!(
            expand_tilde("/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(expand_tilde("downloads"), PathBuf::from("downloads"));
    }

    #[test]
    fn test_channel_request() {
        let cfg = parse(&["--channel-id", "UCxyz", "--limit", "3"]).unwrap();
        assert_eq!(
            cfg.mode,
            RunMode::Once(SyncRequest::Channel {
                channel_id: "UCxyz".into(),
                limit: 3
            })
        );
        assert_eq!(cfg.platform, Platform::Bilibili);
        assert_eq!(cfg.sleep, Duration::from_secs(5));
        assert_eq!(cfg.sync_timeout, Duration::from_secs(1800));
        assert_eq!(cfg.fetch_tool, ToolCommand::new("yt-dlp"));
    }

    #[test]
    fn test_single_item_ignores_limit() {
        let cfg = parse(&["--video-id", "abc", "--limit", "0"]).unwrap();
        assert_eq!(
            cfg.mode,
            RunMode::Once(SyncRequest::SingleItem {
                item_id: "abc".into()
            })
        );
    }

    #[test]
    fn test_requires_a_target() {
        assert_eq!(err(&[]), "provide either --channel-id or --video-id");
        assert_eq!(
            err(&["--channel-id", "  "]),
            "provide either --channel-id or --video-id"
        );
    }

    #[test]
    fn test_rejects_both_targets() {
        assert_eq!(
            err(&["--channel-id", "c", "--video-id", "v"]),
            "provide only one of --channel-id or --video-id"
        );
    }

    #[test]
    fn test_server_mode_wins() {
        let cfg = parse(&["--http-addr", ":8080", "--channel-id", "c", "--video-id", "v"]).unwrap();
        assert_eq!(
            cfg.mode,
            RunMode::Serve {
                addr: "0.0.0.0:8080".into()
            }
        );

        let cfg = parse(&["--http-addr", "127.0.0.1:9000"]).unwrap();
        assert_eq!(
            cfg.mode,
            RunMode::Serve {
                addr: "127.0.0.1:9000".into()
            }
        );
    }

    #[test]
    fn test_numeric_validation() {
        assert_eq!(
            err(&["--channel-id", "c", "--limit", "0"]),
            "--limit must be > 0 for channel downloads"
        );
        assert_eq!(
            err(&["--video-id", "v", "--sleep-seconds", "-1"]),
            "--sleep-seconds must be >= 0"
        );
        assert_eq!(
            err(&["--http-addr", "x:1", "--sync-timeout-secs", "0"]),
            "--sync-timeout-secs must be > 0"
        );
    }

    #[test]
    fn test_platform_validation() {
        let cfg = parse(&["--video-id", "v", "--platform", " TikTok "]).unwrap();
        assert_eq!(cfg.platform, Platform::Tiktok);
        assert_eq!(
            err(&["--video-id", "v", "--platform", "youtube"]),
            "--platform must be bilibili or tiktok"
        );
    }

    #[test]
    fn test_fetch_tool_command_line() {
        let cfg = parse(&["--video-id", "v", "--fetch-tool", "python3 -m yt_dlp"]).unwrap();
        assert_eq!(cfg.fetch_tool.program(), "python3");
        assert_eq!(
            err(&["--video-id", "v", "--fetch-tool", ""]),
            "--fetch-tool must be a non-empty command line"
        );
    }

    #[test]
    fn test_zero_sleep_allowed() {
        let cfg = parse(&["--video-id", "v", "--sleep-seconds", "0"]).unwrap();
        assert_eq!(cfg.sleep, Duration::ZERO);
    }
}
