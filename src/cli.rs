use clap::Parser;

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "yttransfer",
    about = "Sync channel videos to a destination platform, each item at most once"
)]
pub struct Cli {
    /// Channel id or URL to sync
    #[arg(long)]
    pub channel_id: Option<String>,

    /// Single video id or URL to sync
    #[arg(long)]
    pub video_id: Option<String>,

    /// Destination platform (bilibili or tiktok)
    #[arg(long, default_value = "bilibili")]
    pub platform: String,

    /// Output directory for fetched files
    #[arg(long, default_value = "downloads")]
    pub output: String,

    /// Path to the SQLite ledger
    #[arg(long, default_value = "metadata.db")]
    pub db_path: String,

    /// HTTP listen address; enables server mode instead of a single run
    #[arg(long)]
    pub http_addr: Option<String>,

    /// Max videos to fetch for a channel
    #[arg(long, default_value_t = 5, allow_negative_numbers = true)]
    pub limit: i64,

    /// Sleep seconds between downloads, passed to the fetch tool
    #[arg(long, default_value_t = 5, allow_negative_numbers = true)]
    pub sleep_seconds: i64,

    /// JS runtime passed to the fetch tool (auto, node, deno, or a comma list)
    #[arg(long, default_value = "auto")]
    pub js_runtime: String,

    /// Format selector for the fetch tool (auto prefers mp4)
    #[arg(long, default_value = "auto")]
    pub format: String,

    /// Fetch tool command line, e.g. "python3 -m yt_dlp"
    #[arg(long, env = "YTTRANSFER_FETCH_TOOL", default_value = "yt-dlp")]
    pub fetch_tool: String,

    /// Endpoint that receives uploaded files; without it uploads are only logged
    #[arg(long, env = "YTTRANSFER_UPLOAD_ENDPOINT")]
    pub upload_endpoint: Option<String>,

    /// Per-request deadline in server mode
    #[arg(long, default_value_t = 1800, allow_negative_numbers = true)]
    pub sync_timeout_secs: i64,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["yttransfer", "--channel-id", "UC1"]).unwrap();
        assert_eq!(cli.channel_id.as_deref(), Some("UC1"));
        assert_eq!(cli.platform, "bilibili");
        assert_eq!(cli.output, "downloads");
        assert_eq!(cli.db_path, "metadata.db");
        assert_eq!(cli.limit, 5);
        assert_eq!(cli.sleep_seconds, 5);
        assert_eq!(cli.js_runtime, "auto");
        assert_eq!(cli.format, "auto");
        assert_eq!(cli.sync_timeout_secs, 1800);
        assert_eq!(cli.log_level, LogLevel::Info);
        assert!(cli.http_addr.is_none());
    }

    #[test]
    fn test_negative_numbers_reach_validation() {
        let cli = Cli::try_parse_from(["yttransfer", "--video-id", "v", "--sleep-seconds", "-1"])
            .unwrap();
        assert_eq!(cli.sleep_seconds, -1);
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        assert!(Cli::try_parse_from(["yttransfer", "--log-level", "loud"]).is_err());
    }
}
