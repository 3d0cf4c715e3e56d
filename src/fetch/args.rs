//! Argument sets for the fetch tool.

use std::path::Path;
use std::time::Duration;

use crate::capability::{FormatSelection, Postprocess, RuntimeSelection};

const REMOTE_COMPONENTS: &str = "ejs:github";
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Appended after the baseline arguments on the single fallback attempt.
pub(crate) const FALLBACK_EXTRAS: [&str; 3] =
    ["--allow-dynamic-mpd", "--concurrent-fragments", "1"];

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Arguments that print the first `limit` item ids of a channel, one per line.
pub(crate) fn list_args(
    channel_locator: &str,
    limit: u32,
    runtime: &RuntimeSelection,
) -> Vec<String> {
    let mut args = strings(&["--quiet", "--no-warnings", "--flat-playlist", "--print", "id"]);
    args.push("--playlist-items".into());
    args.push(format!("1:{}", limit));
    args.push("--remote-components".into());
    args.push(REMOTE_COMPONENTS.into());
    if let Some(rt) = runtime.as_arg() {
        args.push("--js-runtimes".into());
        args.push(rt.into());
    }
    args.push(channel_locator.into());
    args
}

/// Baseline arguments for fetching one item, without the locator.
pub(crate) fn fetch_base_args(
    output_dir: &Path,
    runtime: &RuntimeSelection,
    format: &FormatSelection,
    postprocess: Postprocess,
    sleep: Option<Duration>,
) -> Vec<String> {
    let mut args = strings(&["--quiet", "--no-warnings", "--no-simulate"]);
    args.push("--remote-components".into());
    args.push(REMOTE_COMPONENTS.into());
    args.push("-o".into());
    args.push(output_dir.join(OUTPUT_TEMPLATE).to_string_lossy().into_owned());

    args.push("--print".into());
    args.push(
        match postprocess {
            Postprocess::MergeAndRemux => "after_postprocess:filepath",
            Postprocess::SingleStream => "after_move:filepath",
        }
        .into(),
    );

    if let Some(rt) = runtime.as_arg() {
        args.push("--js-runtimes".into());
        args.push(rt.into());
    }
    if let Some(selector) = format.as_arg() {
        args.push("--format".into());
        args.push(selector.into());
    }
    if postprocess == Postprocess::MergeAndRemux {
        args.extend(strings(&[
            "--merge-output-format",
            "mp4",
            "--recode-video",
            "mp4",
        ]));
    }
    if let Some(sleep) = sleep.filter(|d| d.as_secs() > 0) {
        let secs = sleep.as_secs();
        args.push(format!("--sleep-interval={}", secs));
        args.push(format!("--max-sleep-interval={}", secs + 1));
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(args: &[String]) -> String {
        args.join(" ")
    }

    #[test]
    fn test_list_args_without_runtime() {
        let args = list_args("https://www.youtube.com/channel/UCxyz/videos", 3, &RuntimeSelection::Unspecified);
        assert_eq!(
            joined(&args),
            "--quiet --no-warnings --flat-playlist --print id --playlist-items 1:3 \
             --remote-components ejs:github https://www.youtube.com/channel/UCxyz/videos"
        );
    }

    #[test]
    fn test_list_args_runtime_before_locator() {
        let args = list_args("loc", 5, &RuntimeSelection::Named("node".into()));
        let n = args.len();
        assert_eq!(&args[n - 3..], &["--js-runtimes", "node", "loc"]);
    }

    #[test]
    fn test_fetch_args_merge_mode() {
        let args = fetch_base_args(
            Path::new("out"),
            &RuntimeSelection::Named("deno".into()),
            &FormatSelection::new("bv*+ba/b"),
            Postprocess::MergeAndRemux,
            None,
        );
        let s = joined(&args);
        assert!(s.contains("--print after_postprocess:filepath"));
        assert!(s.contains("--merge-output-format mp4 --recode-video mp4"));
        assert!(s.contains("--js-runtimes deno"));
        assert!(s.contains("--format bv*+ba/b"));
        assert!(s.contains(&format!("-o {}", Path::new("out").join(OUTPUT_TEMPLATE).display())));
        assert!(!s.contains("--sleep-interval"));
    }

    #[test]
    fn test_fetch_args_single_stream_mode() {
        let args = fetch_base_args(
            Path::new("out"),
            &RuntimeSelection::Unspecified,
            &FormatSelection::default(),
            Postprocess::SingleStream,
            Some(Duration::from_secs(5)),
        );
        let s = joined(&args);
        assert!(s.contains("--print after_move:filepath"));
        assert!(!s.contains("--merge-output-format"));
        assert!(!s.contains("--js-runtimes"));
        assert!(!s.contains("--format"));
        assert!(s.ends_with("--sleep-interval=5 --max-sleep-interval=6"));
    }

    #[test]
    fn test_fetch_args_zero_sleep_omitted() {
        let args = fetch_base_args(
            Path::new("out"),
            &RuntimeSelection::Unspecified,
            &FormatSelection::default(),
            Postprocess::SingleStream,
            Some(Duration::ZERO),
        );
        assert!(!joined(&args).contains("sleep"));
    }
}
