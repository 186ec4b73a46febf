use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use video_grabber_lib::cli::{Cli, Commands, SourceOrder};
use video_grabber_lib::downloader::config::CookiePolicy;

#[test]
fn parse_url_with_defaults() {
    let cli = Cli::parse_from(["video-grabber", "https://site.example/v/1.html"]);
    assert_eq!(cli.input().as_deref(), Some("https://site.example/v/1.html"));
    assert_eq!(cli.cookie_policy(), CookiePolicy::Ask);
    assert_eq!(cli.format, "best");
    assert_eq!(cli.order, SourceOrder::Document);
    assert!(cli.command.is_none());

    let config = cli.to_config();
    assert!(config.manual_fallback);
    assert!(config.tools.embed_subs);
    assert!(!config.fetch.accept_invalid_certs);
    assert_eq!(config.fetch.timeout, Duration::from_secs(30));
    assert_eq!(config.fetch.gate_cooldown, Duration::from_secs(3));
}

#[test]
fn parse_search_words_are_joined() {
    let cli = Cli::parse_from(["video-grabber", "funny", "cat", "videos"]);
    assert_eq!(cli.input().as_deref(), Some("funny cat videos"));
}

#[test]
fn no_input_is_none() {
    let cli = Cli::parse_from(["video-grabber"]);
    assert_eq!(cli.input(), None);
}

#[test]
fn parse_cookie_flags() {
    let cli = Cli::parse_from(["video-grabber", "--cookies", "https://a.example/x"]);
    assert_eq!(cli.cookie_policy(), CookiePolicy::Browser);

    let cli = Cli::parse_from(["video-grabber", "--no-cookies", "https://a.example/x"]);
    assert_eq!(cli.cookie_policy(), CookiePolicy::Never);

    assert!(Cli::try_parse_from(["video-grabber", "--cookies", "--no-cookies", "x"]).is_err());
}

#[test]
fn parse_overrides_into_config() {
    let cli = Cli::parse_from([
        "video-grabber",
        "--dir",
        "/tmp/out",
        "--insecure",
        "--proxy",
        "socks5://127.0.0.1:1080",
        "--ytdlp",
        "/opt/bin/yt-dlp",
        "--ffmpeg",
        "/opt/bin/ffmpeg",
        "--no-subs",
        "--no-manual",
        "--timeout",
        "15",
        "--gate-cooldown",
        "5",
        "-f",
        "bv*+ba/b",
        "https://a.example/x",
    ]);
    let config = cli.to_config();

    assert_eq!(config.download_dir, PathBuf::from("/tmp/out"));
    assert!(config.fetch.accept_invalid_certs);
    assert_eq!(config.fetch.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
    assert_eq!(config.tools.ytdlp_path, "/opt/bin/yt-dlp");
    assert_eq!(config.tools.ffmpeg_path, "/opt/bin/ffmpeg");
    assert_eq!(config.tools.format, "bv*+ba/b");
    assert!(!config.tools.embed_subs);
    assert!(!config.manual_fallback);
    assert_eq!(config.fetch.timeout, Duration::from_secs(15));
    assert_eq!(config.fetch.gate_cooldown, Duration::from_secs(5));
    assert!(config.validate().is_ok());
}

#[test]
fn parse_order_and_output_flags() {
    let cli = Cli::parse_from(["video-grabber", "--order", "confidence", "--json", "-v", "x"]);
    assert_eq!(cli.order, SourceOrder::Confidence);
    assert!(cli.json);
    assert!(cli.verbose);

    assert!(Cli::try_parse_from(["video-grabber", "-v", "-q", "x"]).is_err());
}

#[test]
fn parse_tool_subcommands() {
    let cli = Cli::parse_from(["video-grabber", "tools"]);
    assert_eq!(cli.command, Some(Commands::Tools));

    let cli = Cli::parse_from(["video-grabber", "update", "--ytdlp", "/opt/bin/yt-dlp"]);
    assert_eq!(cli.command, Some(Commands::Update));
    assert_eq!(cli.ytdlp.as_deref(), Some("/opt/bin/yt-dlp"));
}
