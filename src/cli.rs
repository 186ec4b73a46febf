// Command-line surface

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::downloader::config::{CookiePolicy, GrabberConfig};
use crate::downloader::extractors::ExtractOrder;

/// Resolve a playable media source from a video page and save it locally.
#[derive(Parser, Debug)]
#[command(name = "video-grabber")]
#[command(author, version, about)]
pub struct Cli {
    /// Video page URL, or a search query when it is not a URL
    #[arg(value_name = "URL_OR_QUERY", num_args = 0.., index = 1)]
    pub input: Vec<String>,

    /// Destination directory (default: <Downloads>/Videos)
    #[arg(short = 'o', long = "dir", env = "GRABBER_DOWNLOAD_DIR")]
    pub dir: Option<PathBuf>,

    /// Import browser cookies without asking
    #[arg(long, conflicts_with = "no_cookies")]
    pub cookies: bool,

    /// Never import browser cookies
    #[arg(long)]
    pub no_cookies: bool,

    /// Accept invalid TLS certificates when fetching the page
    #[arg(long)]
    pub insecure: bool,

    /// HTTP/HTTPS/SOCKS5 proxy
    #[arg(long, env = "GRABBER_PROXY")]
    pub proxy: Option<String>,

    /// Path to yt-dlp
    #[arg(long, env = "GRABBER_YTDLP", global = true)]
    pub ytdlp: Option<String>,

    /// Path to ffmpeg
    #[arg(long, env = "GRABBER_FFMPEG", global = true)]
    pub ffmpeg: Option<String>,

    /// Downloader format selector
    #[arg(short, long, default_value = "best")]
    pub format: String,

    /// Don't embed subtitles
    #[arg(long)]
    pub no_subs: bool,

    /// Don't offer the manual source prompt
    #[arg(long)]
    pub no_manual: bool,

    /// Skip yt-dlp/ffmpeg detection
    #[arg(long)]
    pub skip_tool_check: bool,

    /// Page fetch timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Seconds to wait before retrying a verification page
    #[arg(long, default_value_t = 3)]
    pub gate_cooldown: u64,

    /// Order in which extracted sources are tried
    #[arg(long, value_enum, default_value_t = SourceOrder::Document)]
    pub order: SourceOrder,

    /// Print the acquisition report as JSON
    #[arg(long)]
    pub json: bool,

    /// Debug logging
    #[arg(short, long, conflicts_with = "quiet", global = true)]
    pub verbose: bool,

    /// Errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Show yt-dlp and ffmpeg status
    Tools,

    /// Install or upgrade yt-dlp through pip
    Update,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrder {
    /// First occurrence in the page
    Document,
    /// Manifests, then progressive files, then player configs, then iframes
    Confidence,
}

impl From<SourceOrder> for ExtractOrder {
    fn from(order: SourceOrder) -> Self {
        match order {
            SourceOrder::Document => ExtractOrder::Document,
            SourceOrder::Confidence => ExtractOrder::Confidence,
        }
    }
}

impl Cli {
    /// Positional words joined back into one URL or query
    pub fn input(&self) -> Option<String> {
        let joined = self.input.join(" ");
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    pub fn cookie_policy(&self) -> CookiePolicy {
        if self.cookies {
            CookiePolicy::Browser
        } else if self.no_cookies {
            CookiePolicy::Never
        } else {
            CookiePolicy::Ask
        }
    }

    pub fn to_config(&self) -> GrabberConfig {
        let mut config = GrabberConfig::default()
            .with_cookie_policy(self.cookie_policy())
            .with_proxy(self.proxy.clone())
            .with_insecure_tls(self.insecure)
            .with_gate_cooldown(Duration::from_secs(self.gate_cooldown));

        if let Some(dir) = &self.dir {
            config = config.with_download_dir(dir.clone());
        }
        if let Some(path) = &self.ytdlp {
            config.tools.ytdlp_path = path.clone();
        }
        if let Some(path) = &self.ffmpeg {
            config.tools.ffmpeg_path = path.clone();
        }
        config.tools.format = self.format.clone();
        config.tools.embed_subs = !self.no_subs;
        config.fetch.timeout = Duration::from_secs(self.timeout);
        config.manual_fallback = !self.no_manual;
        config
    }
}
