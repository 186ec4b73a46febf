// Pipeline configuration

use std::path::PathBuf;
use std::time::Duration;

use super::errors::DownloadError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

pub const DEFAULT_ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

/// Whether strategy 1 runs with browser cookies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CookiePolicy {
    /// Ask the operator once before the chain starts
    #[default]
    Ask,
    /// Never import browser cookies
    Never,
    /// Import cookies without asking
    Browser,
}

/// Page-fetch settings
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub timeout: Duration,
    /// Accept invalid/self-signed certificates. Opt-in only.
    pub accept_invalid_certs: bool,
    /// HTTP/HTTPS/SOCKS5 proxy URL
    pub proxy: Option<String>,
    /// Wait before the single verification-gate retry
    pub gate_cooldown: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
            proxy: None,
            gate_cooldown: Duration::from_secs(3),
        }
    }
}

/// External tool settings
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
    /// Downloader format selector
    pub format: String,
    /// Downloader merge container
    pub merge_format: String,
    pub retries: u32,
    pub fragment_retries: u32,
    pub embed_subs: bool,
    /// Browser whose cookie store is imported by the credentialed strategy
    pub cookies_browser: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            format: "best".to_string(),
            merge_format: "mp4".to_string(),
            retries: 10,
            fragment_retries: 10,
            embed_subs: true,
            cookies_browser: "chrome".to_string(),
        }
    }
}

/// Everything the pipeline reads
#[derive(Debug, Clone)]
pub struct GrabberConfig {
    pub download_dir: PathBuf,
    pub cookie_policy: CookiePolicy,
    /// Offer the manual-source prompt when automation fails
    pub manual_fallback: bool,
    pub fetch: FetchConfig,
    pub tools: ToolConfig,
}

impl Default for GrabberConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            cookie_policy: CookiePolicy::Ask,
            manual_fallback: true,
            fetch: FetchConfig::default(),
            tools: ToolConfig::default(),
        }
    }
}

impl GrabberConfig {
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_cookie_policy(mut self, policy: CookiePolicy) -> Self {
        self.cookie_policy = policy;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.fetch.proxy = proxy;
        self
    }

    pub fn with_gate_cooldown(mut self, cooldown: Duration) -> Self {
        self.fetch.gate_cooldown = cooldown;
        self
    }

    pub fn with_insecure_tls(mut self, enabled: bool) -> Self {
        self.fetch.accept_invalid_certs = enabled;
        self
    }

    /// Reject configuration the pipeline cannot run with
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.download_dir.as_os_str().is_empty() {
            return Err(DownloadError::Config("download directory is empty".to_string()));
        }
        if self.fetch.timeout.is_zero() {
            return Err(DownloadError::Config("fetch timeout must be positive".to_string()));
        }
        if self.fetch.user_agent.trim().is_empty() {
            return Err(DownloadError::Config("user agent is empty".to_string()));
        }
        if self.tools.ytdlp_path.trim().is_empty() || self.tools.ffmpeg_path.trim().is_empty() {
            return Err(DownloadError::Config("tool path is empty".to_string()));
        }
        if self.tools.format.trim().is_empty() {
            return Err(DownloadError::Config("format selector is empty".to_string()));
        }
        if self.tools.retries == 0 || self.tools.fragment_retries == 0 {
            return Err(DownloadError::Config("retry counts must be positive".to_string()));
        }
        if let Some(proxy) = &self.fetch.proxy {
            let parsed = url::Url::parse(proxy)
                .map_err(|e| DownloadError::Config(format!("invalid proxy URL {}: {}", proxy, e)))?;
            if !matches!(parsed.scheme(), "http" | "https" | "socks5" | "socks5h") {
                return Err(DownloadError::Config(format!(
                    "unsupported proxy scheme: {}",
                    parsed.scheme()
                )));
            }
        }
        Ok(())
    }
}

/// `<Downloads>/Videos`, created lazily by the pipeline
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Videos")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GrabberConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tools.fragment_retries, 10);
        assert_eq!(config.fetch.gate_cooldown, Duration::from_secs(3));
        assert!(!config.fetch.accept_invalid_certs);
        assert!(config.download_dir.ends_with("Videos"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = GrabberConfig::default();
        config.fetch.timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(DownloadError::Config(_))));
    }

    #[test]
    fn bad_proxy_is_rejected() {
        let config = GrabberConfig::default().with_proxy(Some("ftp://127.0.0.1:21".to_string()));
        assert!(matches!(config.validate(), Err(DownloadError::Config(_))));

        let config = GrabberConfig::default().with_proxy(Some("not a url".to_string()));
        assert!(config.validate().is_err());

        let config = GrabberConfig::default().with_proxy(Some("socks5h://127.0.0.1:1080".to_string()));
        assert!(config.validate().is_ok());
    }
}
