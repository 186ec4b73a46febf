// External tool detection and installation

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::config::ToolConfig;
use super::errors::DownloadError;
use super::traits::Operator;
use super::utils::run_output_with_timeout;

const VERSION_TIMEOUT_SECS: u64 = 10;
const INSTALL_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version",
        }
    }

    /// Shown when the tool is missing and cannot be installed for the user
    pub fn install_hint(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "install manually with: python3 -m pip install -U yt-dlp",
            ToolType::Ffmpeg => {
                "install with: brew install ffmpeg (macOS), sudo apt-get install ffmpeg (Debian/Ubuntu), or from https://ffmpeg.org/download.html"
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

pub struct ToolManager {
    config: ToolConfig,
}

impl ToolManager {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    fn configured_path(&self, tool_type: ToolType) -> &str {
        match tool_type {
            ToolType::YtDlp => &self.config.ytdlp_path,
            ToolType::Ffmpeg => &self.config.ffmpeg_path,
        }
    }

    /// Whether the configured value names a file rather than a command
    fn is_explicit_path(&self, tool_type: ToolType) -> bool {
        let configured = self.configured_path(tool_type);
        configured.contains(std::path::MAIN_SEPARATOR) || configured.contains('/')
    }

    pub async fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.detect_tool(tool_type).await;
        let version = match &path {
            Some(p) => self.get_version(p, tool_type).await,
            None => None,
        };

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version,
            is_available: path.is_some(),
            path,
        }
    }

    pub async fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp).await,
            self.get_tool_info(ToolType::Ffmpeg).await,
        ]
    }

    async fn detect_tool(&self, tool_type: ToolType) -> Option<String> {
        let configured = self.configured_path(tool_type);

        // 0. Explicit path from config/CLI
        if self.is_explicit_path(tool_type) {
            return Path::new(configured).exists().then(|| configured.to_string());
        }

        // 1. Common install locations
        let common_paths = [
            format!("/opt/homebrew/bin/{}", configured),
            format!("/usr/local/bin/{}", configured),
            format!("/usr/bin/{}", configured),
        ];
        for path in common_paths {
            if Path::new(&path).exists() {
                return Some(path);
            }
        }

        // 2. PATH lookup
        let finder = if cfg!(windows) { "where" } else { "which" };
        match run_output_with_timeout(finder, vec![configured.to_string()], VERSION_TIMEOUT_SECS).await {
            Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
            _ => None,
        }
    }

    async fn get_version(&self, path: &str, tool_type: ToolType) -> Option<String> {
        let output = run_output_with_timeout(
            path,
            vec![tool_type.version_arg().to_string()],
            VERSION_TIMEOUT_SECS,
        )
        .await
        .ok()?;
        if !output.status.success() {
            return None;
        }
        // ffmpeg prints a banner; keep the first line only
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|l| l.trim().to_string())
    }

    /// Install yt-dlp through pip
    pub async fn install_ytdlp(&self) -> Result<(), DownloadError> {
        let python = if cfg!(windows) { "python" } else { "python3" };
        tracing::info!("Installing yt-dlp with {} -m pip", python);

        let output = run_output_with_timeout(
            python,
            vec![
                "-m".to_string(),
                "pip".to_string(),
                "install".to_string(),
                "-U".to_string(),
                "yt-dlp".to_string(),
            ],
            INSTALL_TIMEOUT_SECS,
        )
        .await
        .map_err(|e| DownloadError::ToolNotFound(format!("yt-dlp install failed: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let error = String::from_utf8_lossy(&output.stderr);
            Err(DownloadError::ToolNotFound(format!(
                "yt-dlp install failed: {}",
                error.trim()
            )))
        }
    }

    /// Make sure both tools are usable, offering to install yt-dlp.
    ///
    /// Returns the resolved tool configuration (detected absolute paths).
    pub async fn ensure_tools(&self, operator: &dyn Operator) -> Result<ToolConfig, DownloadError> {
        let mut resolved = self.config.clone();

        match self.detect_tool(ToolType::YtDlp).await {
            Some(path) => resolved.ytdlp_path = path,
            None if self.is_explicit_path(ToolType::YtDlp) => {
                // pip would install elsewhere; the configured path stays missing
                return Err(DownloadError::ToolNotFound(format!(
                    "yt-dlp not found at {}",
                    self.config.ytdlp_path
                )));
            }
            None => {
                tracing::warn!("yt-dlp is not installed");
                if !operator.confirm_install(ToolType::YtDlp.as_str()).await {
                    return Err(DownloadError::ToolNotFound(format!(
                        "yt-dlp is required; {}",
                        ToolType::YtDlp.install_hint()
                    )));
                }
                self.install_ytdlp().await?;
                resolved.ytdlp_path = self.detect_tool(ToolType::YtDlp).await.ok_or_else(|| {
                    DownloadError::ToolNotFound(format!(
                        "yt-dlp still not found after install; {}",
                        ToolType::YtDlp.install_hint()
                    ))
                })?;
                tracing::info!("yt-dlp installed");
            }
        }

        match self.detect_tool(ToolType::Ffmpeg).await {
            Some(path) => resolved.ffmpeg_path = path,
            None => {
                return Err(DownloadError::ToolNotFound(format!(
                    "ffmpeg is not installed; {}",
                    ToolType::Ffmpeg.install_hint()
                )));
            }
        }

        for tool in [ToolType::YtDlp, ToolType::Ffmpeg] {
            let path = match tool {
                ToolType::YtDlp => &resolved.ytdlp_path,
                ToolType::Ffmpeg => &resolved.ffmpeg_path,
            };
            match self.get_version(path, tool).await {
                Some(v) => tracing::debug!(tool = tool.as_str(), version = %v, path = %path, "tool found"),
                None => tracing::debug!(tool = tool.as_str(), path = %path, "tool found, version unknown"),
            }
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Refuses;

    #[async_trait]
    impl Operator for Refuses {
        async fn confirm_browser_cookies(&self, _browser: &str) -> bool {
            false
        }
        async fn manual_source_url(&self) -> Option<String> {
            None
        }
        async fn confirm_install(&self, _tool: &str) -> bool {
            false
        }
    }

    #[test]
    fn tool_names() {
        assert_eq!(ToolType::YtDlp.as_str(), "yt-dlp");
        assert_eq!(ToolType::Ffmpeg.as_str(), "ffmpeg");
        assert!(ToolType::Ffmpeg.install_hint().contains("brew install ffmpeg"));
    }

    #[tokio::test]
    async fn explicit_missing_path_is_not_detected() {
        let manager = ToolManager::new(ToolConfig {
            ytdlp_path: "/definitely/not/here/yt-dlp".to_string(),
            ..ToolConfig::default()
        });
        let info = manager.get_tool_info(ToolType::YtDlp).await;
        assert!(!info.is_available);
        assert!(info.path.is_none());
        assert!(info.version.is_none());
    }

    #[tokio::test]
    async fn declined_install_is_fatal() {
        let manager = ToolManager::new(ToolConfig {
            ytdlp_path: "yt-dlp-definitely-not-installed".to_string(),
            ..ToolConfig::default()
        });
        let err = manager.ensure_tools(&Refuses).await.unwrap_err();
        assert!(matches!(err, DownloadError::ToolNotFound(msg) if msg.contains("pip install")));
    }

    #[derive(Default)]
    struct Consents {
        install_prompts: Mutex<usize>,
    }

    #[async_trait]
    impl Operator for Consents {
        async fn confirm_browser_cookies(&self, _browser: &str) -> bool {
            false
        }
        async fn manual_source_url(&self) -> Option<String> {
            None
        }
        async fn confirm_install(&self, _tool: &str) -> bool {
            *self.install_prompts.lock().unwrap() += 1;
            true
        }
    }

    #[tokio::test]
    async fn missing_explicit_path_is_not_offered_an_install() {
        let manager = ToolManager::new(ToolConfig {
            ytdlp_path: "/definitely/not/here/yt-dlp".to_string(),
            ..ToolConfig::default()
        });
        let operator = Consents::default();

        let err = manager.ensure_tools(&operator).await.unwrap_err();

        assert!(
            matches!(&err, DownloadError::ToolNotFound(msg) if msg.contains("/definitely/not/here/yt-dlp")),
            "got {:?}",
            err
        );
        assert_eq!(*operator.install_prompts.lock().unwrap(), 0);
    }
}
