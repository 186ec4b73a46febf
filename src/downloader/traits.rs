// Seams between the strategy chain and the outside world

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::errors::ToolInvocationError;
use super::models::DownloadProgress;

/// One generic-downloader invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    /// Page URL, extracted candidate, manual source, or `ytsearch1:` query
    pub source_url: String,
    /// Sent as `Referer`, always the original page when there is one
    pub referer: Option<String>,
    /// `<dir>/<base>.%(ext)s`
    pub output_template: String,
    pub use_browser_cookies: bool,
}

/// One stream-copy invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCopyJob {
    pub source_url: String,
    /// Forced as the `Referer` header
    pub referer: Option<String>,
    pub output_path: PathBuf,
}

/// Generic downloader/extractor tool (yt-dlp)
#[async_trait]
pub trait DownloaderBackend: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Run the tool to completion. `Ok` only means the tool exited cleanly;
    /// the caller checks the destination directory.
    async fn download(&self, job: &DownloadJob) -> Result<(), ToolInvocationError>;
}

/// Transcoder used in stream-copy mode (ffmpeg)
#[async_trait]
pub trait StreamCopier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn copy_stream(&self, job: &StreamCopyJob) -> Result<(), ToolInvocationError>;
}

/// Synchronous operator prompts the chain may reach
#[async_trait]
pub trait Operator: Send + Sync {
    /// Consent to read the browser cookie store (may trigger an OS credential prompt)
    async fn confirm_browser_cookies(&self, browser: &str) -> bool;

    /// Directly supplied source URL, `None` to skip
    async fn manual_source_url(&self) -> Option<String>;

    /// Consent to install a missing tool
    async fn confirm_install(&self, tool: &str) -> bool;
}

type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Progress emitter helper
#[derive(Clone, Default)]
pub struct ProgressEmitter {
    callback: Option<ProgressCallback>,
}

impl ProgressEmitter {
    pub fn new(callback: impl Fn(DownloadProgress) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// Emitter that only logs
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, progress: DownloadProgress) {
        tracing::trace!(percent = progress.percent, status = %progress.status, "progress");
        if let Some(cb) = &self.callback {
            cb(progress);
        }
    }
}

impl std::fmt::Debug for ProgressEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressEmitter")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
