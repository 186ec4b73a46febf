// yt-dlp backend - generic downloader used by every strategy

use async_trait::async_trait;

use crate::downloader::config::{FetchConfig, ToolConfig};
use crate::downloader::errors::ToolInvocationError;
use crate::downloader::models::DownloadProgress;
use crate::downloader::traits::{DownloadJob, DownloaderBackend, ProgressEmitter};
use crate::downloader::utils::{check_exit, parse_ytdlp_progress, run_streaming};

pub struct YtDlpBackend {
    tools: ToolConfig,
    fetch: FetchConfig,
    emitter: ProgressEmitter,
}

impl YtDlpBackend {
    pub fn new(tools: ToolConfig, fetch: FetchConfig) -> Self {
        Self {
            tools,
            fetch,
            emitter: ProgressEmitter::silent(),
        }
    }

    pub fn with_emitter(mut self, emitter: ProgressEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    /// Full argument list for one job
    pub fn build_args(&self, job: &DownloadJob) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            self.tools.format.clone(),
            "--merge-output-format".to_string(),
            self.tools.merge_format.clone(),
            "-o".to_string(),
            job.output_template.clone(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--force-overwrites".to_string(),
            "--user-agent".to_string(),
            self.fetch.user_agent.clone(),
        ];

        if let Some(referer) = &job.referer {
            args.push("--referer".to_string());
            args.push(referer.clone());
        }

        args.extend([
            "--add-header".to_string(),
            "Accept:*/*".to_string(),
            "--add-header".to_string(),
            format!("Accept-Language:{}", self.fetch.accept_language),
            "--retries".to_string(),
            self.tools.retries.to_string(),
            "--fragment-retries".to_string(),
            self.tools.fragment_retries.to_string(),
            "--progress".to_string(),
            "--newline".to_string(),
        ]);

        if job.use_browser_cookies {
            args.push("--cookies-from-browser".to_string());
            args.push(self.tools.cookies_browser.clone());
        }

        if let Some(proxy) = &self.fetch.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        if self.fetch.accept_invalid_certs {
            args.push("--no-check-certificates".to_string());
        }

        if self.tools.embed_subs {
            args.push("--all-subs".to_string());
            args.push("--embed-subs".to_string());
        }

        args.push(job.source_url.clone());
        args
    }
}

#[async_trait]
impl DownloaderBackend for YtDlpBackend {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn download(&self, job: &DownloadJob) -> Result<(), ToolInvocationError> {
        let args = self.build_args(job);
        tracing::debug!(tool = self.name(), ?args, "spawning");

        self.emitter.emit(DownloadProgress {
            percent: 0.0,
            status: format!("Starting download of {}", job.source_url),
        });

        let emitter = self.emitter.clone();
        let run = run_streaming(&self.tools.ytdlp_path, &args, move |line| {
            match parse_ytdlp_progress(line) {
                Some(progress) => emitter.emit(progress),
                None => tracing::trace!(target: "tool_stdout", "{}", line),
            }
        })
        .await?;

        check_exit(self.name(), run)
    }
}
