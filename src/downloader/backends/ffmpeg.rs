// ffmpeg stream copier - remuxes a manifest or progressive source into mp4

use async_trait::async_trait;

use crate::downloader::config::{FetchConfig, ToolConfig};
use crate::downloader::errors::ToolInvocationError;
use crate::downloader::traits::{StreamCopier, StreamCopyJob};
use crate::downloader::utils::{check_exit, run_streaming};

pub struct FfmpegCopier {
    ffmpeg_path: String,
    user_agent: String,
    proxy: Option<String>,
}

impl FfmpegCopier {
    pub fn new(tools: &ToolConfig, fetch: &FetchConfig) -> Self {
        Self {
            ffmpeg_path: tools.ffmpeg_path.clone(),
            user_agent: fetch.user_agent.clone(),
            proxy: fetch.proxy.clone(),
        }
    }

    pub fn build_args(&self, job: &StreamCopyJob) -> Vec<String> {
        let mut args = vec!["-user_agent".to_string(), self.user_agent.clone()];

        if let Some(referer) = &job.referer {
            args.push("-headers".to_string());
            args.push(format!("Referer: {}\r\n", referer));
        }

        // ffmpeg only understands plain HTTP proxies
        if let Some(proxy) = self.proxy.as_deref().filter(|p| p.starts_with("http://")) {
            args.push("-http_proxy".to_string());
            args.push(proxy.to_string());
        }

        args.extend([
            "-i".to_string(),
            job.source_url.clone(),
            "-c".to_string(),
            "copy".to_string(),
            "-bsf:a".to_string(),
            "aac_adtstoasc".to_string(),
            "-y".to_string(),
            job.output_path.to_string_lossy().into_owned(),
            "-loglevel".to_string(),
            "warning".to_string(),
            "-stats".to_string(),
        ]);
        args
    }
}

#[async_trait]
impl StreamCopier for FfmpegCopier {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn copy_stream(&self, job: &StreamCopyJob) -> Result<(), ToolInvocationError> {
        let args = self.build_args(job);
        tracing::debug!(tool = self.name(), ?args, "spawning");

        let run = run_streaming(&self.ffmpeg_path, &args, |line| {
            tracing::trace!(target: "tool_stdout", "{}", line);
        })
        .await?;

        check_exit(self.name(), run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn job() -> StreamCopyJob {
        StreamCopyJob {
            source_url: "https://cdn.example/v.m3u8".to_string(),
            referer: Some("https://site.example/watch/abc123.html".to_string()),
            output_path: PathBuf::from("/tmp/Videos/abc123.mp4"),
        }
    }

    #[test]
    fn copy_args_keep_codecs_and_send_referer() {
        let copier = FfmpegCopier::new(&ToolConfig::default(), &FetchConfig::default());
        let args = copier.build_args(&job());

        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "https://cdn.example/v.m3u8");
        assert!(args.contains(&"Referer: https://site.example/watch/abc123.html\r\n".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
        assert!(args.windows(2).any(|w| w[0] == "-bsf:a" && w[1] == "aac_adtstoasc"));
        assert!(args.contains(&"/tmp/Videos/abc123.mp4".to_string()));
        assert!(!args.contains(&"-http_proxy".to_string()));
    }

    #[test]
    fn no_referer_no_header() {
        let copier = FfmpegCopier::new(&ToolConfig::default(), &FetchConfig::default());
        let args = copier.build_args(&StreamCopyJob {
            referer: None,
            ..job()
        });
        assert!(!args.contains(&"-headers".to_string()));
    }

    #[test]
    fn only_http_proxies_are_forwarded() {
        let http = FetchConfig {
            proxy: Some("http://127.0.0.1:8080".to_string()),
            ..FetchConfig::default()
        };
        let args = FfmpegCopier::new(&ToolConfig::default(), &http).build_args(&job());
        assert!(args.windows(2).any(|w| w[0] == "-http_proxy" && w[1] == "http://127.0.0.1:8080"));

        let socks = FetchConfig {
            proxy: Some("socks5://127.0.0.1:1080".to_string()),
            ..FetchConfig::default()
        };
        let args = FfmpegCopier::new(&ToolConfig::default(), &socks).build_args(&job());
        assert!(!args.contains(&"-http_proxy".to_string()));
    }
}
