// Acquisition chain - ordered fallback over every way of getting the asset
//
// Strategies run strictly one after another and the first file produced ends
// the run. Every tool or network failure becomes a recorded attempt; only
// configuration and filesystem faults abort.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::backends::{FfmpegCopier, YtDlpBackend};
use super::config::{CookiePolicy, GrabberConfig};
use super::errors::{DownloadError, StrategyFailure, ToolInvocationError};
use super::extractors::{Diagnosis, ExtractOrder, PatternExtractor};
use super::fetcher::{HttpPageFetcher, PageFetcher, RequestHeaders};
use super::filename::{derive_base_name, random_token};
use super::gate::{GateOutcome, VerificationGate};
use super::models::{
    is_page_url, AcquisitionAttempt, AcquisitionReport, AttemptMethod, AttemptOutcome,
    DownloadProgress, DownloadTarget, Outcome, StrategyKind,
};
use super::traits::{
    DownloadJob, DownloaderBackend, Operator, ProgressEmitter, StreamCopier, StreamCopyJob,
};
use super::utils::OutputSnapshot;

/// Attempts recorded so far plus what the gate saw
#[derive(Default)]
struct RunLog {
    attempts: Vec<AcquisitionAttempt>,
    gate_persisted: bool,
}

impl RunLog {
    fn record(
        &mut self,
        strategy: StrategyKind,
        method: Option<AttemptMethod>,
        target_url: &str,
        result: &Result<PathBuf, StrategyFailure>,
    ) {
        let outcome = match result {
            Ok(path) => AttemptOutcome::Succeeded { path: path.clone() },
            Err(reason) => AttemptOutcome::Failed {
                reason: reason.clone(),
            },
        };
        self.attempts.push(AcquisitionAttempt {
            strategy,
            method,
            target_url: target_url.to_string(),
            outcome,
        });
    }
}

pub struct AcquisitionChain {
    config: GrabberConfig,
    downloader: Arc<dyn DownloaderBackend>,
    copier: Arc<dyn StreamCopier>,
    fetcher: Arc<dyn PageFetcher>,
    operator: Arc<dyn Operator>,
    extractor: PatternExtractor,
    emitter: ProgressEmitter,
}

impl AcquisitionChain {
    pub fn new(
        config: GrabberConfig,
        downloader: Arc<dyn DownloaderBackend>,
        copier: Arc<dyn StreamCopier>,
        fetcher: Arc<dyn PageFetcher>,
        operator: Arc<dyn Operator>,
    ) -> Self {
        Self {
            config,
            downloader,
            copier,
            fetcher,
            operator,
            extractor: PatternExtractor::new(),
            emitter: ProgressEmitter::silent(),
        }
    }

    /// Chain wired to yt-dlp, ffmpeg and the reqwest fetcher
    pub fn from_config(
        config: GrabberConfig,
        operator: Arc<dyn Operator>,
        emitter: ProgressEmitter,
    ) -> Result<Self, DownloadError> {
        config.validate()?;
        let fetcher = HttpPageFetcher::new(&config.fetch)
            .map_err(|e| DownloadError::Config(e.to_string()))?;
        let downloader = YtDlpBackend::new(config.tools.clone(), config.fetch.clone())
            .with_emitter(emitter.clone());
        let copier = FfmpegCopier::new(&config.tools, &config.fetch);

        Ok(Self::new(
            config,
            Arc::new(downloader),
            Arc::new(copier),
            Arc::new(fetcher),
            operator,
        )
        .with_emitter(emitter))
    }

    pub fn with_emitter(mut self, emitter: ProgressEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_extract_order(mut self, order: ExtractOrder) -> Self {
        self.extractor = PatternExtractor::new().with_order(order);
        self
    }

    pub fn config(&self) -> &GrabberConfig {
        &self.config
    }

    /// Destination for `input`: a page URL, or a search query
    pub fn target_for(&self, input: &str) -> DownloadTarget {
        let input = input.trim();
        let base_name = if is_page_url(input) {
            derive_base_name(Some(input))
        } else {
            random_token()
        };
        DownloadTarget::new(input, base_name, self.config.download_dir.clone())
    }

    /// Run every strategy in order until one produces a file.
    ///
    /// Exhaustion is a normal outcome carried in the report; `Err` means the
    /// run itself could not proceed.
    pub async fn run(&self, input: &str) -> Result<AcquisitionReport, DownloadError> {
        self.config.validate()?;
        if input.trim().is_empty() {
            return Err(DownloadError::Config("no URL or search query given".to_string()));
        }

        let target = self.target_for(input);
        target.ensure_dir()?;
        tracing::info!(
            page = %target.page_url,
            base = %target.base_name,
            dir = %target.dest_dir.display(),
            "Starting acquisition"
        );

        let use_cookies = self.decide_cookies().await;
        let mut log = RunLog::default();

        for strategy in self.plan(use_cookies) {
            tracing::info!("Trying strategy: {}", strategy);
            self.emitter.emit(DownloadProgress {
                percent: 0.0,
                status: format!("Trying {}", strategy),
            });

            let result = match strategy {
                StrategyKind::Direct => self.acquire_page(&target, false, &mut log).await,
                StrategyKind::Credentialed => self.acquire_page(&target, true, &mut log).await,
                StrategyKind::ExtractedStream => self.acquire_extracted(&target, &mut log).await,
                StrategyKind::Manual => self.acquire_manual(&target, &mut log).await,
            };

            match result {
                Ok(path) => {
                    tracing::info!("✓ Success with {}: {}", strategy, path.display());
                    self.emitter.emit(DownloadProgress {
                        percent: 100.0,
                        status: "Download complete".to_string(),
                    });
                    return Ok(AcquisitionReport {
                        target,
                        attempts: log.attempts,
                        outcome: Outcome::Success { strategy, path },
                    });
                }
                Err(failure) => {
                    tracing::warn!("✗ {} failed: {}", strategy, failure);
                }
            }
        }

        let diagnosis = Diagnosis::from_attempts(&log.attempts, log.gate_persisted);
        tracing::warn!(observed = ?diagnosis.observed, "All strategies exhausted");
        Ok(AcquisitionReport {
            target,
            attempts: log.attempts,
            outcome: Outcome::Exhausted { diagnosis },
        })
    }

    /// Direct and credentialed are mutually exclusive per run
    fn plan(&self, use_cookies: bool) -> Vec<StrategyKind> {
        let first = if use_cookies {
            StrategyKind::Credentialed
        } else {
            StrategyKind::Direct
        };
        let mut plan = vec![first, StrategyKind::ExtractedStream];
        if self.config.manual_fallback {
            plan.push(StrategyKind::Manual);
        }
        plan
    }

    async fn decide_cookies(&self) -> bool {
        match self.config.cookie_policy {
            CookiePolicy::Never => false,
            CookiePolicy::Browser => true,
            CookiePolicy::Ask => {
                self.operator
                    .confirm_browser_cookies(&self.config.tools.cookies_browser)
                    .await
            }
        }
    }

    /// Strategies 1 and 2: the downloader against the page itself
    async fn acquire_page(
        &self,
        target: &DownloadTarget,
        use_cookies: bool,
        log: &mut RunLog,
    ) -> Result<PathBuf, StrategyFailure> {
        let strategy = if use_cookies {
            StrategyKind::Credentialed
        } else {
            StrategyKind::Direct
        };
        let source = target.downloader_source();
        self.acquire_generic(strategy, target, &source, use_cookies, log)
            .await
    }

    /// Strategy 3: fetch, extract, then try each candidate in order
    async fn acquire_extracted(
        &self,
        target: &DownloadTarget,
        log: &mut RunLog,
    ) -> Result<PathBuf, StrategyFailure> {
        let strategy = StrategyKind::ExtractedStream;

        if target.referer().is_none() {
            let result = Err(StrategyFailure::NotAPage);
            log.record(strategy, None, &target.page_url, &result);
            return result;
        }

        let headers = RequestHeaders::from_config(&self.config.fetch);
        let gate = VerificationGate::new(self.fetcher.as_ref(), self.config.fetch.gate_cooldown);
        let fetched = match gate.fetch(&target.page_url, &headers).await {
            Ok(fetched) => fetched,
            Err(e) => {
                let result = Err(StrategyFailure::Fetch(e));
                log.record(strategy, None, &target.page_url, &result);
                return result;
            }
        };

        if fetched.outcome == GateOutcome::Persisted {
            tracing::warn!("Verification page persisted after retry, scanning it anyway");
            log.gate_persisted = true;
        }

        let candidates = self.extractor.extract(&fetched.result.text());
        if candidates.is_empty() {
            let result = Err(StrategyFailure::ExtractionEmpty);
            log.record(strategy, None, &fetched.result.final_url, &result);
            return result;
        }

        tracing::info!("Found {} source candidates", candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            tracing::info!(
                kind = %candidate.kind,
                "Trying source {}/{}: {}",
                i + 1,
                candidates.len(),
                candidate.url
            );
            match self.acquire_source(strategy, target, &candidate.url, log).await {
                Ok(path) => return Ok(path),
                Err(e) => tracing::debug!(url = %candidate.url, error = %e, "source failed"),
            }
        }

        Err(StrategyFailure::AllCandidatesFailed(candidates.len()))
    }

    /// Strategy 4: whatever the operator pastes
    async fn acquire_manual(
        &self,
        target: &DownloadTarget,
        log: &mut RunLog,
    ) -> Result<PathBuf, StrategyFailure> {
        let source = self
            .operator
            .manual_source_url()
            .await
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        match source {
            Some(source) => {
                self.acquire_source(StrategyKind::Manual, target, &source, log)
                    .await
            }
            None => {
                let result = Err(StrategyFailure::NoManualSource);
                log.record(StrategyKind::Manual, None, "", &result);
                result
            }
        }
    }

    /// One source URL: downloader first, then stream copy
    async fn acquire_source(
        &self,
        strategy: StrategyKind,
        target: &DownloadTarget,
        source: &str,
        log: &mut RunLog,
    ) -> Result<PathBuf, StrategyFailure> {
        if let Ok(path) = self
            .acquire_generic(strategy, target, source, false, log)
            .await
        {
            return Ok(path);
        }
        self.acquire_stream_copy(strategy, target, source, log).await
    }

    async fn acquire_generic(
        &self,
        strategy: StrategyKind,
        target: &DownloadTarget,
        source: &str,
        use_cookies: bool,
        log: &mut RunLog,
    ) -> Result<PathBuf, StrategyFailure> {
        let job = DownloadJob {
            source_url: source.to_string(),
            referer: target.referer().map(str::to_string),
            output_template: target.output_template(),
            use_browser_cookies: use_cookies,
        };
        tracing::debug!(backend = self.downloader.name(), source, "Trying download");

        let snapshot = OutputSnapshot::take(&target.dest_dir, &target.base_name);
        let result = match self.downloader.download(&job).await {
            Ok(()) => snapshot.fresh_output(&target.dest_dir, &target.base_name).ok_or_else(|| {
                StrategyFailure::Tool(ToolInvocationError::MissingOutput {
                    tool: self.downloader.name().to_string(),
                    expected: job.output_template.clone(),
                })
            }),
            Err(e) => Err(StrategyFailure::Tool(e)),
        };

        log.record(strategy, Some(AttemptMethod::GenericDownloader), source, &result);
        result
    }

    async fn acquire_stream_copy(
        &self,
        strategy: StrategyKind,
        target: &DownloadTarget,
        source: &str,
        log: &mut RunLog,
    ) -> Result<PathBuf, StrategyFailure> {
        let job = StreamCopyJob {
            source_url: source.to_string(),
            referer: target.referer().map(str::to_string),
            output_path: target.stream_copy_path(),
        };
        tracing::debug!(copier = self.copier.name(), source, "Trying stream copy");

        let result = match self.copier.copy_stream(&job).await {
            Ok(()) => {
                let non_empty = std::fs::metadata(&job.output_path)
                    .map(|m| m.is_file() && m.len() > 0)
                    .unwrap_or(false);
                if non_empty {
                    Ok(job.output_path.clone())
                } else {
                    Err(StrategyFailure::Tool(ToolInvocationError::MissingOutput {
                        tool: self.copier.name().to_string(),
                        expected: job.output_path.to_string_lossy().into_owned(),
                    }))
                }
            }
            Err(e) => Err(StrategyFailure::Tool(e)),
        };

        if result.is_err() {
            discard_partial(&job.output_path);
        }

        log.record(strategy, Some(AttemptMethod::StreamCopy), source, &result);
        result
    }
}

/// Remove whatever a failed stream copy left at `path`
fn discard_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "Could not remove partial output: {}", e),
    }
}
