// Common data models for the acquisition pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::errors::StrategyFailure;
use super::extractors::Diagnosis;

/// Which pattern family produced a candidate, highest confidence first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CandidateKind {
    /// Streaming manifest (.m3u8)
    Manifest,
    /// Progressive video file (.mp4)
    Progressive,
    /// `url` field of an embedded player-config object
    PlayerConfig,
    /// `src` of an iframe
    Iframe,
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manifest => write!(f, "m3u8"),
            Self::Progressive => write!(f, "mp4"),
            Self::PlayerConfig => write!(f, "player-config"),
            Self::Iframe => write!(f, "iframe"),
        }
    }
}

/// A media-source URL found in page markup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCandidate {
    /// Normalized absolute URL
    pub url: String,
    pub kind: CandidateKind,
}

impl SourceCandidate {
    pub fn new(url: impl Into<String>, kind: CandidateKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }

    /// De-duplication key
    pub fn key(&self) -> &str {
        &self.url
    }
}

/// Raw result of one page fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// URL after redirects
    pub final_url: String,
    pub body: Vec<u8>,
    /// Whether the response looks like a verification interstitial
    pub gated: bool,
}

impl FetchResult {
    /// Body decoded as text (UTF-8, legacy fallback)
    pub fn text(&self) -> String {
        crate::downloader::fetcher::decode_body(&self.body)
    }
}

/// The two pipeline-level strategy families plus the manual fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Generic downloader against the page, no credentials
    Direct,
    /// Generic downloader importing browser cookies
    Credentialed,
    /// Fetch page, extract candidates, acquire each
    ExtractedStream,
    /// Operator-supplied source URL
    Manual,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Credentialed => write!(f, "browser-cookies"),
            Self::ExtractedStream => write!(f, "extracted-stream"),
            Self::Manual => write!(f, "manual-source"),
        }
    }
}

/// Tool used by a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptMethod {
    GenericDownloader,
    StreamCopy,
}

/// Result of a single attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded { path: PathBuf },
    Failed { reason: StrategyFailure },
}

/// One acquisition attempt, as recorded in the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionAttempt {
    pub strategy: StrategyKind,
    /// `None` when the strategy failed before any tool ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<AttemptMethod>,
    pub target_url: String,
    pub outcome: AttemptOutcome,
}

impl AcquisitionAttempt {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Succeeded { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.outcome {
            AttemptOutcome::Succeeded { path } => Some(path),
            AttemptOutcome::Failed { .. } => None,
        }
    }
}

/// Downloader pseudo-URL prefix for a single-result search
pub const SEARCH_PREFIX: &str = "ytsearch1:";

/// Absolute http(s) URL with a host
pub fn is_page_url(input: &str) -> bool {
    url::Url::parse(input)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Where the asset for one page lands
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadTarget {
    /// Page URL, or the search query in search mode
    pub page_url: String,
    /// Stable for every attempt against the same page
    pub base_name: String,
    pub dest_dir: PathBuf,
}

impl DownloadTarget {
    pub fn new(page_url: impl Into<String>, base_name: impl Into<String>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            page_url: page_url.into(),
            base_name: base_name.into(),
            dest_dir: dest_dir.into(),
        }
    }

    /// Referer for tool invocations; `None` in search mode
    pub fn referer(&self) -> Option<&str> {
        is_page_url(&self.page_url).then_some(self.page_url.as_str())
    }

    /// What the generic downloader is pointed at for the page itself
    pub fn downloader_source(&self) -> String {
        if is_page_url(&self.page_url) {
            self.page_url.clone()
        } else {
            format!("{}{}", SEARCH_PREFIX, self.page_url)
        }
    }

    /// Create the destination directory if it is missing
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dest_dir)
    }

    /// Downloader output template: `<dir>/<base>.%(ext)s`
    pub fn output_template(&self) -> String {
        self.dest_dir
            .join(format!("{}.%(ext)s", self.base_name))
            .to_string_lossy()
            .to_string()
    }

    /// Fixed output path used by stream copy
    pub fn stream_copy_path(&self) -> PathBuf {
        self.dest_dir.join(format!("{}.mp4", self.base_name))
    }
}

/// Terminal outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        strategy: StrategyKind,
        path: PathBuf,
    },
    /// Every strategy failed; not an error, reported with guidance
    Exhausted { diagnosis: Diagnosis },
}

/// Everything a run did, in order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionReport {
    pub target: DownloadTarget,
    pub attempts: Vec<AcquisitionAttempt>,
    pub outcome: Outcome,
}

impl AcquisitionReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// Attempts made under one strategy
    pub fn attempts_for(&self, strategy: StrategyKind) -> impl Iterator<Item = &AcquisitionAttempt> {
        self.attempts.iter().filter(move |a| a.strategy == strategy)
    }
}

/// Download progress information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub percent: f32,
    pub status: String,
}
