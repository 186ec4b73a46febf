// Failure diagnostics - turns what went wrong into a cause checklist
//
// Looks at:
// - stderr of failed tool invocations
// - page-fetch errors
// - whether a verification page survived its retry
// and produces the guidance shown when every strategy is exhausted.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::downloader::errors::{FetchError, StrategyFailure};
use crate::downloader::models::{AcquisitionAttempt, AttemptOutcome};

lazy_static::lazy_static! {
    static ref BOT_WORD: Regex = Regex::new(r"\bbots?\b").unwrap();
}

/// Likely reasons a site refused to hand over its media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockingReason {
    /// Anti-bot interstitial / captcha
    BotChallenge,

    /// Login or session cookies required
    AuthRequired,

    /// Encrypted or DRM-protected stream. Permanent, no workaround.
    DrmEncrypted,

    /// HTTP 403 Forbidden - general access denied
    Http403Forbidden,

    /// 429 or similar
    RateLimited,

    GeoBlocked,

    /// Network timeout or refused connection
    NetworkTimeout,

    Unknown,
}

impl BlockingReason {
    /// Whether browser cookies could help
    pub fn cookies_might_help(&self) -> bool {
        matches!(
            self,
            Self::BotChallenge | Self::AuthRequired | Self::Http403Forbidden
        )
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::DrmEncrypted)
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::BotChallenge => "Site shows a visitor verification / bot challenge",
            Self::AuthRequired => "Content requires a logged-in account",
            Self::DrmEncrypted => "Video source is encrypted or DRM-protected",
            Self::Http403Forbidden => "Access denied (HTTP 403)",
            Self::RateLimited => "Rate limited by the site",
            Self::GeoBlocked => "Geographic restriction",
            Self::NetworkTimeout => "Network timeout or connection refused",
            Self::Unknown => "Unknown failure",
        }
    }
}

/// Always-shown causal checklist, most common first
const LIKELY_CAUSES: [BlockingReason; 3] = [
    BlockingReason::BotChallenge,
    BlockingReason::AuthRequired,
    BlockingReason::DrmEncrypted,
];

const REMEDIES: [&str; 4] = [
    "Open the page in a browser and play the video first, then retry (with browser cookies if the site needs a login)",
    "Find the source manually: press F12, open the Network tab, filter by m3u8 or mp4, copy the media URL and supply it at the manual prompt",
    "Use screen capture (macOS: Cmd+Shift+5, Windows: Win+Alt+R)",
    "Use a browser extension such as Video DownloadHelper",
];

/// Guidance attached to an exhausted run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnosis {
    /// Reasons actually observed during the run, first seen first
    pub observed: Vec<BlockingReason>,
    /// Fixed checklist of likely causes
    pub likely_causes: Vec<BlockingReason>,
    pub remedies: Vec<String>,
}

impl Diagnosis {
    /// Build a diagnosis from the attempts of a run
    pub fn from_attempts(attempts: &[AcquisitionAttempt], gate_persisted: bool) -> Self {
        let mut observed = Vec::new();
        let mut push = |reason: BlockingReason| {
            if !observed.contains(&reason) {
                observed.push(reason);
            }
        };

        if gate_persisted {
            push(BlockingReason::BotChallenge);
        }

        for attempt in attempts {
            if let AttemptOutcome::Failed { reason } = &attempt.outcome {
                if let Some(r) = diagnose_failure(reason) {
                    push(r);
                }
            }
        }

        Self {
            observed,
            likely_causes: LIKELY_CAUSES.to_vec(),
            remedies: REMEDIES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.observed.iter().any(BlockingReason::is_permanent)
    }
}

/// Classify a strategy failure, if it says anything about the site
pub fn diagnose_failure(failure: &StrategyFailure) -> Option<BlockingReason> {
    match failure {
        StrategyFailure::Fetch(e) => Some(diagnose_fetch(e)),
        StrategyFailure::Tool(e) => e.stderr().and_then(diagnose_error),
        _ => None,
    }
}

fn diagnose_fetch(error: &FetchError) -> BlockingReason {
    match error {
        FetchError::Timeout | FetchError::ConnectionRefused(_) => BlockingReason::NetworkTimeout,
        FetchError::HttpStatus(401) => BlockingReason::AuthRequired,
        FetchError::HttpStatus(403) => BlockingReason::Http403Forbidden,
        FetchError::HttpStatus(429) => BlockingReason::RateLimited,
        FetchError::HttpStatus(451) => BlockingReason::GeoBlocked,
        _ => BlockingReason::Unknown,
    }
}

/// Analyze tool output and return the blocking reason
pub fn diagnose_error(error: &str) -> Option<BlockingReason> {
    let lower = error.to_lowercase();

    // Most specific first

    if lower.contains("drm")
        || lower.contains("widevine")
        || lower.contains("playready")
        || lower.contains("fairplay")
        || lower.contains("encrypted")
        || lower.contains("decryption")
    {
        return Some(BlockingReason::DrmEncrypted);
    }

    if lower.contains("captcha")
        || lower.contains("cloudflare")
        || lower.contains("challenge")
        || lower.contains("verify you are human")
        || BOT_WORD.is_match(&lower)
        || error.contains("验证")
    {
        return Some(BlockingReason::BotChallenge);
    }

    if lower.contains("login")
        || lower.contains("log in")
        || lower.contains("sign in")
        || lower.contains("401")
        || lower.contains("unauthorized")
        || lower.contains("cookies")
        || lower.contains("登录")
    {
        return Some(BlockingReason::AuthRequired);
    }

    if lower.contains("not available in your country")
        || lower.contains("geo restrict")
        || lower.contains("geo-restrict")
        || lower.contains("451")
    {
        return Some(BlockingReason::GeoBlocked);
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return Some(BlockingReason::RateLimited);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(BlockingReason::Http403Forbidden);
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("network unreachable")
    {
        return Some(BlockingReason::NetworkTimeout);
    }

    if !error.trim().is_empty() {
        return Some(BlockingReason::Unknown);
    }

    None
}
