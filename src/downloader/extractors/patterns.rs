// Pattern extractor - finds media-source URLs in raw page markup
//
// Best-effort by nature: the markup is third-party and often hostile. Each
// pattern carries the kind of candidate it produces. Matches that look like a
// JSON object are parsed for a `url` field; fragments that fail to parse are
// dropped without a diagnostic, they are expected noise.

use regex::Regex;
use std::collections::HashSet;

use crate::downloader::models::{CandidateKind, SourceCandidate};

struct SourcePattern {
    regex: Regex,
    kind: CandidateKind,
}

lazy_static::lazy_static! {
    /// Ordered highest confidence first. Flags: case-insensitive, `.` spans lines.
    static ref PATTERNS: Vec<SourcePattern> = {
        let table: [(&str, CandidateKind); 11] = [
            (r#"https?://[^"\s<>']+\.m3u8[^"\s<>']*"#, CandidateKind::Manifest),
            (r#""url":\s*"([^"]+\.m3u8[^"]*)""#, CandidateKind::Manifest),
            (r#"'url':\s*'([^']+\.m3u8[^']*)'"#, CandidateKind::Manifest),
            (r#"url:\s*["']([^"']+\.m3u8[^"']*)["']"#, CandidateKind::Manifest),
            (r#"https?://[^"\s<>']+\.mp4[^"\s<>']*"#, CandidateKind::Progressive),
            (r#""url":\s*"([^"]+\.mp4[^"]*)""#, CandidateKind::Progressive),
            (r#"'url':\s*'([^']+\.mp4[^']*)'"#, CandidateKind::Progressive),
            (r#"url:\s*["']([^"']+\.mp4[^"']*)["']"#, CandidateKind::Progressive),
            (r#"player_aaaa\s*=\s*(\{[^}]+\})"#, CandidateKind::PlayerConfig),
            (r#"var\s+player[^=]*=\s*(\{.+?\});"#, CandidateKind::PlayerConfig),
            (r#"<iframe[^>]+src=["'](https?://[^"']+)["']"#, CandidateKind::Iframe),
        ];
        table
            .iter()
            .map(|(pattern, kind)| SourcePattern {
                regex: Regex::new(&format!("(?is){}", pattern)).unwrap(),
                kind: *kind,
            })
            .collect()
    };
}

/// Output ordering of the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractOrder {
    /// First occurrence in the markup
    #[default]
    Document,
    /// Grouped by candidate kind (manifest, progressive, player config,
    /// iframe), document order inside each group
    Confidence,
}

/// A raw hit before de-duplication
struct Hit {
    offset: usize,
    rank: usize,
    candidate: SourceCandidate,
}

#[derive(Debug, Clone, Default)]
pub struct PatternExtractor {
    order: ExtractOrder,
}

impl PatternExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_order(mut self, order: ExtractOrder) -> Self {
        self.order = order;
        self
    }

    /// De-duplicated candidates found in `markup`
    pub fn extract(&self, markup: &str) -> Vec<SourceCandidate> {
        let mut hits = Vec::new();

        for (rank, pattern) in PATTERNS.iter().enumerate() {
            for caps in pattern.regex.captures_iter(markup) {
                let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                    continue;
                };
                if let Some(url) = candidate_url(m.as_str()) {
                    hits.push(Hit {
                        offset: m.start(),
                        rank,
                        candidate: SourceCandidate::new(url, pattern.kind),
                    });
                }
            }
        }

        hits.sort_by_key(|h| (h.offset, h.rank));

        let mut seen = HashSet::new();
        let mut candidates: Vec<SourceCandidate> = hits
            .into_iter()
            .filter(|h| seen.insert(h.candidate.key().to_string()))
            .map(|h| h.candidate)
            .collect();

        if self.order == ExtractOrder::Confidence {
            candidates.sort_by_key(|c| c.kind);
        }

        tracing::debug!(count = candidates.len(), "extracted source candidates");
        candidates
    }
}

/// Extract with the default (document) ordering
pub fn extract_candidates(markup: &str) -> Vec<SourceCandidate> {
    PatternExtractor::new().extract(markup)
}

/// Turn one regex match into a normalized absolute URL, if it is one
fn candidate_url(matched: &str) -> Option<String> {
    let trimmed = matched.trim();
    let raw = if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        value.get("url")?.as_str()?.to_string()
    } else {
        trimmed.to_string()
    };

    let url = normalize(&raw);
    is_absolute_url(&url).then_some(url)
}

/// Undo `\/` and `\"` escapes and strip surrounding quotes
pub fn normalize(raw: &str) -> String {
    raw.replace("\\/", "/")
        .replace("\\\"", "\"")
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

fn is_absolute_url(candidate: &str) -> bool {
    match url::Url::parse(candidate) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}
