// Verification-gate handler
//
// Two states. `Direct` is the first fetch; seeing a challenge marker moves to
// `Retrying`, waits for the cooldown and fetches once more. Whatever the retry
// returns is handed back, gated or not.

use serde::Serialize;
use std::time::Duration;

use super::errors::FetchError;
use super::fetcher::{is_verification_gate, PageFetcher, RequestHeaders};
use super::models::FetchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateState {
    Direct,
    Retrying,
}

/// How the gate was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateOutcome {
    /// No challenge on the first fetch
    Passed,
    /// Challenge on the first fetch, clean body after the retry
    Cleared,
    /// Still a challenge after the retry. The body is low-confidence but usable.
    Persisted,
}

#[derive(Debug, Clone)]
pub struct GatedFetch {
    pub result: FetchResult,
    /// Terminal state of the machine
    pub state: GateState,
    pub outcome: GateOutcome,
}

impl GatedFetch {
    pub fn is_gated(&self) -> bool {
        self.outcome == GateOutcome::Persisted
    }
}

pub struct VerificationGate<'a> {
    fetcher: &'a dyn PageFetcher,
    cooldown: Duration,
}

impl<'a> VerificationGate<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, cooldown: Duration) -> Self {
        Self { fetcher, cooldown }
    }

    /// Fetch `url`, retrying exactly once if a verification page comes back
    pub async fn fetch(&self, url: &str, headers: &RequestHeaders) -> Result<GatedFetch, FetchError> {
        let mut state = GateState::Direct;

        loop {
            let mut result = self.fetcher.fetch(url, headers).await?;
            result.gated = result.gated || is_verification_gate(&result.final_url, &result.text());

            match (state, result.gated) {
                (GateState::Direct, false) => {
                    return Ok(GatedFetch {
                        result,
                        state,
                        outcome: GateOutcome::Passed,
                    });
                }
                (GateState::Retrying, false) => {
                    tracing::info!(url, "verification page cleared after retry");
                    return Ok(GatedFetch {
                        result,
                        state,
                        outcome: GateOutcome::Cleared,
                    });
                }
                (GateState::Direct, true) => {
                    tracing::info!(
                        url,
                        cooldown_ms = self.cooldown.as_millis() as u64,
                        "verification page detected, waiting before retry"
                    );
                    state = GateState::Retrying;
                    tokio::time::sleep(self.cooldown).await;
                }
                (GateState::Retrying, true) => {
                    tracing::warn!(url, "verification page persisted after retry, using body as-is");
                    return Ok(GatedFetch {
                        result,
                        state,
                        outcome: GateOutcome::Persisted,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::config::FetchConfig;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays canned bodies, repeating the last one
    struct ScriptedFetcher {
        bodies: Vec<&'static str>,
        calls: Mutex<usize>,
    }

    impl ScriptedFetcher {
        fn new(bodies: Vec<&'static str>) -> Self {
            Self {
                bodies,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str, _headers: &RequestHeaders) -> Result<FetchResult, FetchError> {
            let mut calls = self.calls.lock().unwrap();
            let body = self.bodies[(*calls).min(self.bodies.len() - 1)];
            *calls += 1;
            Ok(FetchResult {
                final_url: url.to_string(),
                body: body.as_bytes().to_vec(),
                gated: false,
            })
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl PageFetcher for FailingFetcher {
        async fn fetch(&self, _url: &str, _headers: &RequestHeaders) -> Result<FetchResult, FetchError> {
            Err(FetchError::Timeout)
        }
    }

    fn headers() -> RequestHeaders {
        RequestHeaders::from_config(&FetchConfig::default())
    }

    #[tokio::test]
    async fn clean_page_passes_with_one_call() {
        let fetcher = ScriptedFetcher::new(vec!["<html>ok</html>"]);
        let gate = VerificationGate::new(&fetcher, Duration::ZERO);

        let out = gate.fetch("https://site.example/a.html", &headers()).await.unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(out.state, GateState::Direct);
        assert_eq!(out.outcome, GateOutcome::Passed);
    }

    #[tokio::test]
    async fn challenge_then_clean_returns_clean_body() {
        let fetcher = ScriptedFetcher::new(vec!["<p>请完成验证</p>", "<html>real page</html>"]);
        let gate = VerificationGate::new(&fetcher, Duration::ZERO);

        let out = gate.fetch("https://site.example/a.html", &headers()).await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(out.state, GateState::Retrying);
        assert_eq!(out.outcome, GateOutcome::Cleared);
        assert_eq!(out.result.text(), "<html>real page</html>");
        assert!(!out.is_gated());
    }

    #[tokio::test]
    async fn persistent_challenge_retries_exactly_once() {
        let fetcher = ScriptedFetcher::new(vec!["<p>请完成验证</p>"]);
        let gate = VerificationGate::new(&fetcher, Duration::ZERO);

        let out = gate.fetch("https://site.example/a.html", &headers()).await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(out.outcome, GateOutcome::Persisted);
        assert!(out.is_gated());
        assert_eq!(out.result.text(), "<p>请完成验证</p>");
    }

    #[tokio::test]
    async fn gate_in_final_url_triggers_retry() {
        struct RedirectingFetcher(Mutex<usize>);

        #[async_trait]
        impl PageFetcher for RedirectingFetcher {
            async fn fetch(&self, url: &str, _h: &RequestHeaders) -> Result<FetchResult, FetchError> {
                let mut n = self.0.lock().unwrap();
                *n += 1;
                let final_url = if *n == 1 {
                    "https://site.example/verify?to=a".to_string()
                } else {
                    url.to_string()
                };
                Ok(FetchResult {
                    final_url,
                    body: b"<html></html>".to_vec(),
                    gated: false,
                })
            }
        }

        let fetcher = RedirectingFetcher(Mutex::new(0));
        let gate = VerificationGate::new(&fetcher, Duration::ZERO);
        let out = gate.fetch("https://site.example/a.html", &headers()).await.unwrap();

        assert_eq!(*fetcher.0.lock().unwrap(), 2);
        assert_eq!(out.outcome, GateOutcome::Cleared);
    }

    #[tokio::test]
    async fn fetch_error_is_propagated() {
        let gate = VerificationGate::new(&FailingFetcher, Duration::ZERO);
        let err = gate.fetch("https://site.example/a.html", &headers()).await.unwrap_err();
        assert_eq!(err, FetchError::Timeout);
    }
}
