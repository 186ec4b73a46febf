// Page fetcher - browser-like HTTP GET with a persistent cookie jar

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use std::sync::Arc;

use super::config::FetchConfig;
use super::errors::FetchError;
use super::models::FetchResult;

/// Markers looked for in the final URL (lowercased)
const URL_GATE_MARKERS: [&str; 3] = ["verify", "captcha", "challenge"];

/// Markers looked for in the decoded body
const BODY_GATE_MARKERS: [&str; 3] = ["验证", "人机验证", "cf-challenge"];

/// Headers sent with a page fetch
#[derive(Debug, Clone)]
pub struct RequestHeaders {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub referer: Option<String>,
}

impl RequestHeaders {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            accept: config.accept.clone(),
            accept_language: config.accept_language.clone(),
            referer: None,
        }
    }

    pub fn with_referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer;
        self
    }

    fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        let pairs = [
            (USER_AGENT, Some(&self.user_agent)),
            (ACCEPT, Some(&self.accept)),
            (ACCEPT_LANGUAGE, Some(&self.accept_language)),
            (REFERER, self.referer.as_ref()),
        ];
        for (name, value) in pairs {
            if let Some(v) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
                map.insert(name, v);
            }
        }
        map.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));
        map
    }
}

/// Anything that can fetch a page
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, headers: &RequestHeaders) -> Result<FetchResult, FetchError>;
}

/// reqwest-backed fetcher. Cookies set by responses are kept in the jar and
/// replayed on later calls.
pub struct HttpPageFetcher {
    client: reqwest::Client,
    jar: Arc<Jar>,
    insecure: bool,
}

impl HttpPageFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        Self::with_jar(config, Arc::new(Jar::default()))
    }

    /// Build a fetcher sharing an existing cookie jar
    pub fn with_jar(config: &FetchConfig, jar: Arc<Jar>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .cookie_provider(jar.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .danger_accept_invalid_certs(config.accept_invalid_certs);

        if config.accept_invalid_certs {
            tracing::warn!("TLS certificate verification disabled for page fetches");
        }

        if let Some(proxy_url) = config.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| FetchError::Other(format!("invalid proxy {}: {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            jar,
            insecure: config.accept_invalid_certs,
        })
    }

    pub fn cookie_jar(&self) -> Arc<Jar> {
        self.jar.clone()
    }

    /// Whether TLS certificate errors are ignored
    pub fn accepts_invalid_certs(&self) -> bool {
        self.insecure
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str, headers: &RequestHeaders) -> Result<FetchResult, FetchError> {
        let parsed = url::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        tracing::debug!(url, "fetching page");
        let response = self
            .client
            .get(parsed)
            .headers(headers.to_header_map())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?
            .to_vec();

        let gated = is_verification_gate(&final_url, &decode_body(&body));
        tracing::debug!(final_url, bytes = body.len(), gated, "page fetched");

        Ok(FetchResult {
            final_url,
            body,
            gated,
        })
    }
}

/// Decode a page body as UTF-8, falling back to GBK for legacy sites
pub fn decode_body(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _, _) = encoding_rs::GBK.decode(body);
            text.into_owned()
        }
    }
}

/// Whether a response is an anti-bot interstitial rather than the page
pub fn is_verification_gate(final_url: &str, body: &str) -> bool {
    let url_lower = final_url.to_lowercase();
    URL_GATE_MARKERS.iter().any(|m| url_lower.contains(m))
        || BODY_GATE_MARKERS.iter().any(|m| body.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_body_decodes_directly() {
        assert_eq!(decode_body("视频 ok".as_bytes()), "视频 ok");
    }

    #[test]
    fn gbk_body_falls_back() {
        let (bytes, _, _) = encoding_rs::GBK.encode("请完成验证");
        assert!(std::str::from_utf8(&bytes).is_err());
        assert_eq!(decode_body(&bytes), "请完成验证");
    }

    #[test]
    fn gate_detected_by_url() {
        assert!(is_verification_gate("https://site.example/Verify?next=/a", "<html></html>"));
    }

    #[test]
    fn gate_detected_by_localized_body() {
        assert!(is_verification_gate("https://site.example/a", "<p>请完成人机验证</p>"));
    }

    #[test]
    fn plain_page_is_not_gated() {
        assert!(!is_verification_gate(
            "https://site.example/watch/1.html",
            r#"<video src="https://cdn.example/a.mp4"></video>"#
        ));
    }

    #[test]
    fn headers_include_referer_when_set() {
        let headers = RequestHeaders::from_config(&FetchConfig::default())
            .with_referer(Some("https://site.example/".to_string()));
        let map = headers.to_header_map();
        assert_eq!(map.get(REFERER).unwrap(), "https://site.example/");
        assert!(map.get(USER_AGENT).unwrap().to_str().unwrap().starts_with("Mozilla/5.0"));
    }
}
