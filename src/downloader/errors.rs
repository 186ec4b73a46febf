// Error types for the acquisition pipeline
//
// Only `DownloadError` is allowed to abort a run. Everything else is caught at
// the strategy boundary and recorded as "this strategy failed".

use serde::Serialize;
use thiserror::Error;

/// Failure of a single page fetch
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum FetchError {
    /// The fetch did not complete inside the configured budget
    #[error("page fetch timed out")]
    Timeout,

    /// Could not open a connection (refused, DNS, unreachable)
    #[error("connection failed: {0}")]
    ConnectionRefused(String),

    /// Certificate or handshake problem
    #[error("TLS error: {0}")]
    Tls(String),

    /// Server answered with a non-success status
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Target is not a fetchable absolute URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("fetch failed: {0}")]
    Other(String),
}

impl FetchError {
    /// Map a reqwest error onto the fetch taxonomy
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if let Some(status) = err.status() {
            return Self::HttpStatus(status.as_u16());
        }

        let chain = error_chain(err);
        let lower = chain.to_lowercase();
        if lower.contains("certificate")
            || lower.contains("tls")
            || lower.contains("ssl")
            || lower.contains("handshake")
        {
            return Self::Tls(chain);
        }
        if err.is_connect() {
            return Self::ConnectionRefused(chain);
        }
        if err.is_builder() {
            return Self::InvalidUrl(chain);
        }
        Self::Other(chain)
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

/// Failure of one external tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ToolInvocationError {
    /// The process could not be started at all
    #[error("failed to start {tool}: {message}")]
    Spawn { tool: String, message: String },

    /// The process exited unsuccessfully
    #[error("{tool} exited with status {code:?}")]
    NonZeroExit {
        tool: String,
        code: Option<i32>,
        /// Last lines of stderr, kept for diagnosis
        stderr: String,
    },

    /// Exit status was fine but nothing usable landed on disk
    #[error("{tool} produced no output file matching {expected}")]
    MissingOutput { tool: String, expected: String },

    #[error("I/O error: {0}")]
    Io(String),
}

impl ToolInvocationError {
    /// Captured stderr, if any
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { stderr, .. } if !stderr.is_empty() => Some(stderr),
            _ => None,
        }
    }
}

/// Why one strategy (or one attempt inside it) did not produce a file
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum StrategyFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The page was fetched but no source candidates were found
    #[error("no media source candidates found in page")]
    ExtractionEmpty,

    #[error(transparent)]
    Tool(#[from] ToolInvocationError),

    /// Input was a search query, there is no page to scan
    #[error("input is not a web page")]
    NotAPage,

    /// Operator skipped the manual source prompt
    #[error("no manual source supplied")]
    NoManualSource,

    #[error("all {0} extracted candidates failed")]
    AllCandidatesFailed(usize),
}

/// Fatal errors: the run cannot continue
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Malformed configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Required external tool is missing
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Run interrupted by the operator
    #[error("cancelled by user")]
    Cancelled,

    #[error("unknown error: {0}")]
    Unknown(String),
}
