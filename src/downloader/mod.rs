// Downloader module - source resolution and acquisition pipeline
//
// Leaves first: extractors and filename are pure, fetcher talks HTTP, gate
// wraps the fetcher, backends wrap the external tools, orchestrator runs the
// strategy chain over all of them.

pub mod backends;
pub mod config;
pub mod errors;
pub mod extractors;
pub mod fetcher;
pub mod filename;
pub mod gate;
pub mod models;
pub mod orchestrator;
pub mod tools;
pub mod traits;
pub mod utils;

pub use config::{CookiePolicy, GrabberConfig};
pub use errors::{DownloadError, FetchError, StrategyFailure, ToolInvocationError};
pub use models::{
    AcquisitionAttempt, AcquisitionReport, DownloadProgress, DownloadTarget, Outcome,
    SourceCandidate, StrategyKind,
};
pub use orchestrator::AcquisitionChain;
pub use traits::{DownloaderBackend, Operator, ProgressEmitter, StreamCopier};
