pub mod cli;
pub mod console;
pub mod downloader;

pub use downloader::{AcquisitionChain, AcquisitionReport, DownloadError, GrabberConfig, Outcome};
