// Terminal operator prompts and report rendering

use async_trait::async_trait;
use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use crate::downloader::models::{AcquisitionReport, AttemptOutcome, Outcome};
use crate::downloader::traits::{Operator, ProgressEmitter};

/// Operator backed by stdin/stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleOperator;

impl ConsoleOperator {
    /// Print `prompt` and read one trimmed line; `None` on EOF or read error
    pub async fn ask(prompt: &str) -> Option<String> {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            let mut stderr = io::stderr();
            let _ = write!(stderr, "{}", prompt);
            let _ = stderr.flush();

            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line.trim().to_string()),
            }
        })
        .await
        .ok()
        .flatten()
    }

    async fn confirm(prompt: &str) -> bool {
        matches!(
            Self::ask(prompt).await.as_deref().map(str::to_lowercase).as_deref(),
            Some("y") | Some("yes")
        )
    }
}

#[async_trait]
impl Operator for ConsoleOperator {
    async fn confirm_browser_cookies(&self, browser: &str) -> bool {
        eprintln!();
        eprintln!("Use {} browser cookies?", browser);
        eprintln!("  + can reach content that needs a logged-in session");
        eprintln!("  - the OS may ask for permission to read the browser's credential store");
        Self::confirm("Use browser cookies? (y/N): ").await
    }

    async fn manual_source_url(&self) -> Option<String> {
        eprintln!();
        eprintln!("{}", "=".repeat(60));
        eprintln!("Find the media source manually:");
        eprintln!("{}", "=".repeat(60));
        eprintln!("1. Open the video page in a browser and start playback");
        eprintln!("2. Press F12 to open the developer tools");
        eprintln!("3. Switch to the Network tab");
        eprintln!("4. Type m3u8 or mp4 into the filter box");
        eprintln!("5. Right-click the media request and copy its URL");
        eprintln!("6. Paste it here");
        eprintln!();
        Self::ask("Source URL (Enter to skip): ")
            .await
            .filter(|s| !s.is_empty())
    }

    async fn confirm_install(&self, tool: &str) -> bool {
        eprintln!();
        eprintln!("{} is not installed.", tool);
        Self::confirm("Install it now? (y/N): ").await
    }
}

/// Single-line progress on stderr
pub fn terminal_emitter() -> ProgressEmitter {
    ProgressEmitter::new(|progress| {
        let mut stderr = io::stderr();
        let _ = write!(stderr, "\r\x1b[2K{:>5.1}% {}", progress.percent, progress.status);
        if progress.percent >= 100.0 {
            let _ = writeln!(stderr);
        }
        let _ = stderr.flush();
    })
}

/// Human-readable run summary
pub fn render_report(report: &AcquisitionReport) -> String {
    let mut out = String::new();
    let rule = "=".repeat(60);

    let _ = writeln!(out, "{}", rule);
    for attempt in &report.attempts {
        let method = attempt
            .method
            .map(|m| format!("{:?}", m))
            .unwrap_or_else(|| "-".to_string());
        match &attempt.outcome {
            AttemptOutcome::Succeeded { path } => {
                let _ = writeln!(out, "  ✓ [{}/{}] {}", attempt.strategy, method, path.display());
            }
            AttemptOutcome::Failed { reason } => {
                let _ = writeln!(out, "  ✗ [{}/{}] {}", attempt.strategy, method, reason);
            }
        }
    }

    match &report.outcome {
        Outcome::Success { strategy, path } => {
            let _ = writeln!(out, "Download complete ({})", strategy);
            let _ = writeln!(out, "Saved to: {}", path.display());
        }
        Outcome::Exhausted { diagnosis } => {
            let _ = writeln!(out, "Download failed");
            let _ = writeln!(out, "{}", rule);
            if !diagnosis.observed.is_empty() {
                let _ = writeln!(out, "Observed:");
                for reason in &diagnosis.observed {
                    let _ = writeln!(out, "  • {}", reason.description());
                }
            }
            let _ = writeln!(out, "Likely causes:");
            for reason in &diagnosis.likely_causes {
                let _ = writeln!(out, "  • {}", reason.description());
            }
            if diagnosis.observed.iter().any(|r| r.cookies_might_help()) {
                let _ = writeln!(out, "Tip: retry with --cookies to reuse your browser session");
            }
            let _ = writeln!(out, "Try:");
            for (i, remedy) in diagnosis.remedies.iter().enumerate() {
                let _ = writeln!(out, "  {}. {}", i + 1, remedy);
            }
            let _ = writeln!(
                out,
                "Any partial file under {} should not be trusted.",
                report.target.dest_dir.display()
            );
        }
    }
    let _ = write!(out, "{}", rule);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::errors::StrategyFailure;
    use crate::downloader::extractors::Diagnosis;
    use crate::downloader::models::{AcquisitionAttempt, AttemptMethod, DownloadTarget, StrategyKind};
    use std::path::PathBuf;

    fn target() -> DownloadTarget {
        DownloadTarget::new("https://site.example/v/abc.html", "abc", "/tmp/Videos")
    }

    #[test]
    fn success_report_names_the_file() {
        let path = PathBuf::from("/tmp/Videos/abc.mp4");
        let report = AcquisitionReport {
            target: target(),
            attempts: vec![AcquisitionAttempt {
                strategy: StrategyKind::Direct,
                method: Some(AttemptMethod::GenericDownloader),
                target_url: "https://site.example/v/abc.html".to_string(),
                outcome: AttemptOutcome::Succeeded { path: path.clone() },
            }],
            outcome: Outcome::Success {
                strategy: StrategyKind::Direct,
                path,
            },
        };
        let text = render_report(&report);
        assert!(text.contains("Download complete (direct)"));
        assert!(text.contains("Saved to: /tmp/Videos/abc.mp4"));
    }

    #[test]
    fn exhausted_report_lists_causes_and_remedies() {
        let attempts = vec![AcquisitionAttempt {
            strategy: StrategyKind::ExtractedStream,
            method: None,
            target_url: "https://site.example/v/abc.html".to_string(),
            outcome: AttemptOutcome::Failed {
                reason: StrategyFailure::ExtractionEmpty,
            },
        }];
        let diagnosis = Diagnosis::from_attempts(&attempts, true);
        let report = AcquisitionReport {
            target: target(),
            attempts,
            outcome: Outcome::Exhausted { diagnosis },
        };
        let text = render_report(&report);
        assert!(text.contains("Download failed"));
        assert!(text.contains("[extracted-stream/-] no media source candidates found in page"));
        assert!(text.contains("Likely causes:"));
        assert!(text.contains("Video DownloadHelper"));
        assert!(text.contains("should not be trusted"));
        assert!(text.contains("retry with --cookies"));
    }
}
