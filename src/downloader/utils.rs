// Process helpers shared by the tool backends

use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::SystemTime;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};

use super::errors::ToolInvocationError;
use super::models::DownloadProgress;

/// Lines of stderr kept for diagnosis
const STDERR_TAIL_LINES: usize = 20;

/// Exit status plus the tail of stderr
#[derive(Debug)]
pub struct StreamedRun {
    pub status: ExitStatus,
    pub stderr_tail: String,
}

/// Run a command to completion, handing every stdout line to `on_line`.
///
/// No timeout: the tool's own retry/timeout behaviour applies. The child is
/// killed if the returned future is dropped (e.g. on Ctrl-C).
pub async fn run_streaming<F>(
    program: &str,
    args: &[String],
    mut on_line: F,
) -> Result<StreamedRun, ToolInvocationError>
where
    F: FnMut(&str) + Send,
{
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ToolInvocationError::Spawn {
            tool: program.to_string(),
            message: e.to_string(),
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ToolInvocationError::Io(format!("failed to capture stdout from {}", program)))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ToolInvocationError::Io(format!("failed to capture stderr from {}", program)))?;

    let stderr_task = tokio::spawn(async move {
        let mut tail: Vec<String> = Vec::new();
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: "tool_stderr", "{}", line);
            tail.push(line);
            if tail.len() > STDERR_TAIL_LINES {
                tail.remove(0);
            }
        }
        tail.join("\n")
    });

    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| ToolInvocationError::Io(format!("failed to read stdout: {}", e)))?
    {
        on_line(&line);
    }

    let status = child.wait().await.map_err(|e| ToolInvocationError::Io(format!(
        "failed to wait for {}: {}",
        program, e
    )))?;
    let stderr_tail = stderr_task.await.unwrap_or_default();

    Ok(StreamedRun { status, stderr_tail })
}

/// Run command with timeout, capturing all output (short probes only)
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, String> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("Failed to start {}: {}", program, e))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| format!("Failed to capture stdout from {}", program))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| format!("Failed to capture stderr from {}", program))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stdout: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stderr: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });

    let waited = timeout(TokioDuration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(status_res) => {
            let status = status_res.map_err(|e| format!("Failed to wait for {}: {}", program, e))?;
            let stdout = stdout_task
                .await
                .map_err(|e| format!("stdout task failed: {}", e))??;
            let stderr = stderr_task
                .await
                .map_err(|e| format!("stderr task failed: {}", e))??;
            Ok(std::process::Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(format!("Timed out after {}s", timeout_secs))
        }
    }
}

/// Map a finished run onto the tool error taxonomy
pub fn check_exit(tool: &str, run: StreamedRun) -> Result<(), ToolInvocationError> {
    if run.status.success() {
        Ok(())
    } else {
        Err(ToolInvocationError::NonZeroExit {
            tool: tool.to_string(),
            code: run.status.code(),
            stderr: run.stderr_tail,
        })
    }
}

/// Parse a yt-dlp `--newline` progress line like:
/// [download]   6.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32 (frag 29/454)
pub fn parse_ytdlp_progress(line: &str) -> Option<DownloadProgress> {
    lazy_static::lazy_static! {
        static ref PROGRESS_RE: Regex = Regex::new(
            r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*(\d+\.?\d*\s*\w+)(?:\s+at\s+(\S+/s))?(?:\s+ETA\s+(\S+))?(?:\s+\(frag\s+(\d+)/(\d+)\))?"
        ).unwrap();
        static ref DEST_RE: Regex = Regex::new(r"\[download\]\s+Destination:\s+(.+)").unwrap();
        static ref MERGE_RE: Regex = Regex::new(r"\[Merger?\]\s+Merging").unwrap();
        static ref ALREADY_RE: Regex = Regex::new(r"has already been downloaded").unwrap();
    }

    if let Some(caps) = PROGRESS_RE.captures(line) {
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        let size = caps.get(2).map(|m| m.as_str()).unwrap_or("?");
        let speed = caps.get(3).map(|m| m.as_str()).unwrap_or("?");
        let eta = caps.get(4).map(|m| m.as_str()).unwrap_or("");

        let mut status = format!("{:.1}% of {} @ {}", percent, size, speed);
        if !eta.is_empty() {
            status.push_str(&format!(" ETA {}", eta));
        }
        if let (Some(fc), Some(ft)) = (caps.get(5), caps.get(6)) {
            status.push_str(&format!(" (frag {}/{})", fc.as_str(), ft.as_str()));
        }

        return Some(DownloadProgress { percent, status });
    }

    if let Some(caps) = DEST_RE.captures(line) {
        let filename = caps.get(1).map(|m| m.as_str()).unwrap_or("file");
        let short_name: String = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string())
            .chars()
            .take(50)
            .collect();
        return Some(DownloadProgress {
            percent: 0.0,
            status: format!("Starting: {}", short_name),
        });
    }

    if MERGE_RE.is_match(line) {
        return Some(DownloadProgress {
            percent: 99.0,
            status: "Merging video and audio".to_string(),
        });
    }

    if ALREADY_RE.is_match(line) {
        return Some(DownloadProgress {
            percent: 100.0,
            status: "File already downloaded".to_string(),
        });
    }

    None
}

/// Partial-download suffixes left behind by interrupted tools
const PARTIAL_SUFFIXES: [&str; 4] = [".part", ".ytdl", ".temp", ".tmp"];

/// Complete, non-empty files in `dir` whose name starts with `base`, sorted by path
fn output_candidates(dir: &Path, base: &str) -> Vec<(PathBuf, Fingerprint)> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let mut found: Vec<(PathBuf, Fingerprint)> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.starts_with(base) && !PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s))
        })
        .filter_map(|e| {
            let meta = e.metadata().ok()?;
            (meta.is_file() && meta.len() > 0).then(|| {
                (
                    e.path(),
                    Fingerprint {
                        len: meta.len(),
                        modified: meta.modified().ok(),
                    },
                )
            })
        })
        .collect();
    found.sort_by(|a, b| a.0.cmp(&b.0));
    found
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

/// Output files that already existed before a tool ran.
///
/// A tool that exits 0 only counts as successful if it produced a file that
/// is new or changed relative to this snapshot; leftovers from an earlier
/// failed attempt never do.
#[derive(Debug, Default, Clone)]
pub struct OutputSnapshot {
    before: HashMap<PathBuf, Fingerprint>,
}

impl OutputSnapshot {
    pub fn take(dir: &Path, base: &str) -> Self {
        Self {
            before: output_candidates(dir, base).into_iter().collect(),
        }
    }

    /// First output written or modified since the snapshot was taken
    pub fn fresh_output(&self, dir: &Path, base: &str) -> Option<PathBuf> {
        output_candidates(dir, base)
            .into_iter()
            .find(|(path, print)| self.before.get(path) != Some(print))
            .map(|(path, _)| path)
    }
}
