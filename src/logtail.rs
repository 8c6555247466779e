//! Bounded reads of the tail of the server's rotating log file.
//!
//! [`TailLogSource`] runs `tail -n <N> <path>` directly (no shell, so the
//! path is never interpreted), keeps the newest [`MAX_TAIL_OUTPUT`] bytes of
//! stdout and enforces the configured timeout. The child is spawned with
//! `kill_on_drop(true)`, so a timed-out read does not leave `tail` behind.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::config::LogsConfig;

/// Max stdout kept from one tail read (1 MB). Older output is dropped first.
const MAX_TAIL_OUTPUT: usize = 1024 * 1024;

/// Errors that can occur while reading the log tail.
#[derive(Debug, thiserror::Error)]
pub enum LogTailError {
    /// `tail` could not be started (not installed, permission denied).
    #[error("failed to spawn tail: {0}")]
    SpawnFailed(String),
    /// `tail` ran but failed, typically because the log file is missing.
    #[error("tail exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },
    #[error("log tail timed out after {0:?}")]
    Timeout(Duration),
}

/// Source of recent log lines already filtered to progress lines.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn recent_lines(&self) -> Result<Vec<String>, LogTailError>;
}

/// [`LogSource`] backed by the system `tail` binary.
pub struct TailLogSource {
    path: String,
    lines: usize,
    pattern: String,
    timeout: Duration,
}

impl TailLogSource {
    pub fn new(config: &LogsConfig) -> Self {
        Self {
            path: config.path.clone(),
            lines: config.tail_lines,
            pattern: config.pattern.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

#[async_trait]
impl LogSource for TailLogSource {
    async fn recent_lines(&self) -> Result<Vec<String>, LogTailError> {
        let output = tail_file(&self.path, self.lines, self.timeout).await?;
        Ok(filter_lines(&output, &self.pattern))
    }
}

/// Keep lines containing `pattern`, oldest first.
pub fn filter_lines(output: &str, pattern: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.contains(pattern))
        .map(ToString::to_string)
        .collect()
}

/// Read the last `lines` lines of `path` within `timeout`.
pub async fn tail_file(path: &str, lines: usize, timeout: Duration) -> Result<String, LogTailError> {
    let mut child = Command::new("tail")
        .arg("-n")
        .arg(lines.to_string())
        .arg("--")
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| LogTailError::SpawnFailed(e.to_string()))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| LogTailError::SpawnFailed("failed to take stdout pipe".to_string()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| LogTailError::SpawnFailed("failed to take stderr pipe".to_string()))?;

    match tokio::time::timeout(timeout, async {
        // Read both pipes concurrently to avoid pipe deadlock
        let (out, err) = tokio::join!(
            read_newest(&mut stdout, MAX_TAIL_OUTPUT),
            read_capped(&mut stderr, 4096),
        );
        let status = child
            .wait()
            .await
            .map_err(|e| LogTailError::SpawnFailed(e.to_string()))?;
        if status.success() {
            Ok(out)
        } else {
            Err(LogTailError::Failed {
                code: status.code().unwrap_or(-1),
                stderr: err.trim().to_string(),
            })
        }
    })
    .await
    {
        Ok(result) => result,
        Err(_) => Err(LogTailError::Timeout(timeout)),
    }
}

/// Keep the first `max_bytes`, but keep draining so the child never blocks on
/// a full pipe.
async fn read_capped(reader: &mut (impl tokio::io::AsyncRead + Unpin), max_bytes: usize) -> String {
    let mut buf = Vec::with_capacity(max_bytes.min(65536));
    let mut tmp = [0u8; 8192];
    loop {
        match reader.read(&mut tmp).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if buf.len() < max_bytes {
                    let take = n.min(max_bytes - buf.len());
                    buf.extend_from_slice(&tmp[..take]);
                }
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Keep the last `max_bytes`. When anything was dropped, the leading partial
/// line is discarded too.
async fn read_newest(reader: &mut (impl tokio::io::AsyncRead + Unpin), max_bytes: usize) -> String {
    let mut buf = Vec::with_capacity(max_bytes.min(65536));
    let mut tmp = [0u8; 8192];
    let mut truncated = false;
    loop {
        match reader.read(&mut tmp).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&tmp[..n]);
                if buf.len() > max_bytes.saturating_mul(2) {
                    buf.drain(..buf.len() - max_bytes);
                    truncated = true;
                }
            }
        }
    }
    if buf.len() > max_bytes {
        buf.drain(..buf.len() - max_bytes);
        truncated = true;
    }
    if truncated {
        let start = buf.iter().position(|&b| b == b'\n').map_or(buf.len(), |i| i + 1);
        buf.drain(..start);
    }
    String::from_utf8_lossy(&buf).into_owned()
}
