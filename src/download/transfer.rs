//! Streaming a single artifact from one mirror into place.
//!
//! Bytes go to a `.part` sibling of the canonical path. Only a validated file
//! is renamed over the canonical path, and every abandoned attempt removes its
//! `.part` file.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use crate::utils::{validate_pdf, HttpClient, BROWSER_USER_AGENT};

/// Percentage step that always produces a checkpoint
const PROGRESS_STEP: u8 = 25;

/// Elapsed time that produces a checkpoint for any forward progress
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

static ATTEMPTS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, thiserror::Error)]
pub(crate) enum TransferError {
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Downloaded bytes are not a valid artifact
    #[error("Invalid artifact: {0}")]
    Invalid(String),

    #[error("Transfer timed out after {0:?}")]
    Timeout(Duration),
}

/// Receives progress checkpoints during a transfer
#[async_trait]
pub(crate) trait ProgressSink: Send + Sync {
    async fn progress(&self, percent: u8);
}

/// Sink for callers that do not track progress
pub(crate) struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn progress(&self, _percent: u8) {}
}

/// Decides which progress values are worth reporting
///
/// A value is reported when it moved at least [`PROGRESS_STEP`] points past
/// the last report, or when [`PROGRESS_INTERVAL`] passed and it moved at all.
#[derive(Debug)]
pub(crate) struct ProgressCheckpoint {
    last_percent: u8,
    last_emit: Instant,
    step: u8,
    interval: Duration,
}

impl ProgressCheckpoint {
    pub(crate) fn new(step: u8, interval: Duration) -> Self {
        Self {
            last_percent: 0,
            last_emit: Instant::now(),
            step,
            interval,
        }
    }

    pub(crate) fn observe(&mut self, percent: u8, now: Instant) -> Option<u8> {
        if percent <= self.last_percent {
            return None;
        }
        let stepped = percent >= self.last_percent.saturating_add(self.step);
        let waited = now.saturating_duration_since(self.last_emit) >= self.interval;
        if stepped || waited {
            self.last_percent = percent;
            self.last_emit = now;
            Some(percent)
        } else {
            None
        }
    }
}

impl Default for ProgressCheckpoint {
    fn default() -> Self {
        Self::new(PROGRESS_STEP, PROGRESS_INTERVAL)
    }
}

/// Temporary path for one attempt at `target`
pub(crate) fn part_path(target: &Path) -> PathBuf {
    let attempt = ATTEMPTS.fetch_add(1, Ordering::Relaxed);
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    target.with_file_name(format!("{}.{}-{}.part", name, std::process::id(), attempt))
}

/// Download `url` and publish it at `target`; returns the published size
pub(crate) async fn fetch_artifact(
    client: &HttpClient,
    url: &str,
    target: &Path,
    min_size: u64,
    timeout: Duration,
    sink: &dyn ProgressSink,
) -> Result<u64, TransferError> {
    let part = part_path(target);

    let result = match tokio::time::timeout(timeout, stream_to(client, url, &part, sink)).await {
        Ok(Ok(())) => publish(&part, target, min_size).await,
        Ok(Err(e)) => Err(e),
        Err(_) => Err(TransferError::Timeout(timeout)),
    };

    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(&part).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", part.display(), e);
            }
        }
    }
    result
}

async fn stream_to(
    client: &HttpClient,
    url: &str,
    part: &Path,
    sink: &dyn ProgressSink,
) -> Result<(), TransferError> {
    let response = client
        .get(url)
        .header("User-Agent", BROWSER_USER_AGENT)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(TransferError::Status(response.status()));
    }

    let total = response.content_length().unwrap_or(0);
    let mut file = tokio::fs::File::create(part).await?;
    let mut stream = response.bytes_stream();
    let mut received: u64 = 0;
    let mut checkpoint = ProgressCheckpoint::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        received += chunk.len() as u64;

        if total > 0 {
            // 100 is reserved for the published file
            let percent = (received.saturating_mul(100) / total).min(99) as u8;
            if let Some(percent) = checkpoint.observe(percent, Instant::now()) {
                tracing::debug!("{}: {}%", url, percent);
                sink.progress(percent).await;
            }
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

async fn publish(part: &Path, target: &Path, min_size: u64) -> Result<u64, TransferError> {
    if !validate_pdf(part, min_size).await {
        return Err(TransferError::Invalid(format!(
            "not a PDF of at least {} bytes",
            min_size
        )));
    }
    let size = tokio::fs::metadata(part).await?.len();
    tokio::fs::rename(part, target).await?;
    Ok(size)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Smallest body the tests treat as a valid artifact
    pub(crate) fn pdf_body(len: usize) -> Vec<u8> {
        let mut body = b"%PDF-1.4\n".to_vec();
        body.resize(len.max(body.len()), b'x');
        body
    }

    fn leftover_parts(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .count()
    }

    #[test]
    fn test_checkpoint_steps() {
        let start = Instant::now();
        let mut cp = ProgressCheckpoint::new(25, Duration::from_secs(5));
        cp.last_emit = start;

        assert_eq!(cp.observe(10, start), None);
        assert_eq!(cp.observe(25, start), Some(25));
        assert_eq!(cp.observe(40, start), None);
        assert_eq!(cp.observe(50, start), Some(50));
        assert_eq!(cp.observe(99, start), Some(99));
    }

    #[test]
    fn test_checkpoint_interval_and_forward_only() {
        let start = Instant::now();
        let mut cp = ProgressCheckpoint::new(25, Duration::from_secs(5));
        cp.last_emit = start;

        let later = start + Duration::from_secs(6);
        assert_eq!(cp.observe(3, later), Some(3));
        // No forward progress, no report even after the interval
        assert_eq!(cp.observe(3, later + Duration::from_secs(10)), None);
        assert_eq!(cp.observe(2, later + Duration::from_secs(10)), None);
    }

    #[test]
    fn test_part_paths_are_unique_siblings() {
        let target = Path::new("/tmp/downloads/2301.00001.pdf");
        let a = part_path(target);
        let b = part_path(target);
        assert_ne!(a, b);
        assert_eq!(a.parent(), target.parent());
        assert!(a.to_string_lossy().ends_with(".part"));
        assert!(a
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("2301.00001.pdf."));
    }

    #[tokio::test]
    async fn test_fetch_publishes_valid_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pdf/1.pdf")
            .with_status(200)
            .with_body(pdf_body(4096))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("1.pdf");
        let size = fetch_artifact(
            &HttpClient::new().unwrap(),
            &format!("{}/pdf/1.pdf", server.url()),
            &target,
            1024,
            Duration::from_secs(10),
            &NoProgress,
        )
        .await
        .unwrap();

        assert_eq!(size, 4096);
        assert!(target.is_file());
        assert_eq!(leftover_parts(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_invalid_body_leaves_nothing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pdf/1.pdf")
            .with_status(200)
            .with_body("<html>captcha</html>".repeat(100))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("1.pdf");
        let err = fetch_artifact(
            &HttpClient::new().unwrap(),
            &format!("{}/pdf/1.pdf", server.url()),
            &target,
            1024,
            Duration::from_secs(10),
            &NoProgress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::Invalid(_)));
        assert!(!target.exists());
        assert_eq!(leftover_parts(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pdf/1.pdf")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetch_artifact(
            &HttpClient::new().unwrap(),
            &format!("{}/pdf/1.pdf", server.url()),
            &dir.path().join("1.pdf"),
            1024,
            Duration::from_secs(10),
            &NoProgress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::Status(s) if s.as_u16() == 404));
    }
}
