//! Artifact download manager.
//!
//! Downloads are tracked as persisted records moving through
//! `pending -> downloading -> completed | failed`. Scheduled downloads run on
//! background tasks bounded by a semaphore; [`DownloadManager::get_or_download`]
//! runs the same mirror and transfer logic inline for callers that need the
//! file right away.
//!
//! The canonical path of an artifact is only ever written by renaming a
//! validated `.part` file onto it.

mod mirror;
mod records;
mod transfer;

pub use mirror::{MirrorProbe, MirrorSelector};

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::DownloadConfig;
use crate::db::StoreError;
use crate::models::{DownloadRecord, DownloadStatus, DownloadTicket};
use crate::utils::{validate_pdf, HttpClient};
use records::RecordStore;
use transfer::{fetch_artifact, NoProgress, ProgressSink};

/// How often [`DownloadManager::wait_for`] re-reads a record
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors from the download manager
///
/// Mirror and transfer failures never appear here; they end up as a
/// `failed` record or a `None` from `get_or_download`.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid artifact id: {0:?}")]
    InvalidId(String),
}

/// Strip whitespace and an `arxiv:` prefix from an artifact id
pub fn normalize_artifact_id(id: &str) -> String {
    let id = id.trim();
    let id = match id.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("arxiv:") => &id[6..],
        _ => id,
    };
    id.trim().to_string()
}

/// File-system safe rendition of an artifact id
pub fn sanitize_file_name(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct DownloadManager {
    records: RecordStore,
    client: HttpClient,
    mirrors: Arc<MirrorSelector>,
    workers: Arc<Semaphore>,
    directory: PathBuf,
    min_file_size: u64,
    transfer_timeout: Duration,
}

impl DownloadManager {
    pub fn new(pool: SqlitePool, client: HttpClient, config: &DownloadConfig) -> Self {
        Self::with_selector(
            pool,
            client.clone(),
            config,
            MirrorSelector::new(client, config),
        )
    }

    /// Use a preconfigured mirror selector
    pub fn with_selector(
        pool: SqlitePool,
        client: HttpClient,
        config: &DownloadConfig,
        mirrors: MirrorSelector,
    ) -> Self {
        Self {
            records: RecordStore::new(pool),
            client,
            mirrors: Arc::new(mirrors),
            workers: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            directory: config.directory.clone(),
            min_file_size: config.min_file_size,
            transfer_timeout: Duration::from_secs(config.transfer_timeout_seconds),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Where a completed artifact lives
    pub fn canonical_path(&self, artifact_id: &str) -> PathBuf {
        let id = normalize_artifact_id(artifact_id);
        self.directory
            .join(format!("{}.pdf", sanitize_file_name(&id)))
    }

    /// Request a download
    ///
    /// An artifact already valid on disk gets a `completed` record right away.
    /// Otherwise a `pending` record is created and a background worker picks
    /// it up.
    pub async fn schedule_download(
        &self,
        artifact_id: &str,
        title: &str,
    ) -> Result<DownloadTicket, DownloadError> {
        let id = checked_id(artifact_id)?;
        let target = self.canonical_path(&id);
        let url = self.primary_url(&id);

        if validate_pdf(&target, self.min_file_size).await {
            let size = tokio::fs::metadata(&target).await?.len();
            let record_id = self
                .records
                .insert_completed(&id, title, &url, &target.to_string_lossy(), size)
                .await?;
            tracing::info!("{} already downloaded, record {}", id, record_id);
            return Ok(DownloadTicket {
                record_id,
                status: DownloadStatus::Completed,
            });
        }

        let record_id = self.records.insert_pending(&id, title, &url).await?;
        tracing::info!("Queued download of {} as record {}", id, record_id);

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_worker(record_id, id).await;
        });

        Ok(DownloadTicket {
            record_id,
            status: DownloadStatus::Pending,
        })
    }

    pub async fn get_download_status(
        &self,
        record_id: i64,
    ) -> Result<Option<DownloadRecord>, DownloadError> {
        Ok(self.records.get(record_id).await?)
    }

    /// All records, newest first
    pub async fn list_downloads(&self) -> Result<Vec<DownloadRecord>, DownloadError> {
        Ok(self.records.list().await?)
    }

    /// Make sure the artifact is on disk, downloading inline if needed
    ///
    /// Returns `None` when every mirror failed. No record is created.
    pub async fn get_or_download(
        &self,
        artifact_id: &str,
    ) -> Result<Option<PathBuf>, DownloadError> {
        let id = checked_id(artifact_id)?;
        let target = self.canonical_path(&id);

        if validate_pdf(&target, self.min_file_size).await {
            tracing::debug!("Using cached artifact {}", target.display());
            return Ok(Some(target));
        }

        tokio::fs::create_dir_all(&self.directory).await?;
        match self.transfer(&id, &target, &NoProgress).await {
            Some(_) => Ok(Some(target)),
            None => Ok(None),
        }
    }

    /// Poll a record until it is terminal or `timeout` passes
    ///
    /// Returns the last state seen, or `None` for an unknown id.
    pub async fn wait_for(
        &self,
        record_id: i64,
        timeout: Duration,
    ) -> Result<Option<DownloadRecord>, DownloadError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let Some(record) = self.records.get(record_id).await? else {
                return Ok(None);
            };
            if record.status.is_terminal() || tokio::time::Instant::now() >= deadline {
                return Ok(Some(record));
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Drop the cached mirror choice
    pub async fn clear_mirror_cache(&self) {
        self.mirrors.invalidate().await;
    }

    /// Mirror the next download will try first
    pub async fn best_mirror(&self) -> Option<String> {
        self.mirrors.best().await
    }

    pub async fn probe_mirrors(&self) -> Vec<MirrorProbe> {
        self.mirrors.probe().await
    }

    fn primary_url(&self, id: &str) -> String {
        self.mirrors
            .mirrors()
            .first()
            .map(|m| MirrorSelector::artifact_url(m, id))
            .unwrap_or_default()
    }

    async fn run_worker(&self, record_id: i64, id: String) {
        let _permit = match Arc::clone(&self.workers).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::error!("Download pool closed: {}", e);
                return;
            }
        };

        if let Err(e) = self.download_record(record_id, &id).await {
            tracing::error!("Download of {} (record {}) aborted: {}", id, record_id, e);
            if let Err(e) = self.records.mark_failed(record_id).await {
                tracing::error!("Record {} could not be marked failed: {}", record_id, e);
            }
        }
    }

    async fn download_record(&self, record_id: i64, id: &str) -> Result<(), DownloadError> {
        self.records.mark_downloading(record_id).await?;
        let target = self.canonical_path(id);

        // Another worker may have published it while this one was queued
        if validate_pdf(&target, self.min_file_size).await {
            let size = tokio::fs::metadata(&target).await?.len();
            self.records
                .mark_completed(record_id, &target.to_string_lossy(), size)
                .await?;
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.directory).await?;
        let sink = RecordProgress {
            records: self.records.clone(),
            record_id,
        };

        match self.transfer(id, &target, &sink).await {
            Some(size) => {
                self.records
                    .mark_completed(record_id, &target.to_string_lossy(), size)
                    .await?;
                tracing::info!("Downloaded {} ({} bytes)", id, size);
            }
            None => {
                self.records.mark_failed(record_id).await?;
                tracing::error!("Download of {} failed on every mirror", id);
            }
        }
        Ok(())
    }

    /// Try each mirror in order; returns the published size
    async fn transfer(&self, id: &str, target: &Path, sink: &dyn ProgressSink) -> Option<u64> {
        for mirror in self.mirrors.ordered().await {
            let url = MirrorSelector::artifact_url(&mirror, id);
            match fetch_artifact(
                &self.client,
                &url,
                target,
                self.min_file_size,
                self.transfer_timeout,
                sink,
            )
            .await
            {
                Ok(size) => return Some(size),
                Err(e) => tracing::warn!("Mirror {} failed for {}: {}", mirror, id, e),
            }
        }
        None
    }
}

fn checked_id(artifact_id: &str) -> Result<String, DownloadError> {
    let id = normalize_artifact_id(artifact_id);
    if id.is_empty() {
        return Err(DownloadError::InvalidId(artifact_id.to_string()));
    }
    Ok(id)
}

/// Writes transfer checkpoints to the record
struct RecordProgress {
    records: RecordStore,
    record_id: i64,
}

#[async_trait]
impl ProgressSink for RecordProgress {
    async fn progress(&self, percent: u8) {
        if let Err(e) = self.records.update_progress(self.record_id, percent).await {
            tracing::warn!("Progress update for record {} failed: {}", self.record_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_store;
    use transfer::tests::pdf_body;

    #[test]
    fn test_normalize_artifact_id() {
        assert_eq!(normalize_artifact_id("  2301.00001 "), "2301.00001");
        assert_eq!(normalize_artifact_id("arXiv:2301.00001v2"), "2301.00001v2");
        assert_eq!(normalize_artifact_id("arxiv: 2301.00001"), "2301.00001");
        assert_eq!(normalize_artifact_id("hep-th/9901001"), "hep-th/9901001");
        assert_eq!(normalize_artifact_id("ar"), "ar");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("hep-th/9901001"), "hep-th_9901001");
        assert_eq!(sanitize_file_name("2301.00001v2"), "2301.00001v2");
        assert_eq!(sanitize_file_name("../etc"), ".._etc");
    }

    async fn manager(mirrors: Vec<String>) -> (DownloadManager, tempfile::TempDir, tempfile::TempDir) {
        let (pool, db_dir) = temp_store().await;
        let files = tempfile::tempdir().unwrap();
        let config = DownloadConfig {
            directory: files.path().to_path_buf(),
            mirrors,
            ..DownloadConfig::default()
        };
        (
            DownloadManager::new(pool, HttpClient::new().unwrap(), &config),
            files,
            db_dir,
        )
    }

    #[tokio::test]
    async fn test_existing_file_completes_without_network() {
        let (manager, files, _db) = manager(vec!["http://127.0.0.1:9/".to_string()]).await;
        std::fs::write(files.path().join("2301.00001.pdf"), pdf_body(2048)).unwrap();

        let ticket = manager.schedule_download("arxiv:2301.00001", "Paper").await.unwrap();
        assert_eq!(ticket.status, DownloadStatus::Completed);

        let record = manager.get_download_status(ticket.record_id).await.unwrap().unwrap();
        assert_eq!(record.status, DownloadStatus::Completed);
        assert_eq!(record.file_size, 2048);
        assert_eq!(record.progress, 100);
        assert_eq!(record.artifact_id, "2301.00001");
    }

    #[tokio::test]
    async fn test_get_or_download_uses_cached_file() {
        let (manager, files, _db) = manager(vec!["http://127.0.0.1:9/".to_string()]).await;
        std::fs::write(files.path().join("2301.00002.pdf"), pdf_body(2048)).unwrap();

        let path = manager.get_or_download("2301.00002").await.unwrap();
        assert_eq!(path, Some(files.path().join("2301.00002.pdf")));
        assert!(manager.list_downloads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_id_rejected() {
        let (manager, _files, _db) = manager(vec!["http://127.0.0.1:9/".to_string()]).await;
        let err = manager.schedule_download("  arxiv:  ", "x").await.unwrap_err();
        assert!(matches!(err, DownloadError::InvalidId(_)));
    }

    #[tokio::test]
    async fn test_wait_for_unknown_record() {
        let (manager, _files, _db) = manager(vec!["http://127.0.0.1:9/".to_string()]).await;
        let record = manager.wait_for(42, Duration::from_millis(50)).await.unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_unwritable_directory_fails_the_record() {
        let (pool, _db) = temp_store().await;
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let config = DownloadConfig {
            directory: blocker.path().join("sub"),
            mirrors: vec!["http://127.0.0.1:9/".to_string()],
            ..DownloadConfig::default()
        };
        let manager = DownloadManager::new(pool, HttpClient::new().unwrap(), &config);

        let ticket = manager.schedule_download("2301.00003", "Paper").await.unwrap();
        assert_eq!(ticket.status, DownloadStatus::Pending);

        let record = manager
            .wait_for(ticket.record_id, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, DownloadStatus::Failed);
        assert!(record.local_path.is_none());
    }
}
