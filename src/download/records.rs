//! Persistence of download records.

use sqlx::SqlitePool;

use crate::db::{now_millis, StoreError};
use crate::models::{DownloadRecord, DownloadStatus};
use crate::utils::millis_to_datetime;

type RecordRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    String,
    i64,
    i64,
    i64,
);

const SELECT_COLUMNS: &str = "SELECT id, artifact_id, title, url, local_path, status, file_size, progress, created_at FROM download_records";

/// Row-level access to `download_records`
///
/// Each method is one statement. A record is only written by the worker
/// that owns it.
#[derive(Debug, Clone)]
pub(crate) struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub(crate) async fn insert_pending(
        &self,
        artifact_id: &str,
        title: &str,
        url: &str,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO download_records (artifact_id, title, url, status, created_at) VALUES (?, ?, ?, 'pending', ?)",
        )
        .bind(artifact_id)
        .bind(title)
        .bind(url)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub(crate) async fn insert_completed(
        &self,
        artifact_id: &str,
        title: &str,
        url: &str,
        local_path: &str,
        file_size: u64,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO download_records
                (artifact_id, title, url, local_path, status, file_size, progress, created_at)
            VALUES (?, ?, ?, ?, 'completed', ?, 100, ?)
            "#,
        )
        .bind(artifact_id)
        .bind(title)
        .bind(url)
        .bind(local_path)
        .bind(file_size as i64)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub(crate) async fn mark_downloading(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE download_records SET status = 'downloading' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Raise progress; lower values are ignored so progress never goes back
    pub(crate) async fn update_progress(&self, id: i64, progress: u8) -> Result<(), StoreError> {
        sqlx::query("UPDATE download_records SET progress = ? WHERE id = ? AND progress < ?")
            .bind(progress as i64)
            .bind(id)
            .bind(progress as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub(crate) async fn mark_completed(
        &self,
        id: i64,
        local_path: &str,
        file_size: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE download_records SET status = 'completed', local_path = ?, file_size = ?, progress = 100 WHERE id = ?",
        )
        .bind(local_path)
        .bind(file_size as i64)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub(crate) async fn mark_failed(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE download_records SET status = 'failed' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub(crate) async fn get(&self, id: i64) -> Result<Option<DownloadRecord>, StoreError> {
        let row: Option<RecordRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(into_record))
    }

    /// Every record, newest first
    pub(crate) async fn list(&self) -> Result<Vec<DownloadRecord>, StoreError> {
        let rows: Vec<RecordRow> =
            sqlx::query_as(&format!("{} ORDER BY created_at DESC, id DESC", SELECT_COLUMNS))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(into_record).collect())
    }
}

fn into_record(row: RecordRow) -> DownloadRecord {
    let (id, artifact_id, title, url, local_path, status, file_size, progress, created_at) = row;
    DownloadRecord {
        id,
        artifact_id,
        title,
        url,
        local_path,
        status: status.parse().unwrap_or_else(|e| {
            tracing::warn!("Record {}: {}", id, e);
            DownloadStatus::Failed
        }),
        file_size: file_size.max(0) as u64,
        progress: progress.clamp(0, 100) as u8,
        created_at: millis_to_datetime(created_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_store;

    #[tokio::test]
    async fn test_lifecycle() {
        let (pool, _dir) = temp_store().await;
        let store = RecordStore::new(pool);

        let id = store.insert_pending("2301.00001", "Paper", "https://x/2301.00001.pdf").await.unwrap();
        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, DownloadStatus::Pending);
        assert_eq!(record.local_path, None);

        store.mark_downloading(id).await.unwrap();
        store.update_progress(id, 50).await.unwrap();
        store.update_progress(id, 25).await.unwrap();
        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, DownloadStatus::Downloading);
        assert_eq!(record.progress, 50);

        store.mark_completed(id, "/d/2301.00001.pdf", 2048).await.unwrap();
        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, DownloadStatus::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.file_size, 2048);
        assert_eq!(record.local_path.as_deref(), Some("/d/2301.00001.pdf"));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let (pool, _dir) = temp_store().await;
        let store = RecordStore::new(pool);

        let first = store.insert_pending("a", "A", "u").await.unwrap();
        let second = store.insert_completed("b", "B", "u", "/p", 10).await.unwrap();

        let ids: Vec<i64> = store.list().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second, first]);
        assert!(store.get(9999).await.unwrap().is_none());
    }
}
