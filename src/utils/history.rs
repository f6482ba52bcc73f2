//! Append-only ledger of executed searches.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::{now_millis, StoreError};
use crate::models::SearchFilters;

/// Largest number of entries returned by one listing
pub const MAX_HISTORY_LIMIT: usize = 100;

/// A single executed search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub query: String,
    pub filters: SearchFilters,
    /// Number of results the search returned
    pub result_count: usize,
    pub created_at: DateTime<Utc>,
}

/// History ledger backed by the `search_history` table
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    pool: SqlitePool,
}

impl HistoryLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one search
    pub async fn record_search(
        &self,
        query: &str,
        filters: &SearchFilters,
        result_count: usize,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO search_history (query, filters, result_count, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(query)
        .bind(serde_json::to_string(filters)?)
        .bind(result_count as i64)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent searches, newest first; `limit` is clamped to 1..=100
    pub async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, StoreError> {
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT) as i64;

        let rows: Vec<(i64, String, String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT id, query, filters, result_count, created_at
            FROM search_history
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, query, filters, result_count, created_at)| HistoryEntry {
                id,
                query,
                filters: serde_json::from_str(&filters).unwrap_or_default(),
                result_count: result_count.max(0) as usize,
                created_at: millis_to_datetime(created_at),
            })
            .collect())
    }

    /// Remove every entry; returns the number removed
    pub async fn clear(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM search_history")
            .execute(&self.pool)
            .await?;
        tracing::info!("Cleared {} history entries", result.rows_affected());
        Ok(result.rows_affected())
    }
}

/// Convert a stored Unix-millisecond timestamp
pub(crate) fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_store;

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let (pool, _dir) = temp_store().await;
        let ledger = HistoryLedger::new(pool);

        ledger.record_search("first", &SearchFilters::new(), 3).await.unwrap();
        ledger
            .record_search("second", &SearchFilters::new().time_range("2020"), 7)
            .await
            .unwrap();

        let entries = ledger.recent(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].query, "second");
        assert_eq!(entries[0].result_count, 7);
        assert_eq!(entries[0].filters.time_range.as_deref(), Some("2020"));
        assert_eq!(entries[1].query, "first");
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        let (pool, _dir) = temp_store().await;
        let ledger = HistoryLedger::new(pool);
        for i in 0..3 {
            ledger.record_search(&format!("q{}", i), &SearchFilters::new(), 0).await.unwrap();
        }

        assert_eq!(ledger.recent(0).await.unwrap().len(), 1);
        assert_eq!(ledger.recent(1000).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_clear() {
        let (pool, _dir) = temp_store().await;
        let ledger = HistoryLedger::new(pool);
        ledger.record_search("q", &SearchFilters::new(), 1).await.unwrap();

        assert_eq!(ledger.clear().await.unwrap(), 1);
        assert!(ledger.recent(10).await.unwrap().is_empty());
    }
}
