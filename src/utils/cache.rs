//! Content-addressed caches for search outcomes and oracle analyses.
//!
//! Both caches live in the SQLite store and are keyed by MD5 digests:
//!
//! - [`SearchCache`] stores a whole [`SearchOutcome`] under a hash of the
//!   normalized `(query, sorted sources, filters)` tuple, with an absolute
//!   expiry timestamp. Expired rows are invisible to reads and are reaped by
//!   [`SearchCache::cleanup_expired`].
//! - [`AnalysisCache`] stores an arbitrary JSON value under a hash of a content
//!   prefix plus an analysis kind. Age is checked at read time and an expired
//!   row is deleted by the read that finds it.
//!
//! Writes are upserts; concurrent writers to one key are last-write-wins.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use std::time::Duration;

use crate::db::{now_millis, StoreError};
use crate::models::{SearchFilters, SearchOutcome};

/// Number of content characters that take part in an analysis key
pub const ANALYSIS_KEY_PREFIX_CHARS: usize = 2000;

/// Cache key for a search request
///
/// Sources are sorted so the key does not depend on the order they were
/// requested in. Object keys are serialized in sorted order.
pub fn make_search_cache_key(query: &str, sources: &[String], filters: &SearchFilters) -> String {
    let mut sorted: Vec<&str> = sources.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let normalized = serde_json::json!({
        "q": query,
        "s": sorted,
        "f": filters,
    });
    format!("{:x}", md5::compute(normalized.to_string().as_bytes()))
}

/// Cache key for an analysis of `content` of the given kind
pub fn make_analysis_cache_key(content: &str, kind: &str) -> String {
    let prefix = crate::models::truncate_chars(content, ANALYSIS_KEY_PREFIX_CHARS);
    let input = format!("{}:{}", prefix, kind);
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Expiring cache of search outcomes
#[derive(Debug, Clone)]
pub struct SearchCache {
    pool: SqlitePool,
}

impl SearchCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Read a live entry
    ///
    /// A row that no longer deserializes is reported as a miss.
    pub async fn get(&self, key: &str) -> Result<Option<SearchOutcome>, StoreError> {
        let row: Option<String> = sqlx::query_scalar(
            "SELECT results FROM search_cache WHERE query_hash = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await?;

        let Some(raw) = row else {
            tracing::debug!("Search cache MISS: {}", key);
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(outcome) => {
                tracing::debug!("Search cache HIT: {}", key);
                Ok(Some(outcome))
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable search cache entry {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Store an outcome that expires `ttl` from now
    pub async fn set(
        &self,
        key: &str,
        outcome: &SearchOutcome,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(outcome)?;
        let now = now_millis();
        let expires_at = now.saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64);

        sqlx::query(
            r#"
            INSERT INTO search_cache (query_hash, results, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(query_hash) DO UPDATE SET
                results = excluded.results,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(payload)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete every expired entry; returns the number removed
    pub async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM search_cache WHERE expires_at <= ?")
            .bind(now_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Fixed-age cache of oracle analysis results
#[derive(Debug, Clone)]
pub struct AnalysisCache {
    pool: SqlitePool,
    max_age: Duration,
}

impl AnalysisCache {
    pub fn new(pool: SqlitePool, max_age: Duration) -> Self {
        Self { pool, max_age }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn max_age_millis(&self) -> i64 {
        self.max_age.as_millis().min(i64::MAX as u128) as i64
    }

    /// Read the analysis of `content` of the given kind
    ///
    /// An entry older than the maximum age is deleted and reported as a miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        content: &str,
        kind: &str,
    ) -> Result<Option<T>, StoreError> {
        let hash = make_analysis_cache_key(content, kind);

        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT result, created_at FROM analysis_cache WHERE content_hash = ? AND analysis_type = ?",
        )
        .bind(&hash)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;

        let Some((raw, created_at)) = row else {
            return Ok(None);
        };

        if now_millis() - created_at > self.max_age_millis() {
            tracing::debug!("Evicting aged analysis cache entry {} ({})", hash, kind);
            sqlx::query("DELETE FROM analysis_cache WHERE content_hash = ? AND analysis_type = ?")
                .bind(&hash)
                .bind(kind)
                .execute(&self.pool)
                .await?;
            return Ok(None);
        }

        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!("Analysis cache HIT: {} ({})", hash, kind);
                Ok(Some(value))
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable analysis cache entry {}: {}", hash, e);
                Ok(None)
            }
        }
    }

    /// Store the analysis of `content` of the given kind
    pub async fn set<T: Serialize>(
        &self,
        content: &str,
        kind: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let hash = make_analysis_cache_key(content, kind);
        let payload = serde_json::to_string(value)?;

        sqlx::query(
            r#"
            INSERT INTO analysis_cache (content_hash, analysis_type, result, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(content_hash, analysis_type) DO UPDATE SET
                result = excluded.result,
                created_at = excluded.created_at
            "#,
        )
        .bind(hash)
        .bind(kind)
        .bind(payload)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete every entry past the maximum age; returns the number removed
    pub async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let cutoff = now_millis() - self.max_age_millis();
        let result = sqlx::query("DELETE FROM analysis_cache WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
