//! Research service: the full search pipeline behind the public API.
//!
//! `search` resolves the source list, consults the search cache, fans out,
//! classifies and optionally relevance-filters the results, stores the outcome
//! and appends to the history ledger. Only store failures reach the caller.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::{classify, RelevanceFilter, SearchOrchestrator};
use crate::config::SearchConfig;
use crate::db::StoreError;
use crate::models::{SearchFilters, SearchOutcome, SourceStatus};
use crate::utils::{
    dedup_by_url, make_search_cache_key, AnalysisCache, HistoryEntry, HistoryLedger, SearchCache,
};

/// Entries removed by a cache sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCleanup {
    pub search_entries: u64,
    pub analysis_entries: u64,
}

#[derive(Debug, Clone)]
pub struct ResearchService {
    orchestrator: SearchOrchestrator,
    relevance: RelevanceFilter,
    search_cache: SearchCache,
    analysis_cache: AnalysisCache,
    history: HistoryLedger,
    config: SearchConfig,
    admission: Arc<Semaphore>,
}

impl ResearchService {
    pub fn new(
        orchestrator: SearchOrchestrator,
        relevance: RelevanceFilter,
        pool: SqlitePool,
        analysis_cache: AnalysisCache,
        config: SearchConfig,
    ) -> Self {
        let admission = Arc::new(Semaphore::new(config.max_concurrent_searches.max(1)));
        Self {
            orchestrator,
            relevance,
            search_cache: SearchCache::new(pool.clone()),
            analysis_cache,
            history: HistoryLedger::new(pool),
            config,
            admission,
        }
    }

    /// Whether relevance filtering can run
    pub fn oracle_available(&self) -> bool {
        self.relevance.is_available()
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search the named sources (the configured defaults when empty)
    pub async fn search(
        &self,
        query: &str,
        sources: &[String],
        filters: &SearchFilters,
    ) -> Result<SearchOutcome, StoreError> {
        let sources = self.resolve_sources(sources);
        let key = make_search_cache_key(query, &sources, filters);

        if let Some(cached) = self.search_cache.get(&key).await? {
            tracing::info!("Returning cached results for '{}'", query);
            return Ok(cached);
        }

        let mut outcome = {
            // A closed semaphore only means no ceiling
            let _permit = self.admission.acquire().await.ok();
            self.orchestrator
                .search_all_sources(query, &sources, filters)
                .await
        };

        for item in &mut outcome.results {
            item.category = classify(&item.url, &item.source);
        }

        let semantic = filters
            .semantic_filter
            .unwrap_or(self.config.semantic_filter);
        if semantic && !outcome.results.is_empty() {
            if self.relevance.is_available() {
                let threshold = filters
                    .relevance_threshold
                    .unwrap_or(self.config.relevance_threshold);
                let results = std::mem::take(&mut outcome.results);
                let filtered = self.relevance.filter(query, results, threshold).await;
                outcome.set_results(filtered);
            } else {
                tracing::debug!("Relevance filter requested but no oracle is configured");
            }
        }

        if outcome.sources_status.values().any(SourceStatus::is_success) {
            self.search_cache
                .set(&key, &outcome, self.config.cache_ttl())
                .await?;
        } else {
            tracing::debug!("No source succeeded for '{}', not caching", query);
        }

        if let Err(e) = self
            .history
            .record_search(query, filters, outcome.total)
            .await
        {
            tracing::warn!("Failed to record search history: {}", e);
        }

        Ok(outcome)
    }

    /// Run several queries and merge them into one outcome
    ///
    /// Items from sources that were not requested are dropped, statuses keep
    /// the worst outcome seen per source, and URLs are deduplicated again
    /// across queries.
    pub async fn search_multiple(
        &self,
        queries: &[String],
        sources: &[String],
        filters: &SearchFilters,
    ) -> Result<SearchOutcome, StoreError> {
        let sources = self.resolve_sources(sources);
        let wanted: HashSet<&str> = sources.iter().map(String::as_str).collect();

        let mut results = Vec::new();
        let mut status: BTreeMap<String, SourceStatus> = BTreeMap::new();
        let mut errors = BTreeMap::new();

        for query in queries {
            let outcome = self.search(query, &sources, filters).await?;
            results.extend(
                outcome
                    .results
                    .into_iter()
                    .filter(|item| wanted.contains(item.source.as_str())),
            );
            for (name, s) in outcome.sources_status {
                status
                    .entry(name)
                    .and_modify(|current| {
                        if severity(s) > severity(*current) {
                            *current = s;
                        }
                    })
                    .or_insert(s);
            }
            errors.extend(outcome.source_errors);
        }

        let mut merged = SearchOutcome::new(dedup_by_url(results), status);
        merged.source_errors = errors;
        Ok(merged)
    }

    /// Recent searches, newest first
    pub async fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>, StoreError> {
        self.history.recent(limit).await
    }

    pub async fn clear_history(&self) -> Result<u64, StoreError> {
        self.history.clear().await
    }

    /// Reap expired search entries and aged analysis entries
    pub async fn cleanup_caches(&self) -> Result<CacheCleanup, StoreError> {
        let cleanup = CacheCleanup {
            search_entries: self.search_cache.cleanup_expired().await?,
            analysis_entries: self.analysis_cache.cleanup_expired().await?,
        };
        tracing::info!(
            "Cache cleanup removed {} search and {} analysis entries",
            cleanup.search_entries,
            cleanup.analysis_entries
        );
        Ok(cleanup)
    }

    fn resolve_sources(&self, sources: &[String]) -> Vec<String> {
        if sources.is_empty() {
            self.config.default_sources.clone()
        } else {
            sources.to_vec()
        }
    }
}

fn severity(status: SourceStatus) -> u8 {
    match status {
        SourceStatus::Success => 0,
        SourceStatus::Skipped => 1,
        SourceStatus::Timeout => 2,
        SourceStatus::Failed => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_store;
    use crate::models::Category;
    use crate::oracle::MockOracle;
    use crate::sources::mock::{make_item, MockSource};
    use crate::sources::SourceRegistry;
    use crate::utils::RateLimiter;
    use std::time::Duration;

    struct Fixture {
        service: ResearchService,
        arxiv: Arc<MockSource>,
        ddg: Arc<MockSource>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(oracle: Option<Arc<MockOracle>>) -> Fixture {
        let (pool, dir) = temp_store().await;
        let arxiv = Arc::new(MockSource::new("arxiv").with_results(vec![
            make_item("arxiv", "Attention Is All You Need", "https://arxiv.org/abs/1706.03762"),
        ]));
        let ddg = Arc::new(MockSource::new("duckduckgo").with_results(vec![
            make_item("duckduckgo", "Transformers explained", "https://medium.com/transformers"),
            make_item("duckduckgo", "Same paper", "https://arxiv.org/abs/1706.03762"),
        ]));

        let mut registry = SourceRegistry::new();
        registry.register(arxiv.clone());
        registry.register(ddg.clone());

        let orchestrator =
            SearchOrchestrator::new(Arc::new(registry), Arc::new(RateLimiter::unlimited()))
                .with_timeout(Duration::from_secs(2));
        let analysis_cache = AnalysisCache::new(pool.clone(), Duration::from_secs(3600));
        let relevance = RelevanceFilter::new(
            oracle.map(|o| o as Arc<dyn crate::oracle::Oracle>),
            10,
        );
        let config = SearchConfig {
            default_sources: vec!["arxiv".to_string()],
            ..SearchConfig::default()
        };

        Fixture {
            service: ResearchService::new(orchestrator, relevance, pool, analysis_cache, config),
            arxiv,
            ddg,
            _dir: dir,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_search_classifies_and_records_history() {
        let f = fixture(None).await;
        let outcome = f
            .service
            .search("transformers", &names(&["arxiv", "duckduckgo"]), &SearchFilters::new())
            .await
            .unwrap();

        assert_eq!(outcome.total, 2);
        for item in &outcome.results {
            if item.url.contains("arxiv.org") {
                assert_eq!(item.category, Category::Academic);
            } else {
                assert_eq!(item.category, Category::Blog);
            }
        }

        let history = f.service.history(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query, "transformers");
        assert_eq!(history[0].result_count, 2);
    }

    #[tokio::test]
    async fn test_empty_sources_use_defaults() {
        let f = fixture(None).await;
        let outcome = f.service.search("q", &[], &SearchFilters::new()).await.unwrap();

        assert_eq!(outcome.sources_status.len(), 1);
        assert!(outcome.sources_status.contains_key("arxiv"));
        assert_eq!(f.ddg.calls(), 0);
    }

    #[tokio::test]
    async fn test_second_search_hits_cache() {
        let f = fixture(None).await;
        let sources = names(&["duckduckgo", "arxiv"]);

        let first = f.service.search("q", &sources, &SearchFilters::new()).await.unwrap();
        let reordered = names(&["arxiv", "duckduckgo"]);
        let second = f.service.search("q", &reordered, &SearchFilters::new()).await.unwrap();

        assert_eq!(f.arxiv.calls(), 1);
        assert_eq!(f.ddg.calls(), 1);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_all_skipped_is_not_cached() {
        let f = fixture(None).await;
        let sources = names(&["nowhere"]);
        f.service.search("q", &sources, &SearchFilters::new()).await.unwrap();
        f.service.search("q", &sources, &SearchFilters::new()).await.unwrap();

        // Both calls reach the ledger: nothing was served from the cache
        assert_eq!(f.service.history(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_relevance_applied_when_oracle_present() {
        let oracle = Arc::new(MockOracle::replying(r#"{"0": 10, "1": 90}"#));
        let f = fixture(Some(oracle.clone())).await;

        let outcome = f
            .service
            .search("q", &names(&["duckduckgo"]), &SearchFilters::new().relevance_threshold(50))
            .await
            .unwrap();

        assert_eq!(oracle.calls(), 1);
        assert_eq!(outcome.total, 1);
        assert_eq!(outcome.results[0].relevance_score, Some(90));
    }

    #[tokio::test]
    async fn test_semantic_filter_can_be_disabled() {
        let oracle = Arc::new(MockOracle::replying(r#"{"0": 0, "1": 0}"#));
        let f = fixture(Some(oracle.clone())).await;

        let outcome = f
            .service
            .search("q", &names(&["duckduckgo"]), &SearchFilters::new().semantic_filter(false))
            .await
            .unwrap();

        assert_eq!(oracle.calls(), 0);
        assert_eq!(outcome.total, 2);
    }

    #[tokio::test]
    async fn test_search_multiple_merges() {
        let f = fixture(None).await;
        f.ddg.set_results(vec![
            make_item("duckduckgo", "Web", "https://web.example"),
            make_item("arxiv", "Foreign source", "https://foreign.example"),
        ]);

        let queries = names(&["first", "second"]);
        let merged = f
            .service
            .search_multiple(&queries, &names(&["duckduckgo", "bogus"]), &SearchFilters::new())
            .await
            .unwrap();

        // Same URL from both queries collapses; items from unrequested sources drop
        assert_eq!(merged.total, 1);
        assert_eq!(merged.results[0].url, "https://web.example");
        assert_eq!(merged.sources_status["duckduckgo"], SourceStatus::Success);
        assert_eq!(merged.sources_status["bogus"], SourceStatus::Skipped);
    }

    #[test]
    fn test_severity_order() {
        assert!(severity(SourceStatus::Failed) > severity(SourceStatus::Timeout));
        assert!(severity(SourceStatus::Timeout) > severity(SourceStatus::Skipped));
        assert!(severity(SourceStatus::Skipped) > severity(SourceStatus::Success));
    }

    #[tokio::test]
    async fn test_clear_history_and_cleanup() {
        let f = fixture(None).await;
        f.service.search("q", &[], &SearchFilters::new()).await.unwrap();

        assert_eq!(f.service.clear_history().await.unwrap(), 1);
        assert!(f.service.history(10).await.unwrap().is_empty());

        let cleanup = f.service.cleanup_caches().await.unwrap();
        assert_eq!(cleanup, CacheCleanup::default());
    }
}
