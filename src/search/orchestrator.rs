//! Concurrent fan-out of one query across several sources.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{Id, JoinSet};
use tokio::time::Instant;

use crate::models::{ResultItem, SearchFilters, SearchOutcome, SearchQuery, SourceStatus};
use crate::sources::{Source, SourceError, SourceRegistry};
use crate::utils::{dedup_by_url, RateLimiter};

/// Runs every requested source concurrently under one overall deadline
#[derive(Debug, Clone)]
pub struct SearchOrchestrator {
    registry: Arc<SourceRegistry>,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
    gate_timeout: Duration,
    max_results: usize,
}

impl SearchOrchestrator {
    pub fn new(registry: Arc<SourceRegistry>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            registry,
            limiter,
            timeout: Duration::from_secs(30),
            gate_timeout: Duration::from_secs(10),
            max_results: 15,
        }
    }

    /// Deadline for the whole fan-out
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long each task waits on its rate limiter
    pub fn with_gate_timeout(mut self, timeout: Duration) -> Self {
        self.gate_timeout = timeout;
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Query every named source and merge what comes back
    ///
    /// Every requested name appears in `sources_status`. Unknown names are
    /// `skipped`; sources still running at the deadline are `timeout` and
    /// their tasks are aborted. Results are concatenated in completion order
    /// and deduplicated by URL.
    pub async fn search_all_sources(
        &self,
        query: &str,
        sources: &[String],
        filters: &SearchFilters,
    ) -> SearchOutcome {
        let mut status = BTreeMap::new();
        let mut errors = BTreeMap::new();
        let mut dispatch: Vec<(String, Arc<dyn Source>)> = Vec::new();
        let mut seen = HashSet::new();

        for name in sources {
            if !seen.insert(name.as_str()) {
                continue;
            }
            match self.registry.get(name) {
                Some(source) => dispatch.push((name.clone(), Arc::clone(source))),
                None => {
                    tracing::warn!("Unknown source '{}', skipping", name);
                    status.insert(name.clone(), SourceStatus::Skipped);
                }
            }
        }

        if dispatch.is_empty() {
            return SearchOutcome::new(Vec::new(), status);
        }

        let search_query = SearchQuery::new(query)
            .max_results(self.max_results)
            .filters(filters.clone());

        let mut pending: HashMap<Id, String> = HashMap::new();
        let mut tasks = JoinSet::new();
        for (name, source) in dispatch {
            let limiter = Arc::clone(&self.limiter);
            let gate_timeout = self.gate_timeout;
            let search_query = search_query.clone();
            let gate_name = name.clone();
            let handle = tasks.spawn(async move {
                if limiter.acquire(&gate_name, gate_timeout).await {
                    source.search(&search_query).await
                } else {
                    Err(SourceError::RateLimit)
                }
            });
            pending.insert(handle.id(), name);
        }

        let deadline = Instant::now() + self.timeout;
        let mut collected: Vec<ResultItem> = Vec::new();

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next_with_id()).await {
                Ok(Some(Ok((id, result)))) => {
                    let Some(name) = pending.remove(&id) else {
                        continue;
                    };
                    match result {
                        Ok(items) => {
                            tracing::info!("Source {} returned {} results", name, items.len());
                            status.insert(name, SourceStatus::Success);
                            collected.extend(items);
                        }
                        Err(e) => {
                            tracing::warn!("Source {} failed: {}", name, e);
                            status.insert(name.clone(), SourceStatus::Failed);
                            errors.insert(name, e.to_string());
                        }
                    }
                }
                Ok(Some(Err(e))) => {
                    let Some(name) = pending.remove(&e.id()) else {
                        continue;
                    };
                    tracing::error!("Source {} task aborted: {}", name, e);
                    status.insert(name.clone(), SourceStatus::Failed);
                    errors.insert(name, "search task panicked".to_string());
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "Search timed out after {:?}, abandoning {} source(s)",
                        self.timeout,
                        pending.len()
                    );
                    for (_, name) in pending.drain() {
                        status.insert(name, SourceStatus::Timeout);
                    }
                    tasks.abort_all();
                    break;
                }
            }
        }

        let mut outcome = SearchOutcome::new(dedup_by_url(collected), status);
        outcome.source_errors = errors;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BucketConfig;
    use crate::sources::mock::{make_item, MockSource};
    use std::collections::HashMap;

    fn orchestrator(sources: Vec<Arc<MockSource>>) -> SearchOrchestrator {
        let mut registry = SourceRegistry::new();
        for source in sources {
            registry.register(source);
        }
        SearchOrchestrator::new(Arc::new(registry), Arc::new(RateLimiter::unlimited()))
            .with_timeout(Duration::from_millis(500))
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_unknown_sources_are_skipped() {
        let orch = orchestrator(vec![]);
        let outcome = orch
            .search_all_sources("q", &names(&["nowhere", "elsewhere"]), &SearchFilters::default())
            .await;

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.total, 0);
        assert_eq!(outcome.sources_status.len(), 2);
        assert!(outcome
            .sources_status
            .values()
            .all(|s| *s == SourceStatus::Skipped));
    }

    #[tokio::test]
    async fn test_status_keys_cover_requested_names() {
        let arxiv = Arc::new(
            MockSource::new("arxiv").with_results(vec![make_item("arxiv", "A", "https://a.example")]),
        );
        let ddg = Arc::new(MockSource::new("duckduckgo").with_failure("blocked"));
        let orch = orchestrator(vec![arxiv, ddg]);

        let outcome = orch
            .search_all_sources("q", &names(&["arxiv", "duckduckgo", "bogus"]), &SearchFilters::default())
            .await;

        assert_eq!(outcome.sources_status["arxiv"], SourceStatus::Success);
        assert_eq!(outcome.sources_status["duckduckgo"], SourceStatus::Failed);
        assert_eq!(outcome.sources_status["bogus"], SourceStatus::Skipped);
        assert!(outcome.source_errors["duckduckgo"].contains("blocked"));
        assert_eq!(outcome.total, 1);
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let arxiv = Arc::new(MockSource::new("arxiv").with_results(vec![
            make_item("arxiv", "GNN survey", "https://arxiv.org/abs/1"),
            make_item("arxiv", "GNN survey (dup)", "https://arxiv.org/abs/1"),
        ]));
        let ddg = Arc::new(
            MockSource::new("duckduckgo")
                .with_results(vec![make_item("duckduckgo", "Slow", "https://slow.example")])
                .with_delay(Duration::from_secs(5)),
        );
        let orch = orchestrator(vec![arxiv, ddg]).with_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let outcome = orch
            .search_all_sources(
                "graph neural networks",
                &names(&["arxiv", "duckduckgo"]),
                &SearchFilters::default(),
            )
            .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.sources_status["arxiv"], SourceStatus::Success);
        assert_eq!(outcome.sources_status["duckduckgo"], SourceStatus::Timeout);
        assert_eq!(outcome.total, 1);
        assert!(outcome.results.iter().all(|r| r.source == "arxiv"));
    }

    #[tokio::test]
    async fn test_dedup_across_sources() {
        let a = Arc::new(MockSource::new("arxiv").with_results(vec![
            make_item("arxiv", "Shared", "https://shared.example"),
            make_item("arxiv", "No url", ""),
        ]));
        let b = Arc::new(MockSource::new("scholar").with_results(vec![
            make_item("scholar", "Shared again", "https://shared.example"),
            make_item("scholar", "Also no url", ""),
        ]));
        let orch = orchestrator(vec![a, b]);

        let outcome = orch
            .search_all_sources("q", &names(&["arxiv", "scholar"]), &SearchFilters::default())
            .await;

        assert_eq!(outcome.total, 3);
        let shared = outcome
            .results
            .iter()
            .filter(|r| r.url == "https://shared.example")
            .count();
        assert_eq!(shared, 1);
        assert_eq!(outcome.results.iter().filter(|r| r.url.is_empty()).count(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_denial_fails_source() {
        let mut limits = HashMap::new();
        limits.insert("arxiv".to_string(), BucketConfig::new(1, 0.01));
        let limiter = RateLimiter::new(&limits).unwrap();

        let source = Arc::new(
            MockSource::new("arxiv").with_results(vec![make_item("arxiv", "A", "https://a.example")]),
        );
        let mut registry = SourceRegistry::new();
        registry.register(source.clone());
        let orch = SearchOrchestrator::new(Arc::new(registry), Arc::new(limiter))
            .with_gate_timeout(Duration::from_millis(50));

        let first = orch
            .search_all_sources("q", &names(&["arxiv"]), &SearchFilters::default())
            .await;
        let second = orch
            .search_all_sources("q", &names(&["arxiv"]), &SearchFilters::default())
            .await;

        assert_eq!(first.sources_status["arxiv"], SourceStatus::Success);
        assert_eq!(second.sources_status["arxiv"], SourceStatus::Failed);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_max_results_forwarded() {
        let items = (0..10)
            .map(|i| make_item("arxiv", &format!("T{}", i), &format!("https://t{}.example", i)))
            .collect();
        let orch = orchestrator(vec![Arc::new(MockSource::new("arxiv").with_results(items))])
            .with_max_results(4);

        let outcome = orch
            .search_all_sources("q", &names(&["arxiv"]), &SearchFilters::default())
            .await;
        assert_eq!(outcome.total, 4);
    }

    #[derive(Debug)]
    struct PanickingSource;

    #[async_trait::async_trait]
    impl Source for PanickingSource {
        fn id(&self) -> &str {
            "scholar"
        }

        fn name(&self) -> &str {
            "Panicking"
        }

        async fn search(&self, _query: &SearchQuery) -> Result<Vec<ResultItem>, SourceError> {
            panic!("adapter bug");
        }
    }

    #[tokio::test]
    async fn test_panicked_source_fails_before_deadline() {
        let slow = Arc::new(
            MockSource::new("arxiv")
                .with_results(vec![make_item("arxiv", "Slow", "https://slow.example")])
                .with_delay(Duration::from_secs(5)),
        );
        let mut registry = SourceRegistry::new();
        registry.register(slow);
        registry.register(Arc::new(PanickingSource));
        let orch = SearchOrchestrator::new(Arc::new(registry), Arc::new(RateLimiter::unlimited()))
            .with_timeout(Duration::from_millis(300));

        let outcome = orch
            .search_all_sources("q", &names(&["arxiv", "scholar"]), &SearchFilters::default())
            .await;

        assert_eq!(outcome.sources_status["scholar"], SourceStatus::Failed);
        assert!(outcome.source_errors["scholar"].contains("panicked"));
        assert_eq!(outcome.sources_status["arxiv"], SourceStatus::Timeout);
    }
}
