//! Mock source for testing purposes.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::models::{ResultItem, SearchQuery};
use crate::sources::{Source, SourceError};

/// A scripted source: returns predefined items after an optional delay, or
/// fails on demand, and counts how often it was invoked.
#[derive(Debug)]
pub struct MockSource {
    id: String,
    results: Mutex<Vec<ResultItem>>,
    delay: Mutex<Duration>,
    failure: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl MockSource {
    /// Create a mock that answers under the given source id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            results: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Set the items to return
    pub fn with_results(self, results: Vec<ResultItem>) -> Self {
        self.set_results(results);
        self
    }

    /// Sleep this long before answering
    pub fn with_delay(self, delay: Duration) -> Self {
        if let Ok(mut guard) = self.delay.lock() {
            *guard = delay;
        }
        self
    }

    /// Fail every search with this message
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        if let Ok(mut guard) = self.failure.lock() {
            *guard = Some(message.into());
        }
        self
    }

    pub fn set_results(&self, results: Vec<ResultItem>) {
        if let Ok(mut guard) = self.results.lock() {
            *guard = results;
        }
    }

    /// Number of times `search` was invoked
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ResultItem>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay.lock().map(|d| *d).unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failure.lock().ok().and_then(|f| f.clone()) {
            return Err(SourceError::Api(message));
        }

        let results = self.results.lock().map(|r| r.clone()).unwrap_or_default();
        Ok(results.into_iter().take(query.max_results).collect())
    }
}

/// Helper to build a result item for tests.
pub fn make_item(source: &str, title: &str, url: &str) -> ResultItem {
    ResultItem::new(title, url, source).snippet(format!("About {}", title))
}
