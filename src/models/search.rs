//! Search request and response models.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ResultItem;

/// Caller-supplied search filters
///
/// Serialized into the search cache key, so field order and names are part
/// of the cache identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Time range, interpreted per adapter ("2020", "2018-2022", "2010-",
    /// "-2015", or "day"/"week"/"month"/"year")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<String>,

    /// Whether to run the relevance filter (defaults to the configured value)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_filter: Option<bool>,

    /// Minimum relevance score (0-100) kept by the relevance filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_threshold: Option<u8>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time_range(mut self, range: impl Into<String>) -> Self {
        self.time_range = Some(range.into());
        self
    }

    pub fn semantic_filter(mut self, enabled: bool) -> Self {
        self.semantic_filter = Some(enabled);
        self
    }

    pub fn relevance_threshold(mut self, threshold: u8) -> Self {
        self.relevance_threshold = Some(threshold.min(100));
        self
    }
}

/// Query handed to a single source adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Main search query string
    pub query: String,

    /// Maximum number of results the adapter should return
    pub max_results: usize,

    /// Filters forwarded from the caller
    pub filters: SearchFilters,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: 15,
            filters: SearchFilters::default(),
        }
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// Per-source outcome of one fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Success,
    Failed,
    Timeout,
    Skipped,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Success => "success",
            SourceStatus::Failed => "failed",
            SourceStatus::Timeout => "timeout",
            SourceStatus::Skipped => "skipped",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SourceStatus::Success)
    }
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified result of a multi-source search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Deduplicated (and possibly relevance-filtered) results
    pub results: Vec<ResultItem>,

    /// Number of results after deduplication and filtering
    pub total: usize,

    /// Outcome for every requested source name
    pub sources_status: BTreeMap<String, SourceStatus>,

    /// Error message for each failed source
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_errors: BTreeMap<String, String>,
}

impl SearchOutcome {
    /// Create an outcome from results, keeping `total` in sync
    pub fn new(results: Vec<ResultItem>, sources_status: BTreeMap<String, SourceStatus>) -> Self {
        Self {
            total: results.len(),
            results,
            sources_status,
            source_errors: BTreeMap::new(),
        }
    }

    /// Replace the result list and recompute `total`
    pub fn set_results(&mut self, results: Vec<ResultItem>) {
        self.total = results.len();
        self.results = results;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        let mut status = BTreeMap::new();
        status.insert("arxiv".to_string(), SourceStatus::Success);
        status.insert("duckduckgo".to_string(), SourceStatus::Timeout);
        let outcome = SearchOutcome::new(vec![], status);

        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(
            json,
            r#"{"results":[],"total":0,"sources_status":{"arxiv":"success","duckduckgo":"timeout"}}"#
        );
    }

    #[test]
    fn test_filters_threshold_capped() {
        let filters = SearchFilters::new().relevance_threshold(250);
        assert_eq!(filters.relevance_threshold, Some(100));
    }

    #[test]
    fn test_empty_filters_serialize_to_empty_object() {
        let json = serde_json::to_value(SearchFilters::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
