//! External content sources with a trait-based plugin architecture.
//!
//! Every source implements [`Source`]: it turns a [`SearchQuery`] into an
//! ordered list of [`ResultItem`]s or fails with a [`SourceError`]. Adapters do
//! not rate limit themselves; the search orchestrator gates each call through
//! the source's token bucket before invoking it.
//!
//! Built-in sources:
//!
//! - `duckduckgo` - general web search scraped from the DuckDuckGo HTML endpoint
//! - `arxiv` - arXiv preprint index (Atom API)
//! - `scholar` - Semantic Scholar citation graph API
//! - `zhihu` - Zhihu Q&A content through a `site:zhihu.com` web search
//!
//! New sources are added by implementing the trait and registering them with
//! the [`SourceRegistry`].

mod arxiv;
mod duckduckgo;
pub mod mock;
mod registry;
mod scholar;
mod zhihu;

pub use arxiv::ArxivSource;
pub use duckduckgo::DuckDuckGoSource;
pub use mock::MockSource;
pub use registry::SourceRegistry;
pub use scholar::ScholarSource;
pub use zhihu::ZhihuSource;

use async_trait::async_trait;

use crate::models::{ResultItem, SearchQuery};

/// The Source trait defines the interface for all content source plugins.
///
/// # Implementing a New Source
///
/// 1. Create a struct holding its HTTP client and endpoint
/// 2. Implement `id`, `name` and `search`
/// 3. Register it with [`SourceRegistry::register`] and, if it needs
///    throttling, add a `[rate_limits.<id>]` entry to the configuration
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Unique identifier, used in requests, status maps and rate-limit tables
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Search for items matching the query
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ResultItem>, SourceError>;
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Parsing error (Atom, JSON, HTML)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limiter did not grant a permit in time
    #[error("Rate limit exceeded")]
    RateLimit,

    /// API error from the source
    #[error("API error: {0}")]
    Api(String),

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

/// Split a year filter into an inclusive `(from, to)` range
///
/// Accepts `2020`, `2018-2022`, `2010-` and `-2015`; anything else (including
/// relative ranges like `week`) yields `None`.
pub(crate) fn parse_year_range(range: &str) -> Option<(Option<u16>, Option<u16>)> {
    fn year(s: &str) -> Option<u16> {
        let s = s.trim();
        if s.len() == 4 {
            s.parse().ok()
        } else {
            None
        }
    }

    let range = range.trim();
    match range.split_once('-') {
        None => year(range).map(|y| (Some(y), Some(y))),
        Some((from, to)) => {
            let from = if from.trim().is_empty() { None } else { Some(year(from)?) };
            let to = if to.trim().is_empty() { None } else { Some(year(to)?) };
            if from.is_none() && to.is_none() {
                None
            } else {
                Some((from, to))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_year_range() {
        assert_eq!(parse_year_range("2020"), Some((Some(2020), Some(2020))));
        assert_eq!(parse_year_range("2018-2022"), Some((Some(2018), Some(2022))));
        assert_eq!(parse_year_range("2010-"), Some((Some(2010), None)));
        assert_eq!(parse_year_range("-2015"), Some((None, Some(2015))));
        assert_eq!(parse_year_range("week"), None);
        assert_eq!(parse_year_range("-"), None);
        assert_eq!(parse_year_range("20-21"), None);
    }
}
