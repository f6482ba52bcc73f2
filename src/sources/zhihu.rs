//! Zhihu Q&A source.
//!
//! Zhihu blocks direct scraping of its own search, so this source runs a
//! `site:zhihu.com` web search and keeps only links that point at Zhihu.

use async_trait::async_trait;

use crate::models::{ResultItem, SearchQuery};
use crate::sources::{DuckDuckGoSource, Source, SourceError};

const MAX_RESULTS: usize = 10;

/// Zhihu research source
#[derive(Debug, Clone)]
pub struct ZhihuSource {
    web: DuckDuckGoSource,
}

impl ZhihuSource {
    /// Create a source that searches through the given web search backend
    pub fn new(web: DuckDuckGoSource) -> Self {
        Self { web }
    }

    fn is_zhihu_url(url: &str) -> bool {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .is_some_and(|host| host == "zhihu.com" || host.ends_with(".zhihu.com"))
    }
}

#[async_trait]
impl Source for ZhihuSource {
    fn id(&self) -> &str {
        "zhihu"
    }

    fn name(&self) -> &str {
        "Zhihu"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ResultItem>, SourceError> {
        let site_query = format!("site:zhihu.com {}", query.query.trim());
        let max_results = query.max_results.min(MAX_RESULTS);

        let hits = self
            .web
            .web_search(&site_query, query.filters.time_range.as_deref(), max_results)
            .await?;

        Ok(hits
            .into_iter()
            .filter(|hit| Self::is_zhihu_url(&hit.url))
            .map(|hit| ResultItem::new(hit.title, hit.url, "zhihu").snippet(hit.snippet))
            .collect())
    }
}
