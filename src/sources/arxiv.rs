//! arXiv preprint source.

use async_trait::async_trait;
use feed_rs::parser;

use crate::models::{truncate_chars, ResultItem, SearchQuery};
use crate::sources::{parse_year_range, Source, SourceError};
use crate::utils::HttpClient;

/// Base URL for arXiv API
const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";
/// Base URL for arXiv PDFs
const ARXIV_PDF_URL: &str = "https://arxiv.org/pdf";

const SNIPPET_CHARS: usize = 500;
const MAX_AUTHORS: usize = 5;

/// arXiv research source
#[derive(Debug, Clone)]
pub struct ArxivSource {
    client: HttpClient,
    api_url: String,
}

impl ArxivSource {
    pub fn new(client: HttpClient) -> Self {
        Self::with_api_url(client, ARXIV_API_URL)
    }

    /// Point the source at a different API endpoint
    pub fn with_api_url(client: HttpClient, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }

    /// Build search query for arXiv API
    fn build_search_query(query: &SearchQuery) -> String {
        let mut parts = vec![format!("all:{}", query.query.trim())];

        if let Some((from, to)) = query
            .filters
            .time_range
            .as_deref()
            .and_then(parse_year_range)
        {
            let from = from.map_or_else(|| "*".to_string(), |y| format!("{}01010000", y));
            let to = to.map_or_else(|| "*".to_string(), |y| format!("{}12312359", y));
            parts.push(format!("submittedDate:[{} TO {}]", from, to));
        }

        parts.join(" AND ")
    }

    /// Convert one Atom entry into a result item
    fn parse_entry(entry: &feed_rs::model::Entry) -> ResultItem {
        // Entry ids look like http://arxiv.org/abs/2301.12345v1
        let url = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate"))
            .map(|l| l.href.clone())
            .unwrap_or_else(|| entry.id.clone());
        let arxiv_id = entry
            .id
            .rsplit("/abs/")
            .next()
            .unwrap_or(&entry.id)
            .to_string();

        let title = entry
            .title
            .as_ref()
            .map(|t| collapse_whitespace(&t.content))
            .unwrap_or_default();

        let summary = entry
            .summary
            .as_ref()
            .map(|s| collapse_whitespace(&s.content))
            .unwrap_or_default();

        let authors = entry
            .authors
            .iter()
            .take(MAX_AUTHORS)
            .map(|a| a.name.trim())
            .collect::<Vec<_>>()
            .join(", ");

        let pdf_url = entry
            .links
            .iter()
            .find(|l| {
                l.title.as_deref() == Some("pdf")
                    || l.media_type.as_deref() == Some("application/pdf")
            })
            .map(|l| l.href.clone())
            .unwrap_or_else(|| format!("{}/{}", ARXIV_PDF_URL, arxiv_id));

        let categories: Vec<String> = entry.categories.iter().map(|c| c.term.clone()).collect();

        ResultItem::new(title, url, "arxiv")
            .snippet(truncate_chars(&summary, SNIPPET_CHARS))
            .authors(authors)
            .published(entry.published.map(|d| d.to_rfc3339()).unwrap_or_default())
            .extra("arxiv_id", arxiv_id)
            .extra("pdf_url", pdf_url)
            .extra("categories", categories)
    }

    /// Parse an Atom feed body into result items
    pub(crate) fn parse_feed(body: &[u8]) -> Result<Vec<ResultItem>, SourceError> {
        let feed = parser::parse(body)
            .map_err(|e| SourceError::Parse(format!("Failed to parse Atom feed: {}", e)))?;
        Ok(feed.entries.iter().map(Self::parse_entry).collect())
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl Source for ArxivSource {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn name(&self) -> &str {
        "arXiv"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ResultItem>, SourceError> {
        let search_query = Self::build_search_query(query);
        let max_results = query.max_results.min(200);

        let url = format!(
            "{}?search_query={}&start=0&max_results={}&sortBy=relevance&sortOrder=descending",
            self.api_url,
            urlencoding::encode(&search_query),
            max_results
        );

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/atom+xml")
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to fetch arXiv results: {}", e)))?;

        if !response.status().is_success() {
            return Err(SourceError::Api(format!(
                "arXiv API returned status: {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to read response: {}", e)))?;

        let mut items = Self::parse_feed(bytes.as_ref())?;
        items.truncate(max_results);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchFilters;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>arXiv Query Results</title>
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <title>Attention Is All
      You Need</title>
    <summary>The dominant sequence transduction models are based on complex recurrent
      or convolutional neural networks.</summary>
    <published>2017-06-12T17:57:34Z</published>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
    <author><name>Niki Parmar</name></author>
    <author><name>Jakob Uszkoreit</name></author>
    <author><name>Llion Jones</name></author>
    <author><name>Aidan N. Gomez</name></author>
    <link href="http://arxiv.org/abs/1706.03762v7" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/1706.03762v7" rel="related" type="application/pdf"/>
    <category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    #[test]
    fn test_build_search_query() {
        let query = SearchQuery::new("graph neural networks");
        assert_eq!(
            ArxivSource::build_search_query(&query),
            "all:graph neural networks"
        );

        let query = SearchQuery::new("gnn").filters(SearchFilters::new().time_range("2018-2022"));
        assert_eq!(
            ArxivSource::build_search_query(&query),
            "all:gnn AND submittedDate:[201801010000 TO 202212312359]"
        );

        let query = SearchQuery::new("gnn").filters(SearchFilters::new().time_range("-2015"));
        assert!(ArxivSource::build_search_query(&query).ends_with("[* TO 201512312359]"));

        // Relative ranges are not expressible in the arXiv query language
        let query = SearchQuery::new("gnn").filters(SearchFilters::new().time_range("week"));
        assert_eq!(ArxivSource::build_search_query(&query), "all:gnn");
    }

    #[test]
    fn test_parse_feed() {
        let items = ArxivSource::parse_feed(FEED.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);

        let item = &items[0];
        assert_eq!(item.title, "Attention Is All You Need");
        assert_eq!(item.url, "http://arxiv.org/abs/1706.03762v7");
        assert_eq!(item.source, "arxiv");
        assert!(item.snippet.starts_with("The dominant sequence transduction"));
        // Only the first five authors are kept
        assert_eq!(
            item.authors,
            "Ashish Vaswani, Noam Shazeer, Niki Parmar, Jakob Uszkoreit, Llion Jones"
        );
        assert!(item.published.starts_with("2017-06-12"));
        assert_eq!(item.extra["arxiv_id"], "1706.03762v7");
        assert_eq!(item.pdf_url(), Some("http://arxiv.org/pdf/1706.03762v7"));
        assert_eq!(item.extra["categories"], serde_json::json!(["cs.CL", "cs.LG"]));
    }

    #[test]
    fn test_parse_feed_rejects_garbage() {
        assert!(matches!(
            ArxivSource::parse_feed(b"not a feed"),
            Err(SourceError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_search_against_mock_api() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/query")
            .match_query(mockito::Matcher::UrlEncoded(
                "max_results".into(),
                "5".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/atom+xml")
            .with_body(FEED)
            .create_async()
            .await;

        let source = ArxivSource::with_api_url(
            HttpClient::new().unwrap(),
            format!("{}/api/query", server.url()),
        );
        let items = source
            .search(&SearchQuery::new("attention").max_results(5))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].extra["arxiv_id"], "1706.03762v7");
    }

    #[tokio::test]
    async fn test_search_reports_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/query")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let source = ArxivSource::with_api_url(
            HttpClient::new().unwrap(),
            format!("{}/api/query", server.url()),
        );
        let result = source.search(&SearchQuery::new("attention")).await;
        assert!(matches!(result, Err(SourceError::Api(_))));
    }
}
