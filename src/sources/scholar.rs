//! Scholarly citation-graph source backed by the Semantic Scholar API.

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{truncate_chars, ResultItem, SearchQuery};
use crate::sources::{parse_year_range, Source, SourceError};
use crate::utils::HttpClient;

const SEMANTIC_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

const SEARCH_FIELDS: &str = "title,url,abstract,authors,year,venue,citationCount,openAccessPdf";
const MAX_RESULTS: usize = 10;
const SNIPPET_CHARS: usize = 500;

/// Semantic Scholar research source
#[derive(Debug, Clone)]
pub struct ScholarSource {
    client: HttpClient,
    api_base: String,
    api_key: Option<String>,
}

impl ScholarSource {
    /// Create a new source; `SEMANTIC_SCHOLAR_API_KEY` raises the API quota
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            api_base: SEMANTIC_API_BASE.to_string(),
            api_key: std::env::var("SEMANTIC_SCHOLAR_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
        }
    }

    /// Point the source at a different API base
    pub fn with_api_base(client: HttpClient, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            api_key: None,
        }
    }

    /// Semantic Scholar's `year` parameter for a year filter
    fn year_param(range: Option<&str>) -> Option<String> {
        let (from, to) = parse_year_range(range?)?;
        Some(match (from, to) {
            (Some(f), Some(t)) if f == t => f.to_string(),
            (f, t) => format!(
                "{}-{}",
                f.map(|y| y.to_string()).unwrap_or_default(),
                t.map(|y| y.to_string()).unwrap_or_default()
            ),
        })
    }

    fn parse_paper(paper: S2Paper) -> ResultItem {
        let authors = paper
            .authors
            .iter()
            .filter_map(|a| a.name.as_deref())
            .collect::<Vec<_>>()
            .join(", ");

        let url = paper.url.unwrap_or_default();
        let mut item = ResultItem::new(paper.title.unwrap_or_default(), url, "scholar")
            .snippet(truncate_chars(
                paper.r#abstract.as_deref().unwrap_or_default(),
                SNIPPET_CHARS,
            ))
            .authors(authors)
            .published(paper.year.map(|y| y.to_string()).unwrap_or_default())
            .extra("venue", paper.venue.unwrap_or_default())
            .extra("citation_count", paper.citation_count.unwrap_or(0));

        if let Some(pdf) = paper.open_access_pdf.and_then(|p| p.url) {
            if !pdf.is_empty() {
                item = item.extra("pdf_url", pdf);
            }
        }
        item
    }
}

#[async_trait]
impl Source for ScholarSource {
    fn id(&self) -> &str {
        "scholar"
    }

    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ResultItem>, SourceError> {
        let limit = query.max_results.min(MAX_RESULTS);
        let mut url = format!(
            "{}/paper/search?query={}&limit={}&fields={}",
            self.api_base,
            urlencoding::encode(&query.query),
            limit,
            SEARCH_FIELDS
        );
        if let Some(year) = Self::year_param(query.filters.time_range.as_deref()) {
            url.push_str("&year=");
            url.push_str(&year);
        }

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await.map_err(|e| {
            SourceError::Network(format!("Failed to search Semantic Scholar: {}", e))
        })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::Api(
                "Semantic Scholar rate limit reached".to_string(),
            ));
        }
        if !response.status().is_success() {
            return Err(SourceError::Api(format!(
                "Semantic Scholar API returned status: {}",
                response.status()
            )));
        }

        let data: S2SearchResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Failed to parse JSON: {}", e)))?;

        Ok(data
            .data
            .into_iter()
            .take(limit)
            .map(Self::parse_paper)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct S2SearchResponse {
    #[serde(default)]
    data: Vec<S2Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    title: Option<String>,
    url: Option<String>,
    r#abstract: Option<String>,
    #[serde(default)]
    authors: Vec<S2Author>,
    year: Option<i32>,
    venue: Option<String>,
    citation_count: Option<u64>,
    open_access_pdf: Option<S2Pdf>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2Pdf {
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchFilters;

    const RESPONSE: &str = r#"{
        "total": 2,
        "offset": 0,
        "data": [
            {
                "paperId": "36eff562f65125511b5dfab68ce7f7a943c27478",
                "url": "https://www.semanticscholar.org/paper/36eff562f65125511b5dfab68ce7f7a943c27478",
                "title": "Semi-Supervised Classification with Graph Convolutional Networks",
                "abstract": "We present a scalable approach for semi-supervised learning on graph-structured data.",
                "venue": "International Conference on Learning Representations",
                "year": 2016,
                "citationCount": 25000,
                "openAccessPdf": null,
                "authors": [
                    {"authorId": "1", "name": "Thomas Kipf"},
                    {"authorId": "2", "name": "M. Welling"}
                ]
            },
            {
                "paperId": "abc",
                "url": "https://www.semanticscholar.org/paper/abc",
                "title": "Graph Attention Networks",
                "abstract": null,
                "venue": "",
                "year": null,
                "citationCount": null,
                "openAccessPdf": {"url": "https://arxiv.org/pdf/1710.10903"},
                "authors": []
            }
        ]
    }"#;

    #[test]
    fn test_year_param() {
        assert_eq!(ScholarSource::year_param(Some("2020")).as_deref(), Some("2020"));
        assert_eq!(
            ScholarSource::year_param(Some("2018-2022")).as_deref(),
            Some("2018-2022")
        );
        assert_eq!(ScholarSource::year_param(Some("2010-")).as_deref(), Some("2010-"));
        assert_eq!(ScholarSource::year_param(Some("-2015")).as_deref(), Some("-2015"));
        assert_eq!(ScholarSource::year_param(Some("week")), None);
    }

    #[test]
    fn test_parse_response() {
        let data: S2SearchResponse = serde_json::from_str(RESPONSE).unwrap();
        let items: Vec<ResultItem> = data.data.into_iter().map(ScholarSource::parse_paper).collect();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].authors, "Thomas Kipf, M. Welling");
        assert_eq!(items[0].published, "2016");
        assert_eq!(items[0].extra["citation_count"], 25000);
        assert_eq!(
            items[0].extra["venue"],
            "International Conference on Learning Representations"
        );
        assert!(items[0].pdf_url().is_none());

        assert_eq!(items[1].snippet, "");
        assert_eq!(items[1].extra["citation_count"], 0);
        assert_eq!(items[1].pdf_url(), Some("https://arxiv.org/pdf/1710.10903"));
    }

    #[tokio::test]
    async fn test_search_against_mock_api() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/paper/search")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("query".into(), "graph convolution".into()),
                mockito::Matcher::UrlEncoded("limit".into(), "10".into()),
                mockito::Matcher::UrlEncoded("year".into(), "2016-".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(RESPONSE)
            .create_async()
            .await;

        let source = ScholarSource::with_api_base(HttpClient::new().unwrap(), server.url());
        let query = SearchQuery::new("graph convolution")
            .max_results(15)
            .filters(SearchFilters::new().time_range("2016-"));
        let items = source.search(&query).await.unwrap();

        mock.assert_async().await;
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.source == "scholar"));
    }
}
