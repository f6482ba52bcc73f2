//! DuckDuckGo web search source.
//!
//! DuckDuckGo has no public search API; results are scraped from the
//! JavaScript-free HTML endpoint. Result links are redirect URLs carrying the
//! target in the `uddg` query parameter.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::models::{ResultItem, SearchQuery};
use crate::sources::{Source, SourceError};
use crate::utils::{HttpClient, BROWSER_USER_AGENT};

const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";

/// One organic hit from a results page
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WebHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// DuckDuckGo research source
#[derive(Debug, Clone)]
pub struct DuckDuckGoSource {
    client: HttpClient,
    endpoint: String,
}

impl DuckDuckGoSource {
    pub fn new(client: HttpClient) -> Self {
        Self::with_endpoint(client, DUCKDUCKGO_HTML_URL)
    }

    /// Point the source at a different HTML endpoint
    pub fn with_endpoint(client: HttpClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// DuckDuckGo's `df` parameter for a relative time range
    fn date_filter(range: Option<&str>) -> Option<&'static str> {
        match range?.trim() {
            "day" | "d" => Some("d"),
            "week" | "w" => Some("w"),
            "month" | "m" => Some("m"),
            "year" | "y" => Some("y"),
            _ => None,
        }
    }

    /// Run a raw web search and return up to `max_results` organic hits
    pub(crate) async fn web_search(
        &self,
        query: &str,
        time_range: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<WebHit>, SourceError> {
        let mut url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));
        if let Some(df) = Self::date_filter(time_range) {
            url.push_str("&df=");
            url.push_str(df);
        }

        let response = self
            .client
            .get(&url)
            .header("User-Agent", BROWSER_USER_AGENT)
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8")
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to search DuckDuckGo: {}", e)))?;

        if !response.status().is_success() {
            return Err(SourceError::Api(format!(
                "DuckDuckGo returned status: {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to read response: {}", e)))?;

        let mut hits = Self::parse_results(&html)?;
        hits.truncate(max_results);
        Ok(hits)
    }

    /// Extract organic results from an HTML results page
    pub(crate) fn parse_results(html: &str) -> Result<Vec<WebHit>, SourceError> {
        let document = Html::parse_document(html);
        let result_selector = Selector::parse("div.result")
            .map_err(|e| SourceError::Parse(format!("Invalid selector: {}", e)))?;
        let link_selector = Selector::parse("a.result__a")
            .map_err(|e| SourceError::Parse(format!("Invalid selector: {}", e)))?;
        let snippet_selector = Selector::parse(".result__snippet").ok();

        let mut hits = Vec::new();
        for result in document.select(&result_selector) {
            // Sponsored results
            if result
                .value()
                .attr("class")
                .is_some_and(|c| c.contains("result--ad"))
            {
                continue;
            }

            let Some(link) = result.select(&link_selector).next() else {
                continue;
            };
            let Some(href) = link.value().attr("href") else {
                continue;
            };

            let snippet = snippet_selector
                .as_ref()
                .and_then(|s| result.select(s).next())
                .map(element_text)
                .unwrap_or_default();

            hits.push(WebHit {
                title: element_text(link),
                url: resolve_redirect(href),
                snippet,
            });
        }

        Ok(hits)
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Unwrap a `/l/?uddg=<target>` redirect link into its target URL
fn resolve_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{}", href)
    } else {
        href.to_string()
    };

    url::Url::parse(&absolute)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(absolute)
}

#[async_trait]
impl Source for DuckDuckGoSource {
    fn id(&self) -> &str {
        "duckduckgo"
    }

    fn name(&self) -> &str {
        "DuckDuckGo"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ResultItem>, SourceError> {
        let hits = self
            .web_search(
                &query.query,
                query.filters.time_range.as_deref(),
                query.max_results,
            )
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| ResultItem::new(hit.title, hit.url, "duckduckgo").snippet(hit.snippet))
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const RESULTS_PAGE: &str = r##"
<html><body>
  <div class="result results_links result--ad">
    <a class="result__a" href="https://ads.example/track">Sponsored</a>
  </div>
  <div class="result results_links results_links_deep web-result">
    <h2 class="result__title">
      <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fdistill.pub%2F2021%2Fgnn-intro%2F&amp;rut=abc">A Gentle Introduction to
        <b>Graph Neural Networks</b></a>
    </h2>
    <a class="result__snippet" href="#">What components are needed for building learning algorithms that leverage the structure of graphs?</a>
  </div>
  <div class="result results_links web-result">
    <h2 class="result__title">
      <a class="result__a" href="https://www.zhihu.com/question/54504471">如何理解图神经网络？</a>
    </h2>
    <a class="result__snippet" href="#">图神经网络入门</a>
  </div>
  <div class="result results_links web-result">
    <h2 class="result__title">No link here</h2>
  </div>
</body></html>"##;

    #[test]
    fn test_parse_results() {
        let hits = DuckDuckGoSource::parse_results(RESULTS_PAGE).unwrap();
        assert_eq!(hits.len(), 2);

        assert_eq!(hits[0].title, "A Gentle Introduction to Graph Neural Networks");
        assert_eq!(hits[0].url, "https://distill.pub/2021/gnn-intro/");
        assert!(hits[0].snippet.starts_with("What components"));

        assert_eq!(hits[1].url, "https://www.zhihu.com/question/54504471");
        assert_eq!(hits[1].snippet, "图神经网络入门");
    }

    #[test]
    fn test_resolve_redirect() {
        assert_eq!(
            resolve_redirect("/l/?uddg=https%3A%2F%2Fexample.com%2Fa%3Fb%3Dc"),
            "https://example.com/a?b=c"
        );
        assert_eq!(resolve_redirect("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn test_date_filter() {
        assert_eq!(DuckDuckGoSource::date_filter(Some("week")), Some("w"));
        assert_eq!(DuckDuckGoSource::date_filter(Some("2020")), None);
        assert_eq!(DuckDuckGoSource::date_filter(None), None);
    }

    #[tokio::test]
    async fn test_search_against_mock_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/html/")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("q".into(), "graph neural networks".into()),
                mockito::Matcher::UrlEncoded("df".into(), "m".into()),
            ]))
            .with_status(200)
            .with_body(RESULTS_PAGE)
            .create_async()
            .await;

        let source = DuckDuckGoSource::with_endpoint(
            HttpClient::new().unwrap(),
            format!("{}/html/", server.url()),
        );
        let query = SearchQuery::new("graph neural networks")
            .max_results(1)
            .filters(crate::models::SearchFilters::new().time_range("month"));
        let items = source.search(&query).await.unwrap();

        mock.assert_async().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, "duckduckgo");
        assert_eq!(items[0].url, "https://distill.pub/2021/gnn-intro/");
    }
}
