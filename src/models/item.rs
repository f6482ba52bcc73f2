//! Result item model shared by every source adapter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Content category assigned to a result after fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Academic,
    Qa,
    Blog,
    Forum,
    #[default]
    Webpage,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Academic => "academic",
            Category::Qa => "qa",
            Category::Blog => "blog",
            Category::Forum => "forum",
            Category::Webpage => "webpage",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered resource
///
/// Adapters construct items per raw hit; the search pipeline then fills in
/// `category` and, when relevance filtering runs, `relevance_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    /// Resource title
    pub title: String,

    /// Resource URL (identity key for deduplication within one query)
    pub url: String,

    /// Source-truncated description
    #[serde(default)]
    pub snippet: String,

    /// Id of the adapter that produced this item
    pub source: String,

    /// Authors, formatted by the adapter
    #[serde(default)]
    pub authors: String,

    /// Free-form publication date or year
    #[serde(default)]
    pub published: String,

    /// Adapter-specific metadata (PDF link, citation count, ...)
    #[serde(default)]
    pub extra: Map<String, Value>,

    /// Category assigned by the classifier
    #[serde(default)]
    pub category: Category,

    /// Relevance score 0-100 assigned by the relevance filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<u8>,
}

impl ResultItem {
    /// Create a new item with the identity fields set
    pub fn new(title: impl Into<String>, url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: String::new(),
            source: source.into(),
            authors: String::new(),
            published: String::new(),
            extra: Map::new(),
            category: Category::default(),
            relevance_score: None,
        }
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn authors(mut self, authors: impl Into<String>) -> Self {
        self.authors = authors.into();
        self
    }

    pub fn published(mut self, published: impl Into<String>) -> Self {
        self.published = published.into();
        self
    }

    /// Attach one adapter-specific metadata value
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// PDF link recorded by the adapter, if any
    pub fn pdf_url(&self) -> Option<&str> {
        self.extra.get("pdf_url").and_then(Value::as_str)
    }
}

/// Truncate a string to at most `max` characters (not bytes)
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
