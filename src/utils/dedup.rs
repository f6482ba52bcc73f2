//! Deduplication of result items across sources.

use std::collections::HashSet;

use crate::models::ResultItem;

/// Remove items whose URL was already seen, keeping first-seen order
///
/// Identity is exact string equality on `url`. Items with an empty URL have no
/// identity and are always kept.
pub fn dedup_by_url(items: Vec<ResultItem>) -> Vec<ResultItem> {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| item.url.is_empty() || seen.insert(item.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, url: &str, source: &str) -> ResultItem {
        ResultItem::new(title, url, source)
    }

    #[test]
    fn test_keeps_first_seen() {
        let items = vec![
            item("A", "https://a.example", "arxiv"),
            item("B", "https://b.example", "duckduckgo"),
            item("A again", "https://a.example", "duckduckgo"),
        ];

        let unique = dedup_by_url(items);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].title, "A");
        assert_eq!(unique[0].source, "arxiv");
        assert_eq!(unique[1].title, "B");
    }

    #[test]
    fn test_empty_urls_are_kept() {
        let items = vec![
            item("no link 1", "", "zhihu"),
            item("no link 2", "", "zhihu"),
            item("x", "https://x.example", "zhihu"),
        ];
        assert_eq!(dedup_by_url(items).len(), 3);
    }

    #[test]
    fn test_exact_match_only() {
        let items = vec![
            item("a", "https://a.example/", "duckduckgo"),
            item("a", "https://a.example", "duckduckgo"),
            item("a", "https://A.example", "duckduckgo"),
        ];
        assert_eq!(dedup_by_url(items).len(), 3);
    }
}
