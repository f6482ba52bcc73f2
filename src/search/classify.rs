//! URL and source based content classification.

use crate::models::Category;

/// Sources whose every result belongs to one category
const SOURCE_RULES: &[(&str, Category)] = &[
    ("arxiv", Category::Academic),
    ("scholar", Category::Academic),
    ("zhihu", Category::Qa),
];

/// Host rules, checked in order; a host matches a domain exactly or as a
/// subdomain of it
const DOMAIN_RULES: &[(Category, &[&str])] = &[
    (
        Category::Academic,
        &[
            "arxiv.org",
            "scholar.google.com",
            "pubmed.ncbi.nlm.nih.gov",
            "ieee.org",
            "acm.org",
            "springer.com",
            "nature.com",
            "sciencedirect.com",
            "doi.org",
        ],
    ),
    (
        Category::Qa,
        &[
            "zhihu.com",
            "stackoverflow.com",
            "stackexchange.com",
            "quora.com",
            "segmentfault.com",
        ],
    ),
    (
        Category::Blog,
        &[
            "medium.com",
            "csdn.net",
            "blog.csdn.net",
            "juejin.cn",
            "dev.to",
            "hashnode.com",
            "cnblogs.com",
            "jianshu.com",
            "wordpress.com",
            "blogspot.com",
            "substack.com",
        ],
    ),
    (
        Category::Forum,
        &[
            "reddit.com",
            "v2ex.com",
            "news.ycombinator.com",
            "discourse.org",
            "tieba.baidu.com",
        ],
    ),
];

/// Assign a category to a result from its source and URL
pub fn classify(url: &str, source: &str) -> Category {
    if let Some((_, category)) = SOURCE_RULES.iter().find(|(s, _)| *s == source) {
        return *category;
    }

    let Some(host) = url::Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    else {
        return Category::Webpage;
    };
    let host = host.strip_prefix("www.").unwrap_or(&host);

    DOMAIN_RULES
        .iter()
        .find(|(_, domains)| {
            domains.iter().any(|domain| {
                host == *domain
                    || host
                        .strip_suffix(domain)
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
        })
        .map(|(category, _)| *category)
        .unwrap_or_default()
}
