//! Utility modules supporting search and download operations.
//!
//! - [`RateLimiter`] / [`TokenBucket`]: per-source admission control
//! - [`SearchCache`] / [`AnalysisCache`]: content-addressed caches in the store
//! - [`HistoryLedger`]: append-only log of executed searches
//! - [`HttpClient`]: the shared HTTP client
//! - [`dedup_by_url`]: first-seen URL deduplication
//! - [`extract_text`] / [`validate_pdf`]: PDF helpers
//!
//! # Rate limiting
//!
//! ```rust,no_run
//! use research_aggregator::config::default_rate_limits;
//! use research_aggregator::utils::RateLimiter;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = RateLimiter::new(&default_rate_limits())?;
//! if limiter.acquire("arxiv", Duration::from_secs(10)).await {
//!     // call the arXiv API
//! }
//! # Ok(())
//! # }
//! ```

mod cache;
mod dedup;
mod history;
mod http;
mod pdf;
mod rate_limit;

pub use cache::{
    make_analysis_cache_key, make_search_cache_key, AnalysisCache, SearchCache,
    ANALYSIS_KEY_PREFIX_CHARS,
};
pub use dedup::dedup_by_url;
pub use history::{HistoryEntry, HistoryLedger, MAX_HISTORY_LIMIT};
pub(crate) use history::millis_to_datetime;
pub use http::{HttpClient, BROWSER_USER_AGENT};
pub use pdf::{extract_text, extract_text_async, validate_pdf, PdfExtractError, PDF_SIGNATURE};
pub use rate_limit::{RateLimiter, TokenBucket};
