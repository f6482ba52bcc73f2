//! Multi-source search: fan-out, classification, relevance scoring and the
//! service that ties them to the caches and history ledger.

mod classify;
mod orchestrator;
mod relevance;
mod service;

pub use classify::classify;
pub use orchestrator::SearchOrchestrator;
pub use relevance::{normalize_score, RelevanceFilter, DEFAULT_SCORE};
pub use service::{CacheCleanup, ResearchService};
