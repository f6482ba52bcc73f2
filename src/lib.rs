//! # Research Aggregator
//!
//! Multi-source research aggregation: one query fans out concurrently to web,
//! preprint, citation-graph and Q&A sources; results are deduplicated,
//! classified, optionally scored for relevance by an LLM oracle, and cached.
//! Papers can be fetched in the background from a set of mirrors.
//!
//! ## Architecture
//!
//! - [`models`]: Result items, search outcomes and download records
//! - [`sources`]: Source adapters behind the [`Source`] trait
//! - [`search`]: Fan-out orchestration, classification, relevance filtering
//!   and the [`ResearchService`] pipeline
//! - [`oracle`]: LLM completion client and loose JSON extraction
//! - [`analysis`]: Cached summaries, translations and paper analyses
//! - [`download`]: Mirror selection and the background download manager
//! - [`utils`]: Rate limiting, caches, history, HTTP and PDF helpers
//! - [`db`]: SQLite store and schema
//! - [`config`]: Configuration management
//! - [`context`]: Wires everything together from a [`config::Config`]

pub mod analysis;
pub mod config;
pub mod context;
pub mod db;
pub mod download;
pub mod models;
pub mod oracle;
pub mod search;
pub mod sources;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use context::AppContext;
pub use models::{ResultItem, SearchFilters, SearchOutcome, SourceStatus};
pub use search::ResearchService;
pub use sources::{Source, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
