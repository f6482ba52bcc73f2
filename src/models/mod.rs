//! Core data models for results, searches and downloads.

mod download;
mod item;
mod search;

pub use download::{DownloadRecord, DownloadStatus, DownloadTicket};
pub use item::{truncate_chars, Category, ResultItem};
pub use search::{SearchFilters, SearchOutcome, SearchQuery, SourceStatus};
