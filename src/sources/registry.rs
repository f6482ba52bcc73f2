//! Registry for managing content source plugins.

use std::collections::HashMap;
use std::sync::Arc;

use super::{ArxivSource, DuckDuckGoSource, ScholarSource, Source, ZhihuSource};
use crate::utils::HttpClient;

/// Registry for all available content sources
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn Source>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in source sharing one HTTP client
    pub fn with_defaults(client: HttpClient) -> Self {
        let mut registry = Self::new();

        let web = DuckDuckGoSource::new(client.clone());
        registry.register(Arc::new(web.clone()));
        registry.register(Arc::new(ArxivSource::new(client.clone())));
        registry.register(Arc::new(ScholarSource::new(client)));
        registry.register(Arc::new(ZhihuSource::new(web)));

        registry
    }

    /// Register a new source, replacing any source with the same id
    pub fn register(&mut self, source: Arc<dyn Source>) {
        self.sources.insert(source.id().to_string(), source);
    }

    /// Get a source by ID
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources.get(id)
    }

    /// Get all registered sources
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.values()
    }

    /// Get all source IDs, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.sources.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Check if a source exists
    pub fn has(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// Get the number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
