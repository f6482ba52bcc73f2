//! Composition root: builds every service from a [`Config`].

use std::sync::Arc;

use crate::analysis::AnalysisService;
use crate::config::{Config, ConfigError};
use crate::db::{self, StoreError};
use crate::download::DownloadManager;
use crate::oracle::{ChatOracle, Oracle, OracleError};
use crate::search::{RelevanceFilter, ResearchService, SearchOrchestrator};
use crate::sources::SourceRegistry;
use crate::utils::{AnalysisCache, HttpClient, RateLimiter};

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Every long-lived service, wired together once at startup
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Config,
    pub http: HttpClient,
    pub search: ResearchService,
    pub downloads: DownloadManager,
    pub analysis: AnalysisService,
    /// Why the oracle is unavailable, if it is
    pub oracle_status: Option<String>,
}

impl AppContext {
    pub async fn build(config: Config) -> Result<Self, ContextError> {
        config.validate()?;

        let pool = db::open(&config.database.path).await?;
        let http = HttpClient::from_config(&config.http)?;
        let limiter = Arc::new(RateLimiter::new(&config.rate_limits)?);
        let registry = Arc::new(SourceRegistry::with_defaults(http.clone()));

        let (oracle, oracle_status) = match ChatOracle::from_config(&config.analysis, http.clone()) {
            Ok(oracle) => {
                tracing::info!("Oracle configured: {}", oracle.model());
                (Some(Arc::new(oracle) as Arc<dyn Oracle>), None)
            }
            Err(OracleError::NotConfigured(reason)) => {
                tracing::warn!(
                    "Oracle not configured ({}); relevance filtering and analysis are disabled",
                    reason
                );
                (None, Some(reason))
            }
            Err(e) => {
                tracing::warn!("Oracle unavailable: {}", e);
                (None, Some(e.to_string()))
            }
        };

        let analysis_cache = AnalysisCache::new(pool.clone(), config.analysis.cache_max_age());

        let orchestrator = SearchOrchestrator::new(registry, limiter)
            .with_timeout(config.search.timeout())
            .with_gate_timeout(config.search.gate_timeout())
            .with_max_results(config.search.max_results_per_source);
        let relevance = RelevanceFilter::new(oracle.clone(), config.analysis.relevance_batch_size)
            .with_cache(analysis_cache.clone());
        let search = ResearchService::new(
            orchestrator,
            relevance,
            pool.clone(),
            analysis_cache.clone(),
            config.search.clone(),
        );

        let downloads = DownloadManager::new(pool, http.clone(), &config.downloads);
        let analysis = AnalysisService::new(
            oracle,
            analysis_cache,
            downloads.clone(),
            config.analysis.max_content_length,
        );

        Ok(Self {
            config,
            http,
            search,
            downloads,
            analysis,
            oracle_status,
        })
    }

    pub fn oracle_available(&self) -> bool {
        self.oracle_status.is_none()
    }
}
