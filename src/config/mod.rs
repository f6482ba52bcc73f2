//! Configuration management.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then environment variables prefixed with `RESEARCH_AGGREGATOR` (nested keys
//! separated by `__`, e.g. `RESEARCH_AGGREGATOR_SEARCH__TIMEOUT_SECONDS=20`).
//!
//! ```toml
//! [search]
//! default_sources = ["duckduckgo", "arxiv"]
//! timeout_seconds = 30
//!
//! [rate_limits.arxiv]
//! capacity = 5
//! refill_rate = 0.33
//!
//! [downloads]
//! directory = "./data/downloads"
//! max_concurrent = 3
//! mirrors = ["https://arxiv.org/pdf/", "https://export.arxiv.org/pdf/"]
//!
//! [analysis]
//! provider = "deepseek"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "RESEARCH_AGGREGATOR";

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub search: SearchConfig,

    /// Token bucket parameters per source name
    #[serde(default = "default_rate_limits")]
    pub rate_limits: HashMap<String, BucketConfig>,

    #[serde(default)]
    pub downloads: DownloadConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            http: HttpConfig::default(),
            search: SearchConfig::default(),
            rate_limits: default_rate_limits(),
            downloads: DownloadConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Config {
    /// Render as TOML with the API key masked
    pub fn to_toml_redacted(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        if shown.analysis.api_key.is_some() {
            shown.analysis.api_key = Some("***".to_string());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (source, bucket) in &self.rate_limits {
            if bucket.capacity == 0 {
                return Err(ConfigError::Invalid(format!(
                    "rate limit capacity for '{}' must be at least 1",
                    source
                )));
            }
            if !(bucket.refill_rate.is_finite() && bucket.refill_rate > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "rate limit refill_rate for '{}' must be a positive number",
                    source
                )));
            }
        }
        if self.downloads.mirrors.is_empty() {
            return Err(ConfigError::Invalid(
                "downloads.mirrors must list at least one mirror".to_string(),
            ));
        }
        if self.downloads.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "downloads.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.search.max_concurrent_searches == 0 {
            return Err(ConfigError::Invalid(
                "search.max_concurrent_searches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Persisted store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Shared HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Proxy URL applied to every outbound request
    #[serde(default = "default_proxy")]
    pub proxy: Option<String>,

    /// Default request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            proxy: default_proxy(),
            timeout_seconds: default_http_timeout(),
        }
    }
}

/// Search fan-out settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Sources used when a request names none
    #[serde(default = "default_sources")]
    pub default_sources: Vec<String>,

    #[serde(default = "default_max_results")]
    pub max_results_per_source: usize,

    /// Overall fan-out deadline
    #[serde(default = "default_search_timeout")]
    pub timeout_seconds: u64,

    /// How long a source task waits on its rate limiter
    #[serde(default = "default_gate_timeout")]
    pub gate_timeout_seconds: u64,

    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,

    /// Ceiling on fan-outs running at the same time
    #[serde(default = "default_max_concurrent_searches")]
    pub max_concurrent_searches: usize,

    /// Whether relevance filtering runs when a request does not say
    #[serde(default = "default_true")]
    pub semantic_filter: bool,

    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: u8,
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn gate_timeout(&self) -> Duration {
        Duration::from_secs(self.gate_timeout_seconds)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours * 3600)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_sources: default_sources(),
            max_results_per_source: default_max_results(),
            timeout_seconds: default_search_timeout(),
            gate_timeout_seconds: default_gate_timeout(),
            cache_ttl_hours: default_cache_ttl_hours(),
            max_concurrent_searches: default_max_concurrent_searches(),
            semantic_filter: true,
            relevance_threshold: default_relevance_threshold(),
        }
    }
}

/// Token bucket parameters for one source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Burst size
    pub capacity: u32,

    /// Tokens added per second
    pub refill_rate: f64,
}

impl BucketConfig {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
        }
    }
}

/// Background download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory holding published artifacts
    #[serde(default = "default_download_dir")]
    pub directory: PathBuf,

    /// Worker pool size (simultaneous transfers)
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent: usize,

    /// Mirror base URLs; the artifact URL is `<mirror><id>.pdf`
    #[serde(default = "default_mirrors")]
    pub mirrors: Vec<String>,

    /// Known-good artifact id used by the mirror health probe
    #[serde(default = "default_probe_id")]
    pub probe_id: String,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,

    /// How long the fastest mirror is trusted before re-probing
    #[serde(default = "default_mirror_cache")]
    pub mirror_cache_seconds: u64,

    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_seconds: u64,

    /// Smallest file accepted as a valid artifact
    #[serde(default = "default_min_file_size")]
    pub min_file_size: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: default_download_dir(),
            max_concurrent: default_max_concurrent_downloads(),
            mirrors: default_mirrors(),
            probe_id: default_probe_id(),
            probe_timeout_seconds: default_probe_timeout(),
            mirror_cache_seconds: default_mirror_cache(),
            transfer_timeout_seconds: default_transfer_timeout(),
            min_file_size: default_min_file_size(),
        }
    }
}

/// Oracle (LLM) settings for relevance scoring and analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// `deepseek` or `zhipu`
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key; falls back to the provider's environment variable
    #[serde(default)]
    pub api_key: Option<String>,

    /// Override of the provider's chat-completions base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Override of the provider's default model
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    #[serde(default = "default_cache_max_age_days")]
    pub cache_max_age_days: u64,

    /// Candidates per relevance-scoring call
    #[serde(default = "default_batch_size")]
    pub relevance_batch_size: usize,
}

impl AnalysisConfig {
    /// Resolve the API key from config or the provider's environment variable
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                let var = match self.provider.as_str() {
                    "zhipu" => "ZHIPU_API_KEY",
                    _ => "DEEPSEEK_API_KEY",
                };
                std::env::var(var).ok().filter(|k| !k.trim().is_empty())
            })
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_days * 24 * 3600)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            base_url: None,
            model: None,
            temperature: default_temperature(),
            max_content_length: default_max_content_length(),
            cache_max_age_days: default_cache_max_age_days(),
            relevance_batch_size: default_batch_size(),
        }
    }
}

/// Base directory for the database and downloads
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("research-aggregator"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("research.db")
}

fn default_download_dir() -> PathBuf {
    default_data_dir().join("downloads")
}

fn default_proxy() -> Option<String> {
    std::env::var("HTTPS_PROXY")
        .or_else(|_| std::env::var("HTTP_PROXY"))
        .ok()
        .filter(|p| !p.is_empty())
}

fn default_http_timeout() -> u64 {
    30
}

fn default_sources() -> Vec<String> {
    vec!["duckduckgo".to_string(), "arxiv".to_string()]
}

fn default_max_results() -> usize {
    15
}

fn default_search_timeout() -> u64 {
    30
}

fn default_gate_timeout() -> u64 {
    10
}

fn default_cache_ttl_hours() -> u64 {
    24
}

fn default_max_concurrent_searches() -> usize {
    8
}

fn default_true() -> bool {
    true
}

fn default_relevance_threshold() -> u8 {
    40
}

/// Per-source token buckets used when the configuration names none
pub fn default_rate_limits() -> HashMap<String, BucketConfig> {
    HashMap::from([
        ("arxiv".to_string(), BucketConfig::new(5, 0.33)),
        ("zhihu".to_string(), BucketConfig::new(3, 0.2)),
        ("scholar".to_string(), BucketConfig::new(10, 1.0)),
        ("duckduckgo".to_string(), BucketConfig::new(20, 2.0)),
    ])
}

fn default_max_concurrent_downloads() -> usize {
    3
}

fn default_mirrors() -> Vec<String> {
    vec![
        "https://arxiv.org/pdf/".to_string(),
        "https://export.arxiv.org/pdf/".to_string(),
        "https://cn.arxiv.org/pdf/".to_string(),
    ]
}

fn default_probe_id() -> String {
    "1706.03762".to_string()
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_mirror_cache() -> u64 {
    300
}

fn default_transfer_timeout() -> u64 {
    300
}

fn default_min_file_size() -> u64 {
    1024
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_content_length() -> usize {
    4000
}

fn default_cache_max_age_days() -> u64 {
    7
}

fn default_batch_size() -> usize {
    10
}

/// Per-user configuration file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("research-aggregator").join("config.toml"))
}

/// Look for a configuration file in the usual places
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("research-aggregator.toml");
    if local.is_file() {
        return Some(local);
    }

    default_config_path().filter(|p| p.is_file())
}

/// Load configuration from an optional file plus environment overrides
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }

    let settings = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let config: Config = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
