//! Configuration management for catalog search
//!
//! Values are resolved in three layers, later layers winning:
//! 1. Defaults
//! 2. Environment variables prefixed with `CATALOG_SEARCH_`
//! 3. `catalog-search.yaml` (working directory, then `~/.config/catalog-search/`)

use crate::common::env_loader::EnvLoader;
use crate::common::RetryPolicy;
use crate::embedding::HttpEmbeddingConfig;
use crate::types::{SearchQuery, MAX_SEARCH_LIMIT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Prefix of every environment variable read by [`SearchConfig::new`]
pub const ENV_PREFIX: &str = "CATALOG_SEARCH";

/// File name searched for by [`SearchConfig::find_yaml_config_file`]
pub const CONFIG_FILE_NAME: &str = "catalog-search.yaml";

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file from disk
    #[error("Failed to read configuration file {path}: {source}")]
    FileRead {
        /// Path to the configuration file that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML content from a configuration file
    #[error("Invalid YAML syntax in {path}:\n{source}\n\nHint: Check for proper indentation and YAML formatting")]
    YamlParse {
        /// Path to the configuration file with invalid YAML content
        path: PathBuf,
        /// Underlying YAML parsing error
        #[source]
        source: serde_yaml::Error,
    },

    /// Invalid configuration value for a specific field
    #[error("Invalid configuration value for '{field}': {value}\n{hint}")]
    InvalidValue {
        /// Name of the offending field
        field: String,
        /// The rejected value
        value: String,
        /// How to fix it
        hint: String,
    },
}

impl From<ConfigError> for crate::error::SearchError {
    fn from(error: ConfigError) -> Self {
        crate::error::SearchError::Config(error.to_string())
    }
}

/// Call sites that apply their own minimum similarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityProfile {
    /// Catalog search box
    Search,
    /// "Similar products" recommendations
    Recommendation,
    /// Tool calls made on behalf of a shopping assistant
    AssistantTool,
}

/// Runtime settings for the search and sync pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Base URL of the OpenAI-compatible embeddings API
    pub embedding_base_url: String,
    /// Embedding model name
    pub embedding_model: String,
    /// Bearer token for the embeddings API
    #[serde(skip_serializing)]
    pub embedding_api_key: Option<String>,
    /// Deadline per embedding request (default: 10000)
    pub embedding_timeout_ms: u64,
    /// Immediate attempts per embedding request, capped at 3 (default: 3)
    pub embedding_max_attempts: usize,
    /// Linear backoff step between embedding attempts (default: 100)
    pub embedding_retry_step_ms: u64,
    /// Deadline per vector store call (default: 5000)
    pub vector_store_timeout_ms: u64,
    /// Deadline per cache call; expiry reads as a miss (default: 250)
    pub cache_timeout_ms: u64,
    /// Query-embedding cache lifetime (default: 3600)
    pub cache_ttl_secs: u64,
    /// Minimum similarity for catalog search (default: 0.3)
    pub search_min_similarity: f32,
    /// Minimum similarity for recommendations (default: 0.35)
    pub recommendation_min_similarity: f32,
    /// Minimum similarity for assistant tool calls (default: 0.6)
    pub assistant_min_similarity: f32,
    /// Page size used when the caller gives none (default: 10)
    pub default_search_limit: usize,
    /// Response-time samples kept per mode (default: 10000)
    pub metrics_sample_cap: usize,
    /// Lifetime of metric counters, refreshed on every increment (default: 86400)
    pub metrics_counter_ttl_secs: u64,
    /// Sliding window of the failure-rate monitor (default: 300)
    pub failure_window_secs: u64,
    /// Failure rate above which an alert fires (default: 10.0)
    pub failure_threshold_percent: f64,
    /// Minimum time between two alerts (default: 900)
    pub alert_cooldown_secs: u64,
    /// Tokens assumed per embedded query for the cost estimate (default: 10)
    pub assumed_tokens_per_query: u64,
    /// USD per embedding token for the cost estimate (default: 0.00000002)
    pub price_per_token_usd: f64,
    /// Dead-letter jobs replayed per sweep (default: 50)
    pub sweep_batch_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            embedding_base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_api_key: None,
            embedding_timeout_ms: 10_000,
            embedding_max_attempts: 3,
            embedding_retry_step_ms: 100,
            vector_store_timeout_ms: 5_000,
            cache_timeout_ms: 250,
            cache_ttl_secs: 3_600,
            search_min_similarity: 0.3,
            recommendation_min_similarity: 0.35,
            assistant_min_similarity: 0.6,
            default_search_limit: 10,
            metrics_sample_cap: 10_000,
            metrics_counter_ttl_secs: 86_400,
            failure_window_secs: 300,
            failure_threshold_percent: 10.0,
            alert_cooldown_secs: 900,
            assumed_tokens_per_query: 10,
            price_per_token_usd: 0.000_000_02,
            sweep_batch_size: 50,
        }
    }
}

impl SearchConfig {
    /// Resolve defaults, then environment variables, then the YAML file if one is found
    ///
    /// An unreadable or invalid YAML file is logged and ignored.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.apply_env_vars();

        if let Some(path) = Self::find_yaml_config_file() {
            match Self::load_from_file(&path) {
                Ok(file_config) => config = file_config.layered_over(config),
                Err(e) => tracing::warn!(
                    "Ignoring configuration file, falling back to env vars and defaults: {}",
                    e
                ),
            }
        }

        config
    }

    /// Load defaults plus environment, then a specific YAML file on top
    pub fn load_with_file(path: &Path) -> Result<Self, ConfigError> {
        let mut base = Self::default();
        base.apply_env_vars();
        let file_config = Self::load_from_file(path)?;
        let config = file_config.layered_over(base);
        config.validate()?;
        Ok(config)
    }

    fn apply_env_vars(&mut self) {
        let loader = EnvLoader::new(ENV_PREFIX);

        self.embedding_base_url = loader.load_string("EMBEDDING_BASE_URL", &self.embedding_base_url);
        self.embedding_model = loader.load_string("EMBEDDING_MODEL", &self.embedding_model);
        self.embedding_api_key = loader
            .load_optional::<String>("EMBEDDING_API_KEY")
            .or_else(|| self.embedding_api_key.take());
        self.embedding_timeout_ms =
            loader.load_parsed("EMBEDDING_TIMEOUT_MS", self.embedding_timeout_ms);
        self.embedding_max_attempts =
            loader.load_parsed("EMBEDDING_MAX_ATTEMPTS", self.embedding_max_attempts);
        self.embedding_retry_step_ms =
            loader.load_parsed("EMBEDDING_RETRY_STEP_MS", self.embedding_retry_step_ms);
        self.vector_store_timeout_ms =
            loader.load_parsed("VECTOR_STORE_TIMEOUT_MS", self.vector_store_timeout_ms);
        self.cache_timeout_ms = loader.load_parsed("CACHE_TIMEOUT_MS", self.cache_timeout_ms);
        self.cache_ttl_secs = loader.load_parsed("CACHE_TTL_SECS", self.cache_ttl_secs);
        self.search_min_similarity =
            loader.load_parsed("SEARCH_MIN_SIMILARITY", self.search_min_similarity);
        self.recommendation_min_similarity = loader.load_parsed(
            "RECOMMENDATION_MIN_SIMILARITY",
            self.recommendation_min_similarity,
        );
        self.assistant_min_similarity =
            loader.load_parsed("ASSISTANT_MIN_SIMILARITY", self.assistant_min_similarity);
        self.default_search_limit =
            loader.load_parsed("DEFAULT_SEARCH_LIMIT", self.default_search_limit);
        self.metrics_sample_cap = loader.load_parsed("METRICS_SAMPLE_CAP", self.metrics_sample_cap);
        self.metrics_counter_ttl_secs =
            loader.load_parsed("METRICS_COUNTER_TTL_SECS", self.metrics_counter_ttl_secs);
        self.failure_window_secs =
            loader.load_parsed("FAILURE_WINDOW_SECS", self.failure_window_secs);
        self.failure_threshold_percent =
            loader.load_parsed("FAILURE_THRESHOLD_PERCENT", self.failure_threshold_percent);
        self.alert_cooldown_secs =
            loader.load_parsed("ALERT_COOLDOWN_SECS", self.alert_cooldown_secs);
        self.assumed_tokens_per_query =
            loader.load_parsed("ASSUMED_TOKENS_PER_QUERY", self.assumed_tokens_per_query);
        self.price_per_token_usd =
            loader.load_parsed("PRICE_PER_TOKEN_USD", self.price_per_token_usd);
        self.sweep_batch_size = loader.load_parsed("SWEEP_BATCH_SIZE", self.sweep_batch_size);
    }

    /// Find `catalog-search.yaml` in the working directory or `~/.config/catalog-search/`
    pub fn find_yaml_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(home_dir) = dirs::home_dir() {
            search_paths.push(
                home_dir
                    .join(".config")
                    .join("catalog-search")
                    .join(CONFIG_FILE_NAME),
            );
        }

        let found = search_paths.into_iter().find(|path| path.is_file());
        match &found {
            Some(path) => tracing::debug!("Found configuration file: {:?}", path),
            None => tracing::debug!("No {} found in any search location", CONFIG_FILE_NAME),
        }
        found
    }

    fn load_from_file(path: &Path) -> Result<YamlConfig, ConfigError> {
        tracing::info!("Loading YAML configuration from: {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check every value is within its accepted range
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("search_min_similarity", self.search_min_similarity),
            ("recommendation_min_similarity", self.recommendation_min_similarity),
            ("assistant_min_similarity", self.assistant_min_similarity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, value, "similarity thresholds must be within [0, 1]"));
            }
        }

        if !(1..=MAX_SEARCH_LIMIT).contains(&self.default_search_limit) {
            return Err(invalid(
                "default_search_limit",
                self.default_search_limit,
                &format!("must be between 1 and {MAX_SEARCH_LIMIT}"),
            ));
        }

        if !(1..=crate::common::MAX_IMMEDIATE_ATTEMPTS).contains(&self.embedding_max_attempts) {
            return Err(invalid(
                "embedding_max_attempts",
                self.embedding_max_attempts,
                &format!(
                    "must be between 1 and {}",
                    crate::common::MAX_IMMEDIATE_ATTEMPTS
                ),
            ));
        }

        for (field, value) in [
            ("embedding_timeout_ms", self.embedding_timeout_ms),
            ("vector_store_timeout_ms", self.vector_store_timeout_ms),
            ("cache_timeout_ms", self.cache_timeout_ms),
            ("cache_ttl_secs", self.cache_ttl_secs),
            ("metrics_counter_ttl_secs", self.metrics_counter_ttl_secs),
            ("failure_window_secs", self.failure_window_secs),
        ] {
            if value == 0 {
                return Err(invalid(field, value, "must be greater than zero"));
            }
        }

        if self.metrics_sample_cap == 0 {
            return Err(invalid("metrics_sample_cap", 0, "must be greater than zero"));
        }
        if self.sweep_batch_size == 0 {
            return Err(invalid("sweep_batch_size", 0, "must be greater than zero"));
        }

        if !(0.0..=100.0).contains(&self.failure_threshold_percent) {
            return Err(invalid(
                "failure_threshold_percent",
                self.failure_threshold_percent,
                "must be a percentage between 0 and 100",
            ));
        }

        if !self.price_per_token_usd.is_finite() || self.price_per_token_usd < 0.0 {
            return Err(invalid(
                "price_per_token_usd",
                self.price_per_token_usd,
                "must be a non-negative number",
            ));
        }

        Ok(())
    }

    /// Minimum similarity for a call site
    pub fn min_similarity(&self, profile: SimilarityProfile) -> f32 {
        match profile {
            SimilarityProfile::Search => self.search_min_similarity,
            SimilarityProfile::Recommendation => self.recommendation_min_similarity,
            SimilarityProfile::AssistantTool => self.assistant_min_similarity,
        }
    }

    /// Query for a call site, with its threshold and the default limit
    pub fn query_for(&self, profile: SimilarityProfile, text: impl Into<String>) -> SearchQuery {
        SearchQuery::new(text)
            .with_limit(self.default_search_limit)
            .with_min_similarity(self.min_similarity(profile))
    }

    /// Embedding request deadline
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    /// Vector store call deadline
    pub fn vector_store_timeout(&self) -> Duration {
        Duration::from_millis(self.vector_store_timeout_ms)
    }

    /// Cache call deadline
    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    /// Query-embedding cache lifetime
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Metric counter lifetime
    pub fn metrics_counter_ttl(&self) -> Duration {
        Duration::from_secs(self.metrics_counter_ttl_secs)
    }

    /// Failure-rate window
    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }

    /// Minimum time between alerts
    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    /// Settings for [`crate::embedding::HttpEmbeddingClient`]
    pub fn http_embedding_config(&self) -> HttpEmbeddingConfig {
        HttpEmbeddingConfig {
            base_url: self.embedding_base_url.clone(),
            api_key: self.embedding_api_key.clone().unwrap_or_default(),
            model: self.embedding_model.clone(),
            timeout: self.embedding_timeout(),
            retry: RetryPolicy {
                max_attempts: self.embedding_max_attempts,
                backoff_step: Duration::from_millis(self.embedding_retry_step_ms),
            },
        }
    }

    /// Annotated example of a configuration file
    pub fn example_yaml_config() -> &'static str {
        r#"# catalog-search.yaml
# Every key is optional; omitted keys keep their environment or default value.

embedding_base_url: "https://api.openai.com/v1"
embedding_model: "text-embedding-3-small"
embedding_timeout_ms: 10000

# Per call-site similarity thresholds
search_min_similarity: 0.3
recommendation_min_similarity: 0.35
assistant_min_similarity: 0.6

# Failure-rate alerting
failure_window_secs: 300
failure_threshold_percent: 10.0
alert_cooldown_secs: 900
"#
    }
}

fn invalid(field: &str, value: impl ToString, hint: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        hint: hint.to_string(),
    }
}

/// Partial configuration as written in `catalog-search.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YamlConfig {
    embedding_base_url: Option<String>,
    embedding_model: Option<String>,
    embedding_api_key: Option<String>,
    embedding_timeout_ms: Option<u64>,
    embedding_max_attempts: Option<usize>,
    embedding_retry_step_ms: Option<u64>,
    vector_store_timeout_ms: Option<u64>,
    cache_timeout_ms: Option<u64>,
    cache_ttl_secs: Option<u64>,
    search_min_similarity: Option<f32>,
    recommendation_min_similarity: Option<f32>,
    assistant_min_similarity: Option<f32>,
    default_search_limit: Option<usize>,
    metrics_sample_cap: Option<usize>,
    metrics_counter_ttl_secs: Option<u64>,
    failure_window_secs: Option<u64>,
    failure_threshold_percent: Option<f64>,
    alert_cooldown_secs: Option<u64>,
    assumed_tokens_per_query: Option<u64>,
    price_per_token_usd: Option<f64>,
    sweep_batch_size: Option<usize>,
}

impl YamlConfig {
    /// Overlay the values present in the file onto `base`
    pub fn layered_over(self, mut base: SearchConfig) -> SearchConfig {
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field { base.$field = value; })*
            };
        }
        overlay!(
            embedding_base_url,
            embedding_model,
            embedding_timeout_ms,
            embedding_max_attempts,
            embedding_retry_step_ms,
            vector_store_timeout_ms,
            cache_timeout_ms,
            cache_ttl_secs,
            search_min_similarity,
            recommendation_min_similarity,
            assistant_min_similarity,
            default_search_limit,
            metrics_sample_cap,
            metrics_counter_ttl_secs,
            failure_window_secs,
            failure_threshold_percent,
            alert_cooldown_secs,
            assumed_tokens_per_query,
            price_per_token_usd,
            sweep_batch_size,
        );
        if self.embedding_api_key.is_some() {
            base.embedding_api_key = self.embedding_api_key;
        }
        base
    }
}
