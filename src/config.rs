//! Pipeline configuration model, defaults, and loading.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

/// Value shipped in the bootstrapped config; the collector refuses to run with it.
pub const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY";
/// Environment variable that overrides `api.api_key`.
pub const API_KEY_ENV_VAR: &str = "BRICKSET_API_KEY";
/// Largest page the `getSets` endpoint serves.
pub const MAX_PAGE_SIZE: u32 = 500;

const CONFIG_DIR_NAME: &str = "figvault";
const CONFIG_FILE_NAME: &str = "config.toml";
const MAX_FETCH_ATTEMPTS: u32 = 20;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Catalog API endpoint and credential.
    pub api: ApiConfig,
    #[serde(default)]
    /// Which themes to page through and where to write them.
    pub collector: CollectorConfig,
    #[serde(default)]
    /// Detail page request headers and retry tuning.
    pub fetch: FetchConfig,
    #[serde(default)]
    /// Enrichment input/output paths, cache and pacing.
    pub enricher: EnricherConfig,
    /// API theme -> app series renames. Unlisted themes pass through.
    #[serde(default = "default_series_renames")]
    pub series: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default)]
    pub user_hash: String,
    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CollectorConfig {
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_catalog_path")]
    pub output_path: String,
}

/// Settings for the detail page fetcher.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Rate-limit backoff is `base * 2^(attempt + 2)`, capped.
    #[serde(default = "default_rate_limit_base_secs")]
    pub rate_limit_base_secs: u64,
    #[serde(default = "default_rate_limit_cap_secs")]
    pub rate_limit_cap_secs: u64,
    /// Transport backoff is `step * attempt`, capped.
    #[serde(default = "default_transport_step_secs")]
    pub transport_step_secs: u64,
    #[serde(default = "default_transport_cap_secs")]
    pub transport_cap_secs: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct EnricherConfig {
    #[serde(default = "default_catalog_path")]
    pub input_path: String,
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
    #[serde(default = "default_enriched_path")]
    pub output_path: String,
    /// Prefix for root-relative image URLs found on detail pages.
    #[serde(default = "default_site_base_url")]
    pub site_base_url: String,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
    #[serde(default)]
    pub failed_items: FailedItemPolicy,
}

/// What to do with a set whose detail page could not be fetched.
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailedItemPolicy {
    /// Cache the empty result; later runs never retry the set.
    #[default]
    CacheEmpty,
    /// Leave the set out of the cache so the next run fetches it again.
    RetryNextRun,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to write default config {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to serialize default config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            collector: CollectorConfig::default(),
            fetch: FetchConfig::default(),
            enricher: EnricherConfig::default(),
            series: default_series_renames(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            api_key: default_api_key(),
            user_hash: String::new(),
            timeout_secs: default_api_timeout_secs(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            page_size: default_page_size(),
            page_delay_ms: default_page_delay_ms(),
            output_path: default_catalog_path(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            timeout_secs: default_fetch_timeout_secs(),
            max_attempts: default_max_attempts(),
            rate_limit_base_secs: default_rate_limit_base_secs(),
            rate_limit_cap_secs: default_rate_limit_cap_secs(),
            transport_step_secs: default_transport_step_secs(),
            transport_cap_secs: default_transport_cap_secs(),
        }
    }
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            input_path: default_catalog_path(),
            cache_path: default_cache_path(),
            output_path: default_enriched_path(),
            site_base_url: default_site_base_url(),
            base_delay_ms: default_base_delay_ms(),
            progress_every: default_progress_every(),
            failed_items: FailedItemPolicy::default(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://brickset.com/api/v3.asmx".to_string()
}

fn default_api_key() -> String {
    PLACEHOLDER_API_KEY.to_string()
}

fn default_api_timeout_secs() -> u64 {
    30
}

fn default_categories() -> Vec<String> {
    vec!["BrickHeadz".to_string(), "Marvel Super Heroes".to_string()]
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_page_delay_ms() -> u64 {
    300
}

fn default_catalog_path() -> String {
    "sets_raw.json".to_string()
}

fn default_cache_path() -> String {
    "minifigs_cache.json".to_string()
}

fn default_enriched_path() -> String {
    "sets_full.json".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (LEGO-Hold personal app)".to_string()
}

fn default_accept_language() -> String {
    "en-US,en;q=0.9,ru;q=0.8".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    40
}

fn default_max_attempts() -> u32 {
    6
}

fn default_rate_limit_base_secs() -> u64 {
    2
}

fn default_rate_limit_cap_secs() -> u64 {
    180
}

fn default_transport_step_secs() -> u64 {
    3
}

fn default_transport_cap_secs() -> u64 {
    60
}

fn default_site_base_url() -> String {
    "https://brickset.com".to_string()
}

fn default_base_delay_ms() -> u64 {
    1200
}

fn default_progress_every() -> usize {
    25
}

fn default_series_renames() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("BrickHeadz".to_string(), "BrickHeadz".to_string()),
        ("Marvel Super Heroes".to_string(), "Marvel".to_string()),
    ])
}

/// `<config dir>/figvault/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Loads the config from `explicit_path`, or from the default location.
///
/// A missing default config is created with default values. A missing explicit
/// path is an error.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match explicit_path {
        Some(path) => path.to_path_buf(),
        None => {
            let Some(path) = default_config_path() else {
                warn!("No user config directory available; using built-in defaults");
                return Ok(finalize(Config::default()));
            };
            ensure_config_file(&path)?;
            path
        }
    };

    read_config_file(&path)
}

fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(finalize(config))
}

/// Bootstraps `path` with the default config unless a file is already there.
fn ensure_config_file(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Ok(());
    }
    write_default_config(path)
}

pub fn parse_config(contents: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(contents)
}

fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    info!(
        "Config file not found. Creating default config. path={}",
        path.display()
    );
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let serialized = toml::to_string(&Config::default())?;
    fs::write(path, serialized).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn finalize(config: Config) -> Config {
    let env_key = std::env::var(API_KEY_ENV_VAR).ok();
    apply_api_key_override(sanitize_config(config), env_key)
}

/// Replaces the configured API key with a non-blank environment value.
pub fn apply_api_key_override(mut config: Config, env_key: Option<String>) -> Config {
    if let Some(key) = env_key.map(|key| key.trim().to_string()) {
        if !key.is_empty() {
            config.api.api_key = key;
        }
    }
    config
}

/// Clamps numeric settings into ranges the pipeline can work with.
pub fn sanitize_config(config: Config) -> Config {
    let Config {
        api,
        collector,
        fetch,
        enricher,
        series,
    } = config;

    let rate_limit_base_secs = fetch.rate_limit_base_secs.max(1);
    let transport_step_secs = fetch.transport_step_secs.max(1);

    Config {
        api: ApiConfig {
            api_key: api.api_key.trim().to_string(),
            timeout_secs: api.timeout_secs.max(1),
            ..api
        },
        collector: CollectorConfig {
            page_size: collector.page_size.clamp(1, MAX_PAGE_SIZE),
            ..collector
        },
        fetch: FetchConfig {
            timeout_secs: fetch.timeout_secs.max(1),
            max_attempts: fetch.max_attempts.clamp(1, MAX_FETCH_ATTEMPTS),
            rate_limit_base_secs,
            rate_limit_cap_secs: fetch.rate_limit_cap_secs.max(rate_limit_base_secs),
            transport_step_secs,
            transport_cap_secs: fetch.transport_cap_secs.max(transport_step_secs),
            ..fetch
        },
        enricher: EnricherConfig {
            progress_every: enricher.progress_every.max(1),
            ..enricher
        },
        series,
    }
}
