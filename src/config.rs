use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::{parse_provider_list, ProviderKind};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/catalog.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    12
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_ms() -> u64 {
    250
}
fn default_user_agent() -> String {
    format!("catalog-harvest/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Provider names in merge priority order.
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,
    /// Maximum candidates pulled from each provider.
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub enrich: bool,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_media_per_entity")]
    pub media_per_entity: usize,
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f64,
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            limit: default_limit(),
            enrich: false,
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
            media_per_entity: default_media_per_entity(),
            duplicate_threshold: default_duplicate_threshold(),
            deadline_secs: None,
        }
    }
}

fn default_providers() -> Vec<String> {
    ProviderKind::ALL.iter().map(|p| p.to_string()).collect()
}
fn default_limit() -> usize {
    500
}
fn default_concurrency() -> usize {
    6
}
fn default_batch_size() -> usize {
    100
}
fn default_media_per_entity() -> usize {
    6
}
fn default_duplicate_threshold() -> f64 {
    0.9
}

impl PipelineConfig {
    pub fn provider_kinds(&self) -> Result<Vec<ProviderKind>> {
        parse_provider_list(&self.providers.join(","))
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub wger: WgerConfig,
    #[serde(default)]
    pub exercisedb: ExerciseDbConfig,
    #[serde(default)]
    pub ninjas: NinjasConfig,
}

/// Resolve an API key given inline or through a named environment variable.
///
/// The inline value wins. An empty value counts as absent.
pub fn resolve_key(inline: Option<&str>, env_var: &str) -> Option<String> {
    inline
        .map(str::to_string)
        .or_else(|| std::env::var(env_var).ok())
        .filter(|k| !k.trim().is_empty())
}

#[derive(Debug, Deserialize, Clone)]
pub struct WgerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_wger_url")]
    pub base_url: String,
    #[serde(default = "default_wger_language")]
    pub language: u32,
    #[serde(default = "default_wger_language")]
    pub fallback_language: u32,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_wger_key_env")]
    pub api_key_env: String,
}

impl WgerConfig {
    pub fn resolved_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), &self.api_key_env)
    }
}

impl Default for WgerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_wger_url(),
            language: default_wger_language(),
            fallback_language: default_wger_language(),
            page_size: default_page_size(),
            api_key: None,
            api_key_env: default_wger_key_env(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_wger_url() -> String {
    "https://wger.de".to_string()
}
fn default_wger_key_env() -> String {
    "WGER_API_KEY".to_string()
}
fn default_wger_language() -> u32 {
    2
}
fn default_page_size() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExerciseDbConfig {
    #[serde(default = "default_exercisedb_url")]
    pub base_url: String,
    #[serde(default = "default_exercisedb_host")]
    pub host: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_exercisedb_key_env")]
    pub api_key_env: String,
}

impl ExerciseDbConfig {
    pub fn resolved_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), &self.api_key_env)
    }
}

impl Default for ExerciseDbConfig {
    fn default() -> Self {
        Self {
            base_url: default_exercisedb_url(),
            host: default_exercisedb_host(),
            page_size: default_page_size(),
            api_key: None,
            api_key_env: default_exercisedb_key_env(),
        }
    }
}

fn default_exercisedb_url() -> String {
    "https://exercisedb.p.rapidapi.com".to_string()
}
fn default_exercisedb_host() -> String {
    "exercisedb.p.rapidapi.com".to_string()
}
fn default_exercisedb_key_env() -> String {
    "EXERCISEDB_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct NinjasConfig {
    #[serde(default = "default_ninjas_url")]
    pub base_url: String,
    /// Muscle groups to page through; the API only lists by muscle.
    #[serde(default = "default_ninjas_muscles")]
    pub muscles: Vec<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_ninjas_key_env")]
    pub api_key_env: String,
}

impl NinjasConfig {
    pub fn resolved_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), &self.api_key_env)
    }
}

impl Default for NinjasConfig {
    fn default() -> Self {
        Self {
            base_url: default_ninjas_url(),
            muscles: default_ninjas_muscles(),
            api_key: None,
            api_key_env: default_ninjas_key_env(),
        }
    }
}

fn default_ninjas_url() -> String {
    "https://api.api-ninjas.com".to_string()
}
fn default_ninjas_muscles() -> Vec<String> {
    [
        "abdominals",
        "abductors",
        "adductors",
        "biceps",
        "calves",
        "chest",
        "forearms",
        "glutes",
        "hamstrings",
        "lats",
        "lower_back",
        "middle_back",
        "neck",
        "quadriceps",
        "traps",
        "triceps",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_ninjas_key_env() -> String {
    "API_NINJAS_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MediaConfig {
    #[serde(default)]
    pub youtube: YoutubeConfig,
    #[serde(default)]
    pub giphy: GiphyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct YoutubeConfig {
    #[serde(default = "default_youtube_url")]
    pub base_url: String,
    #[serde(default = "default_media_results")]
    pub max_results: usize,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_youtube_key_env")]
    pub api_key_env: String,
}

impl YoutubeConfig {
    pub fn resolved_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), &self.api_key_env)
    }
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            base_url: default_youtube_url(),
            max_results: default_media_results(),
            api_key: None,
            api_key_env: default_youtube_key_env(),
        }
    }
}

fn default_youtube_url() -> String {
    "https://www.googleapis.com".to_string()
}
fn default_media_results() -> usize {
    3
}
fn default_youtube_key_env() -> String {
    "YOUTUBE_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GiphyConfig {
    #[serde(default = "default_giphy_url")]
    pub base_url: String,
    #[serde(default = "default_media_results")]
    pub max_results: usize,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_giphy_key_env")]
    pub api_key_env: String,
}

impl GiphyConfig {
    pub fn resolved_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), &self.api_key_env)
    }
}

impl Default for GiphyConfig {
    fn default() -> Self {
        Self {
            base_url: default_giphy_url(),
            max_results: default_media_results(),
            api_key: None,
            api_key_env: default_giphy_key_env(),
        }
    }
}

fn default_giphy_url() -> String {
    "https://api.giphy.com".to_string()
}
fn default_giphy_key_env() -> String {
    "GIPHY_API_KEY".to_string()
}

/// Load and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Validate a configuration, whether loaded from disk or built in code.
pub fn validate(config: &Config) -> Result<()> {
    config.pipeline.provider_kinds()?;

    if config.pipeline.concurrency == 0 {
        bail!("pipeline.concurrency must be > 0");
    }
    if config.pipeline.batch_size == 0 {
        bail!("pipeline.batch_size must be > 0");
    }
    if !(0.0..=1.0).contains(&config.pipeline.duplicate_threshold) {
        bail!("pipeline.duplicate_threshold must be in [0.0, 1.0]");
    }
    if config.http.timeout_secs == 0 {
        bail!("http.timeout_secs must be > 0");
    }
    if config.providers.wger.page_size == 0 || config.providers.exercisedb.page_size == 0 {
        bail!("provider page_size must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(include_str!("../config/harvest.example.toml")).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.providers.ninjas.muscles.len(), 8);
        assert!(config.pipeline.deadline_secs.is_none());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.pipeline.limit, 500);
        assert_eq!(config.pipeline.batch_size, 100);
        assert_eq!(config.cache.ttl_secs, 86_400);
        assert_eq!(config.http.timeout_secs, 12);
        assert_eq!(config.providers.exercisedb.api_key_env, "EXERCISEDB_API_KEY");
    }

    #[test]
    fn test_inline_key_wins_and_blank_is_absent() {
        let config: Config = toml::from_str(
            r#"
            [providers.exercisedb]
            api_key = "abc"
            api_key_env = "HARVEST_TEST_UNSET_VAR"

            [providers.ninjas]
            api_key = "  "
            "#,
        )
        .unwrap();
        assert_eq!(config.providers.exercisedb.resolved_key().as_deref(), Some("abc"));
        assert_eq!(config.providers.ninjas.resolved_key(), None);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config: Config = toml::from_str(
            r#"
            [pipeline]
            providers = ["wger", "nope"]
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.pipeline.concurrency = 0;
        assert!(validate(&config).is_err());
    }
}
