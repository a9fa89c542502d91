//! Configuration loading and config file resolution
//!
//! Bootstrap configuration comes from a single TOML file. Secrets may be
//! overridden from the environment. Every section has built-in defaults, so a
//! missing file yields a usable (if unauthenticated) configuration.
//!
//! # Config file priority
//!
//! 1. Command-line argument (highest priority)
//! 2. `VCMP_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/vcmp/config.toml`, then `/etc/vcmp/config.toml`)
//! 4. Built-in defaults (no file)

use crate::track::BackendKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "VCMP_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub lavalink: LavalinkConfig,

    #[serde(default)]
    pub search: SearchConfig,

    /// Spotify credentials (optional; Spotify links cannot be resolved without them)
    #[serde(default)]
    pub spotify: Option<SpotifyConfig>,

    /// AI recommendation providers, in preference order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    #[serde(default)]
    pub recommendations: RecommendationConfig,

    #[serde(default)]
    pub autoplay: AutoplayConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Audio server (Lavalink v4) connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LavalinkConfig {
    #[serde(default = "default_lavalink_url")]
    pub url: String,

    #[serde(default = "default_lavalink_password")]
    pub password: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LavalinkConfig {
    fn default() -> Self {
        Self {
            url: default_lavalink_url(),
            password: default_lavalink_password(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Search and resolution tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Backend used for free-text queries and degraded searches
    #[serde(default = "default_backend")]
    pub default_backend: BackendKind,

    /// Maximum concurrent backend requests issued while resolving one track
    #[serde(default = "default_fanout_concurrency")]
    pub fanout_concurrency: usize,

    /// Maximum tracks imported from one playlist or album
    #[serde(default = "default_playlist_limit")]
    pub playlist_limit: usize,

    /// Upper bound on a single backend search/load
    #[serde(default = "default_request_timeout_secs")]
    pub resolution_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_backend: default_backend(),
            fanout_concurrency: default_fanout_concurrency(),
            playlist_limit: default_playlist_limit(),
            resolution_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Spotify Web API client credentials
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpotifyConfig {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,
}

/// Which wire protocol a recommendation provider speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gemini `generateContent`
    Gemini,
    /// Any OpenAI-compatible chat completions endpoint (OpenAI, Groq, OpenRouter, ...)
    OpenAi,
}

impl ProviderKind {
    /// Environment variable that overrides this provider's API key
    pub fn api_key_env_var(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "VCMP_GEMINI_API_KEY",
            ProviderKind::OpenAi => "VCMP_OPENAI_API_KEY",
        }
    }
}

/// One AI recommendation provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// Display name used in logs and health snapshots (defaults to the kind)
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub api_key: String,

    pub model: String,

    /// Endpoint override; required for OpenAI-compatible hosts other than OpenAI
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request budget per 60 second window
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl ProviderConfig {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| match self.kind {
            ProviderKind::Gemini => "gemini".to_string(),
            ProviderKind::OpenAi => "openai".to_string(),
        })
    }
}

/// Recommendation gateway resilience settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecommendationConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Consecutive failures before a provider's circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Number of recommendations requested per call
    #[serde(default = "default_recommendation_count")]
    pub count: usize,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_request_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
            count: default_recommendation_count(),
        }
    }
}

/// Autoplay continuity settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutoplayConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// History length that triggers a trim
    #[serde(default = "default_history_soft_cap")]
    pub history_soft_cap: usize,

    /// History length kept after a trim
    #[serde(default = "default_history_trim_to")]
    pub history_trim_to: usize,

    /// Generic popularity queries used by the last fallback tier
    #[serde(default = "default_generic_queries")]
    pub generic_queries: Vec<String>,
}

impl Default for AutoplayConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            history_soft_cap: default_history_soft_cap(),
            history_trim_to: default_history_trim_to(),
            generic_queries: default_generic_queries(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_lavalink_url() -> String {
    "http://127.0.0.1:2333".to_string()
}

fn default_lavalink_password() -> String {
    "youshallnotpass".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_backend() -> BackendKind {
    BackendKind::SoundCloud
}

fn default_fanout_concurrency() -> usize {
    3
}

fn default_playlist_limit() -> usize {
    250
}

fn default_requests_per_minute() -> u32 {
    10
}

fn default_cache_ttl_secs() -> u64 {
    30 * 60
}

fn default_cache_capacity() -> usize {
    100
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown_secs() -> u64 {
    5 * 60
}

fn default_recommendation_count() -> usize {
    5
}

fn default_debounce_ms() -> u64 {
    5000
}

fn default_history_soft_cap() -> usize {
    50
}

fn default_history_trim_to() -> usize {
    30
}

fn default_generic_queries() -> Vec<String> {
    [
        "top hits this week",
        "popular songs",
        "trending music",
        "global top 50",
        "viral hits",
    ]
    .iter()
    .map(|q| q.to_string())
    .collect()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Read configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Resolve, read, override from environment and validate
    ///
    /// Falls back to built-in defaults when no config file can be found.
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_arg, CONFIG_ENV_VAR)? {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                info!("No configuration file found, using built-in defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply secret overrides from environment variables
    ///
    /// Environment wins over TOML. A warning is logged when both are set.
    /// Provider keys (`VCMP_GEMINI_API_KEY`, `VCMP_OPENAI_API_KEY`) apply
    /// only to providers without a `base_url` override.
    pub fn apply_env_overrides(&mut self) {
        if let Some(password) = env_secret("VCMP_LAVALINK_PASSWORD") {
            self.lavalink.password = password;
        }

        let spotify_id = env_secret("VCMP_SPOTIFY_CLIENT_ID");
        let spotify_secret = env_secret("VCMP_SPOTIFY_CLIENT_SECRET");
        if spotify_id.is_some() || spotify_secret.is_some() {
            let spotify = self.spotify.get_or_insert_with(SpotifyConfig::default);
            if let Some(id) = spotify_id {
                override_secret(&mut spotify.client_id, id, "VCMP_SPOTIFY_CLIENT_ID");
            }
            if let Some(secret) = spotify_secret {
                override_secret(&mut spotify.client_secret, secret, "VCMP_SPOTIFY_CLIENT_SECRET");
            }
        }

        // Kind-wide keys only reach the vendor's own endpoint
        for provider in self.providers.iter_mut().filter(|p| p.base_url.is_none()) {
            let var = provider.kind.api_key_env_var();
            if let Some(key) = env_secret(var) {
                override_secret(&mut provider.api_key, key, var);
            }
        }
    }

    /// Reject configuration that cannot work at runtime
    pub fn validate(&self) -> Result<()> {
        if self.lavalink.url.trim().is_empty() {
            return Err(Error::Config("lavalink.url must not be empty".to_string()));
        }
        if self.lavalink.request_timeout_secs == 0 || self.search.resolution_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be greater than zero".to_string()));
        }
        if self.search.default_backend.search_prefix().is_none() {
            return Err(Error::Config(
                "search.default_backend must be a searchable backend".to_string(),
            ));
        }
        if self.search.fanout_concurrency == 0 {
            return Err(Error::Config(
                "search.fanout_concurrency must be at least 1".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            let name = provider.display_name();
            if !names.insert(name.clone()) {
                return Err(Error::Config(format!(
                    "Provider name '{}' is used more than once; set a distinct `name`",
                    name
                )));
            }
            if !is_valid_key(&provider.api_key) {
                return Err(Error::Config(format!(
                    "Provider '{}' has no API key. Set it in the TOML file or via {}",
                    name,
                    provider.kind.api_key_env_var()
                )));
            }
            if provider.model.trim().is_empty() {
                return Err(Error::Config(format!("Provider '{}' has no model", name)));
            }
            if provider.requests_per_minute == 0 {
                return Err(Error::Config(format!(
                    "Provider '{}' requests_per_minute must be at least 1",
                    name
                )));
            }
        }

        let recs = &self.recommendations;
        if recs.failure_threshold == 0 || recs.cache_capacity == 0 || recs.count == 0 {
            return Err(Error::Config(
                "recommendations.failure_threshold, cache_capacity and count must be at least 1"
                    .to_string(),
            ));
        }

        let autoplay = &self.autoplay;
        if autoplay.history_trim_to == 0 || autoplay.history_trim_to > autoplay.history_soft_cap {
            return Err(Error::Config(
                "autoplay.history_trim_to must be between 1 and history_soft_cap".to_string(),
            ));
        }

        Ok(())
    }

    /// Spotify credentials, if both halves are present
    pub fn spotify_credentials(&self) -> Option<&SpotifyConfig> {
        self.spotify
            .as_ref()
            .filter(|s| is_valid_key(&s.client_id) && is_valid_key(&s.client_secret))
    }
}

/// Validate secret (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

fn env_secret(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| is_valid_key(v))
}

fn override_secret(slot: &mut String, value: String, var: &str) {
    if is_valid_key(slot) {
        warn!("{} set in both TOML and environment. Using environment.", var);
    }
    *slot = value;
}

/// Config file resolution
///
/// Returns `Ok(None)` when no file exists and defaults should be used. An
/// explicitly requested file (CLI or environment) that does not exist is an
/// error rather than a silent fallback.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return require_existing(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return require_existing(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config locations
    Ok(default_config_locations().into_iter().find(|p| p.exists()))
}

fn require_existing(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.exists() {
        Ok(Some(path))
    } else {
        Err(Error::Config(format!("Config file not found: {}", path.display())))
    }
}

fn default_config_locations() -> Vec<PathBuf> {
    let mut locations: Vec<PathBuf> = dirs::config_dir()
        .map(|d| d.join("vcmp").join("config.toml"))
        .into_iter()
        .collect();

    if cfg!(target_os = "linux") {
        locations.push(PathBuf::from("/etc/vcmp/config.toml"));
    }

    locations
}
