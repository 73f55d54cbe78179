use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "PROPSEARCH_CONFIG";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a single-line summary of all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub weather: WeatherConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

/// Deployment environment; controls how much error detail reaches clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            environment: Environment::Development,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database holding the property master records
    pub database_path: PathBuf,

    /// JSON array of property records imported when the store is empty
    pub seed_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_data_dir().join("properties.db"),
            seed_path: None,
        }
    }
}

/// Which key-value cache implementation backs the weather cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Database file for the sqlite backend
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,

    /// Property snapshot lifetime in seconds
    #[serde(default = "default_property_ttl")]
    pub property_ttl_secs: u64,

    /// Weather record lifetime in seconds
    #[serde(default = "default_weather_ttl")]
    pub weather_ttl_secs: u64,
}

fn default_cache_path() -> PathBuf {
    default_data_dir().join("cache.db")
}

fn default_property_ttl() -> u64 {
    3600
}

fn default_weather_ttl() -> u64 {
    1800
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            path: default_cache_path(),
            property_ttl_secs: default_property_ttl(),
            weather_ttl_secs: default_weather_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn property_ttl(&self) -> Duration {
        Duration::from_secs(self.property_ttl_secs)
    }

    pub fn weather_ttl(&self) -> Duration {
        Duration::from_secs(self.weather_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Base URL of the Open-Meteo compatible API
    pub api_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Concurrent requests per batch
    pub batch_size: usize,

    /// Pause between batches in milliseconds
    pub batch_delay_ms: u64,

    /// Retries for transient provider failures
    pub max_retries: u32,

    /// Background refresh interval in minutes (0 disables)
    pub refresh_minutes: u32,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.open-meteo.com".to_string(),
            timeout_secs: 5,
            batch_size: 10,
            batch_delay_ms: 100,
            max_retries: 1,
            refresh_minutes: 0,
        }
    }
}

impl WeatherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("propsearch")
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, writing defaults if absent
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.server.port == 0 {
            result.add_error("server.port", "Port cannot be 0");
        }
        if self.server.host.trim().is_empty() {
            result.add_error("server.host", "Host cannot be empty");
        }

        self.validate_url(&self.weather.api_url, "weather.api_url", &mut result);

        if self.weather.timeout_secs == 0 {
            result.add_error("weather.timeout_secs", "Timeout must be greater than 0");
        } else if self.weather.timeout_secs > 30 {
            result.add_warning(
                "weather.timeout_secs",
                "Timeout above 30 seconds will stall searches on a slow provider",
            );
        }

        if self.weather.batch_size == 0 {
            result.add_error("weather.batch_size", "Batch size must be greater than 0");
        }

        if self.weather.refresh_minutes == 0 {
            result.add_warning(
                "weather.refresh_minutes",
                "Background weather refresh disabled (0 minutes)",
            );
        }

        for (field, ttl) in [
            ("cache.property_ttl_secs", self.cache.property_ttl_secs),
            ("cache.weather_ttl_secs", self.cache.weather_ttl_secs),
        ] {
            if ttl == 0 {
                result.add_error(field, "TTL must be greater than 0");
            } else if ttl > 86_400 {
                result.add_warning(field, "TTL is more than 24 hours");
            }
        }

        if self.search.default_limit == 0 {
            result.add_error("search.default_limit", "Default limit must be greater than 0");
        }
        if self.search.max_limit < self.search.default_limit {
            result.add_error(
                "search.max_limit",
                "Max limit must be at least the default limit",
            );
        }

        if let Some(seed) = &self.store.seed_path {
            if !seed.exists() {
                result.add_warning(
                    "store.seed_path",
                    format!("Seed file does not exist: {}", seed.display()),
                );
            }
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// `$PROPSEARCH_CONFIG`, else `<config dir>/propsearch/config.toml`
    fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("propsearch");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_default_ttls() {
        let config = Config::default();
        assert_eq!(config.cache.property_ttl(), Duration::from_secs(3600));
        assert_eq!(config.cache.weather_ttl(), Duration::from_secs(1800));
        assert_eq!(config.weather.timeout(), Duration::from_secs(5));
        assert_eq!(config.weather.batch_size, 10);
    }

    #[test]
    fn test_invalid_api_url_scheme() {
        let mut config = Config::default();
        config.weather.api_url = "ftp://example.com".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_zero_batch_size_is_error() {
        let mut config = Config::default();
        config.weather.batch_size = 0;
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "weather.batch_size"));
    }

    #[test]
    fn test_zero_ttl_is_error() {
        let mut config = Config::default();
        config.cache.weather_ttl_secs = 0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "cache.weather_ttl_secs"));
    }

    #[test]
    fn test_disabled_refresh_is_warning() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "weather.refresh_minutes"));
    }

    #[test]
    fn test_load_from_writes_defaults_then_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let written = Config::load_from(&path).unwrap();
        assert!(path.exists());

        let read = Config::load_from(&path).unwrap();
        assert_eq!(read.server.port, written.server.port);
        assert_eq!(read.cache.backend, CacheBackend::Memory);
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[server]\nhost = \"0.0.0.0\"\nport = 8080\nenvironment = \"production\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Production);
        assert_eq!(config.search.default_limit, 20);
        assert_eq!(config.cache.weather_ttl_secs, 1800);
    }

    #[test]
    fn test_partial_weather_section_keeps_other_defaults() {
        let config: Config =
            toml::from_str("[weather]\nrefresh_minutes = 15\n\n[search]\nmax_limit = 50\n").unwrap();

        assert_eq!(config.weather.refresh_minutes, 15);
        assert_eq!(config.weather.api_url, "https://api.open-meteo.com");
        assert_eq!(config.weather.timeout_secs, 5);
        assert_eq!(config.weather.batch_size, 10);
        assert_eq!(config.weather.batch_delay_ms, 100);
        assert_eq!(config.weather.max_retries, 1);
        assert_eq!(config.search.max_limit, 50);
        assert_eq!(config.search.default_limit, 20);
        assert!(config.validate().is_valid());
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
