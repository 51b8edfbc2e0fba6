use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::logging::LogConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub search: SearchConfig,
    pub generative: GenerativeConfig,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitConfig,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub connection_pool_size: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Retry with the brand alone when brand+model matches nothing.
    pub relax_model_on_empty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerativeConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub max_grounding_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub enable_response_cache: bool,
    pub max_entries: u64,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: usize,
    pub window_seconds: u64,
    pub block_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("car-search-ai");

        Self {
            database: DatabaseConfig {
                path: data_dir.join("catalog.db"),
                connection_pool_size: 15,
                timeout_seconds: 30,
            },
            search: SearchConfig {
                default_page_size: 10,
                max_page_size: 50,
                relax_model_on_empty: true,
            },
            generative: GenerativeConfig {
                timeout_ms: 8_000,
                max_retries: 1,
                max_grounding_rows: 5,
            },
            cache: CacheSettings {
                enable_response_cache: true,
                max_entries: 1_000,
                ttl_seconds: 300,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                max_requests: 30,
                window_seconds: 60,
                block_seconds: 300,
            },
            logging: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from the config file, creating it with defaults on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path();
        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)?;
            let config: AppConfig = toml::from_str(&contents).map_err(|e| {
                AppError::Configuration(format!("failed to parse {}: {e}", config_path.display()))
            })?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            default_config.save()?;
            Ok(default_config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path();
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| AppError::Configuration(format!("failed to serialize config: {e}")))?;
        fs::write(&config_path, contents)?;
        Ok(())
    }

    pub fn config_file_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("car-search-ai")
            .join("config.toml")
    }

    /// Validate values and create the directories the services need.
    pub fn validate_and_setup(&self) -> Result<()> {
        if let Some(parent) = self.database.path.parent() {
            fs::create_dir_all(parent)?;
        }

        if self.database.connection_pool_size == 0 {
            return Err(AppError::Configuration(
                "database.connection_pool_size must be greater than 0".to_string(),
            ));
        }
        if self.search.default_page_size == 0 {
            return Err(AppError::Configuration(
                "search.default_page_size must be greater than 0".to_string(),
            ));
        }
        if self.search.default_page_size > self.search.max_page_size {
            return Err(AppError::Configuration(
                "search.default_page_size must not exceed search.max_page_size".to_string(),
            ));
        }
        if self.generative.timeout_ms == 0 {
            return Err(AppError::Configuration(
                "generative.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.rate_limit.enabled && self.rate_limit.max_requests == 0 {
            return Err(AppError::Configuration(
                "rate_limit.max_requests must be greater than 0 when enabled".to_string(),
            ));
        }
        Ok(())
    }

    pub fn generative_timeout(&self) -> Duration {
        Duration::from_millis(self.generative.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.database.connection_pool_size, 15);
        assert_eq!(config.search.default_page_size, 10);
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn toml_round_trip_preserves_values() {
        let config = AppConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(
            config.generative.timeout_ms,
            deserialized.generative.timeout_ms
        );
        assert_eq!(config.cache.ttl_seconds, deserialized.cache.ttl_seconds);
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let mut config = AppConfig::default();
        config.database.path = std::env::temp_dir().join("car-search-ai-test.db");
        config.database.connection_pool_size = 0;
        assert!(config.validate_and_setup().is_err());
    }

    #[test]
    fn page_size_must_fit_under_maximum() {
        let mut config = AppConfig::default();
        config.database.path = std::env::temp_dir().join("car-search-ai-test.db");
        config.search.default_page_size = 100;
        config.search.max_page_size = 50;
        assert!(config.validate_and_setup().is_err());
    }
}
