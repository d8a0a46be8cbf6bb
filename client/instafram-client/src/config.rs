//! Client configuration
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API connection
    pub api: ApiConfig,

    /// Query cache tuning
    pub cache: CacheSettings,

    /// Where the session tokens live; `None` keeps them in memory
    pub token_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST backend, without trailing slash
    pub base_url: String,
    /// Sent as `x-api-key` when set
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub page_size: usize,
    pub stale_page_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:8000/api".to_string(),
                api_key: None,
                timeout_secs: 30,
            },
            cache: CacheSettings {
                page_size: instafram_common::PAGE_SIZE,
                stale_page_limit: 3,
            },
            token_path: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the environment, reading `.env` first
    pub fn from_env() -> ConfigResult<Self> {
        if let Err(e) = dotenvy::dotenv() {
            debug!(error = %e, "No .env file loaded");
        }
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let base_url = lookup("INSTAFRAM_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api.base_url);
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                name: "INSTAFRAM_API_URL",
                reason: format!("expected an http(s) URL, got {}", base_url),
            });
        }

        let api_key = lookup("INSTAFRAM_API_KEY").filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("INSTAFRAM_API_KEY not set, requests go out without x-api-key");
        }

        let timeout_secs =
            parse_var(&lookup, "INSTAFRAM_REQUEST_TIMEOUT_SECS", defaults.api.timeout_secs)?;
        let page_size = parse_var(&lookup, "INSTAFRAM_PAGE_SIZE", defaults.cache.page_size)?;
        let stale_page_limit =
            parse_var(&lookup, "INSTAFRAM_STALE_PAGE_LIMIT", defaults.cache.stale_page_limit)?;

        if page_size == 0 {
            return Err(ConfigError::Invalid {
                name: "INSTAFRAM_PAGE_SIZE",
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            api: ApiConfig {
                base_url,
                api_key,
                timeout_secs,
            },
            cache: CacheSettings {
                page_size,
                stale_page_limit,
            },
            token_path: lookup("INSTAFRAM_TOKEN_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn cache_config(&self) -> query_cache::CacheConfig {
        query_cache::CacheConfig {
            page_size: self.cache.page_size,
            stale_page_limit: self.cache.stale_page_limit,
            ..query_cache::CacheConfig::default()
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> ConfigResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    // Lookups go through a map; env::set_var is not thread-safe when tests
    // run in parallel.
    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.api.base_url, "http://localhost:8000/api");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.cache.page_size, 10);
        assert_eq!(config.cache.stale_page_limit, 3);
        assert!(config.api.api_key.is_none());
        assert!(config.token_path.is_none());
    }

    #[test]
    fn test_config_from_vars() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("INSTAFRAM_API_URL", "https://api.instafram.test/"),
            ("INSTAFRAM_API_KEY", "key-123"),
            ("INSTAFRAM_REQUEST_TIMEOUT_SECS", "5"),
            ("INSTAFRAM_STALE_PAGE_LIMIT", "2"),
            ("INSTAFRAM_TOKEN_PATH", "/tmp/instafram/session.json"),
        ]))
        .unwrap();

        assert_eq!(config.api.base_url, "https://api.instafram.test");
        assert_eq!(config.api.api_key.as_deref(), Some("key-123"));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.cache_config().stale_page_limit, 2);
        assert_eq!(
            config.token_path,
            Some(PathBuf::from("/tmp/instafram/session.json"))
        );
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[("INSTAFRAM_PAGE_SIZE", "ten")])).unwrap_err();
        assert!(err.to_string().contains("INSTAFRAM_PAGE_SIZE"));

        let err = ClientConfig::from_lookup(lookup(&[("INSTAFRAM_PAGE_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "INSTAFRAM_PAGE_SIZE", .. }));
    }

    #[test]
    fn test_non_http_url_is_rejected() {
        assert!(ClientConfig::from_lookup(lookup(&[("INSTAFRAM_API_URL", "ftp://x")])).is_err());
    }
}
