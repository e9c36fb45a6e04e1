//! Configuration loading for the shelf client.
//!
//! `api_base_url` and `credentials_path` are required; everything else has a
//! default.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    #[serde(default = "default_renewal_path")]
    pub renewal_path: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    pub credentials_path: PathBuf,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryConfig {
    /// A resync within this window is served from memory unless forced.
    #[serde(default = "default_library_freshness")]
    pub freshness_secs: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            freshness_secs: default_library_freshness(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(default = "default_entity_ttl")]
    pub entity_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            entity_ttl_secs: default_entity_ttl(),
        }
    }
}

fn default_renewal_path() -> String {
    "/auth/refresh".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_library_freshness() -> u64 {
    crate::library::LIBRARY_FRESHNESS.as_secs()
}

fn default_entity_ttl() -> u64 {
    300
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    /// Config with defaults for everything but the two required fields.
    pub fn new(api_base_url: impl Into<String>, credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            renewal_path: default_renewal_path(),
            request_timeout_ms: default_request_timeout_ms(),
            credentials_path: credentials_path.into(),
            library: LibraryConfig::default(),
            cache: CacheSettings::default(),
        }
    }

    /// Read and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::from_path(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if !self.renewal_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "renewal_path",
                reason: "must start with '/'".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.credentials_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "credentials_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.cache.entity_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.entity_ttl_secs",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn library_freshness(&self) -> Duration {
        Duration::from_secs(self.library.freshness_secs)
    }

    pub fn entity_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.entity_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        api_base_url = "https://shelf.example.com"
        credentials_path = "/tmp/shelf/credentials.json"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ClientConfig::from_toml(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.renewal_path, "/auth/refresh");
        assert_eq!(config.library_freshness(), Duration::from_secs(300));
        assert_eq!(config.entity_ttl(), Duration::from_secs(300));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_full_config() {
        let config = ClientConfig::from_toml(
            r#"
            api_base_url = "http://localhost:8080"
            renewal_path = "/api/v1/auth/renew"
            request_timeout_ms = 2500
            credentials_path = "creds.json"

            [library]
            freshness_secs = 60

            [cache]
            entity_ttl_secs = 30
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.renewal_path, "/api/v1/auth/renew");
        assert_eq!(config.library_freshness(), Duration::from_secs(60));
        assert_eq!(config.entity_ttl(), Duration::from_secs(30));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = ClientConfig::from_toml(&format!("{}\ntheme = \"dark\"", MINIMAL)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_base_url_rejected() {
        let err = ClientConfig::from_toml("credentials_path = \"c.json\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ClientConfig::new("ftp://shelf", "c.json");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "api_base_url", .. })
        ));

        config.api_base_url = "https://shelf".to_string();
        config.renewal_path = "auth/refresh".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "renewal_path", .. })
        ));

        config.renewal_path = "/auth/refresh".to_string();
        config.request_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "request_timeout_ms", .. })
        ));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = ClientConfig::from_path(&path).unwrap();
        assert_eq!(config.api_base_url, "https://shelf.example.com");
    }
}
