//! Client configuration loading.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable consulted when `--config` is not passed.
pub const CONFIG_ENV_VAR: &str = "MMS_CLIENT_CONFIG";

fn default_holding_bin_owner() -> String {
    "holding_bin_project".to_string()
}

fn default_site() -> String {
    "europa".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Service root, e.g. `https://ems/alfresco/service`.
    pub base_url: String,
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Owner applied to created elements that do not name one.
    #[serde(default = "default_holding_bin_owner")]
    pub holding_bin_owner: String,
    #[serde(default = "default_site")]
    pub default_site: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub api_key: Option<String>,
    pub jwt: Option<String>,
}

impl ClientConfig {
    /// Config pointing at `base_url` with the remaining fields defaulted.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout_ms: 30_000,
            auth: AuthConfig::default(),
            holding_bin_owner: default_holding_bin_owner(),
            default_site: default_site(),
        }
    }

    /// Load from `path`, or from [`CONFIG_ENV_VAR`] when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(config_path_from_env)
            .ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.holding_bin_owner.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "holding_bin_owner",
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(key) = &self.auth.api_key {
            if key.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "auth.api_key",
                    reason: "must not be empty when set".to_string(),
                });
            }
        }
        Ok(())
    }

    /// `base_url` without a trailing slash.
    pub fn root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
base_url = "https://ems.example.org/alfresco/service/"
request_timeout_ms = 5000

[auth]
api_key = "k"
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = ClientConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.request_timeout_ms, 5000);
        assert_eq!(config.auth.api_key.as_deref(), Some("k"));
        assert_eq!(config.holding_bin_owner, "holding_bin_project");
        assert_eq!(config.default_site, "europa");
        assert_eq!(config.root(), "https://ems.example.org/alfresco/service");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = ClientConfig::from_toml("base_url = \"x\"\nrequest_timeout_ms = 1\nbogus = 1\n");
        assert!(matches!(err, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ClientConfig::with_base_url("  ");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "base_url", .. })
        ));

        config.base_url = "http://localhost".to_string();
        config.request_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "request_timeout_ms", .. })
        ));

        config.request_timeout_ms = 10;
        config.holding_bin_owner = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "holding_bin_owner", .. })
        ));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = ClientConfig::from_path(file.path()).unwrap();
        assert_eq!(config.request_timeout_ms, 5000);

        let missing = ClientConfig::from_path(Path::new("/definitely/not/here.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_explicit_path_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = ClientConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.base_url, "https://ems.example.org/alfresco/service/");

        let mut invalid = tempfile::NamedTempFile::new().unwrap();
        invalid
            .write_all(b"base_url = \"http://x\"\nrequest_timeout_ms = 0\n")
            .unwrap();
        assert!(matches!(
            ClientConfig::load(Some(invalid.path())),
            Err(ConfigError::InvalidValue { field: "request_timeout_ms", .. })
        ));
    }
}
