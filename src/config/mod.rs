//! Process configuration.
//!
//! Values come from an optional TOML file, then environment variables on top.
//! The five client settings are required with no defaults; a missing one is a
//! fatal `Configuration` error at startup.

use crate::error::{OAuthError, Result};
use crate::provider::DEFAULT_API_BASE_URL;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Immutable client identity registered with the provider.
#[derive(Clone, PartialEq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

// Keep the secret out of logs and panic messages
impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Complete client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub credentials: ClientCredentials,
    /// Token store location
    pub token_file: PathBuf,
    /// User info store location
    pub info_file: PathBuf,
    /// Authorization server base URL
    pub api_base_url: String,
    /// Per-request timeout
    pub http_timeout: Duration,
    /// Refresh this long before the recorded expiry
    pub refresh_leeway: chrono::Duration,
}

/// Raw settings before validation. Every field is optional so a file can
/// provide some values and the environment the rest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub token_file: Option<PathBuf>,
    pub info_file: Option<PathBuf>,
    pub api_base_url: Option<String>,
    pub http_timeout_secs: Option<u64>,
    pub refresh_leeway_secs: Option<i64>,
}

fn default_http_timeout_secs() -> u64 {
    30
}

/// Load configuration values from TOML file
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path).map_err(|e| OAuthError::storage(path, e))?;
    toml::from_str(&contents).map_err(|e| {
        OAuthError::Configuration(format!("Invalid config file {}: {}", path.display(), e))
    })
}

impl ClientConfig {
    /// Build from env vars, over an optional config file.
    pub fn from_env(file: Option<ConfigFile>) -> Result<Self> {
        Self::from_lookup(file.unwrap_or_default(), |key| std::env::var(key).ok())
    }

    /// Build from `file` with values returned by `lookup` taking precedence.
    pub fn from_lookup<F>(file: ConfigFile, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let client_id = required("CLIENT_ID", var("CLIENT_ID").or(file.client_id))?;
        let client_secret = required("CLIENT_SECRET", var("CLIENT_SECRET").or(file.client_secret))?;
        let redirect_uri = required("REDIRECT_URI", var("REDIRECT_URI").or(file.redirect_uri))?;
        let token_file = required(
            "TOKEN_FILE",
            var("TOKEN_FILE").map(PathBuf::from).or(file.token_file),
        )?;
        let info_file = required(
            "INFO_FILE",
            var("INFO_FILE").map(PathBuf::from).or(file.info_file),
        )?;

        let api_base_url = var("OAUTH_API_BASE_URL")
            .or(file.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let http_timeout_secs = match var("OAUTH_HTTP_TIMEOUT_SECS") {
            Some(v) => parse("OAUTH_HTTP_TIMEOUT_SECS", &v)?,
            None => file.http_timeout_secs.unwrap_or_else(default_http_timeout_secs),
        };
        let refresh_leeway_secs: i64 = match var("OAUTH_REFRESH_LEEWAY_SECS") {
            Some(v) => parse("OAUTH_REFRESH_LEEWAY_SECS", &v)?,
            None => file.refresh_leeway_secs.unwrap_or(0),
        };
        if refresh_leeway_secs < 0 {
            return Err(OAuthError::Configuration(
                "OAUTH_REFRESH_LEEWAY_SECS must not be negative".to_string(),
            ));
        }
        let refresh_leeway = chrono::Duration::try_seconds(refresh_leeway_secs).ok_or_else(|| {
            OAuthError::Configuration(format!(
                "OAUTH_REFRESH_LEEWAY_SECS is out of range: {}",
                refresh_leeway_secs
            ))
        })?;

        Ok(Self {
            credentials: ClientCredentials {
                client_id,
                client_secret,
                redirect_uri,
            },
            token_file,
            info_file,
            api_base_url,
            http_timeout: Duration::from_secs(http_timeout_secs),
            refresh_leeway,
        })
    }
}

fn required<T>(key: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| OAuthError::Configuration(format!("{} is required", key)))
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| OAuthError::Configuration(format!("{} has invalid value '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("CLIENT_ID", "id"),
        ("CLIENT_SECRET", "secret"),
        ("REDIRECT_URI", "https://localhost/callback"),
        ("TOKEN_FILE", "/tmp/token.json"),
        ("INFO_FILE", "/tmp/info.json"),
    ];

    #[test]
    fn test_required_values_and_defaults() {
        let config = ClientConfig::from_lookup(ConfigFile::default(), env(REQUIRED)).unwrap();

        assert_eq!(config.credentials.client_id, "id");
        assert_eq!(config.credentials.client_secret, "secret");
        assert_eq!(config.token_file, PathBuf::from("/tmp/token.json"));
        assert_eq!(config.api_base_url, "https://api.login.yahoo.com");
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.refresh_leeway, chrono::Duration::zero());
    }

    #[test]
    fn test_each_missing_value_is_fatal() {
        for (missing, _) in REQUIRED {
            let pairs: Vec<(&str, &str)> = REQUIRED
                .iter()
                .copied()
                .filter(|(k, _)| k != missing)
                .collect();

            let err = ClientConfig::from_lookup(ConfigFile::default(), env(&pairs)).unwrap_err();
            match err {
                OAuthError::Configuration(msg) => assert!(msg.contains(missing)),
                other => panic!("unexpected error: {}", other),
            }
        }
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let mut pairs = REQUIRED.to_vec();
        pairs[0] = ("CLIENT_ID", "  ");

        let result = ClientConfig::from_lookup(ConfigFile::default(), env(&pairs));
        assert!(matches!(result, Err(OAuthError::Configuration(_))));
    }

    #[test]
    fn test_config_file_with_env_override() {
        let file: ConfigFile = toml::from_str(
            r#"
            client_id = "file-id"
            client_secret = "file-secret"
            redirect_uri = "https://file/callback"
            token_file = "file-token.json"
            info_file = "file-info.json"
            http_timeout_secs = 5
            refresh_leeway_secs = 60
            "#,
        )
        .unwrap();

        let config = ClientConfig::from_lookup(file, env(&[("CLIENT_ID", "env-id")])).unwrap();

        assert_eq!(config.credentials.client_id, "env-id");
        assert_eq!(config.credentials.client_secret, "file-secret");
        assert_eq!(config.info_file, PathBuf::from("file-info.json"));
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert_eq!(config.refresh_leeway, chrono::Duration::seconds(60));
    }

    #[test]
    fn test_optional_values_from_env() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("OAUTH_API_BASE_URL", "http://127.0.0.1:8080"));
        pairs.push(("OAUTH_HTTP_TIMEOUT_SECS", "10"));
        pairs.push(("OAUTH_REFRESH_LEEWAY_SECS", "90"));

        let config = ClientConfig::from_lookup(ConfigFile::default(), env(&pairs)).unwrap();

        assert_eq!(config.api_base_url, "http://127.0.0.1:8080");
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.refresh_leeway, chrono::Duration::seconds(90));
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("OAUTH_HTTP_TIMEOUT_SECS", "soon"));
        assert!(matches!(
            ClientConfig::from_lookup(ConfigFile::default(), env(&pairs)),
            Err(OAuthError::Configuration(_))
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("OAUTH_REFRESH_LEEWAY_SECS", "-5"));
        assert!(matches!(
            ClientConfig::from_lookup(ConfigFile::default(), env(&pairs)),
            Err(OAuthError::Configuration(_))
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("OAUTH_REFRESH_LEEWAY_SECS", "9999999999999999"));
        match ClientConfig::from_lookup(ConfigFile::default(), env(&pairs)) {
            Err(OAuthError::Configuration(msg)) => assert!(msg.contains("out of range")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_oversized_leeway_in_file_rejected() {
        let file = ConfigFile {
            refresh_leeway_secs: Some(i64::MAX),
            ..ConfigFile::default()
        };

        assert!(matches!(
            ClientConfig::from_lookup(file, env(REQUIRED)),
            Err(OAuthError::Configuration(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ClientConfig::from_lookup(ConfigFile::default(), env(REQUIRED)).unwrap();
        let debug = format!("{:?}", config);

        assert!(!debug.contains("\"secret\""));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_load_config_rejects_bad_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "client_id = ").unwrap();

        assert!(matches!(load_config(&path), Err(OAuthError::Configuration(_))));
    }
}
