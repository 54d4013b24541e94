//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Identity provider (OIDC) configuration
    pub oidc: OidcConfig,
    /// Session cookie configuration
    pub session: SessionConfig,
    /// Upstream domain-registry API configuration
    pub registry: RegistryConfig,
    /// CMS content API configuration (menus)
    pub content: ContentConfig,
    /// User directory (persistence) configuration
    pub directory: DirectoryConfig,
    /// Business-registry SOAP lookup configuration
    pub business_registry: BusinessRegistryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Identity provider configuration for the eID login flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    /// Issuer URL; the `iss` claim of every accepted ID token must equal this
    pub issuer: String,
    /// Authorization endpoint path, resolved against the issuer
    pub authorization_path: String,
    /// Token endpoint path, resolved against the issuer
    pub token_path: String,
    /// JWKS endpoint path, resolved against the issuer
    pub jwks_path: String,
    /// OAuth2 client id (also the expected `aud` claim)
    pub client_id: String,
    /// OAuth2 client secret (supports `${VAR}` expansion)
    pub client_secret: String,
    /// Registered redirect URL (must route to `/auth/callback`)
    pub redirect_url: String,
    /// Requested scope
    pub scope: String,
    /// Clock-skew tolerance for `exp`/`nbf` validation, in seconds
    pub leeway_secs: u64,
    /// How often the background task re-fetches the signing key
    #[serde(with = "humantime_serde")]
    pub jwks_refresh_interval: Duration,
    /// Timeout for provider calls (token exchange, JWKS fetch)
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            issuer: "https://openid.example.net".to_string(),
            authorization_path: "/oidc/authorize".to_string(),
            token_path: "/oidc/token".to_string(),
            jwks_path: "/oidc/jwks".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_url: "http://127.0.0.1:3000/auth/callback".to_string(),
            scope: "openid".to_string(),
            leeway_secs: 10,
            jwks_refresh_interval: Duration::from_secs(3600),
            timeout: Duration::from_secs(10),
        }
    }
}

impl OidcConfig {
    /// Full authorization endpoint URL
    #[must_use]
    pub fn authorization_url(&self) -> String {
        join_url(&self.issuer, &self.authorization_path)
    }

    /// Full token endpoint URL
    #[must_use]
    pub fn token_url(&self) -> String {
        join_url(&self.issuer, &self.token_path)
    }

    /// Full JWKS endpoint URL
    #[must_use]
    pub fn jwks_url(&self) -> String {
        join_url(&self.issuer, &self.jwks_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie name
    pub cookie_name: String,
    /// Set the `Secure` attribute (disable only for local development)
    pub secure: bool,
    /// Idle expiry for a session
    #[serde(with = "humantime_serde")]
    pub expiry: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "registrant.sid".to_string(),
            secure: true,
            expiry: Duration::from_secs(4 * 3600),
        }
    }
}

/// Upstream domain-registry API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the registrant API (e.g. `https://registry.example/api/v1/registrant`)
    pub api_url: String,
    /// Per-call timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// CMS content API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Base URL of the content API
    pub api_url: String,
    /// Static API key sent with every request (supports `${VAR}` expansion)
    pub api_key: String,
    /// Per-call timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// User directory (persistence) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Enable the durable user directory
    pub enabled: bool,
    /// Storage directory for user records; empty means
    /// `~/.registrant-portal/users`
    pub data_dir: String,
    /// How old a record's `updated_at` may be before the cached company
    /// list is refreshed on login
    #[serde(with = "humantime_serde")]
    pub company_refresh_ttl: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: String::new(),
            company_refresh_ttl: Duration::from_secs(86_400),
        }
    }
}

/// Business-registry SOAP lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessRegistryConfig {
    /// SOAP endpoint URL
    pub url: String,
    /// Service username (credential travels in the request body)
    pub username: String,
    /// Service password (supports `${VAR}` expansion)
    pub password: String,
    /// Per-call timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for BusinessRegistryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (PORTAL_ prefix)
        figment = figment.merge(Env::prefixed("PORTAL_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before env var expansion)
        config.load_env_files();

        // Expand ${VAR} in credential fields
        config.expand_env_vars();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in credential values
    fn expand_env_vars(&mut self) {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();

        for value in [
            &mut self.oidc.client_id,
            &mut self.oidc.client_secret,
            &mut self.content.api_key,
            &mut self.business_registry.username,
            &mut self.business_registry.password,
        ] {
            *value = Self::expand_string(&re, value);
        }
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else if let Some(hours) = s.strip_suffix('h') {
            hours
                .parse::<u64>()
                .map(|h| Duration::from_secs(h * 3600))
                .map_err(serde::de::Error::custom)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.oidc.leeway_secs, 10);
        assert_eq!(config.registry.timeout, Duration::from_secs(15));
        assert_eq!(config.content.timeout, Duration::from_secs(10));
        assert_eq!(
            config.directory.company_refresh_ttl,
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn oidc_urls_join_without_double_slash() {
        let oidc = OidcConfig {
            issuer: "https://idp.example.net/".to_string(),
            jwks_path: "/oidc/jwks".to_string(),
            ..Default::default()
        };
        assert_eq!(oidc.jwks_url(), "https://idp.example.net/oidc/jwks");
        assert_eq!(
            oidc.token_url(),
            "https://idp.example.net/oidc/token"
        );
    }

    #[test]
    fn config_deserialized_from_yaml() {
        let yaml = r#"
server:
  host: "0.0.0.0"
  port: 8080
oidc:
  issuer: "https://idp.test"
  client_id: "portal"
  leeway_secs: 10
registry:
  api_url: "https://registry.test/api/v1/registrant"
  timeout: 15s
directory:
  enabled: false
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.oidc.client_id, "portal");
        assert_eq!(config.registry.timeout, Duration::from_secs(15));
        assert!(!config.directory.enabled);
    }

    #[test]
    fn humantime_parses_suffixes() {
        #[derive(Deserialize)]
        struct Wrap {
            #[serde(with = "humantime_serde")]
            d: Duration,
        }

        let w: Wrap = serde_yaml::from_str("d: 100ms").unwrap();
        assert_eq!(w.d, Duration::from_millis(100));
        let w: Wrap = serde_yaml::from_str("d: 5m").unwrap();
        assert_eq!(w.d, Duration::from_secs(300));
        let w: Wrap = serde_yaml::from_str("d: 2h").unwrap();
        assert_eq!(w.d, Duration::from_secs(7200));
        let w: Wrap = serde_yaml::from_str("d: 42").unwrap();
        assert_eq!(w.d, Duration::from_secs(42));
    }

    #[test]
    fn load_env_files_sets_env_vars() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("test.env");
        let mut f = std::fs::File::create(&env_path).unwrap();
        writeln!(f, "PORTAL_TEST_KEY_A=hello_from_env_file").unwrap();
        drop(f);

        let config = Config {
            env_files: vec![env_path.to_string_lossy().to_string()],
            ..Default::default()
        };
        config.load_env_files();

        assert_eq!(env::var("PORTAL_TEST_KEY_A").unwrap(), "hello_from_env_file");
    }

    #[test]
    fn load_env_files_skips_missing() {
        let config = Config {
            env_files: vec!["/nonexistent/path/.env".to_string()],
            ..Default::default()
        };
        // Should not panic
        config.load_env_files();
    }

    #[test]
    fn expand_string_substitutes_and_defaults() {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
        assert_eq!(
            Config::expand_string(&re, "${PORTAL_TEST_MISSING:-fallback}"),
            "fallback"
        );
        assert_eq!(Config::expand_string(&re, "plain"), "plain");
    }
}
