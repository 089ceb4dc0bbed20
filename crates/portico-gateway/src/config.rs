//! Gateway configuration types.
//!
//! Configuration is read once from the environment at start-up and is
//! immutable for the lifetime of the process.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use portico_auth::AuthConfig;

use crate::telemetry::LogFormat;

/// Errors raised while loading configuration or the routing table.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    /// A variable is set to a value that cannot be parsed.
    #[error("invalid value for {var}: {reason}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// The routes file could not be read.
    #[error("failed to read routes file {path}: {source}")]
    RoutesFile {
        /// Path of the routes file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The routes file is not valid JSON for the expected schema.
    #[error("failed to parse routes file: {0}")]
    RoutesParse(#[from] serde_json::Error),

    /// A route definition is invalid.
    #[error("invalid route `{service}`: {reason}")]
    InvalidRoute {
        /// Service key of the offending route.
        service: String,
        /// What went wrong.
        reason: String,
    },

    /// An HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Configuration for the gateway service.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8500").
    pub listen_addr: String,

    /// Active environment profile, used to pick per-route target overrides.
    pub environment: String,

    /// Statically allowed CORS origins.
    pub allowed_origins: Vec<String>,

    /// Name of the session cookie.
    pub cookie_name: String,

    /// Credential verification settings.
    pub auth: AuthConfig,

    /// Upstream proxy timeout in seconds.
    pub upstream_timeout_seconds: u64,

    /// Overall request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Path of the JSON routing table.
    pub routes_file: PathBuf,

    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8500".to_string()
    }

    fn default_environment() -> String {
        "local".to_string()
    }

    fn default_cookie_name() -> String {
        "jwt".to_string()
    }

    const fn default_upstream_timeout() -> u64 {
        30
    }

    const fn default_request_timeout() -> u64 {
        60
    }

    const fn default_max_body() -> usize {
        100 * 1024 * 1024 // 100 MB, audio uploads
    }

    fn default_routes_file() -> PathBuf {
        PathBuf::from("config/routes.json")
    }

    /// Load configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `JWT_SECRET_KEY` is unset or a numeric variable
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`GatewayConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = var("JWT_SECRET_KEY").ok_or(ConfigError::Missing("JWT_SECRET_KEY"))?;

        let auth = AuthConfig {
            jwt_secret,
            identity_base_url: var("IDENTITY_BASE_URL")
                .unwrap_or_else(|| AuthConfig::default().identity_base_url),
            identity_timeout: Duration::from_secs(parse_or(
                "IDENTITY_TIMEOUT_SECS",
                var("IDENTITY_TIMEOUT_SECS"),
                AuthConfig::default().identity_timeout.as_secs(),
            )?),
        };

        let log_format = match var("LOG_FORMAT") {
            Some(v) => v.parse::<LogFormat>().map_err(|reason| ConfigError::Invalid {
                var: "LOG_FORMAT",
                reason,
            })?,
            None => LogFormat::Text,
        };

        Ok(Self {
            listen_addr: var("LISTEN_ADDR").unwrap_or_else(Self::default_listen_addr),
            environment: var("ENVIRONMENT").unwrap_or_else(Self::default_environment),
            allowed_origins: parse_origins(var("ALLOWED_ORIGINS").as_deref().unwrap_or("")),
            cookie_name: var("COOKIE_NAME").unwrap_or_else(Self::default_cookie_name),
            auth,
            upstream_timeout_seconds: parse_or(
                "UPSTREAM_TIMEOUT_SECS",
                var("UPSTREAM_TIMEOUT_SECS"),
                Self::default_upstream_timeout(),
            )?,
            request_timeout_seconds: parse_or(
                "REQUEST_TIMEOUT_SECS",
                var("REQUEST_TIMEOUT_SECS"),
                Self::default_request_timeout(),
            )?,
            max_body_bytes: parse_or("MAX_BODY_BYTES", var("MAX_BODY_BYTES"), Self::default_max_body())?,
            routes_file: var("ROUTES_FILE").map_or_else(Self::default_routes_file, PathBuf::from),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
        })
    }

    /// Get the upstream timeout as a `Duration`.
    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_seconds)
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            environment: Self::default_environment(),
            allowed_origins: Vec::new(),
            cookie_name: Self::default_cookie_name(),
            auth: AuthConfig::default(),
            upstream_timeout_seconds: Self::default_upstream_timeout(),
            request_timeout_seconds: Self::default_request_timeout(),
            max_body_bytes: Self::default_max_body(),
            routes_file: Self::default_routes_file(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

/// Split a comma-separated origin list, dropping blanks.
#[must_use]
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_or<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8500");
        assert_eq!(config.environment, "local");
        assert_eq!(config.cookie_name, "jwt");
        assert!(config.allowed_origins.is_empty());
        assert_eq!(config.max_body_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn timeout_duration() {
        let config = GatewayConfig::default();
        assert_eq!(config.upstream_timeout(), Duration::from_secs(30));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn secret_is_required() {
        let err = GatewayConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET_KEY")));

        let err = GatewayConfig::from_lookup(lookup(&[("JWT_SECRET_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET_KEY")));
    }

    #[test]
    fn reads_environment() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("JWT_SECRET_KEY", "s3cret"),
            ("ENVIRONMENT", "prod"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example,,"),
            ("COOKIE_NAME", "jwt-dev"),
            ("UPSTREAM_TIMEOUT_SECS", "12"),
            ("IDENTITY_TIMEOUT_SECS", "2"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.environment, "prod");
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.cookie_name, "jwt-dev");
        assert_eq!(config.upstream_timeout(), Duration::from_secs(12));
        assert_eq!(config.auth.identity_timeout, Duration::from_secs(2));
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = GatewayConfig::from_lookup(lookup(&[
            ("JWT_SECRET_KEY", "s3cret"),
            ("MAX_BODY_BYTES", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "MAX_BODY_BYTES", .. }));
    }

    #[test]
    fn empty_origin_list() {
        assert!(parse_origins("").is_empty());
        assert!(parse_origins(" , ").is_empty());
    }
}
