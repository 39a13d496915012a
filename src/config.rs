//! Process configuration, read once at startup.
//!
//! Every secret the request path needs (JWT signing key, gateway credentials)
//! is validated here so a misconfigured server refuses to start instead of
//! failing inside a handler.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORTONE_BASE_URL: &str = "https://api.iamport.kr";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub jwt: JwtConfig,
    pub portone: PortOneConfig,
    pub nats_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::invalid("HOST", &self.host, "not a valid bind address"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Postgres { url: String, max_connections: u32 },
    Memory,
}

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl: chrono::Duration,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig").field("secret", &"<redacted>").field("ttl", &self.ttl).finish()
    }
}

#[derive(Clone)]
pub struct PortOneConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub timeout: Duration,
}

impl fmt::Debug for PortOneConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortOneConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid { key: &'static str, value: String, reason: &'static str },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: &'static str) -> Self {
        Self::Invalid { key, value: value.to_string(), reason }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Blank values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let server = ServerConfig {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", get("PORT"), 5000)?,
        };

        let storage = match get("STORAGE_BACKEND").as_deref().unwrap_or("postgres") {
            "postgres" => StorageConfig::Postgres {
                url: require("DATABASE_URL")?,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", get("DATABASE_MAX_CONNECTIONS"), 10)?,
            },
            "memory" => StorageConfig::Memory,
            other => return Err(ConfigError::invalid("STORAGE_BACKEND", other, "expected postgres or memory")),
        };

        let ttl_days: i64 = parse_or("JWT_TTL_DAYS", get("JWT_TTL_DAYS"), 7)?;
        if ttl_days <= 0 {
            return Err(ConfigError::invalid("JWT_TTL_DAYS", &ttl_days.to_string(), "must be positive"));
        }
        let jwt = JwtConfig { secret: require("JWT_SECRET")?, ttl: chrono::Duration::days(ttl_days) };

        let portone = PortOneConfig {
            base_url: get("PORTONE_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PORTONE_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: require("PORTONE_API_KEY")?,
            api_secret: require("PORTONE_API_SECRET")?,
            timeout: Duration::from_secs(parse_or("PORTONE_TIMEOUT_SECS", get("PORTONE_TIMEOUT_SECS"), 10)?),
        };

        Ok(Self { server, storage, jwt, portone, nats_url: get("NATS_URL") })
    }
}

fn parse_or<T: std::str::FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::invalid(key, &v, "not a number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/shop"),
        ("JWT_SECRET", "s3cret"),
        ("PORTONE_API_KEY", "key"),
        ("PORTONE_API_SECRET", "secret"),
    ];

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(BASE)).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.portone.base_url, DEFAULT_PORTONE_BASE_URL);
        assert_eq!(config.portone.timeout, Duration::from_secs(10));
        assert_eq!(config.jwt.ttl, chrono::Duration::days(7));
        assert!(matches!(config.storage, StorageConfig::Postgres { max_connections: 10, .. }));
        assert!(config.nats_url.is_none());
    }

    #[test]
    fn test_gateway_credentials_required() {
        let pairs: Vec<_> = BASE.iter().copied().filter(|(k, _)| *k != "PORTONE_API_SECRET").collect();
        assert_eq!(AppConfig::from_lookup(lookup(&pairs)).unwrap_err(), ConfigError::Missing("PORTONE_API_SECRET"));
    }

    #[test]
    fn test_blank_secret_counts_as_missing() {
        let pairs: Vec<_> = BASE.iter().copied()
            .map(|(k, v)| if k == "JWT_SECRET" { (k, "   ") } else { (k, v) })
            .collect();
        assert_eq!(AppConfig::from_lookup(lookup(&pairs)).unwrap_err(), ConfigError::Missing("JWT_SECRET"));
    }

    #[test]
    fn test_memory_backend_needs_no_database() {
        let pairs: Vec<_> = BASE.iter().copied().filter(|(k, _)| *k != "DATABASE_URL")
            .chain([("STORAGE_BACKEND", "memory")]).collect();
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.storage, StorageConfig::Memory);
    }

    #[test]
    fn test_invalid_port() {
        let pairs: Vec<_> = BASE.iter().copied().chain([("PORT", "http")]).collect();
        assert!(matches!(AppConfig::from_lookup(lookup(&pairs)), Err(ConfigError::Invalid { key: "PORT", .. })));
    }
}
