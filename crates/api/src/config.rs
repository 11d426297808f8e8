//! Application configuration loaded from environment variables.

use common::Currency;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL connection string; the in-memory store is
///   used when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `API_TOKENS`: comma-separated `token:principal` pairs accepted as
///   bearer tokens
/// - `DEFAULT_CURRENCY`: currency of amounts sent without one, and of the
///   dashboard headline figures (default: `EUR`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub api_tokens: Vec<(String, String)>,
    pub default_currency: Currency,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which returns the raw value of
    /// a variable if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let port = match var("PORT") {
            Some(raw) => raw.parse().map_err(|_| invalid("PORT", &raw))?,
            None => defaults.port,
        };
        let log_format = match var("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(invalid("LOG_FORMAT", other)),
        };
        let database_max_connections = match var("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => match raw.parse() {
                Ok(n) if n > 0 => n,
                _ => return Err(invalid("DATABASE_MAX_CONNECTIONS", &raw)),
            },
            None => defaults.database_max_connections,
        };
        let api_tokens = match var("API_TOKENS") {
            Some(raw) => parse_tokens(&raw)?,
            None => Vec::new(),
        };
        let default_currency = match var("DEFAULT_CURRENCY") {
            Some(raw) => Currency::new(&raw).map_err(|e| ConfigError::Invalid {
                name: "DEFAULT_CURRENCY",
                reason: e.to_string(),
            })?,
            None => defaults.default_currency,
        };

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port,
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: var("DATABASE_URL"),
            database_max_connections,
            api_tokens,
            default_currency,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 5,
            api_tokens: Vec::new(),
            default_currency: Currency::EUR,
        }
    }
}

fn parse_tokens(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once(':') {
            Some((token, principal)) if !token.trim().is_empty() && !principal.trim().is_empty() => {
                Ok((token.trim().to_string(), principal.trim().to_string()))
            }
            _ => Err(ConfigError::Invalid {
                name: "API_TOKENS",
                reason: "expected comma-separated token:principal pairs".to_string(),
            }),
        })
        .collect()
}

fn invalid(name: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: format!("{value:?}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.database_url, None);
        assert_eq!(config.database_max_connections, 5);
        assert!(config.api_tokens.is_empty());
        assert_eq!(config.default_currency, Currency::EUR);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_reads_every_variable() {
        let config = load(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8081"),
            ("RUST_LOG", "debug"),
            ("LOG_FORMAT", "json"),
            ("DATABASE_URL", "postgres://localhost/erp"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("API_TOKENS", "s3cret:alice, other:bob"),
            ("DEFAULT_CURRENCY", "usd"),
        ])
        .unwrap();

        assert_eq!(config.addr(), "127.0.0.1:8081");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/erp"));
        assert_eq!(config.database_max_connections, 12);
        assert_eq!(
            config.api_tokens,
            vec![
                ("s3cret".to_string(), "alice".to_string()),
                ("other".to_string(), "bob".to_string())
            ]
        );
        assert_eq!(config.default_currency, Currency::USD);
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = load(&[("DATABASE_URL", "  "), ("PORT", "")]).unwrap();
        assert_eq!(config.database_url, None);
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_rejects_malformed_values() {
        assert!(load(&[("PORT", "http")]).is_err());
        assert!(load(&[("LOG_FORMAT", "xml")]).is_err());
        assert!(load(&[("DATABASE_MAX_CONNECTIONS", "0")]).is_err());
        assert!(load(&[("API_TOKENS", "missing-principal")]).is_err());
        assert!(load(&[("DEFAULT_CURRENCY", "EURO")]).is_err());
    }
}
