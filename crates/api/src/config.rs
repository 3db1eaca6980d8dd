//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

use datalink_observability::{LogConfig, LogFormat};

const DEV_JWT_SECRET: &str = "dev-secret";

/// Upper bound for `TOKEN_TTL_MINUTES`: one year.
pub const MAX_TOKEN_TTL_MINUTES: i64 = 365 * 24 * 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    pub bootstrap_admin_password: Option<String>,
    pub log: LogConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| DEV_JWT_SECRET.to_string());

        let token_ttl_minutes: i64 = parse(&get, "TOKEN_TTL_MINUTES", 120)?;
        if !(1..=MAX_TOKEN_TTL_MINUTES).contains(&token_ttl_minutes) {
            return Err(invalid(
                "TOKEN_TTL_MINUTES",
                token_ttl_minutes.to_string(),
                format!("must be 1..={MAX_TOKEN_TTL_MINUTES}"),
            ));
        }

        let format = match get("LOG_FORMAT") {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|e| invalid("LOG_FORMAT", raw.clone(), e.to_string()))?,
            None => LogFormat::Json,
        };

        Ok(Self {
            bind_addr: parse(&get, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8000)))?,
            database_url: get("DATABASE_URL"),
            database_max_connections: parse(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            jwt_secret,
            token_ttl_minutes,
            bootstrap_admin_password: get("BOOTSTRAP_ADMIN_PASSWORD"),
            log: LogConfig {
                level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                format,
            },
        })
    }

    /// Whether tokens are signed with the built-in development key.
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(raw) => raw.parse().map_err(|e: T::Err| invalid(var, raw, e.to_string())),
        None => Ok(default),
    }
}

fn invalid(var: &'static str, value: String, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.bind_addr.port(), 8000);
        assert_eq!(c.database_url, None);
        assert_eq!(c.database_max_connections, 10);
        assert_eq!(c.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(c.token_ttl_minutes, 120);
        assert_eq!(c.log, LogConfig::default());
    }

    #[test]
    fn reads_values() {
        let c = config(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://localhost/datalink"),
            ("JWT_SECRET", "s"),
            ("TOKEN_TTL_MINUTES", "15"),
            ("BOOTSTRAP_ADMIN_PASSWORD", "pw"),
            ("LOG_FORMAT", "pretty"),
            ("LOG_LEVEL", "debug"),
        ])
        .unwrap();
        assert_eq!(c.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(c.database_url.as_deref(), Some("postgres://localhost/datalink"));
        assert_eq!(c.token_ttl_minutes, 15);
        assert_eq!(c.bootstrap_admin_password.as_deref(), Some("pw"));
        assert_eq!(c.log.format, LogFormat::Pretty);
        assert_eq!(c.log.level, "debug");
    }

    #[test]
    fn blank_database_url_means_memory() {
        assert_eq!(config(&[("DATABASE_URL", "  ")]).unwrap().database_url, None);
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(matches!(
            config(&[("DATABASE_MAX_CONNECTIONS", "ten")]),
            Err(ConfigError::Invalid { var: "DATABASE_MAX_CONNECTIONS", .. })
        ));
        assert!(matches!(
            config(&[("TOKEN_TTL_MINUTES", "0")]),
            Err(ConfigError::Invalid { var: "TOKEN_TTL_MINUTES", .. })
        ));
        assert!(config(&[("LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn token_ttl_is_capped() {
        let max = MAX_TOKEN_TTL_MINUTES.to_string();
        assert_eq!(config(&[("TOKEN_TTL_MINUTES", &max)]).unwrap().token_ttl_minutes, MAX_TOKEN_TTL_MINUTES);

        let over = (MAX_TOKEN_TTL_MINUTES + 1).to_string();
        assert!(matches!(
            config(&[("TOKEN_TTL_MINUTES", &over)]),
            Err(ConfigError::Invalid { var: "TOKEN_TTL_MINUTES", .. })
        ));
        assert!(matches!(
            config(&[("TOKEN_TTL_MINUTES", "100000000000000")]),
            Err(ConfigError::Invalid { var: "TOKEN_TTL_MINUTES", .. })
        ));
    }
}
