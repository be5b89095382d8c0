//! Server configuration from environment variables

use thiserror::Error;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_JWT_EXPIRY_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// HS256 secret shared with the auth provider
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub allowed_origins: Vec<String>,
    pub database_max_connections: u32,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let database_max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid {
                    key: "DATABASE_MAX_CONNECTIONS",
                    value: raw,
                })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let jwt_expiry_hours = match lookup("JWT_EXPIRY_HOURS") {
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| ConfigError::Invalid {
                key: "JWT_EXPIRY_HOURS",
                value: raw,
            })?,
            None => DEFAULT_JWT_EXPIRY_HOURS,
        };

        let run_migrations = match lookup("RUN_MIGRATIONS") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid {
                key: "RUN_MIGRATIONS",
                value: raw,
            })?,
            None => false,
        };

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiry_hours,
            allowed_origins,
            database_max_connections,
            run_migrations,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_applied() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/revlens"),
            ("JWT_SECRET", "secret"),
        ])
        .unwrap();

        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.database_max_connections, 10);
        assert!(!config.run_migrations);
        assert_eq!(config.allowed_origins.len(), 2);
    }

    #[test]
    fn test_missing_required() {
        let err = config_from(&[("DATABASE_URL", "postgres://localhost/revlens")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));

        let err = config_from(&[("JWT_SECRET", "secret"), ("DATABASE_URL", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = [
            ("DATABASE_URL", "postgres://localhost/revlens"),
            ("JWT_SECRET", "secret"),
        ];

        let mut pairs = base.to_vec();
        pairs.push(("DATABASE_MAX_CONNECTIONS", "0"));
        assert!(matches!(
            config_from(&pairs),
            Err(ConfigError::Invalid { key: "DATABASE_MAX_CONNECTIONS", .. })
        ));

        let mut pairs = base.to_vec();
        pairs.push(("RUN_MIGRATIONS", "maybe"));
        assert!(matches!(
            config_from(&pairs),
            Err(ConfigError::Invalid { key: "RUN_MIGRATIONS", .. })
        ));
    }

    #[test]
    fn test_origins_split_and_trimmed() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/revlens"),
            ("JWT_SECRET", "secret"),
            ("ALLOWED_ORIGINS", "https://app.revlens.io, https://admin.revlens.io,"),
            ("RUN_MIGRATIONS", "true"),
        ])
        .unwrap();

        assert_eq!(
            config.allowed_origins,
            vec!["https://app.revlens.io", "https://admin.revlens.io"]
        );
        assert!(config.run_migrations);
    }
}
