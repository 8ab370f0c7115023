//! Configuration management for the server.

use std::env;
use std::str::FromStr;

use verlog_engine::{EngineConfig, MissingTime, PendingUpgrade};

/// Where records are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// PostgreSQL at the given URL
    Postgres { database_url: String },
    /// Process memory; contents are lost on restart
    Memory,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Storage backend, chosen once at startup
    pub storage: StorageBackend,
    /// Engine behaviour applied to every record
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let storage = match lookup("STORAGE_BACKEND")
            .unwrap_or_else(|| "postgres".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" => StorageBackend::Postgres {
                database_url: lookup("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?,
            },
            "memory" => StorageBackend::Memory,
            other => return Err(ConfigError::InvalidBackend(other.to_string())),
        };

        let mut engine = EngineConfig::default();
        if let Some(value) = lookup("VERLOG_APPEND_ON_UNDO") {
            engine.append_on_undo = parse_bool("VERLOG_APPEND_ON_UNDO", &value)?;
        }
        if let Some(value) = lookup("VERLOG_SNAPSHOT_INTERVAL") {
            engine.log.snapshot_interval = Some(parse_number("VERLOG_SNAPSHOT_INTERVAL", &value)?);
        }
        if let Some(value) = lookup("VERLOG_HISTORY_LIMIT") {
            engine.log.history_limit = Some(parse_number("VERLOG_HISTORY_LIMIT", &value)?);
        }
        if let Some(value) = lookup("VERLOG_ON_PENDING_UPGRADE") {
            engine.on_pending_upgrade = PendingUpgrade::from_str(&value)?;
        }
        if let Some(value) = lookup("VERLOG_MISSING_TIME") {
            engine.missing_time = MissingTime::from_str(&value)?;
        }

        Ok(Self {
            host,
            port,
            storage,
            engine,
        })
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        }),
    }
}

fn parse_number(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Unknown STORAGE_BACKEND `{0}`, expected postgres or memory")]
    InvalidBackend(String),

    #[error("Invalid {var} value `{value}`")]
    InvalidValue { var: &'static str, value: String },

    #[error(transparent)]
    Policy(#[from] verlog_engine::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_with_database_url() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/verlog")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(
            config.storage,
            StorageBackend::Postgres {
                database_url: "postgres://localhost/verlog".to_string()
            }
        );
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn postgres_requires_database_url() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingDatabaseUrl)));
    }

    #[test]
    fn memory_backend() {
        let config = load(&[("STORAGE_BACKEND", "Memory"), ("PORT", "8080")]).unwrap();
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn engine_settings() {
        let config = load(&[
            ("STORAGE_BACKEND", "memory"),
            ("VERLOG_APPEND_ON_UNDO", "true"),
            ("VERLOG_SNAPSHOT_INTERVAL", "20"),
            ("VERLOG_HISTORY_LIMIT", "100"),
            ("VERLOG_ON_PENDING_UPGRADE", "warn"),
            ("VERLOG_MISSING_TIME", "absent"),
        ])
        .unwrap();

        assert!(config.engine.append_on_undo);
        assert_eq!(config.engine.log.snapshot_interval, Some(20));
        assert_eq!(config.engine.log.history_limit, Some(100));
        assert_eq!(config.engine.on_pending_upgrade, PendingUpgrade::Warn);
        assert_eq!(config.engine.missing_time, MissingTime::Absent);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            load(&[("STORAGE_BACKEND", "sqlite")]),
            Err(ConfigError::InvalidBackend(_))
        ));
        assert!(matches!(
            load(&[("STORAGE_BACKEND", "memory"), ("PORT", "http")]),
            Err(ConfigError::InvalidPort)
        ));
        assert!(matches!(
            load(&[("STORAGE_BACKEND", "memory"), ("VERLOG_HISTORY_LIMIT", "-1")]),
            Err(ConfigError::InvalidValue { var: "VERLOG_HISTORY_LIMIT", .. })
        ));
        assert!(matches!(
            load(&[("STORAGE_BACKEND", "memory"), ("VERLOG_MISSING_TIME", "never")]),
            Err(ConfigError::Policy(verlog_engine::Error::UnknownPolicy { .. }))
        ));
    }
}
