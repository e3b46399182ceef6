//! Environment-driven configuration for processes embedding the registry.

use std::env;

use thiserror::Error;

/// Database file used when `DATABASE_URL` is not set.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://db.sqlite?mode=rwc";

/// Store connection settings derived from `.env`/process variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    database_url: String,
    max_connections: Option<u32>,
}

impl StoreConfig {
    /// Hydrates `.env` (if present) and reads the optional store variables.
    /// Malformed entries surface as `ConfigError`.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let database_url = get_optional_var("DATABASE_URL")
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let max_connections = get_optional_var("DATABASE_MAX_CONNECTIONS")
            .map(|raw| {
                raw.parse().map_err(|source| ConfigError::InvalidNumber {
                    key: "DATABASE_MAX_CONNECTIONS",
                    source,
                })
            })
            .transpose()?;

        Ok(Self {
            database_url,
            max_connections,
        })
    }

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: None,
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn max_connections(&self) -> Option<u32> {
        self.max_connections
    }
}

pub(crate) fn get_optional_var(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("LINKDROP_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}

#[cfg(test)]
pub(crate) static ENV_GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    fn set_env() {
        std::env::set_var("LINKDROP_SKIP_DOTENV", "1");
        std::env::set_var("DATABASE_URL", "sqlite://test.db");
        std::env::remove_var("DATABASE_MAX_CONNECTIONS");
    }

    #[test]
    fn config_loader_reads_env() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("DATABASE_MAX_CONNECTIONS", "4");

        let config = StoreConfig::load_from_env().expect("config loads");
        assert_eq!(config.database_url(), "sqlite://test.db");
        assert_eq!(config.max_connections(), Some(4));

        set_env();
    }

    #[test]
    fn missing_database_url_falls_back_to_default() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::remove_var("DATABASE_URL");

        let config = StoreConfig::load_from_env().expect("config loads");
        assert_eq!(config.database_url(), DEFAULT_DATABASE_URL);
        assert_eq!(config.max_connections(), None);

        set_env();
    }

    #[test]
    fn env_vars_are_trimmed_and_empty_is_absent() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("DATABASE_URL", "  sqlite://trim.db  ");
        std::env::set_var("DATABASE_MAX_CONNECTIONS", "   ");

        let config = StoreConfig::load_from_env().expect("config loads");
        assert_eq!(config.database_url(), "sqlite://trim.db");
        assert_eq!(config.max_connections(), None);

        set_env();
    }

    #[test]
    fn malformed_connection_count_is_rejected() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("DATABASE_MAX_CONNECTIONS", "many");

        let err = StoreConfig::load_from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                key: "DATABASE_MAX_CONNECTIONS",
                ..
            }
        ));

        set_env();
    }
}
