//! Database configuration module.

use std::{env, str::FromStr};

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,

    /// Maximum connection lifetime in seconds
    pub max_lifetime_secs: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring unparsable {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

impl DatabaseConfig {
    /// Pool settings for `database_url`, with sizing taken from the environment:
    ///
    /// - `DB_MAX_CONNECTIONS` (default: 20)
    /// - `DB_MIN_CONNECTIONS` (default: 5)
    /// - `DB_CONNECTION_TIMEOUT_SECS` (default: 10)
    /// - `DB_IDLE_TIMEOUT_SECS` (default: 600)
    /// - `DB_MAX_LIFETIME_SECS` (default: 1800)
    pub fn from_env(database_url: String) -> Self {
        let defaults = Self::development();
        Self {
            database_url,
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: env_or("DB_MIN_CONNECTIONS", defaults.min_connections),
            connection_timeout_secs: env_or(
                "DB_CONNECTION_TIMEOUT_SECS",
                defaults.connection_timeout_secs,
            ),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", defaults.max_lifetime_secs),
        }
    }

    /// Local development defaults against `postgres://postgres@localhost/saas_auth`
    pub fn development() -> Self {
        Self {
            database_url: "postgres://postgres@localhost/saas_auth".to_string(),
            max_connections: 20,
            min_connections: 5,
            connection_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::development()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_keep_url() {
        let config = DatabaseConfig::from_env("postgres://example/db".to_string());
        assert_eq!(config.database_url, "postgres://example/db");
        assert!(config.max_connections >= config.min_connections);
    }
}
