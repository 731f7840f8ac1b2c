//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use chrono::Duration;
use saas_auth::{
    config::{AuthConfig, RunMode, Secrets},
    db::DatabaseConfig,
    email::SmtpConfig,
};
use std::net::SocketAddr;

/// Minimum length of the token signing secrets
pub const MIN_SECRET_CHARS: usize = 32;

/// Minimum length of the password pepper
pub const MIN_PEPPER_CHARS: usize = 16;

const DEFAULT_BIND: ([u8; 4], u16) = ([127, 0, 0, 1], 8080);

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Where accounts and tokens are stored
    pub storage: StorageConfig,
    /// Session lifecycle tunables
    pub auth: AuthConfig,
    /// Signing secrets, pepper and override password
    pub secrets: Secrets,
    /// Outgoing mail relay; mail is only logged when absent
    pub smtp: Option<SmtpConfig>,
    /// Prometheus scrape listener; metrics are off when absent
    pub metrics_bind: Option<SocketAddr>,
    /// OAuth clients for social login
    pub social: Vec<OAuthClientConfig>,
    /// Seconds between expired code/token purges (0 disables)
    pub cleanup_interval_secs: u64,
}

/// Storage backend selection
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Postgres(DatabaseConfig),
    InMemory,
}

/// One OAuth client registration
#[derive(Clone)]
pub struct OAuthClientConfig {
    /// Provider name used in routes, e.g. `google`
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
    /// Absolute callback URL registered with the provider
    pub callback_url: String,
}

impl std::fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("callback_url", &self.callback_url)
            .finish()
    }
}

/// Values given on the command line, taking precedence over the environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<SocketAddr>,
    pub database_url: Option<String>,
    pub in_memory: bool,
}

impl ServerConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(overrides: CliOverrides) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), overrides)
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F, overrides: CliOverrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let bind = match overrides.bind {
            Some(bind) => bind,
            None => env.parse_or("SERVER_BIND", SocketAddr::from(DEFAULT_BIND))?,
        };

        let mode = match env.get("APP_MODE") {
            Some(raw) => RunMode::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                var: "APP_MODE".to_string(),
                reason: format!("Unknown mode {raw:?}; use production, development or test"),
            })?,
            None => RunMode::Development,
        };

        let storage = if overrides.in_memory {
            StorageConfig::InMemory
        } else {
            let database_url = overrides
                .database_url
                .or_else(|| env.get("DATABASE_URL"))
                .ok_or_else(|| ConfigError::MissingRequired {
                    var: "DATABASE_URL".to_string(),
                    hint: "Set a PostgreSQL URL, or start with --in-memory".to_string(),
                })?;
            let pool = DatabaseConfig::default();
            StorageConfig::Postgres(DatabaseConfig {
                database_url,
                max_connections: env.parse_or("DB_MAX_CONNECTIONS", pool.max_connections)?,
                min_connections: env.parse_or("DB_MIN_CONNECTIONS", pool.min_connections)?,
                connection_timeout_secs: env
                    .parse_or("DB_CONNECTION_TIMEOUT_SECS", pool.connection_timeout_secs)?,
                idle_timeout_secs: env.parse_or("DB_IDLE_TIMEOUT_SECS", pool.idle_timeout_secs)?,
                max_lifetime_secs: env.parse_or("DB_MAX_LIFETIME_SECS", pool.max_lifetime_secs)?,
            })
        };

        let defaults = AuthConfig::default();
        let auth = AuthConfig {
            mode,
            access_token_ttl: env.seconds_or("ACCESS_TOKEN_TTL_SECS", defaults.access_token_ttl)?,
            refresh_token_ttl: env
                .seconds_or("REFRESH_TOKEN_TTL_SECS", defaults.refresh_token_ttl)?,
            session_refresh_token_ttl: env.seconds_or(
                "SESSION_REFRESH_TOKEN_TTL_SECS",
                defaults.session_refresh_token_ttl,
            )?,
            verification_code_ttl: env
                .seconds_or("VERIFICATION_CODE_TTL_SECS", defaults.verification_code_ttl)?,
            reset_code_ttl: env.seconds_or("RESET_CODE_TTL_SECS", defaults.reset_code_ttl)?,
            notification_token_ttl: env
                .seconds_or("NOTIFICATION_TOKEN_TTL_SECS", defaults.notification_token_ttl)?,
            code_length: env.parse_or("CODE_LENGTH", defaults.code_length)?,
            code_delivery_medium: env
                .get("CODE_DELIVERY_MEDIUM")
                .unwrap_or(defaults.code_delivery_medium),
            default_role: env.get("DEFAULT_ROLE").unwrap_or(defaults.default_role),
            default_plan: env.get("DEFAULT_PLAN").unwrap_or(defaults.default_plan),
            email_from: env.get("EMAIL_FROM").unwrap_or(defaults.email_from),
            audit_email: env.get("AUDIT_EMAIL"),
            client_base_url: env
                .get("CLIENT_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.client_base_url),
        };

        let secrets = Secrets {
            access_token_secret: env.required(
                "JWT_ACCESS_TOKEN_SECRET",
                "Generate with: openssl rand -hex 32",
            )?,
            notification_token_secret: env.required(
                "JWT_NOTIFICATION_TOKEN_SECRET",
                "Generate with: openssl rand -hex 32",
            )?,
            password_pepper: env
                .required("PASSWORD_PEPPER", "Generate with: openssl rand -hex 16")?,
            override_password: env.get("PASSEPARTOUT_PASSWORD"),
        };

        let smtp = env.get("SMTP_HOST").map(|host| -> Result<SmtpConfig, ConfigError> {
            Ok(SmtpConfig {
                host,
                port: env.parse_or("SMTP_PORT", 587)?,
                username: env.get("SMTP_USERNAME"),
                password: env.get("SMTP_PASSWORD"),
            })
        });
        let smtp = smtp.transpose()?;

        let metrics_bind = match env.get("METRICS_BIND") {
            Some(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("{raw:?} is not an IP:PORT address"),
            })?),
            None => None,
        };

        let social = ["google", "facebook"]
            .into_iter()
            .filter_map(|provider| env.oauth_client(provider))
            .collect();

        let config = ServerConfig {
            bind,
            storage,
            auth,
            secrets,
            smtp,
            metrics_bind,
            social,
            cleanup_interval_secs: env.parse_or("CLEANUP_INTERVAL_SECS", 3600)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (var, value) in [
            ("JWT_ACCESS_TOKEN_SECRET", &self.secrets.access_token_secret),
            (
                "JWT_NOTIFICATION_TOKEN_SECRET",
                &self.secrets.notification_token_secret,
            ),
        ] {
            if value.chars().count() < MIN_SECRET_CHARS {
                return Err(ConfigError::Invalid {
                    var: var.to_string(),
                    reason: format!("Must be at least {MIN_SECRET_CHARS} characters"),
                });
            }
        }

        if self.secrets.password_pepper.chars().count() < MIN_PEPPER_CHARS {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: format!("Must be at least {MIN_PEPPER_CHARS} characters"),
            });
        }

        if self.auth.mode.is_production()
            && self
                .secrets
                .override_password
                .as_deref()
                .is_some_and(|p| !p.is_empty())
        {
            return Err(ConfigError::Invalid {
                var: "PASSEPARTOUT_PASSWORD".to_string(),
                reason: "The override password is not accepted in production mode".to_string(),
            });
        }

        if self.auth.code_length == 0 {
            return Err(ConfigError::Invalid {
                var: "CODE_LENGTH".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.auth.access_token_ttl <= Duration::zero() {
            return Err(ConfigError::Invalid {
                var: "ACCESS_TOKEN_TTL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-blank value of `key`
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str, hint: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingRequired {
            var: key.to_string(),
            hint: hint.to_string(),
        })
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: key.to_string(),
                reason: format!("{raw:?} does not parse"),
            }),
            None => Ok(default),
        }
    }

    fn seconds_or(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let secs: i64 = self.parse_or(key, default.num_seconds())?;
        Ok(Duration::seconds(secs))
    }

    fn oauth_client(&self, provider: &str) -> Option<OAuthClientConfig> {
        let prefix = provider.to_uppercase();
        Some(OAuthClientConfig {
            provider: provider.to_string(),
            client_id: self.get(&format!("{prefix}_CLIENT_ID"))?,
            client_secret: self.get(&format!("{prefix}_CLIENT_SECRET"))?,
            callback_url: self.get(&format!("{prefix}_CALLBACK_URL"))?,
        })
    }
}
