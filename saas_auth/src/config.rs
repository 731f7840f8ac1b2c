//! Session lifecycle configuration.
//!
//! Built once at startup and handed to [`SessionManager`](crate::auth::SessionManager);
//! nothing here is mutated afterwards.

use chrono::Duration;

/// Deployment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Production,
    Development,
    Test,
}

impl RunMode {
    /// Parse `production` / `development` / `test` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "production" | "prod" => Some(RunMode::Production),
            "development" | "dev" => Some(RunMode::Development),
            "test" => Some(RunMode::Test),
            _ => None,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, RunMode::Production)
    }
}

/// Signing secrets and operator passwords
#[derive(Clone)]
pub struct Secrets {
    /// HMAC secret for access tokens
    pub access_token_secret: String,
    /// HMAC secret for notification tokens
    pub notification_token_secret: String,
    /// Server-side pepper appended to passwords before hashing
    pub password_pepper: String,
    /// Break-glass operator password accepted for any account
    pub override_password: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("access_token_secret", &"<redacted>")
            .field("notification_token_secret", &"<redacted>")
            .field("password_pepper", &"<redacted>")
            .field("override_password", &self.override_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Lifecycle tunables
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub mode: RunMode,
    /// Access token lifetime
    pub access_token_ttl: Duration,
    /// Refresh token lifetime when "remember me" is requested
    pub refresh_token_ttl: Duration,
    /// Refresh token lifetime for a plain browser session
    pub session_refresh_token_ttl: Duration,
    /// Signup verification code lifetime
    pub verification_code_ttl: Duration,
    /// Password reset code lifetime
    pub reset_code_ttl: Duration,
    /// Notification token lifetime (records live twice as long)
    pub notification_token_ttl: Duration,
    /// Number of characters in issued codes
    pub code_length: usize,
    /// Reported back to clients, e.g. "email"
    pub code_delivery_medium: String,
    pub default_role: String,
    pub default_plan: String,
    /// Sender address for outgoing mail
    pub email_from: String,
    /// Support inbox receiving audit notifications
    pub audit_email: Option<String>,
    /// Front-end origin used for social login redirects
    pub client_base_url: String,
}

impl AuthConfig {
    /// Codes and other debugging aids may be returned to clients outside production.
    pub fn exposes_codes(&self) -> bool {
        !self.mode.is_production()
    }

    /// Refresh token lifetime for the given "remember me" choice.
    pub fn refresh_ttl(&self, remember_me: bool) -> Duration {
        if remember_me {
            self.refresh_token_ttl
        } else {
            self.session_refresh_token_ttl
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Development,
            access_token_ttl: Duration::minutes(30),
            refresh_token_ttl: Duration::days(7),
            session_refresh_token_ttl: Duration::hours(2),
            verification_code_ttl: Duration::hours(1),
            reset_code_ttl: Duration::hours(1),
            notification_token_ttl: Duration::days(7),
            code_length: 6,
            code_delivery_medium: "email".to_string(),
            default_role: "user".to_string(),
            default_plan: "free".to_string(),
            email_from: "no-reply@localhost".to_string(),
            audit_email: None,
            client_base_url: "http://localhost:3000".to_string(),
        }
    }
}
