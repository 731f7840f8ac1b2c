//! Authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// User ID type
pub type UserId = i64;

/// Role ID type
pub type RoleId = i64;

/// Plan ID type
pub type PlanId = i64;

/// Lifecycle state derived from the verification and deletion flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    PendingVerification,
    Verified,
    Deleted,
}

/// User model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Normalized email (lowercase, ASCII domain)
    pub email: String,
    /// Absent for social-only accounts
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// `provider:id` of the linked social identity
    pub social_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role_ids: Vec<RoleId>,
    pub plan_id: Option<PlanId>,
    pub is_verified: bool,
    pub is_deleted: bool,
    /// The protected root account cannot be revoked or purged
    pub is_root: bool,
    pub just_registered: bool,
    pub notification_preferences: NotificationPreferences,
    #[serde(skip_serializing)]
    pub reset_password_code: Option<String>,
    #[serde(skip_serializing)]
    pub reset_password_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Current lifecycle state. Deletion wins over verification.
    pub fn state(&self) -> AccountState {
        if self.is_deleted {
            AccountState::Deleted
        } else if self.is_verified {
            AccountState::Verified
        } else {
            AccountState::PendingVerification
        }
    }
}

/// Fields required to insert a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub social_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role_ids: Vec<RoleId>,
    pub plan_id: Option<PlanId>,
    pub is_verified: bool,
}

/// Authorization role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub priority: i32,
}

/// Subscription plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
}

/// Signup verification code record
#[derive(Debug, Clone)]
pub struct VerificationCode {
    pub id: i64,
    pub user_id: UserId,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Persisted mirror of an issued access token
#[derive(Debug, Clone)]
pub struct AccessTokenRecord {
    pub token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
}

/// Opaque refresh token record
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Out-of-band delivery channel a notification token is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Push,
    Sms,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Push => "push",
            NotificationChannel::Sms => "sms",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(NotificationChannel::Email),
            "push" => Some(NotificationChannel::Push),
            "sms" => Some(NotificationChannel::Sms),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-channel notification switches, keyed by topic:
/// `{"email": {"offers": true, "news": false}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationPreferences(pub BTreeMap<NotificationChannel, BTreeMap<String, bool>>);

impl NotificationPreferences {
    /// Whether `topic` is switched on for `channel`. Unset topics are off.
    pub fn is_enabled(&self, channel: NotificationChannel, topic: &str) -> bool {
        self.0
            .get(&channel)
            .and_then(|topics| topics.get(topic))
            .copied()
            .unwrap_or(false)
    }
}

/// Notification token record. `expires_at` is the end of the grace window
/// (twice the token lifetime).
#[derive(Debug, Clone)]
pub struct NotificationTokenRecord {
    pub token: String,
    pub user_id: UserId,
    pub channel: NotificationChannel,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
}

/// JWT claims for access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: UserId,           // User ID
    pub jti: String,           // Unique token id
    pub exp: i64,              // Expiration timestamp
    pub iat: i64,              // Issued at timestamp
}

/// JWT claims for notification token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTokenClaims {
    pub sub: UserId,
    pub channel: NotificationChannel,
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

/// Session tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
}

/// Public view of a user, never carrying credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub roles: Vec<Role>,
    pub plan: Option<Plan>,
    pub just_registered: bool,
    pub notification_preferences: NotificationPreferences,
}

/// User signup request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    /// Honoured in test mode only
    pub force_role: Option<String>,
    /// Honoured in test mode only
    pub force_plan: Option<String>,
}

/// User signin request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
    pub remember_me: bool,
}

/// Result of a successful signin or social login
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub profile: UserProfile,
    pub tokens: SessionTokens,
}

/// Password reset confirmation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PasswordResetConfirm {
    pub email: String,
    pub password: String,
    pub code: String,
}

/// Where a code went. `code` is only filled outside production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeDelivery {
    pub message: String,
    pub medium: String,
    pub email: String,
    pub code: Option<String>,
}

/// One address reported by a social provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialEmail {
    pub value: String,
    pub verified: bool,
}

/// Profile handed over by a social identity provider after OAuth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialProfile {
    pub provider: String,
    pub id: String,
    pub emails: Vec<SocialEmail>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub photo: Option<String>,
}

impl SocialProfile {
    /// `provider:id`
    pub fn social_id(&self) -> String {
        format!("{}:{}", self.provider, self.id)
    }

    /// First verified email, falling back to the first one listed.
    pub fn preferred_email(&self) -> Option<&str> {
        self.emails
            .iter()
            .find(|e| e.verified)
            .or_else(|| self.emails.first())
            .map(|e| e.value.as_str())
            .filter(|v| !v.trim().is_empty())
    }
}
