//! Account and session lifecycle.
//!
//! - Argon2id password hashing with a server-side pepper, plus an optional
//!   operator override password
//! - Time-limited signup verification and password reset codes
//! - HS256 access tokens and opaque, persisted refresh tokens
//! - Notification tokens for out-of-band links
//! - Social identity linking
//!
//! ## Example
//!
//! ```no_run
//! use saas_auth::auth::{SessionManager, SigninRequest, SignupRequest};
//! use saas_auth::config::{AuthConfig, RunMode, Secrets};
//! use saas_auth::db::memory::InMemoryStore;
//! use saas_auth::email::LogEmailSender;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryStore::seeded());
//!     let secrets = Secrets {
//!         access_token_secret: "change-me-change-me-change-me-change-me".to_string(),
//!         notification_token_secret: "change-me-too-change-me-too-change-me".to_string(),
//!         password_pepper: "pepper".to_string(),
//!         override_password: None,
//!     };
//!     let config = AuthConfig { mode: RunMode::Test, ..AuthConfig::default() };
//!     let sessions = SessionManager::new(config, secrets, store.repositories(), Arc::new(LogEmailSender));
//!
//!     let delivery = sessions
//!         .signup(SignupRequest {
//!             email: "ada@example.com".to_string(),
//!             password: "password123".to_string(),
//!             ..SignupRequest::default()
//!         })
//!         .await?;
//!     sessions.verify_signup(delivery.code.as_deref().unwrap_or_default()).await?;
//!
//!     let signed_in = sessions
//!         .signin(SigninRequest {
//!             email: "ada@example.com".to_string(),
//!             password: "password123".to_string(),
//!             remember_me: false,
//!         })
//!         .await?;
//!     println!("Access token: {}", signed_in.tokens.access_token);
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod codes;
pub mod errors;
pub mod manager;
pub mod models;
pub mod notification;
pub mod password;
pub mod tokens;

pub use address::{is_valid_email, normalize_email};
pub use codes::{CodeCheck, CodeIssuer, CodePurpose, IssuedCode};
pub use errors::{AuthError, AuthResult, ErrorKind};
pub use manager::{CleanupReport, Repositories, SessionManager};
pub use models::{
    AccessTokenClaims, AccessTokenRecord, AccountState, CodeDelivery, NewUser,
    NotificationChannel, NotificationPreferences, NotificationTokenClaims, NotificationTokenRecord, PasswordResetConfirm,
    Plan, PlanId, RefreshTokenRecord, Role, RoleId, SessionTokens, SignedIn, SigninRequest,
    SignupRequest, SocialEmail, SocialProfile, User, UserId, UserProfile, VerificationCode,
};
pub use notification::NotificationTokens;
pub use password::CredentialVerifier;
pub use tokens::TokenIssuer;
