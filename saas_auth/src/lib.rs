//! # saas_auth
//!
//! Account and session lifecycle core for a multi-tenant SaaS backend.
//!
//! A user moves through `PendingVerification -> Verified`, and may later be
//! soft-deleted. Everything that moves it, from signup and code verification
//! to signin, password reset, refresh and social login, goes through
//! [`auth::SessionManager`].
//!
//! ## Core Modules
//!
//! - [`auth`]: session controller, code and token issuers, credential checks
//! - [`config`]: immutable lifecycle configuration and secrets
//! - [`db`]: repository traits with PostgreSQL and in-memory implementations
//! - [`email`]: outgoing mail collaborator and templates

/// Session lifecycle, tokens and credentials.
pub mod auth;

/// Lifecycle configuration.
pub mod config;

/// Persistence layer.
pub mod db;

/// Email delivery.
pub mod email;

pub use auth::{AuthError, AuthResult, SessionManager};
pub use config::{AuthConfig, RunMode, Secrets};
