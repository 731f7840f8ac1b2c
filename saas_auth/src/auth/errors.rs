//! Authentication error types.

use super::models::UserId;
use crate::email::EmailError;
use thiserror::Error;

/// Broad classification used by the HTTP layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input (400)
    Validation,
    /// Pre-auth rejection: unknown user, wrong password, bad token (401)
    Unauthorized,
    /// State conflict on an otherwise valid request (400)
    Conflict,
    /// Authenticated, but not allowed to act on the target (403)
    Forbidden,
    /// Target of an administrative action does not exist (404)
    NotFound,
    /// Database, mailer or signing key failure (500)
    Dependency,
}

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Email delivery failed
    #[error("Email delivery failed: {0}")]
    Email(#[from] EmailError),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// JWT token error
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    /// A signing secret is empty or missing
    #[error("Signing secret for {0} tokens is not configured")]
    SigningKeyMissing(&'static str),

    /// Every candidate code is held live by another user
    #[error("Could not issue a unique code, please try again")]
    CodeUnavailable,

    /// Required request field absent or blank
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Email address failed syntax validation
    #[error("Please supply a valid email")]
    InvalidEmail,

    /// Role name did not resolve
    #[error("Invalid role name {0}")]
    InvalidRole(String),

    /// Plan name did not resolve
    #[error("Invalid plan name {0}")]
    InvalidPlan(String),

    /// Email already owned by a verified account
    #[error("This email is already taken, sorry")]
    EmailTaken,

    /// User not found
    #[error("User not found")]
    UserNotFound,

    /// Account soft-deleted
    #[error("The account of this user has been deleted")]
    AccountDeleted,

    /// Account still pending signup verification
    #[error("This account is waiting for a verification; if you did register it, check your emails")]
    AccountNotVerified,

    /// Account already verified
    #[error("This account has already been verified, you can log in")]
    AlreadyVerified,

    /// Account has no role or plan attached
    #[error("This account has no role or plan attached")]
    AccountIncomplete,

    /// Password verification failed
    #[error("Wrong password")]
    InvalidPassword,

    /// Signup code unknown
    #[error("This code is not valid, it may be expired")]
    CodeInvalid,

    /// Signup code belongs to a user that no longer exists
    #[error("A user for this code was not found")]
    CodeOwnerMissing,

    /// Signup code past its time-to-live
    #[error("This code has expired, please ask for a new one")]
    CodeExpired,

    /// Reset code unknown, mismatched or expired
    #[error("Password reset code is invalid or has expired")]
    InvalidResetCode,

    /// Refresh token unknown
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    /// Refresh token past its expiry
    #[error("Session expired")]
    SessionExpired,

    /// No token presented
    #[error("You must be authenticated for this action")]
    TokenMissing,

    /// Token signature or expiry valid but past its lifetime
    #[error("Token expired")]
    TokenExpired,

    /// Token malformed, forged, revoked or unknown
    #[error("Token is not valid")]
    TokenInvalid,

    /// Caller lacks the admin role needed to act on another account
    #[error("You must have admin role to {0}")]
    AdminRequired(&'static str),

    /// The root account cannot be revoked or purged
    #[error("Revocation request includes the protected root user and cannot be processed")]
    ProtectedRootUser,

    /// Target account of an administrative action does not exist
    #[error("User {0} not found")]
    TargetNotFound(UserId),

    /// Social provider returned no usable email
    #[error("No email found, please log in with a different method")]
    SocialEmailMissing,
}

impl AuthError {
    /// Status classification for the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Database(_)
            | AuthError::Email(_)
            | AuthError::HashingFailed
            | AuthError::JwtError(_)
            | AuthError::SigningKeyMissing(_)
            | AuthError::CodeUnavailable => ErrorKind::Dependency,

            AuthError::MissingField(_)
            | AuthError::InvalidEmail
            | AuthError::InvalidRole(_)
            | AuthError::InvalidPlan(_)
            | AuthError::CodeInvalid
            | AuthError::CodeExpired
            | AuthError::CodeOwnerMissing
            | AuthError::InvalidResetCode
            | AuthError::SocialEmailMissing => ErrorKind::Validation,

            AuthError::EmailTaken | AuthError::AlreadyVerified | AuthError::AccountIncomplete => {
                ErrorKind::Conflict
            }

            AuthError::AdminRequired(_) | AuthError::ProtectedRootUser => ErrorKind::Forbidden,

            AuthError::TargetNotFound(_) => ErrorKind::NotFound,

            AuthError::UserNotFound
            | AuthError::AccountDeleted
            | AuthError::AccountNotVerified
            | AuthError::InvalidPassword
            | AuthError::InvalidRefreshToken
            | AuthError::SessionExpired
            | AuthError::TokenMissing
            | AuthError::TokenExpired
            | AuthError::TokenInvalid => ErrorKind::Unauthorized,
        }
    }

    /// Machine-readable code returned alongside the message, if any.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            AuthError::AccountDeleted => Some("ACCOUNT_DELETED"),
            AuthError::AccountNotVerified => Some("ACCOUNT_WAITING_FOR_VERIFICATION"),
            AuthError::AccountIncomplete => Some("ACCOUNT_INCOMPLETE"),
            AuthError::EmailTaken => Some("EMAIL_EXISTS_ALREADY"),
            AuthError::MissingField("email") => Some("EMAIL_NOT_FOUND"),
            AuthError::MissingField("password") => Some("PASSWORD_NOT_FOUND"),
            AuthError::MissingField("code") => Some("CODE_NOT_FOUND"),
            AuthError::MissingField("notificationPreferences") => Some("PREFERENCES_NOT_FOUND"),
            AuthError::CodeInvalid => Some("CODE_INVALID"),
            AuthError::CodeExpired => Some("CODE_EXPIRED"),
            AuthError::InvalidResetCode => Some("CODE_INVALID_OR_EXPIRED"),
            AuthError::TokenMissing => Some("NO_TOKEN"),
            AuthError::TokenExpired | AuthError::SessionExpired => Some("EXPIRED_TOKEN"),
            AuthError::TokenInvalid | AuthError::InvalidRefreshToken => Some("BAD_TOKEN"),
            _ => None,
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Dependency failures are collapsed into a generic message; the full cause
    /// is only meant for server logs.
    pub fn client_message(&self) -> String {
        match self.kind() {
            ErrorKind::Dependency => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
