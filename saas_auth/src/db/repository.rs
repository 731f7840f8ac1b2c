//! Repository trait definitions for testability and dependency injection.
//!
//! Every query that touches users takes an explicit [`Visibility`]; nothing is
//! filtered implicitly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::{
    AccessTokenRecord, AuthResult, NewUser, NotificationTokenRecord, Plan, PlanId,
    RefreshTokenRecord, Role, RoleId, User, UserId, VerificationCode,
};

/// Which users a lookup may return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    pub include_deleted: bool,
    pub include_unverified: bool,
}

impl Visibility {
    /// Verified, non-deleted users only
    pub const DEFAULT: Visibility = Visibility {
        include_deleted: false,
        include_unverified: false,
    };

    /// Every user record
    pub const ALL: Visibility = Visibility {
        include_deleted: true,
        include_unverified: true,
    };

    /// Non-deleted users, verified or not
    pub const UNVERIFIED: Visibility = Visibility {
        include_deleted: false,
        include_unverified: true,
    };

    pub fn admits(&self, user: &User) -> bool {
        (self.include_deleted || !user.is_deleted) && (self.include_unverified || user.is_verified)
    }
}

/// Trait for user repository operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user
    async fn create(&self, user: NewUser) -> AuthResult<User>;

    /// Find user by normalized email. When several records share the email
    /// (a deleted one and a live one), the live one wins.
    async fn find_by_email(&self, email: &str, visibility: Visibility) -> AuthResult<Option<User>>;

    /// Find user by ID
    async fn find_by_id(&self, id: UserId, visibility: Visibility) -> AuthResult<Option<User>>;

    /// Verified, non-deleted user whose reset code matches and is unexpired at `now`
    async fn find_by_reset_code(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<User>>;

    /// Persist every mutable field of `user` and bump `updated_at`
    async fn update(&self, user: &User) -> AuthResult<User>;

    /// Mark user as deleted
    async fn soft_delete(&self, id: UserId) -> AuthResult<()>;

    /// Physically remove a user (administrative purge)
    async fn purge(&self, id: UserId) -> AuthResult<()>;

    /// Cheap connectivity probe
    async fn ping(&self) -> AuthResult<()>;
}

/// Trait for role and plan lookups
#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    /// Exact, case-sensitive name match
    async fn find_role(&self, name: &str) -> AuthResult<Option<Role>>;

    /// Exact, case-sensitive name match
    async fn find_plan(&self, name: &str) -> AuthResult<Option<Plan>>;

    async fn roles_by_ids(&self, ids: &[RoleId]) -> AuthResult<Vec<Role>>;

    async fn plan_by_id(&self, id: PlanId) -> AuthResult<Option<Plan>>;
}

/// Trait for signup verification code storage
#[async_trait]
pub trait VerificationCodeRepository: Send + Sync {
    /// Drop every outstanding code of the user and store the new one
    async fn replace_for_user(
        &self,
        user_id: UserId,
        code: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<VerificationCode>;

    async fn find_by_code(&self, code: &str) -> AuthResult<Option<VerificationCode>>;

    async fn delete(&self, id: i64) -> AuthResult<()>;

    /// Remove records whose expiry is before `before`; returns the count
    async fn purge_expired(&self, before: DateTime<Utc>) -> AuthResult<u64>;
}

/// Trait for access, refresh and notification token storage
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn save_access(&self, record: &AccessTokenRecord) -> AuthResult<()>;

    async fn find_access(&self, token: &str) -> AuthResult<Option<AccessTokenRecord>>;

    /// Mark every access token of the user as revoked
    async fn revoke_access_for_user(&self, user_id: UserId) -> AuthResult<u64>;

    async fn save_refresh(&self, record: &RefreshTokenRecord) -> AuthResult<()>;

    async fn find_refresh(&self, token: &str) -> AuthResult<Option<RefreshTokenRecord>>;

    async fn delete_refresh(&self, token: &str) -> AuthResult<()>;

    async fn delete_refresh_for_user(&self, user_id: UserId) -> AuthResult<u64>;

    async fn save_notification(&self, record: &NotificationTokenRecord) -> AuthResult<()>;

    async fn find_notification(&self, token: &str) -> AuthResult<Option<NotificationTokenRecord>>;

    /// Remove token records of every kind whose expiry is before `before`
    async fn purge_expired(&self, before: DateTime<Utc>) -> AuthResult<u64>;
}
