//! Session lifecycle controller.

use super::{
    address::{is_valid_email, normalize_email},
    codes::{CodeCheck, CodeIssuer, CodePurpose},
    errors::{AuthError, AuthResult},
    models::{
        AccountState, CodeDelivery, NewUser, NotificationChannel, NotificationPreferences,
        PasswordResetConfirm, Plan, Role, SessionTokens, SignedIn, SigninRequest, SignupRequest,
        SocialProfile, User, UserId, UserProfile,
    },
    notification::NotificationTokens,
    password::CredentialVerifier,
    tokens::TokenIssuer,
};
use crate::{
    config::{AuthConfig, RunMode, Secrets},
    db::repository::{
        DirectoryRepository, TokenRepository, UserRepository, VerificationCodeRepository,
        Visibility,
    },
    email::{templates::EmailTemplate, EmailMessage, EmailSender},
};
use chrono::Utc;
use std::sync::Arc;

/// Role whose priority (or higher) grants administrative rights
pub const ADMIN_ROLE: &str = "admin";

/// Storage collaborators consumed by [`SessionManager`]
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub directory: Arc<dyn DirectoryRepository>,
    pub codes: Arc<dyn VerificationCodeRepository>,
    pub tokens: Arc<dyn TokenRepository>,
}

/// Counts reported by [`SessionManager::cleanup_expired`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub verification_codes: u64,
    pub tokens: u64,
}

/// Drives signup, verification, signin, password reset, refresh, signout
/// and social login.
///
/// Configuration is fixed at construction time.
#[derive(Clone)]
pub struct SessionManager {
    config: Arc<AuthConfig>,
    repos: Repositories,
    mailer: Arc<dyn EmailSender>,
    credentials: CredentialVerifier,
    codes: CodeIssuer,
    tokens: TokenIssuer,
    notifications: NotificationTokens,
}

fn required<'a>(value: &'a str, field: &'static str) -> AuthResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        Err(AuthError::MissingField(field))
    } else {
        Ok(value)
    }
}

/// Trimmed, normalized and syntax-checked email
fn checked_email(email: &str) -> AuthResult<String> {
    required(email, "email")?;
    if !is_valid_email(email) {
        return Err(AuthError::InvalidEmail);
    }
    normalize_email(email).ok_or(AuthError::MissingField("email"))
}

impl SessionManager {
    pub fn new(
        config: AuthConfig,
        secrets: Secrets,
        repos: Repositories,
        mailer: Arc<dyn EmailSender>,
    ) -> Self {
        let credentials =
            CredentialVerifier::new(secrets.password_pepper, secrets.override_password);
        let codes = CodeIssuer::new(
            repos.codes.clone(),
            config.code_length,
            config.verification_code_ttl,
            config.reset_code_ttl,
        );
        let tokens = TokenIssuer::new(
            repos.tokens.clone(),
            secrets.access_token_secret,
            config.access_token_ttl,
            config.refresh_token_ttl,
            config.session_refresh_token_ttl,
        );
        let notifications = NotificationTokens::new(
            repos.tokens.clone(),
            secrets.notification_token_secret,
            config.notification_token_ttl,
        );

        if credentials.override_enabled() {
            log::warn!("Override password is enabled; any account can be opened with it");
        }

        Self {
            config: Arc::new(config),
            repos,
            mailer,
            credentials,
            codes,
            tokens,
            notifications,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Register a new local account in the pending-verification state and
    /// mail it a signup code.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidEmail` - Email fails syntax validation
    /// * `AuthError::InvalidRole` / `AuthError::InvalidPlan` - Default or forced name not found
    /// * `AuthError::EmailTaken` - A verified account owns the email
    /// * `AuthError::AccountNotVerified` - An unverified account owns the email
    /// * `AuthError::Email` - The code could not be delivered
    pub async fn signup(&self, request: SignupRequest) -> AuthResult<CodeDelivery> {
        let email = checked_email(&request.email)?;
        let password = required(&request.password, "password")?;

        let test_mode = self.config.mode == RunMode::Test;
        let role_name = request
            .force_role
            .filter(|_| test_mode)
            .unwrap_or_else(|| self.config.default_role.clone());
        let plan_name = request
            .force_plan
            .filter(|_| test_mode)
            .unwrap_or_else(|| self.config.default_plan.clone());

        let role = self
            .repos
            .directory
            .find_role(&role_name)
            .await?
            .ok_or(AuthError::InvalidRole(role_name))?;
        let plan = self
            .repos
            .directory
            .find_plan(&plan_name)
            .await?
            .ok_or(AuthError::InvalidPlan(plan_name))?;

        if let Some(existing) = self
            .repos
            .users
            .find_by_email(&email, Visibility::UNVERIFIED)
            .await?
        {
            return Err(if existing.is_verified {
                AuthError::EmailTaken
            } else {
                AuthError::AccountNotVerified
            });
        }

        let user = self
            .repos
            .users
            .create(NewUser {
                email,
                password_hash: Some(self.credentials.hash(password)?),
                social_id: None,
                first_name: request.first_name.trim().to_string(),
                last_name: request.last_name.trim().to_string(),
                role_ids: vec![role.id],
                plan_id: Some(plan.id),
                is_verified: false,
            })
            .await?;

        log::info!("User {} signed up, pending verification", user.id);

        let issued = self
            .codes
            .issue(user.id, CodePurpose::SignupVerification, Utc::now())
            .await?;
        self.send(
            &user.email,
            EmailTemplate::SignupCodeSent {
                first_name: &user.first_name,
                last_name: &user.last_name,
                code: &issued.code,
            },
        )
        .await?;

        Ok(self.delivery(
            format!("A verification code has been sent to {}", user.email),
            user.email,
            issued.code,
        ))
    }

    /// Issue a fresh signup code, invalidating earlier ones.
    pub async fn resend_signup_code(&self, email: &str) -> AuthResult<CodeDelivery> {
        let email = required(email, "email")?;
        let email = normalize_email(email).ok_or(AuthError::MissingField("email"))?;

        let user = self
            .repos
            .users
            .find_by_email(&email, Visibility::UNVERIFIED)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if user.is_verified {
            return Err(AuthError::AlreadyVerified);
        }

        let issued = self
            .codes
            .issue(user.id, CodePurpose::SignupVerification, Utc::now())
            .await?;
        self.send(
            &user.email,
            EmailTemplate::SignupCodeResent {
                first_name: &user.first_name,
                last_name: &user.last_name,
                code: &issued.code,
            },
        )
        .await?;

        Ok(self.delivery(
            format!("A new verification code has been sent to {}", user.email),
            user.email,
            issued.code,
        ))
    }

    /// Consume a signup code and mark its owner verified.
    pub async fn verify_signup(&self, code: &str) -> AuthResult<UserProfile> {
        let code = required(code, "code")?;

        let record = match self.codes.validate(code, Utc::now()).await? {
            CodeCheck::Valid(record) => record,
            CodeCheck::Invalid => return Err(AuthError::CodeInvalid),
            CodeCheck::Expired => return Err(AuthError::CodeExpired),
        };

        let mut user = self
            .repos
            .users
            .find_by_id(record.user_id, Visibility::UNVERIFIED)
            .await?
            .ok_or(AuthError::CodeOwnerMissing)?;
        if user.is_verified {
            self.codes.consume(&record).await?;
            return Err(AuthError::AlreadyVerified);
        }

        user.is_verified = true;
        let user = self.repos.users.update(&user).await?;
        self.codes.consume(&record).await?;

        log::info!("User {} verified", user.id);

        self.send(
            &user.email,
            EmailTemplate::SignupCompleted {
                first_name: &user.first_name,
                last_name: &user.last_name,
            },
        )
        .await?;
        self.audit(
            "User sign up",
            format!(
                "Sign up of user {} {} (email: {})",
                user.first_name, user.last_name, user.email
            ),
        )
        .await;

        self.profile_of(&user).await
    }

    /// Authenticate with email and password.
    ///
    /// Deleted and unverified accounts are looked up too, so that each gets
    /// its own error code.
    pub async fn signin(&self, request: SigninRequest) -> AuthResult<SignedIn> {
        let email = checked_email(&request.email)?;

        let user = self
            .repos
            .users
            .find_by_email(&email, Visibility::ALL)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        match user.state() {
            AccountState::Deleted => return Err(AuthError::AccountDeleted),
            AccountState::PendingVerification => return Err(AuthError::AccountNotVerified),
            AccountState::Verified => {}
        }

        if request.password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }
        if !self
            .credentials
            .authenticate(&request.password, user.password_hash.as_deref())
        {
            log::warn!("Rejected sign-in for user {}: wrong password", user.id);
            return Err(AuthError::InvalidPassword);
        }

        let tokens = self
            .tokens
            .issue_pair(user.id, request.remember_me, Utc::now())
            .await?;
        let profile = self.profile_of(&user).await?;

        log::info!("User {} signed in", user.id);
        self.audit(
            "User sign in",
            format!(
                "Sign in of user {} {} (email: {})",
                user.first_name, user.last_name, user.email
            ),
        )
        .await;

        Ok(SignedIn { profile, tokens })
    }

    /// Start a password reset.
    ///
    /// The response is the same whether or not the email belongs to an
    /// account.
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<CodeDelivery> {
        let requested = required(email, "email")?.to_string();
        self.reset_flow(requested).await
    }

    /// Same as [`request_password_reset`](Self::request_password_reset) with
    /// an up-front syntax check.
    pub async fn resend_password_reset(&self, email: &str) -> AuthResult<CodeDelivery> {
        let requested = required(email, "email")?.to_string();
        if !is_valid_email(&requested) {
            return Err(AuthError::InvalidEmail);
        }
        self.reset_flow(requested).await
    }

    async fn reset_flow(&self, requested: String) -> AuthResult<CodeDelivery> {
        let mut issued_code = None;

        if let Some(email) = normalize_email(&requested)
            && let Some(mut user) = self
                .repos
                .users
                .find_by_email(&email, Visibility::DEFAULT)
                .await?
        {
            let issued = self
                .codes
                .issue(user.id, CodePurpose::PasswordReset, Utc::now())
                .await?;
            user.reset_password_code = Some(issued.code.clone());
            user.reset_password_expires = Some(issued.expires_at);
            let user = self.repos.users.update(&user).await?;

            self.send(
                &user.email,
                EmailTemplate::ResetCodeSent {
                    first_name: &user.first_name,
                    last_name: &user.last_name,
                    code: &issued.code,
                },
            )
            .await?;
            log::info!("Password reset code issued for user {}", user.id);
            issued_code = Some(issued.code);
        } else {
            log::debug!("Password reset requested for an unknown email");
        }

        let medium = self.config.code_delivery_medium.clone();
        Ok(CodeDelivery {
            message: format!(
                "If the account exists, a reset code has been sent to {} via {}.",
                requested, medium
            ),
            medium,
            email: requested,
            code: issued_code.filter(|_| self.config.exposes_codes()),
        })
    }

    /// Set a new password with a valid reset code.
    pub async fn confirm_password_reset(&self, request: PasswordResetConfirm) -> AuthResult<()> {
        let email = required(&request.email, "email")?;
        let password = required(&request.password, "password")?;
        let code = required(&request.code, "code")?;
        let email = normalize_email(email).ok_or(AuthError::MissingField("email"))?;

        let mut user = self
            .repos
            .users
            .find_by_reset_code(&email, code, Utc::now())
            .await?
            .ok_or(AuthError::InvalidResetCode)?;

        user.password_hash = Some(self.credentials.hash(password)?);
        user.reset_password_code = None;
        user.reset_password_expires = None;
        self.repos.users.update(&user).await?;

        log::info!("Password reset completed for user {}", user.id);
        Ok(())
    }

    /// Exchange a refresh token for a new access token. The refresh token
    /// itself stays valid until it expires.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<SessionTokens> {
        let now = Utc::now();
        let record = self
            .tokens
            .check_refresh_token(refresh_token.trim(), now)
            .await?;

        let user = self
            .repos
            .users
            .find_by_id(record.user_id, Visibility::DEFAULT)
            .await?;
        if user.is_none() {
            log::warn!(
                "Refresh token of user {} presented, but the account is gone",
                record.user_id
            );
            return Err(AuthError::InvalidRefreshToken);
        }

        self.tokens.refresh(&record.token, now).await
    }

    /// Revoke every access token record and drop every refresh token of the user.
    pub async fn signout(&self, user_id: UserId) -> AuthResult<()> {
        let revoked = self.repos.tokens.revoke_access_for_user(user_id).await?;
        let dropped = self.repos.tokens.delete_refresh_for_user(user_id).await?;
        log::info!(
            "User {} signed out ({} access, {} refresh tokens invalidated)",
            user_id,
            revoked,
            dropped
        );
        Ok(())
    }

    /// Sign in (or register) through an identity returned by a social provider.
    pub async fn social_login(
        &self,
        profile: SocialProfile,
        remember_me: bool,
    ) -> AuthResult<SignedIn> {
        let email = profile
            .preferred_email()
            .and_then(normalize_email)
            .ok_or(AuthError::SocialEmailMissing)?;
        let social_id = profile.social_id();

        let user = match self
            .repos
            .users
            .find_by_email(&email, Visibility::ALL)
            .await?
        {
            Some(mut user) => {
                match user.state() {
                    AccountState::Deleted => return Err(AuthError::AccountDeleted),
                    AccountState::PendingVerification => {
                        return Err(AuthError::AccountNotVerified);
                    }
                    AccountState::Verified => {}
                }
                if user.role_ids.is_empty() || user.plan_id.is_none() {
                    return Err(AuthError::AccountIncomplete);
                }
                if user.social_id.is_none() {
                    user.social_id = Some(social_id);
                    user = self.repos.users.update(&user).await?;
                    log::info!("Linked {} identity to user {}", profile.provider, user.id);
                }
                user
            }
            None => {
                let role = self
                    .repos
                    .directory
                    .find_role(&self.config.default_role)
                    .await?
                    .ok_or_else(|| AuthError::InvalidRole(self.config.default_role.clone()))?;
                let plan = self
                    .repos
                    .directory
                    .find_plan(&self.config.default_plan)
                    .await?
                    .ok_or_else(|| AuthError::InvalidPlan(self.config.default_plan.clone()))?;

                let user = self
                    .repos
                    .users
                    .create(NewUser {
                        email,
                        password_hash: None,
                        social_id: Some(social_id),
                        first_name: profile.given_name.clone().unwrap_or_default(),
                        last_name: profile.family_name.clone().unwrap_or_default(),
                        role_ids: vec![role.id],
                        plan_id: Some(plan.id),
                        is_verified: true,
                    })
                    .await?;
                log::info!("User {} registered through {}", user.id, profile.provider);
                user
            }
        };

        let tokens = self
            .tokens
            .issue_pair(user.id, remember_me, Utc::now())
            .await?;
        let signed_in = SignedIn {
            profile: self.profile_of(&user).await?,
            tokens,
        };

        self.audit(
            "User social sign in",
            format!(
                "Social sign in with ({}) provider of user {} {} (email: {})",
                profile.provider, user.first_name, user.last_name, user.email
            ),
        )
        .await;

        Ok(signed_in)
    }

    /// Resolve an access token to its user.
    ///
    /// Signature and expiry are checked first; a revoked audit record or a
    /// user that is gone also makes the token invalid.
    pub async fn verify_access_token(&self, token: &str) -> AuthResult<User> {
        let claims = self.tokens.verify_access_token(token.trim())?;

        if let Some(record) = self.repos.tokens.find_access(token.trim()).await?
            && record.is_revoked
        {
            return Err(AuthError::TokenInvalid);
        }

        self.repos
            .users
            .find_by_id(claims.sub, Visibility::DEFAULT)
            .await?
            .ok_or(AuthError::TokenInvalid)
    }

    /// Token for an out-of-band link bound to `channel`.
    pub async fn issue_notification_token(
        &self,
        user_id: UserId,
        channel: NotificationChannel,
    ) -> AuthResult<String> {
        self.notifications.issue(user_id, channel, Utc::now()).await
    }

    /// Resolve a notification token to the channel and user it was issued for.
    pub async fn notification_token_user(
        &self,
        token: &str,
    ) -> AuthResult<(NotificationChannel, User)> {
        let claims = self.notifications.verify(token.trim(), Utc::now()).await?;
        let user = self
            .repos
            .users
            .find_by_id(claims.sub, Visibility::DEFAULT)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        Ok((claims.channel, user))
    }

    /// Resolve a notification token to the channel and profile it was issued for.
    pub async fn verify_notification_token(
        &self,
        token: &str,
    ) -> AuthResult<(NotificationChannel, UserProfile)> {
        let (channel, user) = self.notification_token_user(token).await?;
        Ok((channel, self.profile_of(&user).await?))
    }

    /// Replace the notification preferences of `caller`, or of `target` when
    /// the caller is an administrator.
    ///
    /// `caller` comes from either an access token or a notification token.
    ///
    /// # Errors
    ///
    /// * `AuthError::AdminRequired` - `target` is someone else and the caller is no admin
    /// * `AuthError::MissingField` - No preferences supplied
    /// * `AuthError::TargetNotFound` - `target` is not a live, verified user
    pub async fn save_notification_preferences(
        &self,
        caller: &User,
        target: Option<UserId>,
        preferences: Option<NotificationPreferences>,
    ) -> AuthResult<UserProfile> {
        let user_id = self
            .acting_on(caller, target, "save notification preferences for another user")
            .await?;
        let preferences = preferences.ok_or(AuthError::MissingField("notificationPreferences"))?;

        let mut user = self
            .repos
            .users
            .find_by_id(user_id, Visibility::DEFAULT)
            .await?
            .ok_or(AuthError::TargetNotFound(user_id))?;
        user.notification_preferences = preferences;
        let user = self.repos.users.update(&user).await?;

        log::info!(
            "Notification preferences of user {} updated by user {}",
            user.id,
            caller.id
        );
        self.profile_of(&user).await
    }

    /// Close an account: sign it out everywhere and soft-delete it.
    ///
    /// Users may revoke themselves; administrators may revoke anyone but the
    /// root account. The record is kept, so the email can be registered again.
    pub async fn revoke_account(&self, caller: &User, target: Option<UserId>) -> AuthResult<()> {
        let user_id = self
            .acting_on(caller, target, "revoke another user's account")
            .await?;

        let user = self
            .repos
            .users
            .find_by_id(user_id, Visibility::UNVERIFIED)
            .await?
            .ok_or(AuthError::TargetNotFound(user_id))?;
        if user.is_root {
            return Err(AuthError::ProtectedRootUser);
        }

        self.signout(user.id).await?;
        self.repos.users.soft_delete(user.id).await?;

        log::info!("User {} revoked by user {}", user.id, caller.id);
        self.audit(
            "User revoke",
            format!(
                "Revocation of user {} {} (email: {})",
                user.first_name, user.last_name, user.email
            ),
        )
        .await;
        Ok(())
    }

    /// Physically remove an account, deleted or not, with its codes and
    /// tokens. Administrators only; the root account is refused.
    pub async fn purge_account(&self, caller: &User, target: UserId) -> AuthResult<()> {
        if !self.is_administrator(caller).await? {
            return Err(AuthError::AdminRequired("purge a user's account"));
        }

        let user = self
            .repos
            .users
            .find_by_id(target, Visibility::ALL)
            .await?
            .ok_or(AuthError::TargetNotFound(target))?;
        if user.is_root {
            return Err(AuthError::ProtectedRootUser);
        }

        self.signout(user.id).await?;
        self.repos.users.purge(user.id).await?;

        log::warn!("User {} purged by user {}", user.id, caller.id);
        self.audit(
            "User purge",
            format!(
                "Purge of user {} {} (email: {})",
                user.first_name, user.last_name, user.email
            ),
        )
        .await;
        Ok(())
    }

    /// Whether any role of `user` ranks at or above the admin role.
    pub async fn is_administrator(&self, user: &User) -> AuthResult<bool> {
        let Some(admin) = self.repos.directory.find_role(ADMIN_ROLE).await? else {
            return Ok(false);
        };
        let roles = self.repos.directory.roles_by_ids(&user.role_ids).await?;
        Ok(roles.iter().any(|role| role.priority >= admin.priority))
    }

    /// Id an account operation applies to. Acting on someone else takes an
    /// administrator.
    async fn acting_on(
        &self,
        caller: &User,
        target: Option<UserId>,
        action: &'static str,
    ) -> AuthResult<UserId> {
        match target {
            Some(id) if id != caller.id => {
                if !self.is_administrator(caller).await? {
                    log::warn!("User {} tried to {} ({})", caller.id, action, id);
                    return Err(AuthError::AdminRequired(action));
                }
                Ok(id)
            }
            _ => Ok(caller.id),
        }
    }

    /// Profile of a verified, live user
    pub async fn profile(&self, user_id: UserId) -> AuthResult<UserProfile> {
        let user = self
            .repos
            .users
            .find_by_id(user_id, Visibility::DEFAULT)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        self.profile_of(&user).await
    }

    /// Drop expired codes and tokens. Expiry is always checked at use time;
    /// this only reclaims space.
    pub async fn cleanup_expired(&self) -> AuthResult<CleanupReport> {
        let now = Utc::now();
        let report = CleanupReport {
            verification_codes: self.repos.codes.purge_expired(now).await?,
            tokens: self.repos.tokens.purge_expired(now).await?,
        };
        if report.verification_codes + report.tokens > 0 {
            log::info!(
                "Purged {} expired codes and {} expired tokens",
                report.verification_codes,
                report.tokens
            );
        }
        Ok(report)
    }

    /// Store connectivity check
    pub async fn health(&self) -> AuthResult<()> {
        self.repos.users.ping().await
    }

    async fn profile_of(&self, user: &User) -> AuthResult<UserProfile> {
        let roles: Vec<Role> = self.repos.directory.roles_by_ids(&user.role_ids).await?;
        let plan: Option<Plan> = match user.plan_id {
            Some(id) => self.repos.directory.plan_by_id(id).await?,
            None => None,
        };

        Ok(UserProfile {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            roles,
            plan,
            just_registered: user.just_registered,
            notification_preferences: user.notification_preferences.clone(),
        })
    }

    fn delivery(&self, message: String, email: String, code: String) -> CodeDelivery {
        if self.config.exposes_codes() {
            log::debug!("Code for {}: {}", email, code);
        }
        CodeDelivery {
            message,
            medium: self.config.code_delivery_medium.clone(),
            email,
            code: self.config.exposes_codes().then_some(code),
        }
    }

    async fn send(&self, to: &str, template: EmailTemplate<'_>) -> AuthResult<()> {
        let rendered = template.render();
        self.mailer
            .send_email(EmailMessage {
                to: to.to_string(),
                from: self.config.email_from.clone(),
                subject: rendered.subject,
                html: rendered.html,
            })
            .await?;
        Ok(())
    }

    /// Log an audit line and copy it to the audit inbox. Delivery failures
    /// are logged only.
    async fn audit(&self, subject: &str, body: String) {
        log::info!(target: "audit", "{}: {}", subject, body);

        let Some(to) = self.config.audit_email.as_deref() else {
            return;
        };
        if let Err(e) = self
            .send(
                to,
                EmailTemplate::Audit {
                    subject,
                    body: &body,
                },
            )
            .await
        {
            log::error!("Failed to send audit email: {}", e);
        }
    }
}
