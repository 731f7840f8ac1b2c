//! Integration tests for the session lifecycle.
//!
//! Runs signup, verification, signin, password reset, refresh, signout,
//! notification tokens and social login against the in-memory store.

use chrono::Duration;
use saas_auth::auth::{
    AuthError, NotificationChannel, PasswordResetConfirm, SessionManager, SigninRequest,
    SignupRequest, SocialEmail, SocialProfile,
};
use saas_auth::config::{AuthConfig, RunMode, Secrets};
use saas_auth::db::{InMemoryStore, UserRepository, Visibility};
use saas_auth::email::RecordingEmailSender;
use std::sync::Arc;

struct Harness {
    sessions: SessionManager,
    store: Arc<InMemoryStore>,
    mailer: Arc<RecordingEmailSender>,
}

fn secrets(override_password: Option<&str>) -> Secrets {
    Secrets {
        access_token_secret: "integration-access-secret-0123456789abcdef".to_string(),
        notification_token_secret: "integration-notify-secret-0123456789abcdef".to_string(),
        password_pepper: "integration-pepper".to_string(),
        override_password: override_password.map(str::to_string),
    }
}

fn harness_with(config: AuthConfig, override_password: Option<&str>) -> Harness {
    let store = Arc::new(InMemoryStore::seeded());
    let mailer = Arc::new(RecordingEmailSender::new());
    let sessions = SessionManager::new(
        config,
        secrets(override_password),
        store.repositories(),
        mailer.clone(),
    );
    Harness {
        sessions,
        store,
        mailer,
    }
}

fn harness() -> Harness {
    harness_with(
        AuthConfig {
            mode: RunMode::Test,
            ..AuthConfig::default()
        },
        None,
    )
}

fn signup_request(email: &str, password: &str) -> SignupRequest {
    SignupRequest {
        email: email.to_string(),
        password: password.to_string(),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        ..SignupRequest::default()
    }
}

fn signin_request(email: &str, password: &str) -> SigninRequest {
    SigninRequest {
        email: email.to_string(),
        password: password.to_string(),
        remember_me: false,
    }
}

/// Sign up and verify, returning nothing; panics on failure
async fn register(h: &Harness, email: &str, password: &str) {
    let delivery = h
        .sessions
        .signup(signup_request(email, password))
        .await
        .expect("signup should succeed");
    let code = delivery.code.expect("test mode exposes the code");
    h.sessions
        .verify_signup(&code)
        .await
        .expect("verification should succeed");
}

#[tokio::test]
async fn test_signup_verify_signin_scenario() {
    let h = harness();

    let delivery = h
        .sessions
        .signup(signup_request("test@example.com", "password123"))
        .await
        .unwrap();
    assert_eq!(delivery.email, "test@example.com");
    assert_eq!(delivery.medium, "email");
    let code = delivery.code.expect("code returned in test mode");
    assert_eq!(code.len(), 6);
    assert!(!code.contains('0'));

    let mails = h.mailer.sent_to("test@example.com");
    assert_eq!(mails.len(), 1);
    assert!(mails[0].html.contains(&code));

    let profile = h.sessions.verify_signup(&code).await.unwrap();
    assert_eq!(profile.email, "test@example.com");
    assert_eq!(profile.roles.len(), 1);
    assert_eq!(profile.roles[0].name, "user");
    assert_eq!(profile.plan.as_ref().map(|p| p.name.as_str()), Some("free"));

    let signed_in = h
        .sessions
        .signin(signin_request("test@example.com", "password123"))
        .await
        .unwrap();
    assert!(!signed_in.tokens.access_token.is_empty());
    assert!(!signed_in.tokens.refresh_token.is_empty());
    assert_eq!(signed_in.profile.first_name, "Test");

    let json = serde_json::to_string(&signed_in.profile).unwrap();
    assert!(!json.to_lowercase().contains("password"));
}

#[tokio::test]
async fn test_verification_code_is_single_use() {
    let h = harness();
    let code = h
        .sessions
        .signup(signup_request("once@example.com", "password123"))
        .await
        .unwrap()
        .code
        .unwrap();

    h.sessions.verify_signup(&code).await.unwrap();

    let err = h.sessions.verify_signup(&code).await.unwrap_err();
    assert!(matches!(err, AuthError::CodeInvalid));
    assert_eq!(err.to_string(), "This code is not valid, it may be expired");
}

#[tokio::test]
async fn test_verification_rejects_missing_and_expired_codes() {
    let h = harness_with(
        AuthConfig {
            mode: RunMode::Test,
            verification_code_ttl: Duration::milliseconds(50),
            ..AuthConfig::default()
        },
        None,
    );

    assert!(matches!(
        h.sessions.verify_signup("  ").await,
        Err(AuthError::MissingField("code"))
    ));

    let code = h
        .sessions
        .signup(signup_request("late@example.com", "password123"))
        .await
        .unwrap()
        .code
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert!(matches!(
        h.sessions.verify_signup(&code).await,
        Err(AuthError::CodeExpired)
    ));
}

#[tokio::test]
async fn test_pending_user_cannot_sign_in_regardless_of_password() {
    let h = harness();
    h.sessions
        .signup(signup_request("pending@example.com", "password123"))
        .await
        .unwrap();

    for password in ["password123", "wrong", ""] {
        let err = h
            .sessions
            .signin(signin_request("pending@example.com", password))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountNotVerified));
        assert_eq!(err.code(), Some("ACCOUNT_WAITING_FOR_VERIFICATION"));
    }
}

#[tokio::test]
async fn test_deleted_user_cannot_sign_in() {
    let h = harness();
    register(&h, "gone@example.com", "password123").await;

    let user = h
        .store
        .find_by_email("gone@example.com", Visibility::DEFAULT)
        .await
        .unwrap()
        .unwrap();
    h.store.soft_delete(user.id).await.unwrap();

    let err = h
        .sessions
        .signin(signin_request("gone@example.com", "password123"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountDeleted));
    assert_eq!(err.code(), Some("ACCOUNT_DELETED"));

    // The record is kept
    assert!(
        h.store
            .find_by_id(user.id, Visibility::ALL)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_unknown_user_and_wrong_password() {
    let h = harness();
    let err = h
        .sessions
        .signin(signin_request("nope@x.com", "whatever"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserNotFound));
    assert_eq!(err.to_string(), "User not found");

    register(&h, "real@example.com", "password123").await;
    assert!(matches!(
        h.sessions
            .signin(signin_request("real@example.com", "password124"))
            .await,
        Err(AuthError::InvalidPassword)
    ));
    assert!(matches!(
        h.sessions
            .signin(signin_request("real@example.com", ""))
            .await,
        Err(AuthError::MissingField("password"))
    ));
}

#[tokio::test]
async fn test_signin_is_case_insensitive_on_email() {
    let h = harness();
    register(&h, "Mixed.Case@Example.com", "password123").await;

    assert!(
        h.sessions
            .signin(signin_request("  mixed.case@EXAMPLE.com ", "password123"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_duplicate_signup() {
    let h = harness();
    h.sessions
        .signup(signup_request("dup@example.com", "password123"))
        .await
        .unwrap();

    let err = h
        .sessions
        .signup(signup_request("dup@example.com", "password123"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("ACCOUNT_WAITING_FOR_VERIFICATION"));

    let h = harness();
    register(&h, "dup@example.com", "password123").await;
    let err = h
        .sessions
        .signup(signup_request("DUP@example.com", "password123"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::EmailTaken));
    assert_eq!(err.code(), Some("EMAIL_EXISTS_ALREADY"));
}

#[tokio::test]
async fn test_signup_validation() {
    let h = harness();
    assert!(matches!(
        h.sessions
            .signup(signup_request("not-an-email", "password123"))
            .await,
        Err(AuthError::InvalidEmail)
    ));
    assert!(matches!(
        h.sessions
            .signup(signup_request("ok@example.com", ""))
            .await,
        Err(AuthError::MissingField("password"))
    ));

    let mut request = signup_request("plan@example.com", "password123");
    request.force_plan = Some("platinum".to_string());
    assert!(matches!(
        h.sessions.signup(request).await,
        Err(AuthError::InvalidPlan(_))
    ));
}

#[tokio::test]
async fn test_resend_signup_code() {
    let h = harness();
    assert!(matches!(
        h.sessions.resend_signup_code("ghost@example.com").await,
        Err(AuthError::UserNotFound)
    ));

    let first = h
        .sessions
        .signup(signup_request("resend@example.com", "password123"))
        .await
        .unwrap()
        .code
        .unwrap();
    let second = h
        .sessions
        .resend_signup_code("resend@example.com")
        .await
        .unwrap()
        .code
        .unwrap();

    assert_eq!(h.store.verification_code_count(), 1);
    if first != second {
        assert!(h.sessions.verify_signup(&first).await.is_err());
    }
    h.sessions.verify_signup(&second).await.unwrap();

    assert!(matches!(
        h.sessions.resend_signup_code("resend@example.com").await,
        Err(AuthError::AlreadyVerified)
    ));
    assert_eq!(h.mailer.sent_to("resend@example.com").len(), 3);
}

#[tokio::test]
async fn test_reset_request_does_not_reveal_accounts() {
    let h = harness();
    register(&h, "known@example.com", "password123").await;

    let known = h
        .sessions
        .request_password_reset("known@example.com")
        .await
        .unwrap();
    let unknown = h
        .sessions
        .request_password_reset("unknown@example.com")
        .await
        .unwrap();

    assert_eq!(known.medium, unknown.medium);
    assert_eq!(
        known.message.replace("known@example.com", "X"),
        unknown.message.replace("unknown@example.com", "X")
    );
    assert!(known.code.is_some());
    assert!(unknown.code.is_none());
    assert!(h.mailer.sent_to("unknown@example.com").is_empty());

    assert!(matches!(
        h.sessions.request_password_reset("").await,
        Err(AuthError::MissingField("email"))
    ));
}

#[tokio::test]
async fn test_reset_password_confirm() {
    let h = harness();
    register(&h, "reset@example.com", "password123").await;

    let code = h
        .sessions
        .request_password_reset("reset@example.com")
        .await
        .unwrap()
        .code
        .unwrap();

    let wrong = PasswordResetConfirm {
        email: "reset@example.com".to_string(),
        password: "newpassword".to_string(),
        code: "000000".to_string(),
    };
    let err = h.sessions.confirm_password_reset(wrong).await.unwrap_err();
    assert_eq!(err.code(), Some("CODE_INVALID_OR_EXPIRED"));

    let missing = PasswordResetConfirm {
        email: "reset@example.com".to_string(),
        password: "newpassword".to_string(),
        code: String::new(),
    };
    assert!(matches!(
        h.sessions.confirm_password_reset(missing).await,
        Err(AuthError::MissingField("code"))
    ));

    h.sessions
        .confirm_password_reset(PasswordResetConfirm {
            email: "reset@example.com".to_string(),
            password: "newpassword".to_string(),
            code: code.clone(),
        })
        .await
        .unwrap();

    assert!(
        h.sessions
            .signin(signin_request("reset@example.com", "newpassword"))
            .await
            .is_ok()
    );
    assert!(matches!(
        h.sessions
            .signin(signin_request("reset@example.com", "password123"))
            .await,
        Err(AuthError::InvalidPassword)
    ));

    // Reset codes are cleared once used
    let replay = PasswordResetConfirm {
        email: "reset@example.com".to_string(),
        password: "another".to_string(),
        code,
    };
    assert!(matches!(
        h.sessions.confirm_password_reset(replay).await,
        Err(AuthError::InvalidResetCode)
    ));
}

#[tokio::test]
async fn test_expired_reset_code() {
    let h = harness_with(
        AuthConfig {
            mode: RunMode::Test,
            reset_code_ttl: Duration::milliseconds(50),
            ..AuthConfig::default()
        },
        None,
    );
    register(&h, "slow@example.com", "password123").await;
    let code = h
        .sessions
        .request_password_reset("slow@example.com")
        .await
        .unwrap()
        .code
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let err = h
        .sessions
        .confirm_password_reset(PasswordResetConfirm {
            email: "slow@example.com".to_string(),
            password: "newpassword".to_string(),
            code,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("CODE_INVALID_OR_EXPIRED"));
}

#[tokio::test]
async fn test_resend_password_reset_validates_syntax() {
    let h = harness();
    assert!(matches!(
        h.sessions.resend_password_reset("no-at-sign").await,
        Err(AuthError::InvalidEmail)
    ));
    let delivery = h
        .sessions
        .resend_password_reset("nobody@example.com")
        .await
        .unwrap();
    assert_eq!(delivery.email, "nobody@example.com");
}

#[tokio::test]
async fn test_refresh_round_trip_and_expiry() {
    let h = harness_with(
        AuthConfig {
            mode: RunMode::Test,
            session_refresh_token_ttl: Duration::milliseconds(300),
            ..AuthConfig::default()
        },
        None,
    );
    register(&h, "refresh@example.com", "password123").await;

    let signed_in = h
        .sessions
        .signin(signin_request("refresh@example.com", "password123"))
        .await
        .unwrap();

    let refreshed = h
        .sessions
        .refresh(&signed_in.tokens.refresh_token)
        .await
        .unwrap();
    assert!(!refreshed.access_token.is_empty());
    assert_eq!(refreshed.refresh_token, signed_in.tokens.refresh_token);

    tokio::time::sleep(std::time::Duration::from_millis(400)).await;

    let err = h
        .sessions
        .refresh(&signed_in.tokens.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionExpired));

    assert!(matches!(
        h.sessions.refresh("not-a-token").await,
        Err(AuthError::InvalidRefreshToken)
    ));
}

#[tokio::test]
async fn test_access_token_verification_and_signout() {
    let h = harness();
    register(&h, "out@example.com", "password123").await;
    let signed_in = h
        .sessions
        .signin(signin_request("out@example.com", "password123"))
        .await
        .unwrap();

    let user = h
        .sessions
        .verify_access_token(&signed_in.tokens.access_token)
        .await
        .unwrap();
    assert_eq!(user.id, signed_in.profile.id);

    h.sessions.signout(user.id).await.unwrap();

    assert!(matches!(
        h.sessions
            .verify_access_token(&signed_in.tokens.access_token)
            .await,
        Err(AuthError::TokenInvalid)
    ));
    assert!(matches!(
        h.sessions.refresh(&signed_in.tokens.refresh_token).await,
        Err(AuthError::InvalidRefreshToken)
    ));
    assert_eq!(h.store.refresh_token_count(), 0);
}

#[tokio::test]
async fn test_override_password() {
    let h = harness_with(
        AuthConfig {
            mode: RunMode::Test,
            ..AuthConfig::default()
        },
        Some("break-glass"),
    );
    register(&h, "support@example.com", "password123").await;

    assert!(
        h.sessions
            .signin(signin_request("support@example.com", "break-glass"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_social_only_account_needs_social_or_override() {
    let h = harness();
    let profile = google_profile("social@example.com", true);
    h.sessions.social_login(profile, false).await.unwrap();

    assert!(matches!(
        h.sessions
            .signin(signin_request("social@example.com", ""))
            .await,
        Err(AuthError::MissingField("password"))
    ));
    assert!(matches!(
        h.sessions
            .signin(signin_request("social@example.com", "anything"))
            .await,
        Err(AuthError::InvalidPassword)
    ));
}

fn google_profile(email: &str, verified: bool) -> SocialProfile {
    SocialProfile {
        provider: "google".to_string(),
        id: "1234567890".to_string(),
        emails: vec![SocialEmail {
            value: email.to_string(),
            verified,
        }],
        given_name: Some("Social".to_string()),
        family_name: Some("Person".to_string()),
        photo: None,
    }
}

#[tokio::test]
async fn test_social_login_creates_verified_user() {
    let h = harness();
    let signed_in = h
        .sessions
        .social_login(google_profile("new@example.com", true), true)
        .await
        .unwrap();

    assert_eq!(signed_in.profile.first_name, "Social");
    assert_eq!(signed_in.profile.roles[0].name, "user");

    let user = h
        .store
        .find_by_email("new@example.com", Visibility::DEFAULT)
        .await
        .unwrap()
        .expect("social users are created verified");
    assert_eq!(user.social_id.as_deref(), Some("google:1234567890"));
    assert!(user.password_hash.is_none());

    // Second login reuses the account
    let again = h
        .sessions
        .social_login(google_profile("new@example.com", true), false)
        .await
        .unwrap();
    assert_eq!(again.profile.id, signed_in.profile.id);
}

#[tokio::test]
async fn test_social_login_links_existing_account() {
    let h = harness();
    register(&h, "linked@example.com", "password123").await;

    h.sessions
        .social_login(google_profile("linked@example.com", true), false)
        .await
        .unwrap();

    let user = h
        .store
        .find_by_email("linked@example.com", Visibility::DEFAULT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.social_id.as_deref(), Some("google:1234567890"));

    // Local password keeps working
    assert!(
        h.sessions
            .signin(signin_request("linked@example.com", "password123"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_social_login_refusals() {
    let h = harness();

    let mut no_email = google_profile("x@example.com", true);
    no_email.emails.clear();
    assert!(matches!(
        h.sessions.social_login(no_email, false).await,
        Err(AuthError::SocialEmailMissing)
    ));

    h.sessions
        .signup(signup_request("waiting@example.com", "password123"))
        .await
        .unwrap();
    assert!(matches!(
        h.sessions
            .social_login(google_profile("waiting@example.com", true), false)
            .await,
        Err(AuthError::AccountNotVerified)
    ));

    register(&h, "deleted@example.com", "password123").await;
    let user = h
        .store
        .find_by_email("deleted@example.com", Visibility::DEFAULT)
        .await
        .unwrap()
        .unwrap();
    h.store.soft_delete(user.id).await.unwrap();
    assert!(matches!(
        h.sessions
            .social_login(google_profile("deleted@example.com", true), false)
            .await,
        Err(AuthError::AccountDeleted)
    ));

    register(&h, "bare@example.com", "password123").await;
    let mut bare = h
        .store
        .find_by_email("bare@example.com", Visibility::DEFAULT)
        .await
        .unwrap()
        .unwrap();
    bare.plan_id = None;
    h.store.update(&bare).await.unwrap();
    let err = h
        .sessions
        .social_login(google_profile("bare@example.com", true), false)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("ACCOUNT_INCOMPLETE"));
}

#[tokio::test]
async fn test_notification_tokens() {
    let h = harness_with(
        AuthConfig {
            mode: RunMode::Test,
            notification_token_ttl: Duration::seconds(1),
            ..AuthConfig::default()
        },
        None,
    );
    register(&h, "notify@example.com", "password123").await;
    let user = h
        .store
        .find_by_email("notify@example.com", Visibility::DEFAULT)
        .await
        .unwrap()
        .unwrap();

    let token = h
        .sessions
        .issue_notification_token(user.id, NotificationChannel::Email)
        .await
        .unwrap();
    let (channel, profile) = h.sessions.verify_notification_token(&token).await.unwrap();
    assert_eq!(channel, NotificationChannel::Email);
    assert_eq!(profile.id, user.id);

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    let err = h
        .sessions
        .verify_notification_token(&token)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("EXPIRED_TOKEN"));

    let err = h
        .sessions
        .verify_notification_token("forged.token.value")
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("BAD_TOKEN"));
}

#[tokio::test]
async fn test_cleanup_keeps_users() {
    let h = harness_with(
        AuthConfig {
            mode: RunMode::Test,
            verification_code_ttl: Duration::milliseconds(10),
            ..AuthConfig::default()
        },
        None,
    );
    h.sessions
        .signup(signup_request("cleanup@example.com", "password123"))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let report = h.sessions.cleanup_expired().await.unwrap();
    assert_eq!(report.verification_codes, 1);
    assert_eq!(h.store.verification_code_count(), 0);
    assert!(
        h.store
            .find_by_email("cleanup@example.com", Visibility::ALL)
            .await
            .unwrap()
            .is_some()
    );
}
