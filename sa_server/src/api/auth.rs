//! Authentication API handlers.
//!
//! Request and response bodies use camelCase field names. Missing fields
//! deserialize as empty strings so the session manager can answer with its
//! own `*_NOT_FOUND` codes instead of a generic body rejection.
//!
//! # Examples
//!
//! Sign up:
//! ```bash
//! curl -X POST http://localhost:8080/api/auth/signup \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "ada@example.com", "password": "password123", "firstName": "Ada", "lastName": "Lovelace"}'
//! ```
//!
//! Sign in:
//! ```bash
//! curl -X POST http://localhost:8080/api/auth/signin \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "ada@example.com", "password": "password123"}'
//! ```

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use saas_auth::{
    AuthError,
    auth::{
        CodeDelivery, NotificationPreferences, PasswordResetConfirm, SessionTokens, SigninRequest,
        SignupRequest, User, UserId, UserProfile,
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AppState, cookies, error::ApiError};
use crate::{logging::log_security_event, metrics};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SignupPayload {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    /// Honored only in test mode
    pub forcerole: Option<String>,
    /// Honored only in test mode
    pub forceplan: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EmailPayload {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CodePayload {
    pub code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TokenPayload {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SigninPayload {
    pub email: String,
    pub password: String,
    pub remember_me: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResetConfirmPayload {
    pub email: String,
    pub password: String,
    pub code: String,
}

/// Account an operation targets; absent means the caller.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountTargetPayload {
    pub user_id: Option<UserId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreferencesPayload {
    /// Notification token; only read by the external route
    pub token: String,
    pub user_id: Option<UserId>,
    pub notification_preferences: Option<NotificationPreferences>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeDeliveryResponse {
    pub message: String,
    pub code_delivery_medium: String,
    pub code_delivery_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<CodeDelivery> for CodeDeliveryResponse {
    fn from(delivery: CodeDelivery) -> Self {
        Self {
            message: delivery.message,
            code_delivery_medium: delivery.medium,
            code_delivery_email: delivery.email,
            code: delivery.code,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

/// Profile plus the session tokens
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigninResponse {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub channel: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreferencesResponse {
    pub message: String,
    pub user: UserProfile,
}

/// Register a local account and mail it a verification code.
///
/// # Response
///
/// `201 Created`:
/// ```json
/// {
///   "message": "A verification code has been sent to ada@example.com",
///   "codeDeliveryMedium": "email",
///   "codeDeliveryEmail": "ada@example.com",
///   "code": "123456"
/// }
/// ```
/// `code` is only present outside production.
///
/// # Errors
///
/// - `400 Bad Request`: Invalid email, unknown role/plan, `EMAIL_EXISTS_ALREADY`
/// - `401 Unauthorized`: `ACCOUNT_WAITING_FOR_VERIFICATION` when the email is pending
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupPayload>,
) -> Result<(StatusCode, Json<CodeDeliveryResponse>), ApiError> {
    let request = SignupRequest {
        email: payload.email,
        password: payload.password,
        first_name: payload.first_name,
        last_name: payload.last_name,
        force_role: payload.forcerole,
        force_plan: payload.forceplan,
    };

    let delivery = state
        .sessions
        .signup(request)
        .await
        .map_err(|e| state.error(e))?;

    metrics::signups_total();
    Ok((StatusCode::CREATED, Json(delivery.into())))
}

/// Issue a fresh signup code to a pending account.
///
/// # Errors
///
/// - `401 Unauthorized`: No such account
/// - `400 Bad Request`: Account already verified
pub async fn resend_signup_verification_code(
    State(state): State<AppState>,
    Json(payload): Json<EmailPayload>,
) -> Result<Json<CodeDeliveryResponse>, ApiError> {
    let delivery = state
        .sessions
        .resend_signup_code(&payload.email)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(delivery.into()))
}

/// Consume a signup code.
///
/// # Errors
///
/// - `400 Bad Request`: `CODE_NOT_FOUND`, `CODE_INVALID`, `CODE_EXPIRED`, or
///   the account is already verified
pub async fn signup_verification(
    State(state): State<AppState>,
    Json(payload): Json<CodePayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .sessions
        .verify_signup(&payload.code)
        .await
        .map_err(|e| state.error(e))?;
    Ok(MessageResponse::new(
        "The account has been verified, you can now log in",
    ))
}

/// Authenticate and start a session.
///
/// On success returns the profile with both tokens, and sets the
/// `accessToken` and `refreshToken` cookies.
///
/// # Errors
///
/// - `400 Bad Request`: `EMAIL_NOT_FOUND`, malformed email, `PASSWORD_NOT_FOUND`
/// - `401 Unauthorized`: Unknown user, wrong password, `ACCOUNT_DELETED`,
///   `ACCOUNT_WAITING_FOR_VERIFICATION`
pub async fn signin(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<SigninPayload>,
) -> Result<(CookieJar, Json<SigninResponse>), ApiError> {
    let email = payload.email.clone();
    let request = SigninRequest {
        email: payload.email,
        password: payload.password,
        remember_me: payload.remember_me,
    };

    let signed_in = match state.sessions.signin(request).await {
        Ok(signed_in) => signed_in,
        Err(e) => {
            metrics::signins_total(e.code().unwrap_or("rejected"));
            log_security_event("signin_rejected", None, Some(&email), &e.to_string());
            return Err(state.error(e));
        }
    };

    metrics::signins_total("success");
    let jar = cookies::with_session(jar, &signed_in.tokens, Utc::now(), state.production());
    Ok((jar, Json(signin_response(signed_in.profile, signed_in.tokens))))
}

fn signin_response(profile: UserProfile, tokens: SessionTokens) -> SigninResponse {
    SigninResponse {
        profile,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        refresh_token_expires_at: tokens.refresh_token_expires_at,
    }
}

/// End the caller's session everywhere and clear the cookies.
pub async fn signout(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    state
        .sessions
        .signout(user.id)
        .await
        .map_err(|e| state.error(e))?;
    Ok((
        cookies::without_session(jar),
        MessageResponse::new("Sign out successful"),
    ))
}

/// Profile of the authenticated caller.
pub async fn profile(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = state
        .sessions
        .profile(user.id)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(profile))
}

/// Start a password reset.
///
/// Always `200 OK` for a non-empty email, whether or not an account exists.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailPayload>,
) -> Result<Json<CodeDeliveryResponse>, ApiError> {
    let delivery = state
        .sessions
        .request_password_reset(&payload.email)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(delivery.into()))
}

/// Re-issue a password reset code; the email must be syntactically valid.
pub async fn resend_reset_password_code(
    State(state): State<AppState>,
    Json(payload): Json<EmailPayload>,
) -> Result<Json<CodeDeliveryResponse>, ApiError> {
    let delivery = state
        .sessions
        .resend_password_reset(&payload.email)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(delivery.into()))
}

/// Set a new password with a reset code.
///
/// # Errors
///
/// - `400 Bad Request`: Missing field, or `CODE_INVALID_OR_EXPIRED`
pub async fn reset_password_confirm(
    State(state): State<AppState>,
    Json(payload): Json<ResetConfirmPayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .sessions
        .confirm_password_reset(PasswordResetConfirm {
            email: payload.email,
            password: payload.password,
            code: payload.code,
        })
        .await
        .map_err(|e| state.error(e))?;
    Ok(MessageResponse::new("Your password has been updated"))
}

/// Exchange a refresh token for a new access token.
///
/// The token comes from the body, or from the `refreshToken` cookie when the
/// body is absent or has none. The refresh token itself is returned unchanged.
///
/// # Errors
///
/// - `401 Unauthorized`: `BAD_TOKEN` for unknown tokens, `EXPIRED_TOKEN` once expired
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Option<Json<TokenPayload>>,
) -> Result<(CookieJar, Json<SessionTokens>), ApiError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let token = if payload.token.trim().is_empty() {
        jar.get(cookies::REFRESH_TOKEN_COOKIE)
            .map(|c| c.value().to_string())
            .unwrap_or_default()
    } else {
        payload.token
    };

    let tokens = match state.sessions.refresh(&token).await {
        Ok(tokens) => tokens,
        Err(e) => {
            metrics::refresh_total(e.code().unwrap_or("rejected"));
            return Err(state.error(e));
        }
    };

    metrics::refresh_total("success");
    let jar = cookies::with_session(jar, &tokens, Utc::now(), state.production());
    Ok((jar, Json(tokens)))
}

/// Resolve a notification token (from an email link) to its user.
///
/// # Errors
///
/// - `401 Unauthorized`: `NO_TOKEN`, `EXPIRED_TOKEN` or `BAD_TOKEN`
pub async fn notification_verification(
    State(state): State<AppState>,
    Json(payload): Json<TokenPayload>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let (channel, user) = state
        .sessions
        .verify_notification_token(&payload.token)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(NotificationResponse {
        channel: channel.to_string(),
        user,
    }))
}

/// Save notification preferences for the access-token holder, or for
/// `userId` when the caller is an administrator.
///
/// # Errors
///
/// - `400 Bad Request`: `PREFERENCES_NOT_FOUND`
/// - `403 Forbidden`: `userId` is someone else and the caller is no admin
/// - `404 Not Found`: No live user with that `userId`
pub async fn notification_preferences_save_internal(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<PreferencesPayload>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    save_preferences(&state, &user, payload).await
}

/// Same as the internal route, authorized by the notification token of an
/// out-of-band link instead of a session.
///
/// # Errors
///
/// - `401 Unauthorized`: `NO_TOKEN`, `EXPIRED_TOKEN` or `BAD_TOKEN`
pub async fn notification_preferences_save_external(
    State(state): State<AppState>,
    Json(payload): Json<PreferencesPayload>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let (_, holder) = state
        .sessions
        .notification_token_user(&payload.token)
        .await
        .map_err(|e| state.error(e))?;
    save_preferences(&state, &holder, payload).await
}

async fn save_preferences(
    state: &AppState,
    caller: &User,
    payload: PreferencesPayload,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let user = state
        .sessions
        .save_notification_preferences(caller, payload.user_id, payload.notification_preferences)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(PreferencesResponse {
        message: "Notification preferences updated".to_string(),
        user,
    }))
}

/// Close the caller's account, or `userId`'s when the caller is an admin.
///
/// The account is signed out and soft-deleted. Revoking oneself also
/// clears the session cookies.
///
/// # Errors
///
/// - `403 Forbidden`: Not an admin, or the target is the root account
/// - `404 Not Found`: No such live account
pub async fn revoke(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    jar: CookieJar,
    payload: Option<Json<AccountTargetPayload>>,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    let target = payload.and_then(|Json(p)| p.user_id);
    state
        .sessions
        .revoke_account(&user, target)
        .await
        .map_err(|e| state.error(e))?;

    log_security_event(
        "account_revoked",
        Some(target.unwrap_or(user.id)),
        Some(&user.email),
        "Account revoked",
    );
    let jar = if target.is_none_or(|id| id == user.id) {
        cookies::without_session(jar)
    } else {
        jar
    };
    Ok((jar, MessageResponse::new("User account has been revoked")))
}

/// Remove an account and everything attached to it. Admins only.
///
/// # Errors
///
/// - `400 Bad Request`: No `userId`
/// - `403 Forbidden`: Not an admin, or the target is the root account
/// - `404 Not Found`: No such account
pub async fn purge(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<AccountTargetPayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    let target = payload
        .user_id
        .ok_or_else(|| state.error(AuthError::MissingField("userId")))?;
    state
        .sessions
        .purge_account(&user, target)
        .await
        .map_err(|e| state.error(e))?;

    log_security_event(
        "account_purged",
        Some(target),
        Some(&user.email),
        "Account purged",
    );
    Ok(MessageResponse::new("User account has been purged"))
}

/// Round-tripped through the provider in the OAuth `state` parameter
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SocialState {
    pub remember_me: bool,
    /// Must match the `oauthState` cookie set when the flow started
    pub nonce: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialStartQuery {
    /// Social sessions are long-lived unless the client opts out
    pub remember_me: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SocialCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Payload handed to the client on social sign-in success
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialSuccess {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SocialFailure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

fn encode_payload<T: Serialize>(payload: &T) -> String {
    // Serializing these plain structs cannot fail
    let json = serde_json::to_vec(payload).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

fn decode_state(raw: Option<&str>) -> Option<SocialState> {
    raw.and_then(|s| URL_SAFE_NO_PAD.decode(s).ok())
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
}

/// State from the callback, if it carries the nonce this browser was given.
fn verified_state(raw: Option<&str>, expected_nonce: Option<&str>) -> Option<SocialState> {
    let expected = expected_nonce?;
    decode_state(raw).filter(|s| !s.nonce.is_empty() && s.nonce == expected)
}

fn client_redirect<T: Serialize>(state: &AppState, page: &str, payload: &T) -> Redirect {
    let url = format!(
        "{}/{}?data={}",
        state.sessions.config().client_base_url,
        page,
        encode_payload(payload)
    );
    Redirect::to(&url)
}

fn failure_redirect(state: &AppState, message: String, code: Option<&str>) -> Redirect {
    tracing::warn!(message = %message, "Social sign-in failed");
    client_redirect(
        state,
        "social-signin-error",
        &SocialFailure {
            message,
            code: code.map(str::to_string),
        },
    )
}

/// Redirect the browser to the provider's consent page.
///
/// A random nonce goes both into the OAuth `state` and into the
/// `oauthState` cookie; the callback only proceeds when they match.
///
/// # Errors
///
/// - `404 Not Found`: Provider is not configured
pub async fn social_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<SocialStartQuery>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), ApiError> {
    let Some(social) = state.social.get(&provider).cloned() else {
        return Err(ApiError::not_found(format!("Unknown provider {provider}")));
    };

    let nonce = Uuid::new_v4().simple().to_string();
    let oauth_state = encode_payload(&SocialState {
        remember_me: query.remember_me.unwrap_or(true),
        nonce: nonce.clone(),
    });
    match social.authorize_url(&oauth_state) {
        Ok(url) => Ok((
            cookies::with_oauth_state(jar, nonce, state.production()),
            Redirect::to(&url),
        )),
        Err(e) => Ok((
            jar,
            failure_redirect(
                &state,
                format!("{provider} authentication error: {e}"),
                None,
            ),
        )),
    }
}

/// Complete social sign-in and redirect back to the client.
///
/// Success redirects to `{client}/social-signin-success?data=<base64url JSON>`
/// with the session cookies set; any failure redirects to
/// `{client}/social-signin-error?data=<base64url JSON>`.
pub async fn social_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<SocialCallbackQuery>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let Some(social) = state.social.get(&provider).cloned() else {
        return Err(ApiError::not_found(format!("Unknown provider {provider}")));
    };

    let expected_nonce = cookies::oauth_state(&jar);
    let jar = cookies::without_oauth_state(jar);

    let Some(oauth_state) = verified_state(query.state.as_deref(), expected_nonce.as_deref())
    else {
        log_security_event(
            "social_state_mismatch",
            None,
            None,
            &format!("{provider} callback without a matching state"),
        );
        return Ok((
            jar,
            failure_redirect(
                &state,
                format!("{provider} authentication error: sign-in state does not match"),
                Some("BAD_STATE"),
            ),
        )
            .into_response());
    };

    let code = match (query.code, query.error) {
        (Some(code), _) if !code.is_empty() => code,
        (_, error) => {
            let reason = error.unwrap_or_else(|| "no authorization code".to_string());
            return Ok((
                jar,
                failure_redirect(
                    &state,
                    format!("{provider} authentication error: {reason}"),
                    None,
                ),
            )
                .into_response());
        }
    };

    let profile = match social.fetch_profile(&code).await {
        Ok(profile) => profile,
        Err(e) => {
            return Ok((
                jar,
                failure_redirect(
                    &state,
                    format!("{provider} authentication error: {e}"),
                    None,
                ),
            )
                .into_response());
        }
    };

    let signed_in = match state
        .sessions
        .social_login(profile, oauth_state.remember_me)
        .await
    {
        Ok(signed_in) => signed_in,
        Err(e) => {
            metrics::signins_total(e.code().unwrap_or("rejected"));
            let message = state.error(e).body;
            return Ok((jar, failure_redirect(&state, message.message, message.code))
                .into_response());
        }
    };

    metrics::signins_total("success");
    let jar = cookies::with_session(jar, &signed_in.tokens, Utc::now(), state.production());
    let success = SocialSuccess {
        refresh_token_expires_at: signed_in.tokens.refresh_token_expires_at,
        profile: signed_in.profile,
    };
    Ok((jar, client_redirect(&state, "social-signin-success", &success)).into_response())
}
