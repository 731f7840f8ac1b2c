//! Authentication middleware for protected endpoints.
//!
//! The access token is taken from the `Authorization: Bearer <token>` header,
//! falling back to the `accessToken` cookie. On success the authenticated
//! [`User`] is injected into request extensions for downstream handlers.
//!
//! # Extracting the user
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use saas_auth::auth::User;
//!
//! async fn protected_handler(Extension(user): Extension<User>) -> String {
//!     format!("Authenticated as user {}", user.id)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use super::{AppState, cookies::ACCESS_TOKEN_COOKIE, error::ApiError};

/// Bearer token from the header, else the access token cookie, else empty.
fn presented_token(headers: &HeaderMap, jar: &CookieJar) -> String {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| jar.get(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string()))
        .unwrap_or_default()
}

/// Validates the access token and injects the [`User`](saas_auth::auth::User).
///
/// # Behavior
///
/// - **Success**: Injects the user into request extensions and calls the next handler
/// - **No token**: `401` with `NO_TOKEN`
/// - **Expired token**: `401` with `EXPIRED_TOKEN`
/// - **Forged, revoked or orphaned token**: `401` with `BAD_TOKEN`
pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = presented_token(request.headers(), &jar);

    match state.sessions.verify_access_token(&token).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Err(e) => Err(state.error(e)),
    }
}
