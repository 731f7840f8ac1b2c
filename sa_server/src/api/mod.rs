//! HTTP API for the authentication service.
//!
//! # Modules
//!
//! - [`auth`]: Signup, verification, signin, password reset, refresh, signout
//! - [`social`]: OAuth providers backing social sign-in
//! - [`middleware`]: Access token check for protected endpoints
//! - [`cookies`]: Session cookies
//! - [`error`]: Error rendering
//! - [`request_id`]: Request correlation and request metrics
//!
//! # Endpoints Overview
//!
//! ## Public
//! - `POST /api/auth/signup`
//! - `POST /api/auth/resendSignupVerificationCode`
//! - `POST /api/auth/signupVerification`
//! - `POST /api/auth/signin`
//! - `POST /api/auth/resetPassword`
//! - `POST /api/auth/resendResetPasswordCode`
//! - `POST /api/auth/resetPasswordConfirm`
//! - `POST /api/auth/refreshToken`
//! - `POST /api/auth/notificationVerification`
//! - `POST /api/auth/notificationPreferencesSaveExternal` (notification token in the body)
//! - `GET  /api/auth/{provider}` and `GET /api/auth/{provider}/callback`
//!
//! ## Protected (access token in `Authorization: Bearer` or the `accessToken` cookie)
//! - `POST /api/auth/signout`
//! - `GET  /api/auth/profile`
//! - `POST /api/auth/notificationPreferencesSaveInternal`
//! - `POST /api/auth/revoke`
//! - `POST /api/auth/purge` (admins only)
//!
//! ## Health Check
//! - `GET /health`
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use sa_server::api::{create_router, AppState};
//! use saas_auth::{
//!     config::{AuthConfig, Secrets},
//!     db::InMemoryStore,
//!     email::LogEmailSender,
//!     SessionManager,
//! };
//! use std::sync::Arc;
//! # async fn example(secrets: Secrets) -> Result<(), Box<dyn std::error::Error>> {
//!
//! let store = Arc::new(InMemoryStore::seeded());
//! let sessions = SessionManager::new(
//!     AuthConfig::default(),
//!     secrets,
//!     store.repositories(),
//!     Arc::new(LogEmailSender),
//! );
//!
//! let app = create_router(AppState::new(sessions));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively. In production, put the API behind the
//! same origin as the client or configure allowed origins at the proxy.

pub mod auth;
pub mod cookies;
pub mod error;
pub mod middleware;
pub mod request_id;
pub mod social;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use saas_auth::{AuthError, SessionManager};
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tower_http::cors::CorsLayer;

use error::ApiError;
use social::SocialProvider;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request (cheap due to Arc wrappers).
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    /// Social providers by route name
    pub social: Arc<HashMap<String, Arc<dyn SocialProvider>>>,
}

impl AppState {
    pub fn new(sessions: SessionManager) -> Self {
        Self {
            sessions: Arc::new(sessions),
            social: Arc::new(HashMap::new()),
        }
    }

    /// Register a social provider under its route name.
    pub fn with_provider(mut self, provider: Arc<dyn SocialProvider>) -> Self {
        Arc::make_mut(&mut self.social).insert(provider.name().to_string(), provider);
        self
    }

    pub fn production(&self) -> bool {
        self.sessions.config().mode.is_production()
    }

    /// Render a library error for this deployment.
    pub fn error(&self, error: AuthError) -> ApiError {
        ApiError::from_auth(error, self.sessions.config())
    }
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Endpoint Summary
///
/// ```text
/// GET  /health                                  - Health check
/// POST /api/auth/signup                         - Register (201)
/// POST /api/auth/resendSignupVerificationCode   - Resend signup code
/// POST /api/auth/signupVerification             - Verify signup code
/// POST /api/auth/signin                         - Sign in, sets cookies
/// POST /api/auth/resetPassword                  - Request reset code
/// POST /api/auth/resendResetPasswordCode        - Resend reset code
/// POST /api/auth/resetPasswordConfirm           - Set new password
/// POST /api/auth/refreshToken                   - New access token
/// POST /api/auth/notificationVerification       - Resolve notification token
/// POST /api/auth/notificationPreferencesSaveExternal - Save preferences (notification token)
/// POST /api/auth/signout                        - Sign out (auth required)
/// GET  /api/auth/profile                        - Current user (auth required)
/// POST /api/auth/notificationPreferencesSaveInternal - Save preferences (auth required)
/// POST /api/auth/revoke                         - Close an account (auth required)
/// POST /api/auth/purge                          - Delete an account (admin)
/// GET  /api/auth/{provider}                     - Start social sign-in
/// GET  /api/auth/{provider}/callback            - Finish social sign-in
/// ```
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_router(state.clone()))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn auth_router(state: AppState) -> Router<AppState> {
    let public_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route(
            "/resendSignupVerificationCode",
            post(auth::resend_signup_verification_code),
        )
        .route("/signupVerification", post(auth::signup_verification))
        .route("/signin", post(auth::signin))
        .route("/resetPassword", post(auth::reset_password))
        .route("/resendResetPasswordCode", post(auth::resend_reset_password_code))
        .route("/resetPasswordConfirm", post(auth::reset_password_confirm))
        .route("/refreshToken", post(auth::refresh_token))
        .route(
            "/notificationVerification",
            post(auth::notification_verification),
        )
        .route(
            "/notificationPreferencesSaveExternal",
            post(auth::notification_preferences_save_external),
        )
        .route("/{provider}", get(auth::social_start))
        .route("/{provider}/callback", get(auth::social_callback));

    let protected_routes = Router::new()
        .route("/signout", post(auth::signout))
        .route("/profile", get(auth::profile))
        .route(
            "/notificationPreferencesSaveInternal",
            post(auth::notification_preferences_save_internal),
        )
        .route("/revoke", post(auth::revoke))
        .route("/purge", post(auth::purge))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth_middleware,
        ));

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the store answers, `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","version":"0.1.0","store":true,"timestamp":"2026-01-22T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_healthy = match state.sessions.health().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            false
        }
    };

    let status_code = if store_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if store_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": store_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
