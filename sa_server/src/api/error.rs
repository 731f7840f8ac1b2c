//! Error responses.
//!
//! Every failing handler returns an [`ApiError`], rendered as
//! `{message, code?, codeDeliveryMedium?}` with a status derived from the
//! error kind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use saas_auth::{AuthConfig, AuthError, auth::ErrorKind};
use serde::Serialize;

/// Error body sent to clients
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_delivery_medium: Option<String>,
}

/// A rendered failure ready to become a response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::Conflict => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Dependency => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    /// Render `error` for a client.
    ///
    /// Dependency failures are logged in full; the client only sees the cause
    /// outside production.
    pub fn from_auth(error: AuthError, config: &AuthConfig) -> Self {
        let kind = error.kind();
        let message = if kind == ErrorKind::Dependency {
            tracing::error!(error = %error, "Request failed on a dependency");
            if config.mode.is_production() {
                error.client_message()
            } else {
                error.to_string()
            }
        } else {
            error.to_string()
        };

        let code_delivery_medium = matches!(error, AuthError::AccountNotVerified)
            .then(|| config.code_delivery_medium.clone());

        Self {
            status: status_for(kind),
            body: ErrorBody {
                message,
                code: error.code(),
                code_delivery_medium,
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorBody {
                message: message.into(),
                code: None,
                code_delivery_medium: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
