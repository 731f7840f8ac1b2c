//! Tokens embedded in out-of-band links (preference changes from an email,
//! push or SMS message).
//!
//! A token is signed with its own secret and lives for `ttl`. Its record is
//! kept for twice that long so a recently expired link can be told apart from
//! a forged or unknown one.

use super::{
    errors::{AuthError, AuthResult},
    models::{NotificationChannel, NotificationTokenClaims, NotificationTokenRecord, UserId},
    tokens::strict_validation,
};
use crate::db::repository::TokenRepository;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct NotificationTokens {
    tokens: Arc<dyn TokenRepository>,
    secret: String,
    ttl: Duration,
}

impl NotificationTokens {
    pub fn new(tokens: Arc<dyn TokenRepository>, secret: String, ttl: Duration) -> Self {
        Self { tokens, secret, ttl }
    }

    pub async fn issue(
        &self,
        user_id: UserId,
        channel: NotificationChannel,
        now: DateTime<Utc>,
    ) -> AuthResult<String> {
        if self.secret.is_empty() {
            return Err(AuthError::SigningKeyMissing("notification"));
        }

        let claims = NotificationTokenClaims {
            sub: user_id,
            channel,
            jti: Uuid::new_v4().to_string(),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        self.tokens
            .save_notification(&NotificationTokenRecord {
                token: token.clone(),
                user_id,
                channel,
                created_at: now,
                expires_at: now + self.ttl * 2,
                is_revoked: false,
            })
            .await?;

        Ok(token)
    }

    /// `TokenInvalid` for anything forged, unknown, revoked or past the grace
    /// window; `TokenExpired` for a genuine token past its lifetime but
    /// still inside the grace window.
    pub async fn verify(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<NotificationTokenClaims> {
        if token.is_empty() {
            return Err(AuthError::TokenMissing);
        }
        if self.secret.is_empty() {
            return Err(AuthError::SigningKeyMissing("notification"));
        }

        let mut validation = strict_validation();
        validation.validate_exp = false;

        let claims = decode::<NotificationTokenClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|_| AuthError::TokenInvalid)?
        .claims;

        let record = self
            .tokens
            .find_notification(token)
            .await?
            .filter(|r| !r.is_revoked && r.user_id == claims.sub && r.channel == claims.channel)
            .ok_or(AuthError::TokenInvalid)?;

        if now >= record.expires_at {
            return Err(AuthError::TokenInvalid);
        }
        if now >= record.created_at + self.ttl || now.timestamp() > claims.exp {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }
}
