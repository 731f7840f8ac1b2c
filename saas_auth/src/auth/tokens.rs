//! Access and refresh token issuance.

use super::{
    errors::{AuthError, AuthResult},
    models::{AccessTokenClaims, AccessTokenRecord, RefreshTokenRecord, SessionTokens, UserId},
};
use crate::db::repository::TokenRepository;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, EncodingKey,
    Header, Validation,
};
use std::sync::Arc;
use uuid::Uuid;

/// Opaque refresh token: 32 random bytes, hex encoded.
pub fn generate_refresh_token() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

/// Strict HS256 validation with no clock leeway
pub(crate) fn strict_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

/// Mints signed access tokens and opaque refresh tokens
#[derive(Clone)]
pub struct TokenIssuer {
    tokens: Arc<dyn TokenRepository>,
    secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    session_refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(
        tokens: Arc<dyn TokenRepository>,
        secret: String,
        access_ttl: Duration,
        refresh_ttl: Duration,
        session_refresh_ttl: Duration,
    ) -> Self {
        Self {
            tokens,
            secret,
            access_ttl,
            refresh_ttl,
            session_refresh_ttl,
        }
    }

    fn encoding_key(&self) -> AuthResult<EncodingKey> {
        if self.secret.is_empty() {
            return Err(AuthError::SigningKeyMissing("access"));
        }
        Ok(EncodingKey::from_secret(self.secret.as_bytes()))
    }

    /// Sign an access token for `user_id` and store its audit record.
    pub async fn issue_access_token(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> AuthResult<(String, DateTime<Utc>)> {
        let expires_at = now + self.access_ttl;
        let claims = AccessTokenClaims {
            sub: user_id,
            jti: Uuid::new_v4().to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key()?)?;

        self.tokens
            .save_access(&AccessTokenRecord {
                token: token.clone(),
                user_id,
                created_at: now,
                expires_at,
                is_revoked: false,
            })
            .await?;

        Ok((token, expires_at))
    }

    /// Signature and expiry check only; no store round-trip.
    pub fn verify_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        if token.is_empty() {
            return Err(AuthError::TokenMissing);
        }
        if self.secret.is_empty() {
            return Err(AuthError::SigningKeyMissing("access"));
        }

        decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &strict_validation(),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            JwtErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid,
        })
    }

    /// Persist a new opaque refresh token. "Remember me" gets the long lifetime.
    pub async fn issue_refresh_token(
        &self,
        user_id: UserId,
        remember_me: bool,
        now: DateTime<Utc>,
    ) -> AuthResult<RefreshTokenRecord> {
        let ttl = if remember_me {
            self.refresh_ttl
        } else {
            self.session_refresh_ttl
        };

        let record = RefreshTokenRecord {
            token: generate_refresh_token(),
            user_id,
            created_at: now,
            expires_at: now + ttl,
        };
        self.tokens.save_refresh(&record).await?;

        Ok(record)
    }

    /// Access + refresh pair for a fresh session
    pub async fn issue_pair(
        &self,
        user_id: UserId,
        remember_me: bool,
        now: DateTime<Utc>,
    ) -> AuthResult<SessionTokens> {
        let (access_token, access_token_expires_at) = self.issue_access_token(user_id, now).await?;
        let refresh = self.issue_refresh_token(user_id, remember_me, now).await?;

        Ok(SessionTokens {
            access_token,
            access_token_expires_at,
            refresh_token: refresh.token,
            refresh_token_expires_at: refresh.expires_at,
        })
    }

    /// Resolve a presented refresh token.
    ///
    /// Expiry is checked here even though stores may evict expired rows on
    /// their own. An expired token is deleted on sight.
    pub async fn check_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<RefreshTokenRecord> {
        if token.is_empty() {
            return Err(AuthError::InvalidRefreshToken);
        }

        let record = self
            .tokens
            .find_refresh(token)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        if record.expires_at <= now {
            self.tokens.delete_refresh(token).await?;
            return Err(AuthError::SessionExpired);
        }

        Ok(record)
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The refresh token is not rotated; the returned pair carries the same one.
    pub async fn refresh(&self, token: &str, now: DateTime<Utc>) -> AuthResult<SessionTokens> {
        let record = self.check_refresh_token(token, now).await?;
        let (access_token, access_token_expires_at) =
            self.issue_access_token(record.user_id, now).await?;

        Ok(SessionTokens {
            access_token,
            access_token_expires_at,
            refresh_token: record.token,
            refresh_token_expires_at: record.expires_at,
        })
    }
}
