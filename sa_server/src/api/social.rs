//! OAuth social sign-in providers.
//!
//! A provider turns an authorization `code` from its consent redirect into a
//! [`SocialProfile`]; account lookup and linking happen in
//! [`SessionManager::social_login`](saas_auth::SessionManager::social_login).

use async_trait::async_trait;
use reqwest::Url;
use saas_auth::auth::{SocialEmail, SocialProfile};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::OAuthClientConfig;

/// Provider round-trip failures
#[derive(Debug, Error)]
pub enum SocialError {
    #[error("Provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned no access token")]
    NoAccessToken,

    #[error("Provider URL is invalid: {0}")]
    Url(String),

    #[error("Unsupported provider {0}")]
    Unsupported(String),
}

/// An identity provider able to complete an authorization-code flow
#[async_trait]
pub trait SocialProvider: Send + Sync {
    /// Route name, e.g. `google`
    fn name(&self) -> &str;

    /// Consent page to redirect the browser to; `state` is echoed back on callback.
    fn authorize_url(&self, state: &str) -> Result<String, SocialError>;

    /// Exchange an authorization code for the user's profile.
    async fn fetch_profile(&self, code: &str) -> Result<SocialProfile, SocialError>;
}

struct Endpoints {
    authorize: &'static str,
    token: &'static str,
    profile: &'static str,
    scope: &'static str,
}

const GOOGLE: Endpoints = Endpoints {
    authorize: "https://accounts.google.com/o/oauth2/v2/auth",
    token: "https://oauth2.googleapis.com/token",
    profile: "https://openidconnect.googleapis.com/v1/userinfo",
    scope: "openid email profile",
};

const FACEBOOK: Endpoints = Endpoints {
    authorize: "https://www.facebook.com/v19.0/dialog/oauth",
    token: "https://graph.facebook.com/v19.0/oauth/access_token",
    profile: "https://graph.facebook.com/me?fields=id,email,first_name,last_name,picture",
    scope: "email public_profile",
};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FacebookPictureData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FacebookPicture {
    data: Option<FacebookPictureData>,
}

#[derive(Debug, Deserialize)]
struct FacebookUser {
    id: String,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    picture: Option<FacebookPicture>,
}

/// Authorization-code client for Google or Facebook
pub struct OAuthProvider {
    client: reqwest::Client,
    config: OAuthClientConfig,
    endpoints: &'static Endpoints,
}

impl OAuthProvider {
    /// Provider for `config.provider`, which must be `google` or `facebook`.
    pub fn new(config: OAuthClientConfig) -> Result<Self, SocialError> {
        let endpoints = match config.provider.as_str() {
            "google" => &GOOGLE,
            "facebook" => &FACEBOOK,
            other => return Err(SocialError::Unsupported(other.to_string())),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            config,
            endpoints,
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<String, SocialError> {
        let params = [
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.callback_url.as_str()),
            ("grant_type", "authorization_code"),
        ];
        let response: TokenResponse = self
            .client
            .post(self.endpoints.token)
            .form(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(SocialError::NoAccessToken)
    }
}

#[async_trait]
impl SocialProvider for OAuthProvider {
    fn name(&self) -> &str {
        &self.config.provider
    }

    fn authorize_url(&self, state: &str) -> Result<String, SocialError> {
        let url = Url::parse_with_params(
            self.endpoints.authorize,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("response_type", "code"),
                ("scope", self.endpoints.scope),
                ("state", state),
            ],
        )
        .map_err(|e| SocialError::Url(e.to_string()))?;
        Ok(url.into())
    }

    async fn fetch_profile(&self, code: &str) -> Result<SocialProfile, SocialError> {
        let access_token = self.exchange_code(code).await?;
        let request = self
            .client
            .get(self.endpoints.profile)
            .bearer_auth(&access_token);

        let profile = match self.config.provider.as_str() {
            "google" => {
                let info: GoogleUserInfo =
                    request.send().await?.error_for_status()?.json().await?;
                SocialProfile {
                    provider: "google".to_string(),
                    id: info.sub,
                    emails: info
                        .email
                        .map(|value| SocialEmail {
                            value,
                            verified: info.email_verified,
                        })
                        .into_iter()
                        .collect(),
                    given_name: info.given_name,
                    family_name: info.family_name,
                    photo: info.picture,
                }
            }
            _ => {
                let info: FacebookUser = request.send().await?.error_for_status()?.json().await?;
                SocialProfile {
                    provider: "facebook".to_string(),
                    id: info.id,
                    // Graph only returns confirmed addresses
                    emails: info
                        .email
                        .map(|value| SocialEmail {
                            value,
                            verified: true,
                        })
                        .into_iter()
                        .collect(),
                    given_name: info.first_name,
                    family_name: info.last_name,
                    photo: info.picture.and_then(|p| p.data).and_then(|d| d.url),
                }
            }
        };

        tracing::debug!(
            provider = %profile.provider,
            emails = profile.emails.len(),
            "Fetched social profile"
        );
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str) -> OAuthClientConfig {
        OAuthClientConfig {
            provider: provider.to_string(),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            callback_url: format!("http://localhost:8080/api/auth/{provider}/callback"),
        }
    }

    #[test]
    fn test_authorize_url_carries_client_and_state() {
        let provider = OAuthProvider::new(config("google")).unwrap();
        let url = provider.authorize_url("abc").unwrap();
        let parsed = Url::parse(&url).unwrap();

        assert_eq!(parsed.host_str(), Some("accounts.google.com"));
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".to_string(), "client-id".to_string())));
        assert!(pairs.contains(&("state".to_string(), "abc".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(!url.contains("client-secret"));
    }

    #[test]
    fn test_unsupported_provider() {
        assert!(matches!(
            OAuthProvider::new(config("myspace")),
            Err(SocialError::Unsupported(_))
        ));
    }

    #[test]
    fn test_google_userinfo_parsing() {
        let info: GoogleUserInfo = serde_json::from_str(
            r#"{"sub":"42","email":"a@b.io","email_verified":true,"given_name":"Ada"}"#,
        )
        .unwrap();
        assert_eq!(info.sub, "42");
        assert!(info.email_verified);
        assert!(info.family_name.is_none());
    }
}
