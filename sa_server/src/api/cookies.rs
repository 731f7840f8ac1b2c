//! Session cookies set on sign-in and cleared on sign-out, and the
//! short-lived cookie binding a social sign-in to the browser that started it.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use saas_auth::auth::SessionTokens;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";
pub const OAUTH_STATE_COOKIE: &str = "oauthState";

/// Time a user has to get through the provider's consent page
const OAUTH_STATE_TTL_MINUTES: i64 = 10;
const OAUTH_STATE_PATH: &str = "/api/auth";

fn session_cookie(
    name: &'static str,
    value: String,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    production: bool,
) -> Cookie<'static> {
    let max_age = (expires_at - now).num_seconds().max(0);
    Cookie::build((name, value))
        .http_only(true)
        .secure(production)
        .same_site(if production {
            SameSite::Strict
        } else {
            SameSite::Lax
        })
        .path("/")
        .max_age(time::Duration::seconds(max_age))
        .build()
}

/// Add both token cookies, each living as long as its token.
pub fn with_session(
    jar: CookieJar,
    tokens: &SessionTokens,
    now: DateTime<Utc>,
    production: bool,
) -> CookieJar {
    jar.add(session_cookie(
        ACCESS_TOKEN_COOKIE,
        tokens.access_token.clone(),
        tokens.access_token_expires_at,
        now,
        production,
    ))
    .add(session_cookie(
        REFRESH_TOKEN_COOKIE,
        tokens.refresh_token.clone(),
        tokens.refresh_token_expires_at,
        now,
        production,
    ))
}

/// Expire both token cookies.
pub fn without_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_TOKEN_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_TOKEN_COOKIE).path("/"))
}

/// Remember the nonce sent in the OAuth `state`.
///
/// `SameSite=Lax` so the cookie comes back on the provider's top-level redirect.
pub fn with_oauth_state(jar: CookieJar, nonce: String, production: bool) -> CookieJar {
    jar.add(
        Cookie::build((OAUTH_STATE_COOKIE, nonce))
            .http_only(true)
            .secure(production)
            .same_site(SameSite::Lax)
            .path(OAUTH_STATE_PATH)
            .max_age(time::Duration::minutes(OAUTH_STATE_TTL_MINUTES))
            .build(),
    )
}

/// Nonce remembered by [`with_oauth_state`], if the browser sent it back.
pub fn oauth_state(jar: &CookieJar) -> Option<String> {
    jar.get(OAUTH_STATE_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Expire the OAuth state cookie; it is good for one callback only.
pub fn without_oauth_state(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(OAUTH_STATE_COOKIE).path(OAUTH_STATE_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tokens(now: DateTime<Utc>) -> SessionTokens {
        SessionTokens {
            access_token: "access".to_string(),
            access_token_expires_at: now + Duration::minutes(30),
            refresh_token: "refresh".to_string(),
            refresh_token_expires_at: now + Duration::hours(2),
        }
    }

    #[test]
    fn test_production_cookies_are_strict_and_secure() {
        let now = Utc::now();
        let jar = with_session(CookieJar::new(), &tokens(now), now, true);

        let access = jar.get(ACCESS_TOKEN_COOKIE).unwrap();
        assert_eq!(access.value(), "access");
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.secure(), Some(true));
        assert_eq!(access.same_site(), Some(SameSite::Strict));
        assert_eq!(access.max_age(), Some(time::Duration::minutes(30)));

        let refresh = jar.get(REFRESH_TOKEN_COOKIE).unwrap();
        assert_eq!(refresh.max_age(), Some(time::Duration::hours(2)));
    }

    #[test]
    fn test_development_cookies_are_lax() {
        let now = Utc::now();
        let jar = with_session(CookieJar::new(), &tokens(now), now, false);
        let access = jar.get(ACCESS_TOKEN_COOKIE).unwrap();
        assert_eq!(access.secure(), Some(false));
        assert_eq!(access.same_site(), Some(SameSite::Lax));
    }

    #[test]
    fn test_without_session_removes_cookies() {
        let now = Utc::now();
        let jar = without_session(with_session(CookieJar::new(), &tokens(now), now, false));
        assert!(jar.get(ACCESS_TOKEN_COOKIE).is_none());
        assert!(jar.get(REFRESH_TOKEN_COOKIE).is_none());
    }

    #[test]
    fn test_oauth_state_cookie() {
        let jar = with_oauth_state(CookieJar::new(), "nonce-1".to_string(), true);
        let cookie = jar.get(OAUTH_STATE_COOKIE).unwrap();
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/api/auth"));
        assert_eq!(oauth_state(&jar).as_deref(), Some("nonce-1"));

        let jar = without_oauth_state(jar);
        assert_eq!(oauth_state(&jar), None);
    }
}
