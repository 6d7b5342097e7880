//! Google OAuth 2.0 helpers: consent URL, code exchange and token refresh.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use diesel_async::AsyncPgConnection;
use serde::Deserialize;

use crate::config::GoogleConfig;
use crate::db::users;
use crate::models::UserRow;

pub const GOOGLE_OAUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Scopes requested at login: Classroom, Calendar and Gmail plus identity
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/classroom.courses.readonly",
    "https://www.googleapis.com/auth/classroom.coursework.me.readonly",
    "https://www.googleapis.com/auth/classroom.announcements.readonly",
    "https://www.googleapis.com/auth/calendar.events",
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/drive.readonly",
    "openid",
    "email",
    "profile",
];

/// Tokens are refreshed this long before Google would reject them
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| now + Duration::seconds(secs))
    }
}

#[derive(Debug, Deserialize)]
pub struct GoogleUserInfo {
    pub id: Option<String>,
    pub email: String,
    pub name: Option<String>,
}

/// Build the consent URL the browser is redirected to.
pub fn authorization_url(client_id: &str, redirect_uri: &str, state: &str) -> String {
    format!(
        "{}?\
         client_id={}&\
         redirect_uri={}&\
         response_type=code&\
         scope={}&\
         access_type=offline&\
         prompt=consent&\
         state={}",
        GOOGLE_OAUTH_URL,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&SCOPES.join(" ")),
        urlencoding::encode(state)
    )
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code(
    http: &reqwest::Client,
    google: &GoogleConfig,
    redirect_uri: &str,
    code: &str,
) -> Result<TokenResponse> {
    let params = [
        ("code", code),
        ("client_id", google.client_id.as_str()),
        ("client_secret", google.client_secret.as_str()),
        ("redirect_uri", redirect_uri),
        ("grant_type", "authorization_code"),
    ];

    request_token(http, &params).await
}

/// Obtain a new access token from a stored refresh token.
pub async fn refresh_access_token(
    http: &reqwest::Client,
    google: &GoogleConfig,
    refresh_token: &str,
) -> Result<TokenResponse> {
    let params = [
        ("refresh_token", refresh_token),
        ("client_id", google.client_id.as_str()),
        ("client_secret", google.client_secret.as_str()),
        ("grant_type", "refresh_token"),
    ];

    request_token(http, &params).await
}

async fn request_token(http: &reqwest::Client, params: &[(&str, &str)]) -> Result<TokenResponse> {
    let response = http
        .post(TOKEN_URL)
        .form(params)
        .send()
        .await
        .context("Token request failed")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Token endpoint returned {}: {}", status, body);
    }

    response.json().await.context("Invalid token response")
}

pub async fn fetch_user_info(http: &reqwest::Client, access_token: &str) -> Result<GoogleUserInfo> {
    http.get(USERINFO_URL)
        .bearer_auth(access_token)
        .send()
        .await
        .context("Failed to get user info")?
        .error_for_status()
        .context("User info request rejected")?
        .json()
        .await
        .context("Invalid user info response")
}

/// Whether a stored access token can still be used at `now`.
pub fn token_is_fresh(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(expiry) => expiry - Duration::seconds(EXPIRY_MARGIN_SECS) > now,
        None => false,
    }
}

/// Return a usable access token for `user`, refreshing and persisting it if needed.
pub async fn access_token_for(
    conn: &mut AsyncPgConnection,
    http: &reqwest::Client,
    google: &GoogleConfig,
    user: &UserRow,
) -> Result<String> {
    let now = Utc::now();

    if let Some(token) = &user.access_token {
        if token_is_fresh(user.token_expires_at, now) {
            return Ok(token.clone());
        }
    }

    let refresh_token = user
        .refresh_token
        .as_deref()
        .with_context(|| format!("No refresh token stored for {}", user.email))?;

    tracing::debug!("Refreshing access token for {}", user.email);
    let tokens = refresh_access_token(http, google, refresh_token).await?;
    let expires_at = tokens
        .expires_at(now)
        .unwrap_or_else(|| now + Duration::hours(1));

    users::update_access_token(conn, user.id, &tokens.access_token, expires_at).await?;

    Ok(tokens.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url_encodes_parameters() {
        let url = authorization_url(
            "client-123.apps.googleusercontent.com",
            "http://localhost:8000/auth/callback",
            "state-1",
        );

        assert!(url.starts_with(GOOGLE_OAUTH_URL));
        assert!(url.contains("client_id=client-123.apps.googleusercontent.com"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8000%2Fauth%2Fcallback"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("state=state-1"));
        assert!(url.contains("openid%20email%20profile"));
    }

    #[test]
    fn test_token_freshness() {
        let now = Utc::now();
        assert!(token_is_fresh(Some(now + Duration::minutes(10)), now));
        assert!(!token_is_fresh(Some(now + Duration::seconds(30)), now));
        assert!(!token_is_fresh(Some(now - Duration::minutes(1)), now));
        assert!(!token_is_fresh(None, now));
    }

    #[test]
    fn test_token_response_expiry() {
        let tokens: TokenResponse = serde_json::from_str(
            r#"{"access_token":"ya29.a0","expires_in":3599,"scope":"openid","token_type":"Bearer"}"#,
        )
        .unwrap();
        let now = Utc::now();
        assert_eq!(tokens.expires_at(now), Some(now + Duration::seconds(3599)));
        assert!(tokens.refresh_token.is_none());
    }
}
