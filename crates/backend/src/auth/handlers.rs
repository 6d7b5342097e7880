//! Authentication HTTP handlers.

use anyhow::Context;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;

use crate::db::{self, users};
use crate::error::ApiResult;
use crate::google::oauth;
use crate::AppState;

/// Start the Google OAuth flow by redirecting to the consent screen.
pub async fn auth_start(State(state): State<AppState>) -> ApiResult<Redirect> {
    let google = state.config.google()?;
    let oauth_state = state.oauth_states.issue().await;

    let url = oauth::authorization_url(
        &google.client_id,
        &state.config.oauth_redirect_uri,
        &oauth_state,
    );

    Ok(Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
pub struct AuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Handle the Google OAuth callback.
///
/// The `state` parameter must match one issued by `/auth/start`. Exchanges the
/// code for tokens, stores them on the user row and sends the browser back to
/// the frontend. Failures redirect with `auth_error` set.
pub async fn auth_callback(
    State(state): State<AppState>,
    Query(params): Query<AuthCallbackParams>,
) -> Response {
    let frontend = &state.config.frontend_redirect_url;

    let state_valid = match params.state.as_deref() {
        Some(value) => state.oauth_states.take(value).await,
        None => false,
    };

    if let Some(error) = params.error {
        tracing::warn!("OAuth consent denied: {}", error);
        return Redirect::to(&error_redirect(frontend, &error)).into_response();
    }

    if !state_valid {
        tracing::warn!("OAuth callback with unknown or expired state");
        return Redirect::to(&error_redirect(frontend, "invalid_state")).into_response();
    }

    let Some(code) = params.code else {
        return Redirect::to(&error_redirect(frontend, "missing_code")).into_response();
    };

    match handle_callback_inner(&state, &code).await {
        Ok(email) => {
            tracing::info!("Connected Google account: {}", email);
            Redirect::to(frontend).into_response()
        }
        Err(e) => {
            tracing::error!("Auth callback error: {:?}", e);
            Redirect::to(&error_redirect(frontend, "auth_failed")).into_response()
        }
    }
}

async fn handle_callback_inner(state: &AppState, code: &str) -> anyhow::Result<String> {
    let google = state
        .config
        .google
        .as_ref()
        .context("Google OAuth is not configured")?;

    let tokens =
        oauth::exchange_code(&state.http, google, &state.config.oauth_redirect_uri, code).await?;
    let user_info = oauth::fetch_user_info(&state.http, &tokens.access_token).await?;

    if tokens.refresh_token.is_none() {
        tracing::warn!(
            "No refresh token received for {}; background sync needs a prior consent",
            user_info.email
        );
    }

    let mut conn = db::get_conn(&state.pool).await?;
    let user = users::upsert_with_tokens(
        &mut conn,
        user_info.id.as_deref(),
        &user_info.email,
        user_info.name.as_deref(),
        &tokens.access_token,
        tokens.refresh_token.as_deref(),
        tokens.expires_at(Utc::now()),
    )
    .await
    .context("Failed to store OAuth tokens")?;

    Ok(user.email)
}

fn error_redirect(frontend: &str, reason: &str) -> String {
    let separator = if frontend.contains('?') { '&' } else { '?' };
    format!(
        "{}{}auth_error={}",
        frontend,
        separator,
        urlencoding::encode(reason)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_redirect_appends_query() {
        assert_eq!(
            error_redirect("http://127.0.0.1:5500/oauth.html", "auth_failed"),
            "http://127.0.0.1:5500/oauth.html?auth_error=auth_failed"
        );
        assert_eq!(
            error_redirect("http://localhost/app?tab=inbox", "access denied"),
            "http://localhost/app?tab=inbox&auth_error=access%20denied"
        );
    }
}
