// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava OAuth sign-in, session cookie and logout routes.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Redirect,
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_session_token, SESSION_COOKIE};
use crate::models::{SessionUser, User};
use crate::services::strava::OAuthGrant;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Strava scopes requested at sign-in.
const STRAVA_SCOPE: &str = "read,activity:read_all";

/// How long a signed OAuth `state` stays acceptable.
const OAUTH_STATE_MAX_AGE_SECS: u64 = 10 * 60;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/strava", get(auth_start))
        .route("/auth/strava/callback", get(auth_callback))
        .route("/auth/logout", post(logout))
}

/// Sign-in failure reasons passed to the frontend sign-in page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignInError {
    OAuth,
    Token,
    Server,
}

impl SignInError {
    fn as_str(self) -> &'static str {
        match self {
            SignInError::OAuth => "OAuthError",
            SignInError::Token => "TokenError",
            SignInError::Server => "ServerError",
        }
    }
}

fn signin_error_redirect(frontend_url: &str, error: SignInError) -> Redirect {
    Redirect::temporary(&format!(
        "{}/auth/signin?error={}",
        frontend_url,
        error.as_str()
    ))
}

/// Start OAuth flow - redirect to Strava authorization.
async fn auth_start(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Redirect> {
    let now = unix_now()?;
    let oauth_state = sign_oauth_state(&state.config.oauth_state_key, now)?;

    let callback_url = format!("{}/auth/strava/callback", request_origin(&headers));

    let auth_url = format!(
        "https://www.strava.com/oauth/authorize?\
         client_id={}&\
         redirect_uri={}&\
         response_type=code&\
         approval_prompt=auto&\
         scope={}&\
         state={}",
        state.config.strava_client_id,
        urlencoding::encode(&callback_url),
        urlencoding::encode(STRAVA_SCOPE),
        oauth_state
    );

    tracing::info!(
        client_id = %state.config.strava_client_id,
        "Starting OAuth flow, redirecting to Strava"
    );

    Ok(Redirect::temporary(&auth_url))
}

/// Scheme and host this request was addressed to.
fn request_origin(headers: &HeaderMap) -> String {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:8080");

    let scheme = if host.contains("localhost") || host.contains("127.0.0.1") {
        "http"
    } else {
        "https"
    };

    format!("{}://{}", scheme, host)
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code for tokens, create session.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> (CookieJar, Redirect) {
    let frontend_url = state.config.frontend_url.as_str();

    if let Some(error) = &params.error {
        tracing::warn!(error = %error, "OAuth error from Strava");
        return (jar, signin_error_redirect(frontend_url, SignInError::OAuth));
    }

    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        tracing::warn!("OAuth callback without authorization code");
        return (jar, signin_error_redirect(frontend_url, SignInError::OAuth));
    };

    let state_ok = match (params.state.as_deref(), unix_now()) {
        (Some(s), Ok(now)) => verify_oauth_state(s, &state.config.oauth_state_key, now),
        _ => false,
    };
    if !state_ok {
        tracing::warn!("Invalid or expired OAuth state parameter");
        return (jar, signin_error_redirect(frontend_url, SignInError::OAuth));
    }

    let grant = match state.strava.exchange_code(code).await {
        Ok(grant) => grant,
        Err(e) => {
            tracing::error!(error = %e, "Strava token exchange failed");
            return (jar, signin_error_redirect(frontend_url, SignInError::Token));
        }
    };

    match complete_sign_in(&state, grant).await {
        Ok(session_token) => {
            let jar = jar.add(session_cookie(session_token, state.config.secure_cookies()));
            (
                jar,
                Redirect::temporary(&format!("{}/dashboard", frontend_url)),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to complete sign-in");
            (jar, signin_error_redirect(frontend_url, SignInError::Server))
        }
    }
}

/// Store the user profile and encrypted tokens, then mint a session token.
async fn complete_sign_in(state: &AppState, grant: OAuthGrant) -> Result<String> {
    let athlete = &grant.athlete;
    let user_id = athlete.id.to_string();
    let now = crate::time_utils::format_utc_rfc3339(chrono::Utc::now());

    let created_at = match state.db.get_user(&user_id).await {
        Ok(Some(existing)) => existing.created_at,
        Ok(None) => now.clone(),
        Err(e) => {
            tracing::warn!(error = %e, user_id = %user_id, "Failed to read existing user");
            now.clone()
        }
    };

    let user = User {
        user_id: user_id.clone(),
        strava_athlete_id: athlete.id,
        name: athlete.display_name(),
        profile_picture: athlete.profile.clone(),
        created_at,
        last_active: now,
    };

    if let Err(e) = state.db.upsert_user(&user).await {
        tracing::warn!(error = %e, "Failed to store user profile, continuing anyway");
    }

    state
        .credentials
        .store_oauth_grant(&user_id, &grant.tokens)
        .await?;

    tracing::info!(user_id = %user_id, "OAuth successful, credentials stored");

    create_session_token(&SessionUser::from(&user), &state.config.session_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Session token creation failed: {}", e)))
}

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::days(30))
        .build()
}

/// Logout - clear the session cookie.
async fn logout(jar: CookieJar) -> (CookieJar, StatusCode) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, StatusCode::NO_CONTENT)
}

fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))
}

fn state_mac(key: &[u8], payload: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(mac)
}

/// Build the OAuth `state` parameter: base64url of `timestamp_hex|hmac_hex`.
pub fn sign_oauth_state(key: &[u8], issued_at: u64) -> Result<String> {
    let payload = format!("{:x}", issued_at);
    let signature = state_mac(key, &payload)?.finalize().into_bytes();
    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, hex::encode(signature))))
}

/// Check the signature and age of an OAuth `state` parameter.
pub fn verify_oauth_state(state: &str, key: &[u8], now: u64) -> bool {
    let Some(decoded) = URL_SAFE_NO_PAD
        .decode(state)
        .ok()
        .and_then(|b| String::from_utf8(b).ok())
    else {
        return false;
    };

    let Some((payload, signature_hex)) = decoded.split_once('|') else {
        return false;
    };
    let Ok(issued_at) = u64::from_str_radix(payload, 16) else {
        return false;
    };
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mac) = state_mac(key, payload) else {
        return false;
    };

    let expected = mac.finalize().into_bytes();
    if !bool::from(expected.as_slice().ct_eq(&signature)) {
        tracing::warn!("OAuth state signature mismatch");
        return false;
    }

    issued_at <= now && now - issued_at <= OAUTH_STATE_MAX_AGE_SECS
}
