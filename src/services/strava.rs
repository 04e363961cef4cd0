// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client for OAuth and segment lookups.
//!
//! Handles:
//! - Authorization code exchange at sign-in
//! - Token refresh (as the [`TokenIssuer`] behind credential management)
//! - Segment search, details and effort listing

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

const STRAVA_API_BASE: &str = "https://www.strava.com/api/v3";
const STRAVA_OAUTH_TOKEN_URL: &str = "https://www.strava.com/oauth/token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Source of fresh Strava tokens.
///
/// The production implementation is [`StravaClient`]; tests use a counting
/// double to check that refreshes happen exactly when needed.
#[trait_variant::make(TokenIssuer: Send)]
pub trait LocalTokenIssuer {
    /// Exchange a refresh token for a new token pair.
    ///
    /// Any non-success answer from the issuer is [`AppError::RefreshFailed`].
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AppError>;
}

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    /// Create a new Strava client with OAuth credentials.
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self::with_urls(
            client_id,
            client_secret,
            STRAVA_API_BASE.to_string(),
            STRAVA_OAUTH_TOKEN_URL.to_string(),
        )
    }

    /// Create a client pointed at alternate endpoints (local stubs).
    pub fn with_urls(
        client_id: String,
        client_secret: String,
        base_url: String,
        token_url: String,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build HTTP client with timeout, using default");
                reqwest::Client::new()
            });

        Self {
            http,
            base_url,
            token_url,
            client_id,
            client_secret,
        }
    }

    /// Exchange an OAuth authorization code for tokens and athlete profile.
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthGrant, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Strava token exchange failed");
            return Err(AppError::StravaApi(format!(
                "Token exchange failed with status {}",
                status
            )));
        }

        let raw: RawTokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::StravaApi(format!("Failed to parse token response: {}", e)))?;

        let athlete = raw
            .athlete
            .ok_or_else(|| AppError::StravaApi("Token response missing athlete".to_string()))?;
        let expires_at = expiry_from_unix(raw.expires_at)
            .ok_or_else(|| AppError::StravaApi("Token response has invalid expiry".to_string()))?;

        Ok(OAuthGrant {
            tokens: TokenGrant {
                access_token: raw.access_token,
                refresh_token: raw.refresh_token,
                expires_at,
            },
            athlete,
        })
    }

    /// Search for riding segments within a bounding box.
    pub async fn search_segments(
        &self,
        access_token: &str,
        bounds: &SegmentBounds,
    ) -> Result<Vec<StravaSegment>, AppError> {
        let url = format!("{}/segments/explore", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("bounds", bounds.to_query()),
                ("activity_type", "riding".to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        let explore: ExploreResponse = self.check_response_json(response).await?;
        Ok(explore.segments)
    }

    /// Get a segment by ID.
    pub async fn get_segment(
        &self,
        access_token: &str,
        segment_id: u64,
    ) -> Result<StravaSegment, AppError> {
        let url = format!("{}/segments/{}", self.base_url, segment_id);
        self.get_json(&url, access_token).await
    }

    /// List the authenticated athlete's efforts on a segment within a date range.
    pub async fn get_segment_efforts(
        &self,
        access_token: &str,
        segment_id: u64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StravaSegmentEffort>, AppError> {
        let url = format!("{}/segment_efforts", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("segment_id", segment_id.to_string()),
                ("start_date_local", crate::time_utils::format_utc_rfc3339(start)),
                ("end_date_local", crate::time_utils::format_utc_rfc3339(end)),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(AppError::NotFound("Strava resource".to_string()));
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                tracing::warn!("Strava rate limit hit (429)");
                return Err(AppError::StravaApi("Strava rate limit exceeded".to_string()));
            }
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(AppError::StravaApi("Strava rejected access token".to_string()));
            }

            return Err(AppError::StravaApi(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::StravaApi(format!("JSON parse error: {}", e)))
    }
}

impl TokenIssuer for StravaClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::RefreshFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::RefreshFailed(format!("HTTP {}: {}", status, body)));
        }

        let raw: RawTokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::RefreshFailed(format!("unreadable response: {}", e)))?;

        let expires_at = expiry_from_unix(raw.expires_at)
            .ok_or_else(|| AppError::RefreshFailed("invalid expires_at".to_string()))?;

        Ok(TokenGrant {
            access_token: raw.access_token,
            refresh_token: raw.refresh_token,
            expires_at,
        })
    }
}

fn expiry_from_unix(expires_at: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(expires_at, 0)
}

/// A fresh access/refresh token pair from Strava.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of the authorization code exchange.
#[derive(Debug, Clone)]
pub struct OAuthGrant {
    pub tokens: TokenGrant,
    pub athlete: StravaAthlete,
}

/// Token endpoint response (the athlete is only present on code exchange).
#[derive(Debug, Deserialize)]
struct RawTokenResponse {
    access_token: String,
    refresh_token: String,
    expires_at: i64,
    athlete: Option<StravaAthlete>,
}

/// Athlete info from OAuth token exchange.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StravaAthlete {
    pub id: u64,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    pub profile: Option<String>,
}

impl StravaAthlete {
    /// Display name, "First Last".
    pub fn display_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
            .trim()
            .to_string()
    }
}

/// Bounding box for segment search, in degrees.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SegmentBounds {
    #[validate(range(min = -90.0, max = 90.0))]
    pub sw_lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub sw_lng: f64,
    #[validate(range(min = -90.0, max = 90.0))]
    pub ne_lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub ne_lng: f64,
}

impl SegmentBounds {
    /// `sw_lat,sw_lng,ne_lat,ne_lng`, the format `/segments/explore` expects.
    pub fn to_query(&self) -> String {
        format!(
            "{},{},{},{}",
            self.sw_lat, self.sw_lng, self.ne_lat, self.ne_lng
        )
    }
}

#[derive(Debug, Deserialize)]
struct ExploreResponse {
    #[serde(default)]
    segments: Vec<StravaSegment>,
}

/// A Strava segment as returned by explore or detail endpoints.
///
/// Explore results call the grade `avg_grade`; details call it `average_grade`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StravaSegment {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub distance: f64,
    #[serde(alias = "avg_grade", default)]
    pub average_grade: f64,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub climb_category: Option<i32>,
    pub elev_difference: Option<f64>,
    pub start_latlng: Option<Vec<f64>>,
    pub end_latlng: Option<Vec<f64>>,
    /// Encoded polyline
    pub points: Option<String>,
}

/// One effort by the authenticated athlete on a segment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StravaSegmentEffort {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub elapsed_time: u32,
    pub start_date: String,
    pub segment: SegmentRef,
}

/// Segment reference embedded in an effort.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SegmentRef {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
}
