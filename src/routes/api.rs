// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Effort, ScoringMode, UserStanding};
use crate::services::standings::compute_standings;
use crate::services::strava::{SegmentBounds, StravaSegment, StravaSegmentEffort};
use crate::time_utils::format_time;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const MAX_EFFORTS: u64 = 10_000;
const MAX_SEGMENTS: u64 = 100;

/// API routes (require authentication).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/standings", post(post_standings))
        .route("/api/strava/segments", get(search_segments))
        .route("/api/strava/segments/{id}", get(get_segment))
        .route("/api/strava/segments/{id}/efforts", get(get_segment_efforts))
}

fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::BadRequest(e.to_string())
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MeResponse {
    pub user_id: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub strava_id: u64,
    pub name: String,
    pub profile_picture: Option<String>,
}

/// Get current user. Identity comes from the session; the stored profile
/// only adds the picture.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Json<MeResponse> {
    let profile_picture = match state.db.get_user(&user.user_id).await {
        Ok(profile) => profile.and_then(|p| p.profile_picture),
        Err(e) => {
            tracing::warn!(error = %e, user_id = %user.user_id, "Failed to load user profile");
            None
        }
    };

    Json(MeResponse {
        user_id: user.user_id,
        strava_id: user.strava_id,
        name: user.name,
        profile_picture,
    })
}

// ─── Standings ───────────────────────────────────────────────

/// Leaderboard request: every recorded effort plus the race definition.
#[derive(Debug, Deserialize, Validate)]
pub struct StandingsRequest {
    #[validate(length(max = MAX_EFFORTS), nested)]
    pub efforts: Vec<Effort>,
    #[validate(length(max = MAX_SEGMENTS))]
    pub segment_ids: Vec<String>,
    pub mode: ScoringMode,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StandingsResponse {
    pub mode: String,
    pub standings: Vec<StandingEntry>,
}

/// One leaderboard row.
#[derive(Serialize, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StandingEntry {
    /// 1-based; equal scores share a rank
    pub rank: u32,
    pub user_id: String,
    pub user_name: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub score: u64,
    /// Total time as `M:SS` (TIME mode only)
    pub total_time: Option<String>,
    /// Best time per segment as `M:SS`
    pub times: BTreeMap<String, String>,
    pub points: BTreeMap<String, u32>,
}

/// Convert computed standings into ranked rows.
pub fn rank_standings(standings: Vec<UserStanding>, mode: ScoringMode) -> Vec<StandingEntry> {
    let mut entries: Vec<StandingEntry> = Vec::with_capacity(standings.len());
    let mut previous: Option<(u64, u32)> = None;

    for (i, standing) in standings.into_iter().enumerate() {
        let rank = match previous {
            Some((score, rank)) if score == standing.score => rank,
            _ => i as u32 + 1,
        };
        previous = Some((standing.score, rank));

        entries.push(StandingEntry {
            rank,
            user_id: standing.user_id,
            user_name: standing.user_name,
            score: standing.score,
            total_time: (mode == ScoringMode::Time).then(|| format_time(standing.score)),
            times: standing
                .times
                .into_iter()
                .map(|(seg, t)| (seg, format_time(u64::from(t))))
                .collect(),
            points: standing.points.into_iter().collect(),
        });
    }

    entries
}

/// Compute a race leaderboard from submitted efforts.
async fn post_standings(
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(request): Json<StandingsRequest>,
) -> Result<Json<StandingsResponse>> {
    request.validate().map_err(validation_error)?;

    tracing::debug!(
        user_id = %user.user_id,
        efforts = request.efforts.len(),
        segments = request.segment_ids.len(),
        mode = %request.mode,
        "Computing standings"
    );

    let standings = compute_standings(&request.efforts, &request.segment_ids, request.mode);

    Ok(Json(StandingsResponse {
        mode: request.mode.to_string(),
        standings: rank_standings(standings, request.mode),
    }))
}

// ─── Strava Segments ─────────────────────────────────────────

async fn search_segments(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(bounds): Query<SegmentBounds>,
) -> Result<Json<Vec<StravaSegment>>> {
    bounds.validate().map_err(validation_error)?;
    if bounds.sw_lat > bounds.ne_lat {
        return Err(AppError::BadRequest(
            "sw_lat must not be north of ne_lat".to_string(),
        ));
    }

    let access_token = state
        .credentials
        .get_valid_access_token(&user.user_id)
        .await?;
    let segments = state.strava.search_segments(&access_token, &bounds).await?;

    Ok(Json(segments))
}

async fn get_segment(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(segment_id): Path<u64>,
) -> Result<Json<StravaSegment>> {
    let access_token = state
        .credentials
        .get_valid_access_token(&user.user_id)
        .await?;
    let segment = state.strava.get_segment(&access_token, segment_id).await?;

    Ok(Json(segment))
}

#[derive(Debug, Deserialize)]
struct EffortsQuery {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

async fn get_segment_efforts(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(segment_id): Path<u64>,
    Query(range): Query<EffortsQuery>,
) -> Result<Json<Vec<StravaSegmentEffort>>> {
    if range.end <= range.start {
        return Err(AppError::BadRequest("end must be after start".to_string()));
    }

    let access_token = state
        .credentials
        .get_valid_access_token(&user.user_id)
        .await?;
    let efforts = state
        .strava
        .get_segment_efforts(&access_token, segment_id, range.start, range.end)
        .await?;

    tracing::debug!(
        user_id = %user.user_id,
        segment_id,
        count = efforts.len(),
        "Fetched segment efforts"
    );

    Ok(Json(efforts))
}
