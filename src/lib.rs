// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Segment Races: leaderboards for cycling races built from Strava segments
//!
//! This crate provides the backend API for computing race standings and
//! managing the encrypted Strava credentials used to fetch segment efforts.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use middleware::rate_limit::RateLimiter;
use services::{StravaClient, StravaCredentials};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub strava: StravaClient,
    pub credentials: StravaCredentials,
    pub rate_limiter: RateLimiter,
}
