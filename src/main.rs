// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Segment Races API Server
//!
//! Computes leaderboards for races made of Strava segments and proxies
//! segment lookups with each rider's own Strava credentials.

use segment_races::{
    config::Config,
    db::FirestoreDb,
    middleware::rate_limit::{MemoryRateLimitStore, RateLimitConfig, RateLimiter},
    services::{CredentialManager, StravaClient, TokenCipher},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Missing or malformed secrets stop startup here
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Segment Races API");

    let cipher = TokenCipher::new(&config.encryption_key)?;

    let db = FirestoreDb::new(&config.gcp_project_id).await?;

    let strava = StravaClient::new(
        config.strava_client_id.clone(),
        config.strava_client_secret.clone(),
    );

    let credentials =
        CredentialManager::new(Arc::new(db.clone()), Arc::new(strava.clone()), cipher);

    let rate_limiter = RateLimiter::new(
        Arc::new(MemoryRateLimitStore::new()),
        RateLimitConfig::per_minute(config.auth_rate_limit_per_minute),
        RateLimitConfig::per_minute(config.api_rate_limit_per_minute),
    );
    tracing::info!(
        auth_per_minute = config.auth_rate_limit_per_minute,
        api_per_minute = config.api_rate_limit_per_minute,
        "Rate limiting enabled"
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        strava,
        credentials,
        rate_limiter,
    });

    let app = segment_races::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("segment_races=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
