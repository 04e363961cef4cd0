// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fixed-window rate limiting keyed by client address.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Above this many tracked clients, expired windows are swept on each check.
const PURGE_THRESHOLD: usize = 10_000;

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    /// When the current window ends (Unix milliseconds)
    pub reset_at_ms: i64,
}

/// Storage backend for rate limit counters.
#[trait_variant::make(RateLimitStore: Send)]
pub trait LocalRateLimitStore {
    /// Count a request for `key` at `now_ms` and report whether it is allowed.
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
        now_ms: i64,
    ) -> Result<RateLimitResult, AppError>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at_ms: i64,
}

/// In-process counters. Each instance keeps its own windows.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    windows: DashMap<String, Window>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of clients currently tracked.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    fn purge_expired(&self, now_ms: i64) {
        self.windows.retain(|_, w| w.reset_at_ms >= now_ms);
    }

    fn check(&self, key: &str, config: &RateLimitConfig, now_ms: i64) -> RateLimitResult {
        if self.windows.len() > PURGE_THRESHOLD {
            self.purge_expired(now_ms);
        }

        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at_ms: now_ms + config.window_ms(),
        });

        if entry.reset_at_ms < now_ms {
            *entry = Window {
                count: 0,
                reset_at_ms: now_ms + config.window_ms(),
            };
        }

        if entry.count >= config.max_requests {
            return RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_at_ms: entry.reset_at_ms,
            };
        }

        entry.count += 1;
        RateLimitResult {
            allowed: true,
            remaining: config.max_requests - entry.count,
            reset_at_ms: entry.reset_at_ms,
        }
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
        now_ms: i64,
    ) -> Result<RateLimitResult, AppError> {
        Ok(self.check(key, config, now_ms))
    }
}

/// Limits for the two route groups, sharing one store.
pub struct RateLimiter<S = MemoryRateLimitStore> {
    store: Arc<S>,
    auth: RateLimitConfig,
    api: RateLimitConfig,
}

impl<S: RateLimitStore + Sync> RateLimiter<S> {
    pub fn new(store: Arc<S>, auth: RateLimitConfig, api: RateLimitConfig) -> Self {
        Self { store, auth, api }
    }

    /// Check the auth route limit for a client.
    pub async fn check_auth(&self, key: &str) -> Result<RateLimitResult, AppError> {
        self.store
            .check_and_increment(&format!("auth:{}", key), &self.auth, now_ms())
            .await
    }

    /// Check the API route limit for a client.
    pub async fn check_api(&self, key: &str) -> Result<RateLimitResult, AppError> {
        self.store
            .check_and_increment(&format!("api:{}", key), &self.api, now_ms())
            .await
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Rate limit key for a request: the first `X-Forwarded-For` hop.
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

fn ceil_secs(ms: i64) -> i64 {
    (ms + 999) / 1000
}

/// 429 response carrying `Retry-After` and `X-RateLimit-Reset`.
pub fn rate_limited_response(reset_at_ms: i64, now_ms: i64) -> Response {
    let retry_after_secs = ceil_secs((reset_at_ms - now_ms).max(0));
    let reset_secs = ceil_secs(reset_at_ms);

    let mut response = AppError::RateLimited.into_response();
    let headers = response.headers_mut();
    headers.insert("Retry-After", HeaderValue::from(retry_after_secs));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(reset_secs));
    response
}

async fn enforce(result: Result<RateLimitResult, AppError>, req: Request, next: Next) -> Response {
    match result {
        Ok(r) if r.allowed => next.run(req).await,
        Ok(r) => rate_limited_response(r.reset_at_ms, now_ms()),
        Err(e) => {
            // Fail open on store errors.
            tracing::warn!(error = %e, "Rate limit check failed, allowing request");
            next.run(req).await
        }
    }
}

/// Middleware applying the auth route limit.
pub async fn limit_auth(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let key = client_key(req.headers());
    let result = state.rate_limiter.check_auth(&key).await;
    if matches!(&result, Ok(r) if !r.allowed) {
        tracing::warn!(client = %key, "Auth rate limit exceeded");
    }
    enforce(result, req, next).await
}

/// Middleware applying the API route limit.
pub async fn limit_api(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let key = client_key(req.headers());
    let result = state.rate_limiter.check_api(&key).await;
    if matches!(&result, Ok(r) if !r.allowed) {
        tracing::warn!(client = %key, "API rate limit exceeded");
    }
    enforce(result, req, next).await
}
