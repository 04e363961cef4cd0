// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{DateTime, Utc};
use segment_races::config::Config;
use segment_races::db::{CredentialStore, FirestoreDb};
use segment_races::error::AppError;
use segment_races::middleware::auth::create_session_token;
use segment_races::middleware::rate_limit::{MemoryRateLimitStore, RateLimitConfig, RateLimiter};
use segment_races::models::{SessionUser, StoredCredential};
use segment_races::routes::create_router;
use segment_races::services::{CredentialManager, StravaClient, TokenCipher, TokenGrant, TokenIssuer};
use segment_races::AppState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Cipher using the test configuration's key.
#[allow(dead_code)]
pub fn test_cipher() -> TokenCipher {
    TokenCipher::new(&Config::test_default().encryption_key).expect("test key is 32 bytes")
}

/// Create a test app with offline mock dependencies.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with_config(Config::test_default())
}

/// Create a test app from a specific configuration.
#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> (axum::Router, Arc<AppState>) {
    let db = FirestoreDb::new_mock();
    // Unroutable endpoints: any accidental network call fails fast
    let strava = StravaClient::with_urls(
        config.strava_client_id.clone(),
        config.strava_client_secret.clone(),
        "http://127.0.0.1:9/api/v3".to_string(),
        "http://127.0.0.1:9/oauth/token".to_string(),
    );
    let cipher = TokenCipher::new(&config.encryption_key).expect("test key is 32 bytes");
    let credentials = CredentialManager::new(Arc::new(db.clone()), Arc::new(strava.clone()), cipher);
    let rate_limiter = RateLimiter::new(
        Arc::new(MemoryRateLimitStore::new()),
        RateLimitConfig::per_minute(config.auth_rate_limit_per_minute),
        RateLimitConfig::per_minute(config.api_rate_limit_per_minute),
    );

    let state = Arc::new(AppState {
        config,
        db,
        strava,
        credentials,
        rate_limiter,
    });

    (create_router(state.clone()), state)
}

/// Session user used across route tests.
#[allow(dead_code)]
pub fn test_user() -> SessionUser {
    SessionUser {
        user_id: "12345".to_string(),
        strava_id: 12345,
        name: "Test Rider".to_string(),
    }
}

/// Signed session token for [`test_user`].
#[allow(dead_code)]
pub fn test_session_token(state: &AppState) -> String {
    create_session_token(&test_user(), &state.config.session_signing_key)
        .expect("session token should sign")
}

/// In-memory credential store that counts reads and writes.
#[derive(Default)]
#[allow(dead_code)]
pub struct MemoryCredentialStore {
    records: Mutex<HashMap<String, StoredCredential>>,
    pub finds: AtomicUsize,
    pub upserts: AtomicUsize,
}

#[allow(dead_code)]
impl MemoryCredentialStore {
    pub fn with(credential: StoredCredential) -> Self {
        let store = Self::default();
        store
            .records
            .lock()
            .unwrap()
            .insert(credential.user_id.clone(), credential);
        store
    }

    pub fn get(&self, user_id: &str) -> Option<StoredCredential> {
        self.records.lock().unwrap().get(user_id).cloned()
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

impl CredentialStore for MemoryCredentialStore {
    async fn find_credential(&self, user_id: &str) -> Result<Option<StoredCredential>, AppError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(user_id))
    }

    async fn upsert_credential(&self, credential: &StoredCredential) -> Result<(), AppError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .insert(credential.user_id.clone(), credential.clone());
        Ok(())
    }
}

/// Token issuer double with a canned answer and a call counter.
#[allow(dead_code)]
pub struct MockIssuer {
    response: Result<TokenGrant, String>,
    delay: Duration,
    calls: AtomicUsize,
    seen_refresh_tokens: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockIssuer {
    pub fn granting(access: &str, refresh: &str, expires_at: DateTime<Utc>) -> Self {
        Self {
            response: Ok(TokenGrant {
                access_token: access.to_string(),
                refresh_token: refresh.to_string(),
                expires_at,
            }),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            seen_refresh_tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            response: Err(reason.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            seen_refresh_tokens: Mutex::new(Vec::new()),
        }
    }

    /// Make each refresh take `delay`, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_refresh_tokens(&self) -> Vec<String> {
        self.seen_refresh_tokens.lock().unwrap().clone()
    }
}

impl TokenIssuer for MockIssuer {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_refresh_tokens
            .lock()
            .unwrap()
            .push(refresh_token.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.response
            .clone()
            .map_err(AppError::RefreshFailed)
    }
}

/// Encrypted credential for `user_id` with the given plaintext tokens.
#[allow(dead_code)]
pub fn encrypted_credential(
    cipher: &TokenCipher,
    user_id: &str,
    access: &str,
    refresh: &str,
    token_expiry: DateTime<Utc>,
) -> StoredCredential {
    StoredCredential {
        user_id: user_id.to_string(),
        access_token_encrypted: cipher.encrypt(access).unwrap(),
        refresh_token_encrypted: cipher.encrypt(refresh).unwrap(),
        token_expiry,
    }
}
