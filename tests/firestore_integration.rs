// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator and are skipped unless
//! `FIRESTORE_EMULATOR_HOST` is set.

use chrono::{Duration, SubsecRound, Utc};
use segment_races::db::CredentialStore;
use segment_races::models::User;
use segment_races::services::CredentialManager;
use std::sync::Arc;

mod common;
use common::{encrypted_credential, test_cipher, test_db, MockIssuer};

/// Unique user id per test run for isolation.
fn unique_user_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}", nanos % 1_000_000_000_000)
}

fn test_user(user_id: &str) -> User {
    User {
        user_id: user_id.to_string(),
        strava_athlete_id: user_id.parse().unwrap(),
        name: "Test Rider".to_string(),
        profile_picture: Some("https://example.com/pic.jpg".to_string()),
        created_at: "2024-01-15T10:00:00Z".to_string(),
        last_active: "2024-01-15T10:00:00Z".to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// USER TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_user_upsert_and_get() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();

    assert!(db.get_user(&user_id).await.unwrap().is_none());

    let user = test_user(&user_id);
    db.upsert_user(&user).await.unwrap();

    let fetched = db.get_user(&user_id).await.unwrap().expect("user should exist");
    assert_eq!(fetched, user);

    let mut updated = user.clone();
    updated.name = "Renamed Rider".to_string();
    updated.last_active = "2024-02-01T08:00:00Z".to_string();
    db.upsert_user(&updated).await.unwrap();

    let fetched = db.get_user(&user_id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "Renamed Rider");
    assert_eq!(fetched.created_at, "2024-01-15T10:00:00Z");
}

// ═══════════════════════════════════════════════════════════════════════════
// CREDENTIAL TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_credential_upsert_and_find() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();
    let cipher = test_cipher();
    let credential = encrypted_credential(
        &cipher,
        &user_id,
        "access",
        "refresh",
        Utc::now().trunc_subsecs(0) + Duration::hours(1),
    );

    assert!(db.find_credential(&user_id).await.unwrap().is_none());

    db.upsert_credential(&credential).await.unwrap();
    let found = db.find_credential(&user_id).await.unwrap().expect("credential stored");
    assert_eq!(found, credential);
    assert_eq!(cipher.decrypt(&found.access_token_encrypted).unwrap(), "access");

    let replacement = encrypted_credential(
        &cipher,
        &user_id,
        "access-2",
        "refresh-2",
        Utc::now().trunc_subsecs(0) + Duration::hours(2),
    );
    db.upsert_credential(&replacement).await.unwrap();
    let found = db.find_credential(&user_id).await.unwrap().unwrap();
    assert_eq!(found, replacement);
}

#[tokio::test]
async fn test_refresh_persists_through_firestore() {
    require_emulator!();

    let db = Arc::new(test_db().await);
    let user_id = unique_user_id();
    let cipher = test_cipher();
    db.upsert_credential(&encrypted_credential(
        &cipher,
        &user_id,
        "access-old",
        "refresh-old",
        Utc::now() - Duration::minutes(5),
    ))
    .await
    .unwrap();

    let new_expiry = Utc::now().trunc_subsecs(0) + Duration::hours(6);
    let issuer = Arc::new(MockIssuer::granting("access-new", "refresh-new", new_expiry));
    let manager = CredentialManager::new(db.clone(), issuer.clone(), cipher.clone());

    assert_eq!(manager.get_valid_access_token(&user_id).await.unwrap(), "access-new");
    // Second call sees the persisted token
    assert_eq!(manager.get_valid_access_token(&user_id).await.unwrap(), "access-new");
    assert_eq!(issuer.calls(), 1);

    let stored = db.find_credential(&user_id).await.unwrap().unwrap();
    assert_eq!(stored.token_expiry, new_expiry);
    assert_eq!(cipher.decrypt(&stored.refresh_token_encrypted).unwrap(), "refresh-new");
}
