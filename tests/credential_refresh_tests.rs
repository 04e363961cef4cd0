// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential lifecycle tests.
//!
//! These tests verify that:
//! 1. A valid token is returned without contacting the issuer
//! 2. An expired token triggers exactly one refresh and one write
//! 3. Refresh failures leave the stored credential untouched
//! 4. Concurrent callers for one user share a single refresh

mod common;

use chrono::{Duration, Utc};
use common::{encrypted_credential, test_cipher, MemoryCredentialStore, MockIssuer};
use segment_races::db::CredentialStore;
use segment_races::error::AppError;
use segment_races::services::CredentialManager;
use std::sync::Arc;

const USER: &str = "12345";

#[tokio::test]
async fn test_valid_token_returned_without_refresh() {
    let cipher = test_cipher();
    let store = Arc::new(MemoryCredentialStore::with(encrypted_credential(
        &cipher,
        USER,
        "access-current",
        "refresh-current",
        Utc::now() + Duration::hours(1),
    )));
    let issuer = Arc::new(MockIssuer::failing("should not be called"));
    let manager = CredentialManager::new(store.clone(), issuer.clone(), cipher);

    let token = manager.get_valid_access_token(USER).await.unwrap();

    assert_eq!(token, "access-current");
    assert_eq!(issuer.calls(), 0);
    assert_eq!(store.upsert_count(), 0);
}

#[tokio::test]
async fn test_expired_token_refreshed_once_and_persisted() {
    let cipher = test_cipher();
    let original = encrypted_credential(
        &cipher,
        USER,
        "access-old",
        "refresh-old",
        Utc::now() - Duration::minutes(5),
    );
    let store = Arc::new(MemoryCredentialStore::with(original.clone()));
    let new_expiry = Utc::now() + Duration::hours(6);
    let issuer = Arc::new(MockIssuer::granting("access-new", "refresh-new", new_expiry));
    let manager = CredentialManager::new(store.clone(), issuer.clone(), cipher.clone());

    let token = manager.get_valid_access_token(USER).await.unwrap();

    assert_eq!(token, "access-new");
    assert_eq!(issuer.calls(), 1);
    assert_eq!(issuer.seen_refresh_tokens(), vec!["refresh-old".to_string()]);
    assert_eq!(store.upsert_count(), 1);

    let stored = store.get(USER).unwrap();
    assert_eq!(stored.token_expiry, new_expiry);
    assert_ne!(stored.access_token_encrypted, original.access_token_encrypted);
    assert_eq!(cipher.decrypt(&stored.access_token_encrypted).unwrap(), "access-new");
    assert_eq!(cipher.decrypt(&stored.refresh_token_encrypted).unwrap(), "refresh-new");
    // Plaintext never reaches storage
    assert!(!stored.access_token_encrypted.contains("access-new"));
}

#[tokio::test]
async fn test_token_at_exact_expiry_is_refreshed() {
    let cipher = test_cipher();
    let store = Arc::new(MemoryCredentialStore::with(encrypted_credential(
        &cipher,
        USER,
        "access-old",
        "refresh-old",
        Utc::now(),
    )));
    let issuer = Arc::new(MockIssuer::granting(
        "access-new",
        "refresh-new",
        Utc::now() + Duration::hours(6),
    ));
    let manager = CredentialManager::new(store, issuer.clone(), cipher);

    assert_eq!(manager.get_valid_access_token(USER).await.unwrap(), "access-new");
    assert_eq!(issuer.calls(), 1);
}

#[tokio::test]
async fn test_missing_credential_is_not_found() {
    let store = Arc::new(MemoryCredentialStore::default());
    let issuer = Arc::new(MockIssuer::failing("unused"));
    let manager = CredentialManager::new(store, issuer.clone(), test_cipher());

    let err = manager.get_valid_access_token("nobody").await.unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert!(err.requires_reauthorization());
    assert_eq!(issuer.calls(), 0);
}

#[tokio::test]
async fn test_refresh_failure_leaves_credential_untouched() {
    let cipher = test_cipher();
    let original = encrypted_credential(
        &cipher,
        USER,
        "access-old",
        "refresh-revoked",
        Utc::now() - Duration::minutes(1),
    );
    let store = Arc::new(MemoryCredentialStore::with(original.clone()));
    let issuer = Arc::new(MockIssuer::failing("HTTP 400: invalid_grant"));
    let manager = CredentialManager::new(store.clone(), issuer.clone(), cipher);

    let err = manager.get_valid_access_token(USER).await.unwrap_err();

    assert!(matches!(err, AppError::RefreshFailed(_)));
    assert_eq!(issuer.calls(), 1);
    assert_eq!(store.upsert_count(), 0);
    assert_eq!(store.get(USER), Some(original));
}

#[tokio::test]
async fn test_already_expired_grant_rejected() {
    let cipher = test_cipher();
    let original = encrypted_credential(
        &cipher,
        USER,
        "access-old",
        "refresh-old",
        Utc::now() - Duration::minutes(1),
    );
    let store = Arc::new(MemoryCredentialStore::with(original.clone()));
    let issuer = Arc::new(MockIssuer::granting(
        "access-stale",
        "refresh-stale",
        Utc::now() - Duration::seconds(30),
    ));
    let manager = CredentialManager::new(store.clone(), issuer, cipher);

    let err = manager.get_valid_access_token(USER).await.unwrap_err();

    assert!(matches!(err, AppError::RefreshFailed(_)));
    assert_eq!(store.get(USER), Some(original));
}

#[tokio::test]
async fn test_corrupt_stored_token_is_crypto_error() {
    let cipher = test_cipher();
    let mut credential = encrypted_credential(
        &cipher,
        USER,
        "access",
        "refresh",
        Utc::now() + Duration::hours(1),
    );
    credential.access_token_encrypted = "invalid".to_string();
    let store = Arc::new(MemoryCredentialStore::with(credential));
    let manager = CredentialManager::new(store, Arc::new(MockIssuer::failing("unused")), cipher);

    let err = manager.get_valid_access_token(USER).await.unwrap_err();

    assert!(matches!(err, AppError::Crypto(_)));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let cipher = test_cipher();
    let store = Arc::new(MemoryCredentialStore::with(encrypted_credential(
        &cipher,
        USER,
        "access-old",
        "refresh-old",
        Utc::now() - Duration::minutes(5),
    )));
    let issuer = Arc::new(
        MockIssuer::granting("access-new", "refresh-new", Utc::now() + Duration::hours(6))
            .with_delay(std::time::Duration::from_millis(50)),
    );
    let manager = CredentialManager::new(store.clone(), issuer.clone(), cipher);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.get_valid_access_token(USER).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "access-new");
    }

    assert_eq!(issuer.calls(), 1);
    assert_eq!(store.upsert_count(), 1);
    assert_eq!(manager.pending_refreshes(), 0);
}

#[tokio::test]
async fn test_refresh_locks_released_after_refresh() {
    let cipher = test_cipher();
    let expired = Utc::now() - Duration::minutes(5);
    let store = Arc::new(MemoryCredentialStore::default());
    for user in ["rider-1", "rider-2", "rider-3"] {
        store
            .upsert_credential(&encrypted_credential(&cipher, user, "a", "r", expired))
            .await
            .unwrap();
    }
    let issuer = Arc::new(MockIssuer::granting(
        "access-new",
        "refresh-new",
        Utc::now() + Duration::hours(6),
    ));
    let manager = CredentialManager::new(store, issuer.clone(), cipher);

    for user in ["rider-1", "rider-2", "rider-3"] {
        manager.get_valid_access_token(user).await.unwrap();
    }

    assert_eq!(issuer.calls(), 3);
    assert_eq!(manager.pending_refreshes(), 0);
}

#[tokio::test]
async fn test_refresh_lock_released_after_failure() {
    let cipher = test_cipher();
    let store = Arc::new(MemoryCredentialStore::with(encrypted_credential(
        &cipher,
        USER,
        "access-old",
        "refresh-revoked",
        Utc::now() - Duration::minutes(1),
    )));
    let manager = CredentialManager::new(store, Arc::new(MockIssuer::failing("invalid_grant")), cipher);

    assert!(manager.get_valid_access_token(USER).await.is_err());
    assert_eq!(manager.pending_refreshes(), 0);
}

#[tokio::test]
async fn test_store_oauth_grant_encrypts_tokens() {
    let cipher = test_cipher();
    let store = Arc::new(MemoryCredentialStore::default());
    let manager = CredentialManager::new(
        store.clone(),
        Arc::new(MockIssuer::failing("unused")),
        cipher.clone(),
    );
    let expiry = Utc::now() + Duration::hours(6);
    let grant = segment_races::services::TokenGrant {
        access_token: "access-login".to_string(),
        refresh_token: "refresh-login".to_string(),
        expires_at: expiry,
    };

    manager.store_oauth_grant(USER, &grant).await.unwrap();

    let stored = store.get(USER).unwrap();
    assert_eq!(stored.token_expiry, expiry);
    assert_eq!(cipher.decrypt(&stored.refresh_token_encrypted).unwrap(), "refresh-login");
    assert_eq!(manager.get_valid_access_token(USER).await.unwrap(), "access-login");
}
