// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava credential lifecycle: decrypt, refresh when expired, re-encrypt.

use crate::db::{CredentialStore, FirestoreDb};
use crate::error::AppError;
use crate::models::StoredCredential;
use crate::services::crypto::TokenCipher;
use crate::services::strava::{StravaClient, TokenGrant, TokenIssuer};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-user locks serializing refresh exchanges.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Credential manager wired to Firestore and the Strava token endpoint.
pub type StravaCredentials = CredentialManager<FirestoreDb, StravaClient>;

/// Hands out unexpired Strava access tokens for users.
///
/// Tokens live encrypted in the store. A valid token is decrypted and
/// returned without touching the network. An expired one is refreshed with
/// the issuer and the new pair is written back in a single upsert.
pub struct CredentialManager<S, I> {
    store: Arc<S>,
    issuer: Arc<I>,
    cipher: TokenCipher,
    refresh_locks: RefreshLocks,
}

impl<S, I> Clone for CredentialManager<S, I> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            issuer: self.issuer.clone(),
            cipher: self.cipher.clone(),
            refresh_locks: self.refresh_locks.clone(),
        }
    }
}

impl<S, I> CredentialManager<S, I>
where
    S: CredentialStore + Send + Sync,
    I: TokenIssuer + Send + Sync,
{
    pub fn new(store: Arc<S>, issuer: Arc<I>, cipher: TokenCipher) -> Self {
        Self {
            store,
            issuer,
            cipher,
            refresh_locks: Arc::new(DashMap::new()),
        }
    }

    /// Get an access token for `user_id` that is valid right now.
    ///
    /// Refreshes through the issuer when the stored token has expired. At
    /// most one refresh per user runs at a time in this process; callers
    /// that queued behind it re-read the store and reuse the new token.
    ///
    /// Errors:
    /// - [`AppError::NotFound`] when the user has no stored credential
    /// - [`AppError::RefreshFailed`] when the issuer rejects the refresh;
    ///   the stored credential is left as it was
    pub async fn get_valid_access_token(&self, user_id: &str) -> Result<String, AppError> {
        let credential = self.load(user_id).await?;
        if !credential.is_expired_at(Utc::now()) {
            return Ok(self.cipher.decrypt(&credential.access_token_encrypted)?);
        }

        let lock = self
            .refresh_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked(user_id).await
        };

        // Only the map and this task hold the lock: nobody is waiting on it.
        self.refresh_locks
            .remove_if(user_id, |_, held| Arc::strong_count(held) <= 2);

        result
    }

    /// Number of users with a refresh running or queued.
    pub fn pending_refreshes(&self) -> usize {
        self.refresh_locks.len()
    }

    async fn refresh_locked(&self, user_id: &str) -> Result<String, AppError> {
        // Another task may have refreshed while we waited.
        let credential = self.load(user_id).await?;
        let now = Utc::now();
        if !credential.is_expired_at(now) {
            return Ok(self.cipher.decrypt(&credential.access_token_encrypted)?);
        }

        tracing::info!(user_id, "Access token expired, refreshing");

        let refresh_token = self.cipher.decrypt(&credential.refresh_token_encrypted)?;
        let grant = self.issuer.refresh(&refresh_token).await?;

        if grant.expires_at <= now {
            return Err(AppError::RefreshFailed(
                "issuer returned an already expired token".to_string(),
            ));
        }

        self.persist(user_id, &grant).await?;

        tracing::info!(user_id, expires_at = %grant.expires_at, "Token refreshed");
        Ok(grant.access_token)
    }

    /// Encrypt and store the tokens from a completed OAuth sign-in.
    pub async fn store_oauth_grant(&self, user_id: &str, grant: &TokenGrant) -> Result<(), AppError> {
        self.persist(user_id, grant).await
    }

    async fn load(&self, user_id: &str) -> Result<StoredCredential, AppError> {
        self.store
            .find_credential(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Credentials for user {}", user_id)))
    }

    async fn persist(&self, user_id: &str, grant: &TokenGrant) -> Result<(), AppError> {
        let credential = StoredCredential {
            user_id: user_id.to_string(),
            access_token_encrypted: self.cipher.encrypt(&grant.access_token)?,
            refresh_token_encrypted: self.cipher.encrypt(&grant.refresh_token)?,
            token_expiry: grant.expires_at,
        };
        self.store.upsert_credential(&credential).await
    }
}
