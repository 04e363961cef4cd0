// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Stored Strava OAuth credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's Strava tokens as persisted.
///
/// Both tokens are `iv:tag:ciphertext` blobs produced by
/// [`TokenCipher`](crate::services::TokenCipher); plaintext never reaches storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// Owning user (also used as document ID)
    pub user_id: String,
    /// Encrypted access token
    pub access_token_encrypted: String,
    /// Encrypted refresh token
    pub refresh_token_encrypted: String,
    /// Instant after which the access token must be refreshed before use
    pub token_expiry: DateTime<Utc>,
}

impl StoredCredential {
    /// Whether the access token can no longer be used at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.token_expiry
    }
}
