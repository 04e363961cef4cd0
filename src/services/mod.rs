// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod credentials;
pub mod crypto;
pub mod standings;
pub mod strava;

pub use credentials::{CredentialManager, StravaCredentials};
pub use crypto::{CryptoError, TokenCipher};
pub use standings::compute_standings;
pub use strava::{StravaClient, TokenGrant, TokenIssuer};
