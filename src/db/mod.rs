//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

use crate::error::AppError;
use crate::models::StoredCredential;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Encrypted Strava credentials (keyed by user id)
    pub const CREDENTIALS: &str = "credentials";
}

/// Persistence for encrypted Strava credentials, one record per user.
///
/// Implemented by [`FirestoreDb`] in production. Tests supply in-memory
/// stores so the refresh logic can be exercised without the emulator.
#[trait_variant::make(CredentialStore: Send)]
pub trait LocalCredentialStore {
    /// Look up the stored credential for a user.
    async fn find_credential(&self, user_id: &str) -> Result<Option<StoredCredential>, AppError>;

    /// Insert or replace the stored credential for `credential.user_id`.
    async fn upsert_credential(&self, credential: &StoredCredential) -> Result<(), AppError>;
}
