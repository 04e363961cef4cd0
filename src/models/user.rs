//! User model for storage and API.

use serde::{Deserialize, Serialize};

/// User profile stored in Firestore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Application user ID (also used as document ID)
    pub user_id: String,
    /// Strava athlete ID
    pub strava_athlete_id: u64,
    /// Display name ("First Last")
    pub name: String,
    /// Profile picture URL
    pub profile_picture: Option<String>,
    /// When user first connected
    pub created_at: String,
    /// Last sign-in timestamp
    pub last_active: String,
}

/// Identity carried in the session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: String,
    pub strava_id: u64,
    pub name: String,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id.clone(),
            strava_id: user.strava_athlete_id,
            name: user.name.clone(),
        }
    }
}
