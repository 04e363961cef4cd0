//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup. Key material is validated here so a
//! missing or malformed secret stops the server before it accepts requests.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hkdf::Hkdf;
use sha2::Sha256;
use std::env;

/// Length in bytes of the AES-256 token encryption key.
pub const ENCRYPTION_KEY_LEN: usize = 32;

/// Minimum length in bytes of the session signing secret.
pub const MIN_SESSION_SECRET_LEN: usize = 32;

const OAUTH_STATE_KEY_INFO: &[u8] = b"segment-races oauth state v1";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Frontend URL for OAuth redirects and CORS
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Requests per minute allowed on the auth routes, per client
    pub auth_rate_limit_per_minute: u32,
    /// Requests per minute allowed on the API routes, per client
    pub api_rate_limit_per_minute: u32,

    // --- Secrets ---
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// HS256 key for session tokens (raw bytes)
    pub session_signing_key: Vec<u8>,
    /// HMAC key for the OAuth `state` parameter, derived from the session secret
    pub oauth_state_key: Vec<u8>,
    /// AES-256-GCM key for Strava tokens at rest (decoded, 32 bytes)
    pub encryption_key: Vec<u8>,
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let session_secret =
            env::var("SESSION_SECRET").map_err(|_| ConfigError::Missing("SESSION_SECRET"))?;
        let session_signing_key = parse_session_secret(&session_secret)?;
        let oauth_state_key = derive_oauth_state_key(&session_signing_key)?;

        let encryption_key = parse_encryption_key(
            &env::var("ENCRYPTION_KEY").map_err(|_| ConfigError::Missing("ENCRYPTION_KEY"))?,
        )?;

        Ok(Self {
            strava_client_id: env::var("STRAVA_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            auth_rate_limit_per_minute: env::var("AUTH_RATE_LIMIT_PER_MINUTE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            api_rate_limit_per_minute: env::var("API_RATE_LIMIT_PER_MINUTE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),

            strava_client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            session_signing_key,
            oauth_state_key,
            encryption_key,
        })
    }

    /// Fixed configuration for tests.
    pub fn test_default() -> Self {
        let session_signing_key = b"test_session_key_32_bytes_minimum!!".to_vec();
        let oauth_state_key = derive_oauth_state_key(&session_signing_key)
            .unwrap_or_else(|_| session_signing_key.clone());

        Self {
            strava_client_id: "test_client_id".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            auth_rate_limit_per_minute: 10,
            api_rate_limit_per_minute: 60,
            strava_client_secret: "test_secret".to_string(),
            session_signing_key,
            oauth_state_key,
            encryption_key: b"0123456789abcdef0123456789abcdef".to_vec(),
        }
    }

    /// Whether cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        !(self.frontend_url.starts_with("http://localhost")
            || self.frontend_url.starts_with("http://127.0.0.1"))
    }
}

/// Decode the base64 `ENCRYPTION_KEY` and check it is a 256-bit key.
pub fn parse_encryption_key(encoded: &str) -> Result<Vec<u8>, ConfigError> {
    let key = BASE64
        .decode(encoded.trim())
        .map_err(|e| ConfigError::Invalid {
            name: "ENCRYPTION_KEY",
            reason: format!("not valid base64: {}", e),
        })?;

    if key.len() != ENCRYPTION_KEY_LEN {
        return Err(ConfigError::Invalid {
            name: "ENCRYPTION_KEY",
            reason: format!(
                "expected {} bytes after decoding, got {}",
                ENCRYPTION_KEY_LEN,
                key.len()
            ),
        });
    }

    Ok(key)
}

fn parse_session_secret(secret: &str) -> Result<Vec<u8>, ConfigError> {
    let secret = secret.trim();
    if secret.len() < MIN_SESSION_SECRET_LEN {
        return Err(ConfigError::Invalid {
            name: "SESSION_SECRET",
            reason: format!("must be at least {} characters", MIN_SESSION_SECRET_LEN),
        });
    }
    Ok(secret.as_bytes().to_vec())
}

fn derive_oauth_state_key(session_key: &[u8]) -> Result<Vec<u8>, ConfigError> {
    let mut okm = [0u8; 32];
    Hkdf::<Sha256>::new(None, session_key)
        .expand(OAUTH_STATE_KEY_INFO, &mut okm)
        .map_err(|e| ConfigError::Invalid {
            name: "SESSION_SECRET",
            reason: format!("key derivation failed: {}", e),
        })?;
    Ok(okm.to_vec())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
