// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! AES-256-GCM encryption for Strava tokens at rest.
//!
//! Each value is sealed under a fresh random 96-bit IV and stored as
//! `hex(iv):hex(tag):hex(ciphertext)`. The tag is kept separate so a stored
//! blob can be inspected without knowing the key layout of the ring API.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;

use crate::config::ENCRYPTION_KEY_LEN;

const TAG_LEN: usize = 16;

/// Errors from sealing or opening a token blob.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Encryption key must be {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    #[error("Malformed ciphertext")]
    InvalidFormat,

    #[error("Ciphertext failed authentication")]
    AuthenticationFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decrypted data is not valid UTF-8")]
    InvalidUtf8,
}

/// Authenticated cipher for credential strings.
///
/// Cheap to clone; the key schedule is shared.
#[derive(Clone)]
pub struct TokenCipher {
    key: std::sync::Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl TokenCipher {
    /// Build a cipher from a raw 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != ENCRYPTION_KEY_LEN {
            return Err(CryptoError::InvalidKey {
                expected: ENCRYPTION_KEY_LEN,
                actual: key.len(),
            });
        }

        let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| CryptoError::InvalidKey {
            expected: ENCRYPTION_KEY_LEN,
            actual: key.len(),
        })?;

        Ok(Self {
            key: std::sync::Arc::new(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        })
    }

    /// Build a cipher from a base64-encoded key, as stored in `ENCRYPTION_KEY`.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CryptoError> {
        let key = BASE64
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidKey {
                expected: ENCRYPTION_KEY_LEN,
                actual: 0,
            })?;
        Self::new(&key)
    }

    /// Encrypt `plaintext` under a fresh random IV.
    ///
    /// Encrypting the same value twice gives different output.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut iv = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut iv)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut in_out = plaintext.as_bytes().to_vec();
        let tag = self
            .key
            .seal_in_place_separate_tag(
                Nonce::assume_unique_for_key(iv),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag.as_ref()),
            hex::encode(&in_out)
        ))
    }

    /// Decrypt a blob produced by [`TokenCipher::encrypt`].
    pub fn decrypt(&self, blob: &str) -> Result<String, CryptoError> {
        let mut parts = blob.split(':');
        let (Some(iv_hex), Some(tag_hex), Some(ct_hex), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CryptoError::InvalidFormat);
        };

        let iv: [u8; NONCE_LEN] = hex::decode(iv_hex)
            .map_err(|_| CryptoError::InvalidFormat)?
            .try_into()
            .map_err(|_| CryptoError::InvalidFormat)?;
        let tag = hex::decode(tag_hex).map_err(|_| CryptoError::InvalidFormat)?;
        if tag.len() != TAG_LEN {
            return Err(CryptoError::InvalidFormat);
        }
        let mut in_out = hex::decode(ct_hex).map_err(|_| CryptoError::InvalidFormat)?;
        in_out.extend_from_slice(&tag);

        let plaintext = self
            .key
            .open_in_place(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::InvalidUtf8)
    }
}

// Compile-time check that ring's tag length matches the stored format.
const _: () = assert!(aead::MAX_TAG_LEN == TAG_LEN);
