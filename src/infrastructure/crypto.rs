//! AES-256-GCM encryption for OAuth tokens at rest.
//!
//! Ciphertext is stored as `base64(nonce):base64(ciphertext)` with a fresh
//! nonce per encryption.

use crate::domain::credential::EncryptedToken;
use crate::error::{PayoutError, Result};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use zeroize::Zeroizing;

/// AES-GCM nonce size in bytes (96 bits).
const NONCE_SIZE: usize = 12;

/// Symmetric cipher guarding tokens in the credential store.
///
/// The credential manager is the only component holding one of these.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    pub fn new(key: &[u8]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| PayoutError::Encryption("encryption key must be 32 bytes".into()))?;
        Ok(Self { cipher })
    }

    /// Builds a cipher from a base64-encoded 32-byte key, the form the key
    /// takes in configuration.
    pub fn from_base64_key(encoded: &str) -> Result<Self> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| PayoutError::Encryption(format!("invalid base64 key: {e}")))?;
        Self::new(&key)
    }

    /// A cipher with a random throwaway key, for sandbox runs and tests.
    pub fn ephemeral() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::new(&key).expect("32-byte key")
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedToken> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| PayoutError::Encryption("token encryption failed".into()))?;
        Ok(EncryptedToken(format!(
            "{}:{}",
            STANDARD.encode(nonce_bytes),
            STANDARD.encode(&ciphertext)
        )))
    }

    /// Decrypts into a buffer that is wiped on drop; decrypted tokens must
    /// not outlive the single outbound call they are needed for.
    pub fn decrypt(&self, token: &EncryptedToken) -> Result<Zeroizing<String>> {
        let (nonce_part, cipher_part) = token
            .0
            .split_once(':')
            .ok_or_else(|| PayoutError::Encryption("malformed encrypted token".into()))?;
        let nonce_bytes = STANDARD
            .decode(nonce_part)
            .map_err(|e| PayoutError::Encryption(format!("invalid nonce encoding: {e}")))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(PayoutError::Encryption(format!(
                "invalid nonce size: expected {NONCE_SIZE}, got {}",
                nonce_bytes.len()
            )));
        }
        let ciphertext = STANDARD
            .decode(cipher_part)
            .map_err(|e| PayoutError::Encryption(format!("invalid ciphertext encoding: {e}")))?;
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| {
                PayoutError::Encryption("token decryption failed: wrong key or corrupted data".into())
            })?;
        let text = String::from_utf8(plaintext)
            .map_err(|e| PayoutError::Encryption(format!("invalid UTF-8 in token: {e}")))?;
        Ok(Zeroizing::new(text))
    }
}
