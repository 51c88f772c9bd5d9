//! `ChaCha20-Poly1305` AEAD encryption.
//!
//! The session-key AEAD used for encrypted chat frames: a 12-byte random
//! nonce and a 16-byte authentication tag, matching the wire format's fixed
//! nonce/tag sizes. Decryption returns `None` on tag failure rather than
//! propagating an error — callers treat that as "deliver unencrypted/tainted",
//! not as a fatal condition.

use crate::CryptoError;
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};

/// Nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Session AEAD key (32 bytes).
pub struct AeadKey([u8; 32]);

impl AeadKey {
    /// Wrap a raw 32-byte key.
    #[must_use]
    pub fn new(key: [u8; 32]) -> Self {
        Self(key)
    }

    /// Generate a random 12-byte nonce.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS CSPRNG fails.
    pub fn random_nonce() -> Result<[u8; NONCE_SIZE], CryptoError> {
        let mut nonce = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce).map_err(|_| CryptoError::RandomFailed)?;
        Ok(nonce)
    }

    /// Encrypt `plaintext`, appending the 16-byte tag.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if the underlying cipher
    /// rejects the operation (only possible for pathological input sizes).
    pub fn encrypt(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt `ciphertext` (plaintext || 16-byte tag).
    ///
    /// Returns `None` on authentication failure rather than an error;
    /// tag failure should never abort the connection, only the caller's
    /// handling of this one message.
    #[must_use]
    pub fn decrypt(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Option<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()
    }
}
