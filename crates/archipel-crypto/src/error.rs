//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (authentication failure)
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid nonce length
    #[error("invalid nonce length")]
    InvalidNonceLength,

    /// Signature does not authenticate the message
    #[error("invalid signature")]
    InvalidSignature,

    /// Public key bytes do not decode to a valid curve point
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,

    /// Random number generation failed (with detail, used by passphrase encryption)
    #[error("random number generation failed: {0}")]
    RandomGenerationFailed(String),

    /// Argon2id key derivation failed
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// Passphrase-encrypted key material is malformed or the wrong length
    #[error("invalid key material")]
    InvalidKeyMaterial,

    /// Parameter outside accepted bounds
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
