//! # ARCHIPEL Crypto
//!
//! Cryptographic primitives for the ARCHIPEL protocol.
//!
//! This crate provides:
//! - Long-term node identity (Ed25519 signing + X25519 DH keypairs, `NodeId` derivation)
//! - `ChaCha20-Poly1305` AEAD encryption for session traffic
//! - BLAKE3 hashing and HKDF-like key derivation
//! - Secure random number generation
//! - Password-based private key encryption at rest (Argon2id + `XChaCha20-Poly1305`)
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | Key Exchange | X25519 | 128-bit |
//! | Session AEAD | ChaCha20-Poly1305 | 256-bit key |
//! | Hash | BLAKE3 | 128-bit collision |
//! | KDF | HKDF-BLAKE3 | 128-bit |
//! | Signatures | Ed25519 | 128-bit |
//! | Key-at-rest encryption | Argon2id + XChaCha20-Poly1305 | 256-bit |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod aead;
pub mod encrypted_keys;
pub mod error;
pub mod hash;
pub mod identity;
pub mod random;
pub mod signatures;
pub mod x25519;

pub use error::CryptoError;
pub use identity::{Identity, NodeId, derive_node_id, node_id_hex};

/// X25519 public/secret key size
pub const X25519_KEY_SIZE: usize = 32;

/// Session AEAD key size
pub const AEAD_KEY_SIZE: usize = 32;

/// BLAKE3 output size
pub const BLAKE3_OUTPUT_SIZE: usize = 32;

/// Ed25519 public key size
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 secret key size
pub const ED25519_SECRET_KEY_SIZE: usize = 32;

/// Ed25519 signature size
pub const ED25519_SIGNATURE_SIZE: usize = 64;
