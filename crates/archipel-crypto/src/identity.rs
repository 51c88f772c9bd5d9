//! Long-term node identity: signing keypair, DH keypair, and the derived
//! `NodeId`.

use crate::hash::hash;
use crate::signatures::{Signature, SigningKey, VerifyingKey};
use crate::x25519::{PrivateKey as DhPrivateKey, PublicKey as DhPublicKey};
use crate::CryptoError;
use rand_core::OsRng;

/// Stable 32-byte node identifier: `hash(signingPub)`.
pub type NodeId = [u8; 32];

/// Render a `NodeId` as lowercase hex, as required on the wire.
#[must_use]
pub fn node_id_hex(id: &NodeId) -> String {
    hex::encode(id)
}

/// Derive a `NodeId` from a signing public key.
#[must_use]
pub fn derive_node_id(signing_pub: &VerifyingKey) -> NodeId {
    hash(&signing_pub.to_bytes())
}

/// A node's long-lived keys: a signing keypair for identity assertions and a
/// DH keypair for key agreement.
pub struct Identity {
    node_id: NodeId,
    signing_key: SigningKey,
    dh_key: DhPrivateKey,
}

impl Identity {
    /// Generate a fresh random identity.
    #[must_use]
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let dh_key = DhPrivateKey::generate(&mut OsRng);
        let node_id = derive_node_id(&signing_key.verifying_key());
        Self {
            node_id,
            signing_key,
            dh_key,
        }
    }

    /// Reconstruct an identity from raw key bytes, re-checking the `NodeId`
    /// invariant (`NodeId == hash(signingPub)`).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if `signing_seed` does not
    /// decode to a valid Ed25519 key, or [`CryptoError::InvalidKeyMaterial`]
    /// if the recomputed `NodeId` does not match `expected_node_id`.
    pub fn from_parts(
        signing_seed: [u8; 32],
        dh_seed: [u8; 32],
        expected_node_id: NodeId,
    ) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_bytes(&signing_seed);
        let dh_key = DhPrivateKey::from_bytes(dh_seed);
        let node_id = derive_node_id(&signing_key.verifying_key());
        if node_id != expected_node_id {
            return Err(CryptoError::InvalidKeyMaterial);
        }
        Ok(Self {
            node_id,
            signing_key,
            dh_key,
        })
    }

    /// This node's stable identifier.
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Signing (Ed25519) public key.
    #[must_use]
    pub fn signing_public(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// DH (X25519) public key.
    #[must_use]
    pub fn dh_public(&self) -> DhPublicKey {
        self.dh_key.public_key()
    }

    /// Sign arbitrary bytes with the long-term signing key.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Raw signing key seed bytes, for persistence. Handle with care.
    #[must_use]
    pub fn signing_seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Raw DH private key bytes, for persistence. Handle with care.
    #[must_use]
    pub fn dh_seed(&self) -> [u8; 32] {
        self.dh_key.to_bytes()
    }

    /// The long-term DH private key, for performing the static-static leg of
    /// the handshake.
    #[must_use]
    pub fn dh_private(&self) -> &DhPrivateKey {
        &self.dh_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_matches_hash_of_signing_pub() {
        let identity = Identity::generate();
        assert_eq!(
            identity.node_id(),
            hash(&identity.signing_public().to_bytes())
        );
    }

    #[test]
    fn reload_rechecks_invariant() {
        let identity = Identity::generate();
        let reloaded = Identity::from_parts(
            identity.signing_seed(),
            identity.dh_seed(),
            identity.node_id(),
        )
        .unwrap();
        assert_eq!(reloaded.node_id(), identity.node_id());
    }

    #[test]
    fn reload_rejects_mismatched_node_id() {
        let identity = Identity::generate();
        let other = Identity::generate();
        let result = Identity::from_parts(identity.signing_seed(), identity.dh_seed(), other.node_id());
        assert!(result.is_err());
    }

    #[test]
    fn hex_rendering_is_lowercase() {
        let id: NodeId = [0xABu8; 32];
        let hex_str = node_id_hex(&id);
        assert_eq!(hex_str, hex_str.to_lowercase());
        assert_eq!(hex_str.len(), 64);
    }
}
