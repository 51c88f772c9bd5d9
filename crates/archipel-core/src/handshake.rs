//! The two-leg session handshake: an ephemeral X25519
//! exchange plus the long-term static X25519 exchange, combined into one
//! session key. Both legs derive the same key because Diffie-Hellman is
//! symmetric: `ephA·ephPubB == ephB·ephPubA` and likewise for the static
//! keys.
//!
//! ```text
//! initiator -> responder : HANDSHAKE_INIT { staticPub, ephPub, .. }
//! responder -> initiator : HANDSHAKE_RESP { staticPub, ephPub, .. }
//! sessionKey = hash( DH(ephPriv, peerEphPub) ‖ DH(staticPriv, peerStaticPub) )
//! ```
//!
//! TOFU trust is checked on both legs before the session key is trusted:
//! a mismatch against a pinned key aborts the handshake rather than
//! completing it with an impostor.

use std::collections::HashMap;
use std::sync::Mutex;

use archipel_crypto::hash::hash;
use archipel_crypto::x25519::{PrivateKey as DhPrivateKey, PublicKey as DhPublicKey};
use archipel_crypto::{node_id_hex, Identity, NodeId};
use archipel_proto::payload::MsgPayload;
use archipel_store::{Store, TrustStatus};
use rand_core::OsRng;
use tokio::sync::oneshot;

use crate::error::NodeError;
use crate::wire::decode32;

/// The plaintext fields of an incoming `HANDSHAKE_INIT`, decoded from hex.
pub struct HandshakeInitFields {
    pub node_id: NodeId,
    pub node_id_hex: String,
    pub signing_pub: [u8; 32],
    pub signing_pub_hex: String,
    pub dh_pub: [u8; 32],
    pub dh_pub_hex: String,
    pub ephemeral_dh_pub: [u8; 32],
}

/// The plaintext fields of an incoming `HANDSHAKE_RESP`, decoded from hex.
pub type HandshakeRespFields = HandshakeInitFields;

impl HandshakeInitFields {
    /// Decode a `HANDSHAKE_INIT` or `HANDSHAKE_RESP` variant's fields.
    /// Returns `None` for any other [`MsgPayload`] variant or malformed
    /// hex.
    #[must_use]
    pub fn decode(payload: &MsgPayload) -> Option<Self> {
        let (node_id_hex, signing_pub_hex, dh_pub_hex, ephemeral_dh_pub_hex) = match payload {
            MsgPayload::HandshakeInit { node_id, signing_pub, dh_pub, ephemeral_dh_pub, .. } => {
                (node_id.clone(), signing_pub.clone(), dh_pub.clone(), ephemeral_dh_pub.clone())
            }
            MsgPayload::HandshakeResp { node_id, signing_pub, dh_pub, ephemeral_dh_pub, .. } => {
                (node_id.clone(), signing_pub.clone(), dh_pub.clone(), ephemeral_dh_pub.clone())
            }
            _ => return None,
        };

        Some(Self {
            node_id: decode32(&node_id_hex)?,
            node_id_hex,
            signing_pub: decode32(&signing_pub_hex)?,
            signing_pub_hex,
            dh_pub: decode32(&dh_pub_hex)?,
            dh_pub_hex,
            ephemeral_dh_pub: decode32(&ephemeral_dh_pub_hex)?,
        })
    }
}

/// One handshake attempt's ephemeral private state, held while we wait for
/// the peer's reply.
struct PendingInitiation {
    ephemeral_private: DhPrivateKey,
    completion: oneshot::Sender<Result<[u8; 32], NodeError>>,
}

/// The result of completing either side of a handshake.
pub struct HandshakeOutcome {
    pub session_key: [u8; 32],
    pub peer_signing_pub: [u8; 32],
    pub peer_dh_pub: [u8; 32],
    pub trust_status: TrustStatus,
}

/// Tracks in-flight handshakes keyed by peer `NodeId`. A second `initiate`
/// for the same peer while one is pending replaces it — only the latest
/// attempt can complete.
pub struct HandshakeCoordinator {
    pending: Mutex<HashMap<NodeId, PendingInitiation>>,
}

impl Default for HandshakeCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakeCoordinator {
    /// An empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self { pending: Mutex::new(HashMap::new()) }
    }

    /// Build this node's `HANDSHAKE_INIT` payload and register a pending
    /// completion slot. The returned receiver resolves once
    /// [`Self::complete_as_initiator`] is called for this peer, or never
    /// resolves if the caller's own timeout fires first — callers should
    /// race it against `tokio::time::timeout` and call [`Self::abandon`]
    /// on timeout.
    pub fn initiate(
        &self,
        identity: &Identity,
        peer_node_id: NodeId,
    ) -> (MsgPayload, oneshot::Receiver<Result<[u8; 32], NodeError>>) {
        let ephemeral_private = DhPrivateKey::generate(&mut OsRng);
        let ephemeral_public = ephemeral_private.public_key();

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(
            peer_node_id,
            PendingInitiation { ephemeral_private, completion: tx },
        );

        let payload = MsgPayload::HandshakeInit {
            node_id: node_id_hex(&identity.node_id()),
            signing_pub: hex::encode(identity.signing_public().to_bytes()),
            dh_pub: hex::encode(identity.dh_public().to_bytes()),
            ephemeral_dh_pub: hex::encode(ephemeral_public.to_bytes()),
            timestamp: archipel_discovery::unix_timestamp(),
        };
        (payload, rx)
    }

    /// Responder side: given a decoded `HANDSHAKE_INIT`, check trust and,
    /// if accepted, compute the session key and build the `HANDSHAKE_RESP`
    /// to send back.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::TrustMismatch`] if the presented keys conflict
    /// with a pinned trust record, or [`NodeError::Crypto`] if either DH
    /// exchange yields a low-order point.
    pub async fn accept_as_responder(
        &self,
        identity: &Identity,
        store: &Store,
        init: &HandshakeInitFields,
        now: i64,
    ) -> Result<(MsgPayload, HandshakeOutcome), NodeError> {
        let trust = store
            .check_trust(&init.node_id_hex, &init.signing_pub_hex, &init.dh_pub_hex, now)
            .await?;
        if !trust.trusted {
            return Err(NodeError::TrustMismatch(init.node_id_hex.clone()));
        }

        let peer_static_pub = DhPublicKey::from_bytes(init.dh_pub);
        let peer_ephemeral_pub = DhPublicKey::from_bytes(init.ephemeral_dh_pub);

        let responder_ephemeral_private = DhPrivateKey::generate(&mut OsRng);
        let responder_ephemeral_public = responder_ephemeral_private.public_key();

        let session_key = derive_session_key(
            &responder_ephemeral_private,
            &peer_ephemeral_pub,
            identity.dh_private(),
            &peer_static_pub,
        )?;

        let response = MsgPayload::HandshakeResp {
            node_id: node_id_hex(&identity.node_id()),
            signing_pub: hex::encode(identity.signing_public().to_bytes()),
            dh_pub: hex::encode(identity.dh_public().to_bytes()),
            ephemeral_dh_pub: hex::encode(responder_ephemeral_public.to_bytes()),
            timestamp: archipel_discovery::unix_timestamp(),
        };

        Ok((
            response,
            HandshakeOutcome {
                session_key,
                peer_signing_pub: init.signing_pub,
                peer_dh_pub: init.dh_pub,
                trust_status: trust.status,
            },
        ))
    }

    /// Initiator side: given a decoded `HANDSHAKE_RESP` matching a pending
    /// attempt, check trust and derive the session key, resolving the
    /// `initiate` future either way.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::UnknownPeer`] if no handshake is pending for
    /// this peer (a stray or duplicate response), [`NodeError::TrustMismatch`]
    /// on a pinned-key conflict, or [`NodeError::Crypto`] on a low-order DH
    /// result.
    pub async fn complete_as_initiator(
        &self,
        identity: &Identity,
        store: &Store,
        resp: &HandshakeRespFields,
        now: i64,
    ) -> Result<HandshakeOutcome, NodeError> {
        let Some(pending) = self.pending.lock().unwrap().remove(&resp.node_id) else {
            return Err(NodeError::UnknownPeer(resp.node_id_hex.clone()));
        };

        let trust = store
            .check_trust(&resp.node_id_hex, &resp.signing_pub_hex, &resp.dh_pub_hex, now)
            .await?;
        if !trust.trusted {
            let _ = pending.completion.send(Err(NodeError::TrustMismatch(resp.node_id_hex.clone())));
            return Err(NodeError::TrustMismatch(resp.node_id_hex.clone()));
        }

        let peer_static_pub = DhPublicKey::from_bytes(resp.dh_pub);
        let peer_ephemeral_pub = DhPublicKey::from_bytes(resp.ephemeral_dh_pub);

        let session_key = match derive_session_key(
            &pending.ephemeral_private,
            &peer_ephemeral_pub,
            identity.dh_private(),
            &peer_static_pub,
        ) {
            Ok(key) => key,
            Err(error) => {
                let _ = pending.completion.send(Err(NodeError::Crypto(archipel_crypto::CryptoError::InvalidKeyMaterial)));
                return Err(error);
            }
        };

        let _ = pending.completion.send(Ok(session_key));

        Ok(HandshakeOutcome {
            session_key,
            peer_signing_pub: resp.signing_pub,
            peer_dh_pub: resp.dh_pub,
            trust_status: trust.status,
        })
    }

    /// Drop a pending initiation without completing it, for use when the
    /// caller's own wait timed out first.
    pub fn abandon(&self, peer_node_id: &NodeId) {
        self.pending.lock().unwrap().remove(peer_node_id);
    }
}

fn derive_session_key(
    own_ephemeral: &DhPrivateKey,
    peer_ephemeral_pub: &DhPublicKey,
    own_static: &DhPrivateKey,
    peer_static_pub: &DhPublicKey,
) -> Result<[u8; 32], NodeError> {
    let dh1 = own_ephemeral
        .exchange(peer_ephemeral_pub)
        .ok_or(archipel_crypto::CryptoError::InvalidKeyMaterial)?;
    let dh2 = own_static
        .exchange(peer_static_pub)
        .ok_or(archipel_crypto::CryptoError::InvalidKeyMaterial)?;

    let mut combined = Vec::with_capacity(64);
    combined.extend_from_slice(dh1.as_bytes());
    combined.extend_from_slice(dh2.as_bytes());
    Ok(hash(&combined))
}
