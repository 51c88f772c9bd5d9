//! Chat messaging: direct send, opportunistic relay fallback, broadcast,
//! and decrypt/verify of inbound `CHAT` payloads.

use std::net::SocketAddr;

use archipel_crypto::aead::AeadKey;
use archipel_crypto::signatures::{Signature, VerifyingKey};
use archipel_crypto::{node_id_hex, Identity, NodeId};
use archipel_proto::payload::{MsgPayload, RelayPayload};
use archipel_proto::{PacketType, SHARED_MAC_KEY};
use archipel_store::{MessageRecord, RelayEnvelope, Store};
use archipel_transport::SessionTransport;

use crate::error::NodeError;
use crate::peer::{PeerEntry, PeerTable};

/// The result of decoding and, where possible, decrypting and verifying an
/// inbound `CHAT` payload.
pub struct DecodedChat {
    /// The plaintext content.
    pub content: String,
    /// `true` if the payload carried a signature that verified against a
    /// signing key this node has on file for the sender. `false` either
    /// means verification failed or the sender's signing key is not yet
    /// known — callers that care about the distinction should consult the
    /// peer table themselves.
    pub signature_verified: bool,
}

/// What happened when a chat message was sent, reported back to the caller
/// per spec: `{encrypted, relayed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    /// `true` if an established session key was used to AEAD-encrypt the
    /// message; `false` if it went out (or was queued) as plaintext.
    pub encrypted: bool,
    /// `true` if the direct send failed and the message was instead handed
    /// to an active carrier peer or queued in the local relay store.
    pub relayed: bool,
}

fn mac_key_for(peer: &PeerEntry) -> Vec<u8> {
    peer.session_key.map(|k| k.to_vec()).unwrap_or_else(|| SHARED_MAC_KEY.to_vec())
}

fn peer_socket_addr(peer: &PeerEntry) -> SocketAddr {
    SocketAddr::new(peer.address.ip(), peer.tcp_port)
}

/// Build the `CHAT` payload for `content`: AEAD-encrypted under
/// `session_key` when one is available, plaintext otherwise, always signed
/// with the node's long-term signing key.
///
/// # Errors
///
/// Returns [`NodeError::Crypto`] if nonce generation or encryption fails.
pub fn build_chat_payload(
    identity: &Identity,
    session_key: Option<[u8; 32]>,
    content: &str,
) -> Result<MsgPayload, NodeError> {
    let signature = identity.sign(content.as_bytes());
    let (ciphertext, nonce) = match session_key {
        Some(key) => {
            let aead = AeadKey::new(key);
            let nonce = AeadKey::random_nonce().map_err(archipel_crypto::CryptoError::from)?;
            let ct = aead.encrypt(&nonce, content.as_bytes())?;
            (hex::encode(ct), Some(hex::encode(nonce)))
        }
        None => (hex::encode(content.as_bytes()), None),
    };

    Ok(MsgPayload::Chat {
        ciphertext,
        nonce,
        signature: hex::encode(signature.as_bytes()),
        node_id: node_id_hex(&identity.node_id()),
        timestamp: archipel_discovery::unix_timestamp(),
    })
}

/// Decode an inbound `CHAT` payload: decrypt if a session key and nonce are
/// present, then verify the signature if the sender's signing key is
/// already on file.
///
/// # Errors
///
/// Returns [`NodeError::MalformedPayload`] if hex fields fail to decode, or
/// if a nonce is present but AEAD decryption fails (tag mismatch).
pub fn decode_chat_payload(
    payload: &MsgPayload,
    session_key: Option<[u8; 32]>,
    sender_signing_pub: Option<[u8; 32]>,
) -> Result<DecodedChat, NodeError> {
    let MsgPayload::Chat { ciphertext, nonce, signature, .. } = payload else {
        return Err(NodeError::MalformedPayload("expected a CHAT payload".into()));
    };

    let content = match nonce {
        Some(nonce_hex) => {
            let key = session_key.ok_or_else(|| {
                NodeError::MalformedPayload("encrypted chat arrived with no session key on file".into())
            })?;
            let nonce_raw = hex::decode(nonce_hex).map_err(|_| NodeError::MalformedPayload("bad nonce hex".into()))?;
            let nonce_bytes: [u8; 12] =
                nonce_raw.try_into().map_err(|_| NodeError::MalformedPayload("nonce is not 12 bytes".into()))?;
            let ct = hex::decode(ciphertext)
                .map_err(|_| NodeError::MalformedPayload("bad ciphertext hex".into()))?;
            let plaintext = AeadKey::new(key)
                .decrypt(&nonce_bytes, &ct)
                .ok_or_else(|| NodeError::MalformedPayload("AEAD tag verification failed".into()))?;
            String::from_utf8(plaintext).map_err(|_| NodeError::MalformedPayload("decrypted content is not UTF-8".into()))?
        }
        None => {
            let bytes = hex::decode(ciphertext).map_err(|_| NodeError::MalformedPayload("bad plaintext hex".into()))?;
            String::from_utf8(bytes).map_err(|_| NodeError::MalformedPayload("content is not UTF-8".into()))?
        }
    };

    let signature_verified = match sender_signing_pub {
        Some(signing_pub_bytes) => verify_signature(&signing_pub_bytes, content.as_bytes(), signature),
        None => false,
    };

    Ok(DecodedChat { content, signature_verified })
}

fn verify_signature(signing_pub_bytes: &[u8; 32], message: &[u8], signature_hex: &str) -> bool {
    let Ok(signature_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature_bytes): Result<[u8; 64], _> = signature_bytes.try_into() else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(signing_pub_bytes) else {
        return false;
    };
    let signature = Signature::from_bytes(signature_bytes);
    verifying_key.verify(message, &signature).is_ok()
}

/// Send a chat message to `target`: direct if reachable, relayed through an
/// active peer, or queued in the persistent relay store as a last resort.
/// Always appends the plaintext to local history.
///
/// # Errors
///
/// Returns [`NodeError::UnknownPeer`] if `target` has no peer-table entry
/// at all (nowhere to route even a relay attempt).
pub async fn send_message(
    identity: &Identity,
    store: &Store,
    peer_table: &PeerTable,
    transport: &SessionTransport,
    relay_ttl_secs: i64,
    target: NodeId,
    content: &str,
) -> Result<SendOutcome, NodeError> {
    let peer = peer_table.get(&target).ok_or_else(|| NodeError::UnknownPeer(node_id_hex(&target)))?;

    let payload = build_chat_payload(identity, peer.session_key, content)?;
    let payload_bytes = serde_json::to_vec(&payload).map_err(|e| NodeError::MalformedPayload(e.to_string()))?;
    let frame = archipel_proto::frame::build(PacketType::Msg, &identity.node_id(), &payload_bytes, &mac_key_for(&peer));

    let now = archipel_discovery::unix_timestamp();
    let direct_result = transport.send_to(target, peer_socket_addr(&peer), frame).await;
    let relayed = direct_result.is_err();

    if relayed {
        relay_fallback(identity, store, peer_table, transport, relay_ttl_secs, target, &payload_bytes, now).await?;
    }

    store
        .append_message(&MessageRecord {
            peer_id: node_id_hex(&target),
            sender: node_id_hex(&identity.node_id()),
            content: content.to_string(),
            encrypted: peer.session_key.is_some(),
            timestamp: now,
        })
        .await?;

    Ok(SendOutcome { encrypted: peer.session_key.is_some(), relayed })
}

/// Forward `content_bytes` (a serialized `CHAT` payload) to an active peer
/// as a `RELAY` frame so that peer enqueues it for `target` in its own
/// relay queue. If no peer is currently active, enqueue locally instead —
/// this node will flush it to `target` directly if it ever connects.
async fn relay_fallback(
    identity: &Identity,
    store: &Store,
    peer_table: &PeerTable,
    transport: &SessionTransport,
    relay_ttl_secs: i64,
    target: NodeId,
    content_bytes: &[u8],
    now: i64,
) -> Result<(), NodeError> {
    let content = String::from_utf8_lossy(content_bytes).into_owned();
    let relay_payload = RelayPayload {
        target: node_id_hex(&target),
        sender: node_id_hex(&identity.node_id()),
        content: content.clone(),
        timestamp: now,
    };

    if let Some(carrier) = peer_table.any_active(now, i64::MAX, &target) {
        if let Some(carrier_peer) = peer_table.get(&carrier) {
            let payload_bytes = serde_json::to_vec(&relay_payload).map_err(|e| NodeError::MalformedPayload(e.to_string()))?;
            let frame = archipel_proto::frame::build(
                PacketType::Relay,
                &identity.node_id(),
                &payload_bytes,
                &mac_key_for(&carrier_peer),
            );
            if transport.send_to(carrier, peer_socket_addr(&carrier_peer), frame).await.is_ok() {
                return Ok(());
            }
        }
    }

    store
        .enqueue_relay(&RelayEnvelope {
            target_node_id: node_id_hex(&target),
            sender_node_id: node_id_hex(&identity.node_id()),
            content,
            created_at: now,
            expires_at: now + relay_ttl_secs,
        })
        .await?;
    Ok(())
}

/// Send to every currently-active peer, best-effort: a failure sending to
/// one peer does not stop the rest.
pub async fn broadcast(
    identity: &Identity,
    store: &Store,
    peer_table: &PeerTable,
    transport: &SessionTransport,
    relay_ttl_secs: i64,
    content: &str,
) {
    for peer in peer_table.all() {
        if let Err(error) =
            send_message(identity, store, peer_table, transport, relay_ttl_secs, peer.node_id, content).await
        {
            tracing::debug!(%error, peer = %node_id_hex(&peer.node_id), "broadcast delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unencrypted_chat_round_trips_plaintext() {
        let identity = Identity::generate();
        let payload = build_chat_payload(&identity, None, "hello archipel").unwrap();
        let decoded = decode_chat_payload(&payload, None, Some(identity.signing_public().to_bytes())).unwrap();
        assert_eq!(decoded.content, "hello archipel");
        assert!(decoded.signature_verified);
    }

    #[test]
    fn encrypted_chat_round_trips_and_verifies() {
        let identity = Identity::generate();
        let session_key = [42u8; 32];
        let payload = build_chat_payload(&identity, Some(session_key), "secret message").unwrap();
        let decoded =
            decode_chat_payload(&payload, Some(session_key), Some(identity.signing_public().to_bytes())).unwrap();
        assert_eq!(decoded.content, "secret message");
        assert!(decoded.signature_verified);
    }

    #[test]
    fn encrypted_chat_without_matching_session_key_is_rejected() {
        let identity = Identity::generate();
        let payload = build_chat_payload(&identity, Some([1u8; 32]), "secret").unwrap();
        let result = decode_chat_payload(&payload, Some([2u8; 32]), None);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_signing_key_is_reported_as_unverified_not_an_error() {
        let identity = Identity::generate();
        let payload = build_chat_payload(&identity, None, "hi").unwrap();
        let decoded = decode_chat_payload(&payload, None, None).unwrap();
        assert!(!decoded.signature_verified);
    }
}
