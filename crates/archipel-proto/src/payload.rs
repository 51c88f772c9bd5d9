//! JSON payload shapes carried inside frame bodies.
//!
//! Discovery and `MSG` frames carry a dynamically-shaped JSON object
//! discriminated by an internal `type` tag. We model it as a single
//! `#[serde(tag = "type")]` sum type: unknown variants deserialize into
//! [`MsgPayload::Other`] rather than failing, since ARCHIPEL nodes must
//! tolerate payload shapes introduced by newer peers.

use serde::{Deserialize, Serialize};

/// The `HELLO` announcement payload, carried both over multicast discovery
/// and (rarely) as a symmetric reply over an established session socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    /// Hex-encoded `NodeId` of the announcer.
    pub node_id: String,
    /// Hex-encoded X25519 public key.
    pub dh_public_key: String,
    /// Hex-encoded Ed25519 public key.
    pub signing_public_key: String,
    /// TCP port the announcer's session transport listens on.
    pub tcp_port: u16,
    /// Summaries of files the announcer currently shares.
    #[serde(default)]
    pub shared_files: Vec<String>,
    /// Unix timestamp, seconds.
    pub timestamp: i64,
}

/// One entry in a `PEER_LIST` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerSummary {
    /// Hex-encoded `NodeId`.
    pub node_id: String,
    /// Last observed network address, `ip:port`.
    pub address: String,
    /// Hex-encoded X25519 public key, if known.
    pub dh_public_key: Option<String>,
    /// Hex-encoded Ed25519 public key, if known.
    pub signing_public_key: Option<String>,
    /// File summaries advertised by this peer.
    #[serde(default)]
    pub shared_files: Vec<String>,
}

/// The `PEER_LIST` frame body: every peer entry the sender knows about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerListPayload {
    /// The advertised peers.
    pub peers: Vec<PeerSummary>,
}

/// One chunk descriptor inside a [`ManifestPayload`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    /// Zero-based, contiguous chunk index.
    pub index: u32,
    /// Byte offset of this chunk within the file.
    pub offset: u64,
    /// Size of this chunk in bytes (the final chunk may be short).
    pub size: u32,
    /// Hex-encoded BLAKE3 hash of this chunk's bytes.
    pub hash: String,
}

/// The `MANIFEST` frame body describing a file available for transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestPayload {
    /// Deterministic id: `hash(fileName ‖ fileSize)`, hex-encoded.
    pub file_id: String,
    /// Original file name.
    pub file_name: String,
    /// Total file size in bytes.
    pub file_size: u64,
    /// Fixed chunk size used to split this file (512 KiB).
    pub chunk_size: u32,
    /// Number of chunks.
    pub chunk_count: u32,
    /// Hex-encoded whole-file BLAKE3 hash.
    pub file_hash: String,
    /// Per-chunk descriptors, contiguous from index 0.
    pub chunks: Vec<ChunkDescriptor>,
}

/// The `CHUNK_REQ` frame body: a request for one chunk of a known file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRequestPayload {
    /// The file being requested.
    pub file_id: String,
    /// The chunk index being requested.
    pub index: u32,
}

/// The `CHUNK_DATA` frame body: one chunk's bytes and its hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDataPayload {
    /// The file this chunk belongs to.
    pub file_id: String,
    /// The chunk index.
    pub index: u32,
    /// Base64-encoded chunk bytes.
    pub data: String,
    /// Hex-encoded BLAKE3 hash of the chunk, for `verifyChunk`.
    pub hash: String,
}

/// The `RELAY` frame body: an envelope a node agrees to carry on a peer's
/// behalf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayPayload {
    /// Final destination `NodeId`, hex-encoded.
    pub target: String,
    /// Originating `NodeId`, hex-encoded.
    pub sender: String,
    /// Opaque relayed content (typically a serialized chat `MSG` payload).
    pub content: String,
    /// Unix timestamp, seconds, at enqueue time.
    pub timestamp: i64,
}

/// The dynamically-shaped body of a `MSG` frame, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum MsgPayload {
    /// Handshake initiation, sent by the initiator under the shared MAC key.
    #[serde(rename = "HANDSHAKE_INIT")]
    HandshakeInit {
        /// Initiator's `NodeId`, hex-encoded.
        node_id: String,
        /// Initiator's long-term signing public key, hex-encoded.
        signing_pub: String,
        /// Initiator's long-term DH public key, hex-encoded.
        dh_pub: String,
        /// Initiator's freshly-generated ephemeral DH public key, hex-encoded.
        ephemeral_dh_pub: String,
        /// Unix timestamp, seconds.
        timestamp: i64,
    },
    /// Handshake response, sent by the responder.
    #[serde(rename = "HANDSHAKE_RESP")]
    HandshakeResp {
        /// Responder's `NodeId`, hex-encoded.
        node_id: String,
        /// Responder's long-term signing public key, hex-encoded.
        signing_pub: String,
        /// Responder's long-term DH public key, hex-encoded.
        dh_pub: String,
        /// Responder's freshly-generated ephemeral DH public key, hex-encoded.
        ephemeral_dh_pub: String,
        /// Unix timestamp, seconds.
        timestamp: i64,
    },
    /// A chat message, direct or relayed.
    #[serde(rename = "CHAT")]
    Chat {
        /// Hex-encoded ciphertext (AEAD output with tag appended) when
        /// `nonce` is present, otherwise hex-encoded plaintext.
        ciphertext: String,
        /// Hex-encoded 12-byte AEAD nonce, or `None` when unencrypted.
        nonce: Option<String>,
        /// Hex-encoded Ed25519 signature over the plaintext.
        signature: String,
        /// Sender's `NodeId`, hex-encoded.
        node_id: String,
        /// Unix timestamp, seconds.
        timestamp: i64,
    },
    /// Any payload shape this node does not recognize. Preserved so that an
    /// older node can still route (but not interpret) frames from a newer
    /// one.
    #[serde(other)]
    Other,
}

/// The `ACK` frame body. Carries no semantic content; dispatch is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AckPayload {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_payload_round_trips_through_json() {
        let payload = MsgPayload::Chat {
            ciphertext: "deadbeef".into(),
            nonce: Some("00112233".into()),
            signature: "cafebabe".into(),
            node_id: "aa".repeat(32),
            timestamp: 1_700_000_000,
        };
        let json = serde_json::to_vec(&payload).unwrap();
        let back: MsgPayload = serde_json::from_slice(&json).unwrap();
        assert_eq!(payload, back);
    }

    #[test]
    fn unknown_msg_variant_deserializes_as_other() {
        let json = br#"{"type":"SOME_FUTURE_TYPE","foo":"bar"}"#;
        let parsed: MsgPayload = serde_json::from_slice(json).unwrap();
        assert_eq!(parsed, MsgPayload::Other);
    }

    #[test]
    fn hello_payload_defaults_shared_files_when_absent() {
        let json = br#"{"nodeId":"aa","dhPublicKey":"bb","signingPublicKey":"cc","tcpPort":7777,"timestamp":1}"#;
        let parsed: HelloPayload = serde_json::from_slice(json).unwrap();
        assert!(parsed.shared_files.is_empty());
    }
}
