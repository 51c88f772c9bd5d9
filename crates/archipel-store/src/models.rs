//! Domain types returned from and passed into the store.

/// Outcome of [`crate::Store::check_trust`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustStatus {
    /// No prior record existed; one was created and trusted on first sight.
    New,
    /// A record existed and the presented keys matched it.
    Known,
    /// A record existed but the presented keys did not match it. The record
    /// is now untrusted until an operator re-asserts trust.
    Mismatch,
}

/// The result of a [`crate::Store::check_trust`] call: the resulting status
/// plus the record's current `trusted` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustOutcome {
    /// Which branch of TOFU logic produced this result.
    pub status: TrustStatus,
    /// Whether the peer is currently trusted.
    pub trusted: bool,
}

/// A durable trust record, keyed by `NodeId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustRecord {
    /// Hex-encoded `NodeId`.
    pub node_id: String,
    /// Hex-encoded Ed25519 signing public key.
    pub signing_pub: String,
    /// Hex-encoded X25519 DH public key.
    pub dh_pub: String,
    /// Unix timestamp, seconds, of the first sighting.
    pub first_seen: i64,
    /// Unix timestamp, seconds, of the most recent sighting.
    pub last_seen: i64,
    /// Whether this peer is currently trusted.
    pub trusted: bool,
}

/// A durable peer record: enough to attempt reconnection after a restart.
/// Deliberately narrower than the in-memory peer table entry: it carries no
/// `reputation` or `sessionKey`, since both are ephemeral per spec and reset
/// on every process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedPeer {
    /// Hex-encoded `NodeId`.
    pub node_id: String,
    /// Last observed network address, `ip:port`.
    pub address: String,
    /// Last advertised TCP listening port.
    pub tcp_port: u16,
    /// Hex-encoded Ed25519 signing public key, if known.
    pub signing_pub: Option<String>,
    /// Hex-encoded X25519 DH public key, if known.
    pub dh_pub: Option<String>,
    /// File summaries last advertised by this peer.
    pub shared_files: Vec<String>,
    /// Unix timestamp, seconds, of the most recent sighting.
    pub last_seen: i64,
}

/// One row of persisted chat history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// The remote peer this message was exchanged with.
    pub peer_id: String,
    /// Who originated the message: a `NodeId`, or a local marker.
    pub sender: String,
    /// The plaintext content (never the ciphertext).
    pub content: String,
    /// Whether the message traveled AEAD-encrypted on the wire.
    pub encrypted: bool,
    /// Unix timestamp, seconds.
    pub timestamp: i64,
}

/// A store-and-forward relay envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEnvelope {
    /// Final destination `NodeId`, hex-encoded.
    pub target_node_id: String,
    /// Originating `NodeId`, hex-encoded.
    pub sender_node_id: String,
    /// Opaque relayed content.
    pub content: String,
    /// Unix timestamp, seconds, at enqueue time.
    pub created_at: i64,
    /// Unix timestamp, seconds, after which this envelope is dropped.
    pub expires_at: i64,
}
