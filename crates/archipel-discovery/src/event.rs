//! Events emitted by the discovery service.
//!
//! Discovery does not own the peer table itself (per the single-actor
//! ownership design: the peer table lives in `archipel-core` and is
//! mutated from one place). Instead discovery reports what it observed on
//! the wire and lets the core layer decide what to do with it.

use std::net::SocketAddr;

use archipel_crypto::NodeId;

/// One HELLO datagram observed on the multicast group.
#[derive(Debug, Clone)]
pub struct AnnouncedPeer {
    /// The announcer's `NodeId`.
    pub node_id: NodeId,
    /// The source address the datagram arrived from (used as the peer's
    /// network address, independent of whatever address the payload might
    /// claim).
    pub source_addr: SocketAddr,
    /// The announcer's X25519 public key.
    pub dh_public_key: [u8; 32],
    /// The announcer's Ed25519 public key.
    pub signing_public_key: [u8; 32],
    /// The TCP port the announcer's session transport listens on.
    pub tcp_port: u16,
    /// File summaries the announcer currently shares.
    pub shared_files: Vec<String>,
    /// `true` if the frame's MAC did not verify (always the case for
    /// discovery's shared-key HELLOs unless the key was tampered with in
    /// transit; surfaced so callers can decide whether to treat the
    /// address as a hint only — per spec this is never disqualifying for
    /// HELLO, but it is still reported).
    pub unverified: bool,
}

/// Something discovery observed that the core layer should act on.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A HELLO frame was received and parsed successfully.
    Announced(AnnouncedPeer),
    /// The periodic pruning timer fired; the core layer should sweep its
    /// peer table for entries past `PEER_TTL`.
    PruneTick,
}
