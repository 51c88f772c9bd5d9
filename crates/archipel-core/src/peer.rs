//! The in-memory peer table: everything known about every peer this node
//! has heard from this process lifetime. Mutated only from the central
//! dispatcher, which owns exclusive mutation rights over it, never
//! concurrently from request-handling code paths directly.

use std::net::SocketAddr;

use archipel_crypto::NodeId;
use archipel_proto::payload::PeerSummary;
use dashmap::DashMap;

/// Starting and ceiling reputation value for a freshly-seen peer.
pub const REPUTATION_MAX: i32 = 100;
const REPUTATION_FLOOR: i32 = 0;
const REPUTATION_PENALTY: i32 = 10;

/// Everything known about one peer.
#[derive(Debug, Clone)]
pub struct PeerEntry {
    /// The peer's stable identifier.
    pub node_id: NodeId,
    /// Last observed network address (discovery source address, or the
    /// session transport's connected peer address).
    pub address: SocketAddr,
    /// The peer's advertised session-transport listening port.
    pub tcp_port: u16,
    /// Long-term Ed25519 signing public key, once known.
    pub signing_pub: Option<[u8; 32]>,
    /// Long-term X25519 DH public key, once known.
    pub dh_pub: Option<[u8; 32]>,
    /// File summaries last advertised by this peer.
    pub shared_files: Vec<String>,
    /// Unix timestamp, seconds, of the most recent sighting.
    pub last_seen: i64,
    /// Telemetry-only reputation score; nothing in this crate currently
    /// reads it to make chunk-source routing decisions.
    pub reputation: i32,
    /// The session key established by the handshake, once one exists.
    pub session_key: Option<[u8; 32]>,
}

impl PeerEntry {
    fn summary(&self) -> PeerSummary {
        PeerSummary {
            node_id: archipel_crypto::node_id_hex(&self.node_id),
            address: self.address.to_string(),
            dh_public_key: self.dh_pub.map(hex::encode),
            signing_public_key: self.signing_pub.map(hex::encode),
            shared_files: self.shared_files.clone(),
        }
    }

    /// `true` once both long-term public keys are on file — the point at
    /// which this node can initiate a handshake.
    #[must_use]
    pub fn has_keys(&self) -> bool {
        self.signing_pub.is_some() && self.dh_pub.is_some()
    }
}

/// The node's view of every peer it has heard from this run.
pub struct PeerTable {
    entries: DashMap<NodeId, PeerEntry>,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Insert or refresh an entry. Returns `true` if this `node_id` had no
    /// prior entry — the "first sighting this run" signal
    /// `onPeerDiscovered` fires on.
    ///
    /// `reputation` and `session_key` are preserved across re-sightings:
    /// both track the handshake/trust lifecycle, not the latest
    /// discovery/HELLO sighting.
    pub fn upsert(
        &self,
        node_id: NodeId,
        address: SocketAddr,
        tcp_port: u16,
        signing_pub: Option<[u8; 32]>,
        dh_pub: Option<[u8; 32]>,
        shared_files: Vec<String>,
        now: i64,
    ) -> bool {
        let mut is_new = false;
        self.entries
            .entry(node_id)
            .and_modify(|entry| {
                entry.address = address;
                entry.tcp_port = tcp_port;
                if signing_pub.is_some() {
                    entry.signing_pub = signing_pub;
                }
                if dh_pub.is_some() {
                    entry.dh_pub = dh_pub;
                }
                entry.shared_files = shared_files.clone();
                entry.last_seen = now;
            })
            .or_insert_with(|| {
                is_new = true;
                PeerEntry {
                    node_id,
                    address,
                    tcp_port,
                    signing_pub,
                    dh_pub,
                    shared_files,
                    last_seen: now,
                    reputation: REPUTATION_MAX,
                    session_key: None,
                }
            });
        is_new
    }

    /// Snapshot one entry.
    #[must_use]
    pub fn get(&self, node_id: &NodeId) -> Option<PeerEntry> {
        self.entries.get(node_id).map(|e| e.clone())
    }

    /// Record a newly-established session key.
    pub fn set_session_key(&self, node_id: &NodeId, key: [u8; 32]) {
        if let Some(mut entry) = self.entries.get_mut(node_id) {
            entry.session_key = Some(key);
        }
    }

    /// Update a peer's known network address (e.g. once a direct
    /// connection is established and its remote address observed).
    pub fn set_address(&self, node_id: &NodeId, address: SocketAddr) {
        if let Some(mut entry) = self.entries.get_mut(node_id) {
            entry.address = address;
        }
    }

    /// Refresh `last_seen` without touching anything else.
    pub fn touch(&self, node_id: &NodeId, now: i64) {
        if let Some(mut entry) = self.entries.get_mut(node_id) {
            entry.last_seen = now;
        }
    }

    /// Any peer seen within `ttl_secs`, for relay-fallback routing. There is
    /// no prescribed way to pick among several active peers, so this
    /// returns the first one found; peer reputation is not yet consulted
    /// here (see [`PeerEntry::reputation`]'s doc comment).
    #[must_use]
    pub fn any_active(&self, now: i64, ttl_secs: i64, exclude: &NodeId) -> Option<NodeId> {
        self.entries
            .iter()
            .find(|entry| entry.node_id != *exclude && now - entry.last_seen <= ttl_secs)
            .map(|entry| entry.node_id)
    }

    /// Lower a peer's reputation after it misbehaves (fails a chunk
    /// verification, sends a malformed frame, etc).
    pub fn penalize(&self, node_id: &NodeId) {
        if let Some(mut entry) = self.entries.get_mut(node_id) {
            entry.reputation = (entry.reputation - REPUTATION_PENALTY).max(REPUTATION_FLOOR);
        }
    }

    /// Evict entries unseen for longer than `ttl_secs`, returning their
    /// ids so the caller can emit `PeerLost` events.
    pub fn prune_dead(&self, now: i64, ttl_secs: i64) -> Vec<NodeId> {
        let dead: Vec<NodeId> = self
            .entries
            .iter()
            .filter(|entry| now - entry.last_seen > ttl_secs)
            .map(|entry| entry.node_id)
            .collect();
        for node_id in &dead {
            self.entries.remove(node_id);
        }
        dead
    }

    /// Prune stale entries first, then snapshot every surviving peer — the
    /// spec's `getActive`. Unlike [`Self::all`], a peer whose `lastSeen` is
    /// past `ttl_secs` is never returned, even if the independent 30 s
    /// prune sweep hasn't run yet.
    #[must_use]
    pub fn get_active(&self, now: i64, ttl_secs: i64) -> Vec<PeerEntry> {
        self.prune_dead(now, ttl_secs);
        self.all()
    }

    /// Render every entry as a `PEER_LIST` frame body.
    #[must_use]
    pub fn summary(&self) -> Vec<PeerSummary> {
        self.entries.iter().map(|entry| entry.summary()).collect()
    }

    /// Snapshot every entry.
    #[must_use]
    pub fn all(&self) -> Vec<PeerEntry> {
        self.entries.iter().map(|entry| entry.clone()).collect()
    }
}
