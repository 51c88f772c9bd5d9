//! Node-wide tunables.

use std::path::PathBuf;
use std::time::Duration;

use archipel_discovery::DiscoveryConfig;

/// Configuration for one ARCHIPEL node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Preferred TCP port for the session transport. The transport will
    /// increment past this if it is already in use.
    pub listen_port: u16,
    /// Multicast discovery tunables.
    pub discovery: DiscoveryConfig,
    /// Directory holding the node's identity blob and SQLite database.
    pub data_dir: PathBuf,
    /// Directory of files this node offers to peers.
    pub shared_dir: PathBuf,
    /// Directory completed downloads are assembled into.
    pub downloads_dir: PathBuf,
    /// Maximum relay-queue entries accepted on behalf of a single sender,
    /// across all targets. Bounds the store-and-forward DoS surface: any
    /// peer can hand us `RELAY` frames to hold.
    pub relay_queue_cap_per_sender: u64,
    /// A download with no `CHUNK_DATA` progress for this long is aborted.
    pub transfer_inactivity_timeout: Duration,
    /// How long a handshake initiator waits for `HANDSHAKE_RESP` before
    /// giving up.
    pub handshake_timeout: Duration,
    /// How long a `connect` attempt may take before it is treated as
    /// unreachable.
    pub connect_timeout: Duration,
    /// A peer unseen for longer than this is pruned from the peer table.
    pub peer_ttl: Duration,
    /// A store-and-forward relay envelope older than this is dropped
    /// rather than delivered.
    pub relay_ttl: Duration,
    /// Maximum messages returned by a single history query.
    pub history_limit: u32,
    /// When set, the identity file is Argon2id/`XChaCha20-Poly1305`-encrypted
    /// at rest under this passphrase instead of stored in the clear.
    pub identity_passphrase: Option<Vec<u8>>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./archipel-data");
        Self {
            listen_port: 7777,
            discovery: DiscoveryConfig::default(),
            shared_dir: data_dir.join("shared"),
            downloads_dir: data_dir.join("downloads"),
            data_dir,
            relay_queue_cap_per_sender: 256,
            transfer_inactivity_timeout: Duration::from_secs(120),
            handshake_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            peer_ttl: Duration::from_secs(90),
            relay_ttl: Duration::from_secs(24 * 60 * 60),
            history_limit: 100,
            identity_passphrase: None,
        }
    }
}
