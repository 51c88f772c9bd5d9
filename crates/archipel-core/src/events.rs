//! Events a running [`crate::node::Node`] broadcasts to subscribers.

use std::path::PathBuf;

use archipel_crypto::NodeId;
use archipel_store::TrustStatus;

/// Something the application layer might want to react to.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// A peer not previously seen this process lifetime announced itself.
    PeerDiscovered(NodeId),
    /// A peer's entry was evicted after exceeding `peerTtl`.
    PeerLost(NodeId),
    /// A session handshake with a peer completed and a session key is now
    /// in place.
    SessionEstablished(NodeId),
    /// A chat message was received and, if it arrived encrypted, was
    /// decrypted successfully.
    MessageReceived {
        /// The originating peer.
        from: NodeId,
        /// The plaintext content.
        content: String,
    },
    /// A peer offered a file manifest.
    ManifestReceived {
        /// The offering peer.
        from: NodeId,
        /// The file's deterministic id.
        file_id: [u8; 32],
        /// The file's declared name.
        file_name: String,
    },
    /// A download received and verified another chunk.
    TransferProgress {
        /// The file being downloaded.
        file_id: [u8; 32],
        /// Chunks verified and buffered so far.
        received_chunks: u32,
        /// Total chunks the manifest declares.
        total_chunks: u32,
    },
    /// A download completed, hash-verified, and was assembled to disk.
    TransferComplete {
        /// The file that finished downloading.
        file_id: [u8; 32],
        /// Where the assembled file was written.
        path: PathBuf,
    },
    /// A download failed: a hash mismatch, inactivity timeout, or I/O
    /// error.
    TransferFailed {
        /// The file whose download failed.
        file_id: [u8; 32],
        /// A human-readable reason.
        reason: String,
    },
    /// A peer's TOFU trust record changed state.
    TrustChanged {
        /// The peer whose record changed.
        node_id: NodeId,
        /// The resulting status.
        status: TrustStatus,
    },
}
