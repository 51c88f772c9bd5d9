//! The node-wide error type.

use thiserror::Error;

/// Errors surfaced by `archipel-core`'s public API.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The persistent store rejected or failed an operation.
    #[error(transparent)]
    Store(#[from] archipel_store::StoreError),

    /// A cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] archipel_crypto::CryptoError),

    /// The session transport reported an error.
    #[error(transparent)]
    Transport(#[from] archipel_transport::TransportError),

    /// The discovery service reported an error.
    #[error(transparent)]
    Discovery(#[from] archipel_discovery::DiscoveryError),

    /// Chunking, verification, or assembly of a file failed.
    #[error(transparent)]
    Files(#[from] archipel_files::FilesError),

    /// A filesystem or socket I/O error not already wrapped by a lower
    /// layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The referenced peer has no entry in the peer table.
    #[error("peer {0} is not known")]
    UnknownPeer(String),

    /// Neither a direct connection nor an active relay carrier is
    /// available for this peer.
    #[error("no route to peer {0}: not connected and no active peer to relay through")]
    Unreachable(String),

    /// The handshake initiator's wait for `HANDSHAKE_RESP` exceeded
    /// [`crate::config::NodeConfig::handshake_timeout`].
    #[error("handshake with {0} timed out")]
    HandshakeTimeout(String),

    /// The peer's presented keys did not match its pinned trust record.
    #[error("handshake with {0} aborted: key mismatch against pinned trust record")]
    TrustMismatch(String),

    /// The referenced file has no local manifest (neither shared nor
    /// downloading).
    #[error("file {0} is not known locally")]
    UnknownFile(String),

    /// A download made no progress for
    /// [`crate::config::NodeConfig::transfer_inactivity_timeout`].
    #[error("transfer of {0} timed out waiting for a chunk")]
    TransferTimeout(String),

    /// A wire payload could not be decoded into the shape its frame type
    /// requires (bad hex, bad JSON, wrong variant).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}
