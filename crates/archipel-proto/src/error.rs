//! Error types for wire protocol encoding and decoding.

use thiserror::Error;

/// Errors that can occur while working with ARCHIPEL protocol types.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The frame was shorter than [`crate::frame::MIN_FRAME_SIZE`].
    #[error("frame too short")]
    FrameTooShort,

    /// The frame's magic prefix did not match `"ARCH"`.
    #[error("bad magic prefix")]
    BadMagic,

    /// The frame declared a type byte that is not a known `PacketType`.
    #[error("unknown packet type: {0}")]
    UnknownPacketType(u8),

    /// The frame's MAC failed to verify.
    #[error("MAC verification failed")]
    MacMismatch,

    /// A JSON payload failed to (de)serialize.
    #[error("payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
