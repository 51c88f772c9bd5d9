//! Small hex-decoding helpers shared by every module that reads JSON
//! payload fields back into fixed-size key/hash material.

use archipel_crypto::NodeId;

/// Decode a hex string into exactly 32 bytes, or `None` if it is malformed
/// or the wrong length.
#[must_use]
pub fn decode32(hex_str: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(hex_str).ok()?;
    bytes.try_into().ok()
}

/// Decode a hex-encoded `NodeId`.
#[must_use]
pub fn decode_node_id(hex_str: &str) -> Option<NodeId> {
    decode32(hex_str)
}
