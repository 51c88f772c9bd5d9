//! Binary packet framing for the ARCHIPEL wire protocol.
//!
//! A frame is:
//!
//! ```text
//! MAGIC(4)="ARCH" | TYPE(1) | NODE_ID(32) | PAYLOAD_LEN(4, BE) | PAYLOAD(N) | MAC(32)
//! ```
//!
//! `build` appends an HMAC-SHA256 of the header+payload prefix under the
//! caller-supplied key. `parse` verifies that MAC in constant time before
//! returning a [`Packet`] view, with one exception: a `HELLO` frame whose MAC
//! fails to verify is still returned, flagged [`Packet::unverified`], so that
//! discovery can bootstrap before a session key exists.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::PacketType;

type HmacSha256 = Hmac<Sha256>;

/// 4-byte magic prefix identifying an ARCHIPEL frame.
pub const MAGIC: [u8; 4] = *b"ARCH";

/// Size of the `NodeId` field, in bytes.
pub const NODE_ID_SIZE: usize = 32;

/// Size of the MAC trailer, in bytes.
pub const MAC_SIZE: usize = 32;

/// Fixed header size: magic(4) + type(1) + node_id(32) + payload_len(4).
pub const HEADER_SIZE: usize = 4 + 1 + NODE_ID_SIZE + 4;

/// Minimum valid frame size: header + zero-length payload + MAC.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + MAC_SIZE;

/// A validated, immutable view of a wire frame.
///
/// Once parsed, a `Packet` never changes: its fields are a read-only
/// projection of the bytes that produced it.
#[derive(Debug, Clone)]
pub struct Packet {
    packet_type: PacketType,
    sender_node_id: [u8; NODE_ID_SIZE],
    payload: Vec<u8>,
    unverified: bool,
}

impl Packet {
    /// The frame's declared type.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// The `NodeId` of the frame's claimed sender.
    #[must_use]
    pub fn sender_node_id(&self) -> &[u8; NODE_ID_SIZE] {
        &self.sender_node_id
    }

    /// The opaque application payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// `true` if this frame was accepted despite a failed MAC check (only
    /// possible for `HELLO`). Consumers must treat an unverified HELLO as an
    /// address hint only — never as proof of identity.
    #[must_use]
    pub fn unverified(&self) -> bool {
        self.unverified
    }
}

/// Build a wire frame: header + payload + HMAC-SHA256(header || payload).
#[must_use]
pub fn build(packet_type: PacketType, node_id: &[u8; NODE_ID_SIZE], payload: &[u8], key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + MAC_SIZE);
    buf.extend_from_slice(&MAGIC);
    buf.push(packet_type as u8);
    buf.extend_from_slice(node_id);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);

    let mac = compute_mac(&buf, key);
    buf.extend_from_slice(&mac);
    buf
}

/// Parse and authenticate a wire frame.
///
/// Returns `None` if the buffer is too short, the magic mismatches, the
/// declared payload length would overrun the buffer, or (for any type other
/// than `HELLO`) the MAC fails to verify. A `HELLO` frame with a bad MAC is
/// still returned with [`Packet::unverified`] set.
#[must_use]
pub fn parse(buf: &[u8], key: &[u8]) -> Option<Packet> {
    if buf.len() < MIN_FRAME_SIZE {
        return None;
    }
    if buf[0..4] != MAGIC[..] {
        return None;
    }

    let packet_type = PacketType::try_from(buf[4]).ok()?;

    let mut sender_node_id = [0u8; NODE_ID_SIZE];
    sender_node_id.copy_from_slice(&buf[5..5 + NODE_ID_SIZE]);

    let len_offset = 5 + NODE_ID_SIZE;
    let payload_len = u32::from_be_bytes([
        buf[len_offset],
        buf[len_offset + 1],
        buf[len_offset + 2],
        buf[len_offset + 3],
    ]) as usize;

    let payload_offset = len_offset + 4;
    let mac_offset = payload_offset + payload_len;
    if mac_offset + MAC_SIZE > buf.len() {
        return None;
    }

    let signed = &buf[..mac_offset];
    let mac = &buf[mac_offset..mac_offset + MAC_SIZE];
    let verified = verify_mac(signed, key, mac);

    if !verified && packet_type != PacketType::Hello {
        return None;
    }

    Some(Packet {
        packet_type,
        sender_node_id,
        payload: buf[payload_offset..mac_offset].to_vec(),
        unverified: !verified,
    })
}

fn compute_mac(signed: &[u8], key: &[u8]) -> [u8; MAC_SIZE] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(signed);
    let result = mac.finalize().into_bytes();
    let mut out = [0u8; MAC_SIZE];
    out.copy_from_slice(&result);
    out
}

/// Constant-time MAC verification.
fn verify_mac(signed: &[u8], key: &[u8], expected: &[u8]) -> bool {
    let computed = compute_mac(signed, key);
    computed.ct_eq(expected).into()
}
