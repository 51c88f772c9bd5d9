//! # ARCHIPEL Protocol
//!
//! Binary wire framing and JSON payload shapes shared by every ARCHIPEL
//! transport and discovery implementation. This crate has no knowledge of
//! sockets, peers, or persistence — it only encodes and decodes bytes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod payload;

pub use error::ProtoError;
pub use frame::Packet;

/// The published shared MAC key used to authenticate `HELLO` and handshake
/// frames before a per-peer session key exists. Known to every ARCHIPEL
/// node at compile time; it authenticates the protocol, not any individual
/// peer.
pub const SHARED_MAC_KEY: &[u8] = b"archipel-lan-discovery-v1";

/// Frame type discriminant, carried as a single byte in every frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Discovery announcement / symmetric reply.
    Hello = 1,
    /// A node's known-peer summary list.
    PeerList = 2,
    /// Handshake leg or chat message; inner shape discriminated by `type`.
    Msg = 3,
    /// Request for one chunk of a known file.
    ChunkReq = 4,
    /// One chunk's data in response to a `CHUNK_REQ`.
    ChunkData = 5,
    /// A file manifest offered to a peer.
    Manifest = 6,
    /// Acknowledgement; dispatch is a no-op.
    Ack = 7,
    /// A store-and-forward envelope carried on another node's behalf.
    Relay = 8,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::Hello),
            2 => Ok(PacketType::PeerList),
            3 => Ok(PacketType::Msg),
            4 => Ok(PacketType::ChunkReq),
            5 => Ok(PacketType::ChunkData),
            6 => Ok(PacketType::Manifest),
            7 => Ok(PacketType::Ack),
            8 => Ok(PacketType::Relay),
            other => Err(ProtoError::UnknownPacketType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_type_round_trips_through_u8() {
        for &ty in &[
            PacketType::Hello,
            PacketType::PeerList,
            PacketType::Msg,
            PacketType::ChunkReq,
            PacketType::ChunkData,
            PacketType::Manifest,
            PacketType::Ack,
            PacketType::Relay,
        ] {
            assert_eq!(PacketType::try_from(ty as u8).unwrap(), ty);
        }
    }

    #[test]
    fn unknown_packet_type_is_rejected() {
        assert!(PacketType::try_from(0).is_err());
        assert!(PacketType::try_from(9).is_err());
    }
}
