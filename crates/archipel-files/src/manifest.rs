//! The file manifest: deterministic chunk layout plus per-chunk and
//! whole-file hashes.

use archipel_crypto::hash::{hash, HashOutput};
use archipel_proto::payload::{ChunkDescriptor as WireChunkDescriptor, ManifestPayload};

/// Fixed chunk size used to split every file: 512 KiB.
pub const CHUNK_SIZE: u64 = 512 * 1024;

/// Deterministic file identifier: `hash(fileName ‖ fileSize)`.
///
/// This collides for any two files sharing both a name and a size — a
/// known, accepted limitation; it is cheap and wire-compatible and a
/// re-implementation should not silently "fix" it by hashing content
/// instead, which would break interop with peers computing the same id
/// this way.
#[must_use]
pub fn file_id(file_name: &str, file_size: u64) -> HashOutput {
    let mut buf = Vec::with_capacity(file_name.len() + 8);
    buf.extend_from_slice(file_name.as_bytes());
    buf.extend_from_slice(&file_size.to_be_bytes());
    hash(&buf)
}

/// One chunk's position, size, and hash within a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Zero-based, contiguous index.
    pub index: u32,
    /// Byte offset within the file.
    pub offset: u64,
    /// Size in bytes (the final chunk may be short).
    pub size: u32,
    /// BLAKE3 hash of this chunk's bytes.
    pub hash: HashOutput,
}

/// A file's chunk layout and integrity metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// `hash(fileName ‖ fileSize)`.
    pub file_id: HashOutput,
    /// Original file name (not a path; the basename offered to peers).
    pub file_name: String,
    /// Total file size in bytes.
    pub file_size: u64,
    /// Number of chunks. `chunks.len()` as a `u32`.
    pub chunk_count: u32,
    /// Whole-file BLAKE3 hash.
    pub file_hash: HashOutput,
    /// Per-chunk descriptors, contiguous from index 0.
    pub chunks: Vec<ChunkDescriptor>,
}

impl Manifest {
    /// Render this manifest as the wire `MANIFEST` payload shape, hex- and
    /// decimal-encoding its binary fields for the wire.
    #[must_use]
    pub fn to_payload(&self) -> ManifestPayload {
        ManifestPayload {
            file_id: hex::encode(self.file_id),
            file_name: self.file_name.clone(),
            file_size: self.file_size,
            chunk_size: CHUNK_SIZE as u32,
            chunk_count: self.chunk_count,
            file_hash: hex::encode(self.file_hash),
            chunks: self
                .chunks
                .iter()
                .map(|c| WireChunkDescriptor {
                    index: c.index,
                    offset: c.offset,
                    size: c.size,
                    hash: hex::encode(c.hash),
                })
                .collect(),
        }
    }

    /// Parse a wire `MANIFEST` payload back into a [`Manifest`].
    ///
    /// # Errors
    ///
    /// Returns `None` if any hex field fails to decode to the expected
    /// length — a malformed manifest from a misbehaving or buggy peer.
    #[must_use]
    pub fn from_payload(payload: &ManifestPayload) -> Option<Self> {
        let file_id = decode_32(&payload.file_id)?;
        let file_hash = decode_32(&payload.file_hash)?;
        let mut chunks = Vec::with_capacity(payload.chunks.len());
        for c in &payload.chunks {
            chunks.push(ChunkDescriptor {
                index: c.index,
                offset: c.offset,
                size: c.size,
                hash: decode_32(&c.hash)?,
            });
        }
        Some(Self {
            file_id,
            file_name: payload.file_name.clone(),
            file_size: payload.file_size,
            chunk_count: payload.chunk_count,
            file_hash,
            chunks,
        })
    }
}

fn decode_32(hex_str: &str) -> Option<HashOutput> {
    let bytes = hex::decode(hex_str).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_is_deterministic_and_name_size_sensitive() {
        assert_eq!(file_id("a.bin", 10), file_id("a.bin", 10));
        assert_ne!(file_id("a.bin", 10), file_id("b.bin", 10));
        assert_ne!(file_id("a.bin", 10), file_id("a.bin", 11));
    }

    #[test]
    fn manifest_round_trips_through_wire_payload() {
        let manifest = Manifest {
            file_id: [1u8; 32],
            file_name: "data.bin".into(),
            file_size: 1_048_576,
            chunk_count: 2,
            file_hash: [2u8; 32],
            chunks: vec![
                ChunkDescriptor { index: 0, offset: 0, size: 524_288, hash: [3u8; 32] },
                ChunkDescriptor { index: 1, offset: 524_288, size: 524_288, hash: [4u8; 32] },
            ],
        };
        let payload = manifest.to_payload();
        let back = Manifest::from_payload(&payload).unwrap();
        assert_eq!(manifest, back);
    }
}
