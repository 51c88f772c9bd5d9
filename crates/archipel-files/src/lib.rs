//! # ARCHIPEL Files
//!
//! Deterministic file chunking and manifest handling: fixed 512 KiB chunks,
//! per-chunk and whole-file BLAKE3 hashing, chunk verification, and
//! hash-checked assembly. Has no knowledge of peers, sockets, or transfer
//! scheduling — those live in `archipel-core`'s transfer engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunker;
pub mod error;
pub mod manifest;

pub use chunker::{assemble_file, create_manifest, read_chunk, verify_chunk};
pub use error::FilesError;
pub use manifest::{file_id, ChunkDescriptor, Manifest, CHUNK_SIZE};
