//! Error types for chunking, manifest creation, and assembly.

use thiserror::Error;

/// Errors raised while chunking, verifying, or assembling a file.
#[derive(Debug, Error)]
pub enum FilesError {
    /// An I/O error against the source file, a chunk read, or the output
    /// directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A requested chunk index is outside `0..chunkCount`.
    #[error("chunk index {index} out of range (chunk count {chunk_count})")]
    ChunkIndexOutOfRange {
        /// The requested index.
        index: u32,
        /// The manifest's declared chunk count.
        chunk_count: u32,
    },

    /// A chunk's bytes did not hash to its manifest-declared value.
    #[error("chunk {index} failed hash verification")]
    ChunkHashMismatch {
        /// The chunk index that failed verification.
        index: u32,
    },

    /// The reassembled file's whole-file hash did not match the manifest.
    /// The partially-written output file has already been deleted.
    #[error("assembled file hash mismatch")]
    WholeFileHashMismatch,

    /// `assembleFile` was called before every chunk slot was filled.
    #[error("missing chunk {index}, cannot assemble")]
    MissingChunk {
        /// The first missing chunk index encountered.
        index: u32,
    },
}
