//! Streaming manifest creation, chunk reads, verification, and assembly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use archipel_crypto::hash::{hash, HashOutput, TreeHasher};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

use crate::error::FilesError;
use crate::manifest::{ChunkDescriptor, Manifest, CHUNK_SIZE};

/// Stream `path` once, computing a per-chunk hash and a rolling whole-file
/// hash, and return its [`Manifest`]. The file name offered to peers is
/// `path`'s basename, not the full path.
pub async fn create_manifest(path: impl AsRef<Path>) -> Result<Manifest, FilesError> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut file = File::open(path).await?;
    let file_size = file.metadata().await?.len();

    let mut whole_file_hasher = TreeHasher::new();
    let mut chunks = Vec::with_capacity(chunk_count_for(file_size) as usize);
    let mut buf = vec![0u8; CHUNK_SIZE as usize];
    let mut offset = 0u64;
    let mut index = 0u32;

    loop {
        let want = std::cmp::min(CHUNK_SIZE, file_size - offset) as usize;
        if want == 0 {
            break;
        }
        file.read_exact(&mut buf[..want]).await?;
        whole_file_hasher.update(&buf[..want]);
        let chunk_hash = hash(&buf[..want]);
        chunks.push(ChunkDescriptor {
            index,
            offset,
            size: want as u32,
            hash: chunk_hash,
        });
        offset += want as u64;
        index += 1;
    }

    Ok(Manifest {
        file_id: crate::manifest::file_id(&file_name, file_size),
        file_name,
        file_size,
        chunk_count: chunks.len() as u32,
        file_hash: whole_file_hasher.finalize(),
        chunks,
    })
}

fn chunk_count_for(file_size: u64) -> u64 {
    file_size.div_ceil(CHUNK_SIZE)
}

/// Read the bytes of chunk `index` out of `path`, per `manifest`'s declared
/// offset and size.
///
/// # Errors
///
/// Returns [`FilesError::ChunkIndexOutOfRange`] if `index >= manifest.chunk_count`.
pub async fn read_chunk(path: impl AsRef<Path>, manifest: &Manifest, index: u32) -> Result<Vec<u8>, FilesError> {
    let descriptor = manifest
        .chunks
        .get(index as usize)
        .ok_or(FilesError::ChunkIndexOutOfRange { index, chunk_count: manifest.chunk_count })?;

    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(descriptor.offset)).await?;
    let mut buf = vec![0u8; descriptor.size as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Recompute `bytes`'s hash and compare it against `expected_hash`.
#[must_use]
pub fn verify_chunk(bytes: &[u8], expected_hash: &HashOutput) -> bool {
    &hash(bytes) == expected_hash
}

/// Write every chunk in `buffers` at its manifest-declared offset under
/// `out_dir/manifest.file_name`, verifying each chunk's hash before writing
/// it, then recompute the whole-file hash over the reassembled output.
///
/// On whole-file hash mismatch the partially-written output file is
/// deleted and [`FilesError::WholeFileHashMismatch`] is returned.
///
/// # Errors
///
/// Returns [`FilesError::MissingChunk`] if `buffers` does not contain every
/// index in `0..manifest.chunk_count`, [`FilesError::ChunkHashMismatch`] if
/// a chunk's bytes do not match its declared hash, or
/// [`FilesError::WholeFileHashMismatch`] if the assembled file's hash does
/// not match `manifest.file_hash`.
pub async fn assemble_file(
    manifest: &Manifest,
    buffers: &HashMap<u32, Vec<u8>>,
    out_dir: impl AsRef<Path>,
) -> Result<PathBuf, FilesError> {
    for descriptor in &manifest.chunks {
        let Some(bytes) = buffers.get(&descriptor.index) else {
            return Err(FilesError::MissingChunk { index: descriptor.index });
        };
        if !verify_chunk(bytes, &descriptor.hash) {
            return Err(FilesError::ChunkHashMismatch { index: descriptor.index });
        }
    }

    tokio::fs::create_dir_all(&out_dir).await?;
    let out_path = out_dir.as_ref().join(&manifest.file_name);
    let mut file = File::create(&out_path).await?;

    let mut whole_file_hasher = TreeHasher::new();
    for descriptor in &manifest.chunks {
        let bytes = &buffers[&descriptor.index];
        file.seek(SeekFrom::Start(descriptor.offset)).await?;
        file.write_all(bytes).await?;
        whole_file_hasher.update(bytes);
    }
    file.flush().await?;
    drop(file);

    if whole_file_hasher.finalize() != manifest.file_hash {
        let _ = tokio::fs::remove_file(&out_path).await;
        return Err(FilesError::WholeFileHashMismatch);
    }

    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    async fn write_random_file(dir: &Path, name: &str, size: usize) -> PathBuf {
        let path = dir.join(name);
        let bytes: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, &bytes).await.unwrap();
        path
    }

    #[tokio::test]
    async fn manifest_chunk_sizes_sum_to_file_size_with_short_last_chunk() {
        let dir = tempdir().unwrap();
        let path = write_random_file(dir.path(), "data.bin", CHUNK_SIZE as usize + 123).await;
        let manifest = create_manifest(&path).await.unwrap();

        assert_eq!(manifest.chunk_count, 2);
        assert_eq!(manifest.chunks[0].size as u64, CHUNK_SIZE);
        assert_eq!(manifest.chunks[1].size, 123);
        let total: u64 = manifest.chunks.iter().map(|c| c.size as u64).sum();
        assert_eq!(total, manifest.file_size);

        let indices: Vec<u32> = manifest.chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, (0..manifest.chunk_count).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn full_round_trip_reassembles_byte_identical_file() {
        let dir = tempdir().unwrap();
        let out_dir = tempdir().unwrap();
        let path = write_random_file(dir.path(), "data.bin", 2 * CHUNK_SIZE as usize + 777).await;
        let original = tokio::fs::read(&path).await.unwrap();

        let manifest = create_manifest(&path).await.unwrap();
        let mut buffers = HashMap::new();
        for descriptor in &manifest.chunks {
            let bytes = read_chunk(&path, &manifest, descriptor.index).await.unwrap();
            assert!(verify_chunk(&bytes, &descriptor.hash));
            buffers.insert(descriptor.index, bytes);
        }

        let assembled_path = assemble_file(&manifest, &buffers, out_dir.path()).await.unwrap();
        let assembled = tokio::fs::read(&assembled_path).await.unwrap();
        assert_eq!(assembled, original);
    }

    #[tokio::test]
    async fn corrupted_chunk_is_rejected_before_assembly() {
        let dir = tempdir().unwrap();
        let out_dir = tempdir().unwrap();
        let path = write_random_file(dir.path(), "data.bin", CHUNK_SIZE as usize).await;
        let manifest = create_manifest(&path).await.unwrap();

        let mut buffers = HashMap::new();
        for descriptor in &manifest.chunks {
            let mut bytes = read_chunk(&path, &manifest, descriptor.index).await.unwrap();
            if descriptor.index == 0 {
                bytes[0] ^= 0xFF;
            }
            buffers.insert(descriptor.index, bytes);
        }

        let result = assemble_file(&manifest, &buffers, out_dir.path()).await;
        assert!(matches!(result, Err(FilesError::ChunkHashMismatch { index: 0 })));
    }

    #[tokio::test]
    async fn whole_file_mismatch_deletes_partial_output() {
        let dir = tempdir().unwrap();
        let out_dir = tempdir().unwrap();
        let path = write_random_file(dir.path(), "data.bin", CHUNK_SIZE as usize).await;
        let mut manifest = create_manifest(&path).await.unwrap();
        manifest.file_hash = [0xAB; 32]; // force a whole-file mismatch

        let mut buffers = HashMap::new();
        for descriptor in &manifest.chunks {
            let bytes = read_chunk(&path, &manifest, descriptor.index).await.unwrap();
            buffers.insert(descriptor.index, bytes);
        }

        let result = assemble_file(&manifest, &buffers, out_dir.path()).await;
        assert!(matches!(result, Err(FilesError::WholeFileHashMismatch)));
        assert!(!out_dir.path().join("data.bin").exists());
    }

    #[tokio::test]
    async fn missing_chunk_is_rejected() {
        let dir = tempdir().unwrap();
        let out_dir = tempdir().unwrap();
        let path = write_random_file(dir.path(), "data.bin", 2 * CHUNK_SIZE as usize).await;
        let manifest = create_manifest(&path).await.unwrap();

        let mut buffers = HashMap::new();
        let first = read_chunk(&path, &manifest, 0).await.unwrap();
        buffers.insert(0, first);

        let result = assemble_file(&manifest, &buffers, out_dir.path()).await;
        assert!(matches!(result, Err(FilesError::MissingChunk { index: 1 })));
    }
}
