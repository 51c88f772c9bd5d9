//! Chunked file transfer: manifest creation for shared
//! files, pipelined chunk requests for downloads, hash-verified chunk
//! receipt, and stateless chunk serving for requests from peers.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use archipel_crypto::{node_id_hex, Identity, NodeId};
use archipel_files::manifest::Manifest;
use archipel_proto::payload::{ChunkDataPayload, ChunkRequestPayload};
use archipel_proto::{frame, PacketType, SHARED_MAC_KEY};
use archipel_transport::SessionTransport;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::NodeError;
use crate::peer::PeerTable;
use crate::wire::decode32;

fn mac_key_for(peer_table: &PeerTable, node_id: &NodeId) -> Vec<u8> {
    peer_table.get(node_id).and_then(|p| p.session_key).map(|k| k.to_vec()).unwrap_or_else(|| SHARED_MAC_KEY.to_vec())
}

fn peer_addr(peer_table: &PeerTable, node_id: &NodeId) -> Option<SocketAddr> {
    peer_table.get(node_id).map(|p| SocketAddr::new(p.address.ip(), p.tcp_port))
}

/// A file this node is currently downloading.
struct Download {
    manifest: Manifest,
    source: NodeId,
    buffers: Mutex<HashMap<u32, Vec<u8>>>,
    requested: Mutex<HashSet<u32>>,
    last_progress: StdMutex<Instant>,
}

/// The outcome of handling one inbound `CHUNK_DATA` frame.
pub enum ChunkOutcome {
    /// The chunk verified and was buffered; the download continues.
    Progress {
        /// The file being downloaded.
        file_id: [u8; 32],
        /// Chunks verified and buffered so far.
        received_chunks: u32,
        /// Total chunks the manifest declares.
        total_chunks: u32,
    },
    /// The last chunk verified and the file was assembled to disk.
    Complete {
        /// The file that finished downloading.
        file_id: [u8; 32],
        /// Where the assembled file was written.
        path: PathBuf,
    },
    /// The download failed outright (hash mismatch on the final assembly).
    Failed {
        /// The file whose download failed.
        file_id: [u8; 32],
        /// A human-readable reason.
        reason: String,
    },
    /// The frame referenced a file this node is not downloading, or a chunk
    /// whose hash did not match — ignored or re-requested, nothing for the
    /// caller to surface.
    Ignored,
}

/// Owns in-flight downloads and the manifests of files this node shares.
pub struct TransferManager {
    downloads: DashMap<[u8; 32], Download>,
    shared: DashMap<[u8; 32], (Manifest, PathBuf)>,
    /// Manifests peers have offered us, and who offered them — enough to
    /// start a download once the application layer asks for the file.
    remote_manifests: DashMap<[u8; 32], (Manifest, NodeId)>,
    downloads_dir: PathBuf,
}

impl TransferManager {
    /// A fresh manager with no in-flight downloads and nothing shared yet.
    #[must_use]
    pub fn new(downloads_dir: PathBuf) -> Self {
        Self { downloads: DashMap::new(), shared: DashMap::new(), remote_manifests: DashMap::new(), downloads_dir }
    }

    /// Record a manifest a peer offered, for later lookup by
    /// [`Self::remote_manifest`].
    pub fn record_remote_manifest(&self, manifest: Manifest, offered_by: NodeId) {
        self.remote_manifests.insert(manifest.file_id, (manifest, offered_by));
    }

    /// A manifest previously offered by a peer, and who offered it.
    #[must_use]
    pub fn remote_manifest(&self, file_id: &[u8; 32]) -> Option<(Manifest, NodeId)> {
        self.remote_manifests.get(file_id).map(|e| e.value().clone())
    }

    /// Chunk and register a local file for sharing, returning its manifest
    /// so the caller can advertise it to peers.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Files`] if the file cannot be read.
    pub async fn share_file(&self, path: impl AsRef<Path>) -> Result<Manifest, NodeError> {
        let manifest = archipel_files::create_manifest(&path).await?;
        self.shared.insert(manifest.file_id, (manifest.clone(), path.as_ref().to_path_buf()));
        Ok(manifest)
    }

    /// Every manifest currently offered to peers.
    #[must_use]
    pub fn shared_manifests(&self) -> Vec<Manifest> {
        self.shared.iter().map(|entry| entry.value().0.clone()).collect()
    }

    /// `true` if a download for `file_id` is already in flight.
    #[must_use]
    pub fn is_downloading(&self, file_id: &[u8; 32]) -> bool {
        self.downloads.contains_key(file_id)
    }

    /// Begin downloading `manifest` from `source`, sending a `CHUNK_REQ` for
    /// every chunk index up front, in order. There is no application-level
    /// pipeline window: all outstanding requests ride the one TCP
    /// connection, and the OS socket write buffer is the only backpressure.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Transport`] if the initial requests cannot be
    /// sent (the peer is unreachable).
    pub async fn begin_download(
        &self,
        identity: &Identity,
        peer_table: &PeerTable,
        transport: &SessionTransport,
        manifest: Manifest,
        source: NodeId,
    ) -> Result<(), NodeError> {
        let file_id = manifest.file_id;
        let chunk_count = manifest.chunk_count;

        let download = Download {
            manifest,
            source,
            buffers: Mutex::new(HashMap::new()),
            requested: Mutex::new(HashSet::new()),
            last_progress: StdMutex::new(Instant::now()),
        };
        self.downloads.insert(file_id, download);

        for index in 0..chunk_count {
            self.request_chunk(identity, peer_table, transport, file_id, source, index).await?;
            if let Some(download) = self.downloads.get(&file_id) {
                download.requested.lock().await.insert(index);
            }
        }
        Ok(())
    }

    async fn request_chunk(
        &self,
        identity: &Identity,
        peer_table: &PeerTable,
        transport: &SessionTransport,
        file_id: [u8; 32],
        source: NodeId,
        index: u32,
    ) -> Result<(), NodeError> {
        let addr = peer_addr(peer_table, &source).ok_or_else(|| NodeError::UnknownPeer(node_id_hex(&source)))?;
        let payload = ChunkRequestPayload { file_id: hex::encode(file_id), index };
        let payload_bytes = serde_json::to_vec(&payload).map_err(|e| NodeError::MalformedPayload(e.to_string()))?;
        let frame = frame::build(PacketType::ChunkReq, &identity.node_id(), &payload_bytes, &mac_key_for(peer_table, &source));
        transport.send_to(source, addr, frame).await?;
        Ok(())
    }

    /// Handle an inbound `CHUNK_DATA` frame: verify the chunk against the
    /// download's manifest, buffer it, and assemble the file once every
    /// chunk has arrived. Every chunk was already requested by
    /// [`Self::begin_download`], so no further request is issued here.
    pub async fn handle_chunk_data(
        &self,
        identity: &Identity,
        peer_table: &PeerTable,
        transport: &SessionTransport,
        sender: NodeId,
        payload: &ChunkDataPayload,
    ) -> ChunkOutcome {
        let Some(file_id) = decode32(&payload.file_id) else {
            return ChunkOutcome::Ignored;
        };
        let Some(download) = self.downloads.get(&file_id) else {
            return ChunkOutcome::Ignored;
        };
        if download.source != sender {
            return ChunkOutcome::Ignored;
        }
        let Some(descriptor) = download.manifest.chunks.get(payload.index as usize) else {
            return ChunkOutcome::Ignored;
        };

        let Ok(bytes) = BASE64.decode(&payload.data) else {
            peer_table.penalize(&sender);
            return ChunkOutcome::Ignored;
        };
        if !archipel_files::verify_chunk(&bytes, &descriptor.hash) {
            peer_table.penalize(&sender);
            let _ = self.request_chunk(identity, peer_table, transport, file_id, sender, payload.index).await;
            return ChunkOutcome::Ignored;
        }

        download.buffers.lock().await.insert(payload.index, bytes);
        download.requested.lock().await.remove(&payload.index);
        *download.last_progress.lock().unwrap() = Instant::now();

        let received_chunks = download.buffers.lock().await.len() as u32;
        let total_chunks = download.manifest.chunk_count;

        if received_chunks < total_chunks {
            return ChunkOutcome::Progress { file_id, received_chunks, total_chunks };
        }

        let buffers = download.buffers.lock().await.clone();
        let manifest = download.manifest.clone();
        drop(download);
        self.downloads.remove(&file_id);

        match archipel_files::assemble_file(&manifest, &buffers, &self.downloads_dir).await {
            Ok(path) => ChunkOutcome::Complete { file_id, path },
            Err(error) => ChunkOutcome::Failed { file_id, reason: error.to_string() },
        }
    }

    /// Abort any download that has made no progress for `inactivity_timeout`,
    /// returning the file ids that were abandoned so the caller can emit
    /// `TransferFailed` events.
    #[must_use]
    pub fn reap_stalled(&self, inactivity_timeout: Duration) -> Vec<[u8; 32]> {
        let stalled: Vec<[u8; 32]> = self
            .downloads
            .iter()
            .filter(|entry| entry.last_progress.lock().unwrap().elapsed() > inactivity_timeout)
            .map(|entry| *entry.key())
            .collect();
        for file_id in &stalled {
            self.downloads.remove(file_id);
        }
        stalled
    }

    /// Serve one `CHUNK_REQ`: read the requested chunk from the shared file
    /// on disk and send it back as `CHUNK_DATA`. A request for a file or
    /// chunk index this node does not have is silently ignored; there is no
    /// error frame defined for this case.
    pub async fn serve_chunk_request(
        &self,
        identity: &Identity,
        peer_table: &PeerTable,
        transport: &SessionTransport,
        requester: NodeId,
        payload: &ChunkRequestPayload,
    ) -> Result<(), NodeError> {
        let Some(file_id) = decode32(&payload.file_id) else {
            return Ok(());
        };
        let Some(entry) = self.shared.get(&file_id) else {
            return Ok(());
        };
        let (manifest, path) = entry.value().clone();
        drop(entry);

        let Some(descriptor) = manifest.chunks.get(payload.index as usize) else {
            return Ok(());
        };
        let bytes = archipel_files::read_chunk(&path, &manifest, payload.index).await?;

        let response = ChunkDataPayload {
            file_id: payload.file_id.clone(),
            index: payload.index,
            data: BASE64.encode(&bytes),
            hash: hex::encode(descriptor.hash),
        };
        let response_bytes = serde_json::to_vec(&response).map_err(|e| NodeError::MalformedPayload(e.to_string()))?;
        let addr = peer_addr(peer_table, &requester).ok_or_else(|| NodeError::UnknownPeer(node_id_hex(&requester)))?;
        let frame = frame::build(PacketType::ChunkData, &identity.node_id(), &response_bytes, &mac_key_for(peer_table, &requester));
        transport.send_to(requester, addr, frame).await?;
        Ok(())
    }
}
