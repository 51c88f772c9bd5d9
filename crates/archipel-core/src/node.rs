//! `Node`: the single entry point applications construct, wiring identity,
//! storage, discovery, transport, and the central dispatcher together into
//! the crate's background-task concurrency model.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use archipel_crypto::encrypted_keys::{EncryptedPrivateKey, KeyEncryptionParams};
use archipel_crypto::{Identity, NodeId};
use archipel_discovery::{AnnounceSource, DiscoveryHandle};
use archipel_files::Manifest;
use archipel_proto::payload::HelloPayload;
use archipel_proto::{frame, PacketType, SHARED_MAC_KEY};
use archipel_store::Store;
use archipel_transport::{MacKeyResolver, SessionTransport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::NodeConfig;
use crate::dispatch::{self, DispatchContext};
use crate::error::NodeError;
use crate::events::NodeEvent;
use crate::handshake::HandshakeCoordinator;
use crate::peer::{PeerEntry, PeerTable};
use crate::transfer::TransferManager;

/// How often the stalled-download reaper sweeps in-flight downloads.
const REAP_INTERVAL: Duration = Duration::from_secs(10);

/// Resolves a peer's session key (once established) as its frame MAC key,
/// falling back to the shared discovery key. This is the session
/// transport's `MacKeyResolver` implementation.
struct PeerTableMacResolver(Arc<PeerTable>);

impl MacKeyResolver for PeerTableMacResolver {
    fn resolve(&self, sender_node_id: &NodeId) -> Vec<u8> {
        self.0
            .get(sender_node_id)
            .and_then(|peer| peer.session_key)
            .map(|key| key.to_vec())
            .unwrap_or_else(|| SHARED_MAC_KEY.to_vec())
    }
}

/// Builds this node's current `HELLO` payload on every announce tick, so a
/// changed shared-file list or re-bound port takes effect without a
/// restart.
struct NodeAnnounceSource {
    identity: Arc<Identity>,
    transfer: Arc<TransferManager>,
    tcp_port: Arc<AtomicU16>,
}

impl AnnounceSource for NodeAnnounceSource {
    fn hello_payload(&self) -> HelloPayload {
        HelloPayload {
            node_id: archipel_crypto::node_id_hex(&self.identity.node_id()),
            dh_public_key: hex::encode(self.identity.dh_public().to_bytes()),
            signing_public_key: hex::encode(self.identity.signing_public().to_bytes()),
            tcp_port: self.tcp_port.load(Ordering::SeqCst),
            shared_files: self.transfer.shared_manifests().into_iter().map(|m| m.file_name).collect(),
            timestamp: archipel_discovery::unix_timestamp(),
        }
    }
}

/// The running set of background tasks and handles a started node owns.
/// `None` before [`Node::start`] and after [`Node::stop`].
#[derive(Default)]
struct Running {
    transport: Option<Arc<SessionTransport>>,
    discovery: Option<DiscoveryHandle>,
    tasks: Vec<JoinHandle<()>>,
}

/// A LAN-only ARCHIPEL node: one identity, one persistent store, and the
/// running discovery/transport/dispatch machinery once [`Node::start`] is
/// called.
///
/// See the crate-level quick start for a minimal usage example.
pub struct Node {
    identity: Arc<Identity>,
    config: Arc<NodeConfig>,
    store: Store,
    peer_table: Arc<PeerTable>,
    handshake: Arc<HandshakeCoordinator>,
    transfer: Arc<TransferManager>,
    events_tx: mpsc::UnboundedSender<NodeEvent>,
    events_rx: StdMutex<Option<mpsc::UnboundedReceiver<NodeEvent>>>,
    running: StdMutex<Running>,
}

impl Node {
    /// Open (or create) the configured store and load the node's persisted
    /// identity, generating and persisting a fresh one on first run.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Store`] if the database cannot be opened, or
    /// [`NodeError::Crypto`] if a persisted identity blob fails to decrypt
    /// or fails its `NodeId` invariant re-check.
    pub async fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let store = open_store(&config).await?;
        let identity = match store.load_identity().await? {
            Some(blob) => decode_identity(&blob, config.identity_passphrase.as_deref())?,
            None => {
                let identity = Identity::generate();
                let blob = encode_identity(&identity, config.identity_passphrase.as_deref())?;
                store.save_identity(&blob).await?;
                identity
            }
        };
        Self::assemble(config, store, identity)
    }

    /// Always generate a fresh random identity, overwriting any persisted
    /// one. Useful for ephemeral nodes and tests.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Store`] if the database cannot be opened.
    pub async fn new_random(config: NodeConfig) -> Result<Self, NodeError> {
        let store = open_store(&config).await?;
        let identity = Identity::generate();
        let blob = encode_identity(&identity, config.identity_passphrase.as_deref())?;
        store.save_identity(&blob).await?;
        Self::assemble(config, store, identity)
    }

    fn assemble(config: NodeConfig, store: Store, identity: Identity) -> Result<Self, NodeError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            identity: Arc::new(identity),
            transfer: Arc::new(TransferManager::new(config.downloads_dir.clone())),
            config: Arc::new(config),
            store,
            peer_table: Arc::new(PeerTable::new()),
            handshake: Arc::new(HandshakeCoordinator::new()),
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
            running: StdMutex::new(Running::default()),
        })
    }

    /// This node's stable identifier.
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.identity.node_id()
    }

    /// Take the event receiver. Only the first caller gets it — later calls
    /// return `None`.
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<NodeEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    /// Every peer currently active — stale entries (`now - lastSeen >
    /// PEER_TTL`) are pruned first, so a peer that has gone quiet never
    /// appears here even between prune-sweep ticks.
    #[must_use]
    pub fn peers(&self) -> Vec<PeerEntry> {
        let now = archipel_discovery::unix_timestamp();
        self.peer_table.get_active(now, self.config.peer_ttl.as_secs() as i64)
    }

    /// Start discovery, the session transport, and the central dispatcher.
    /// Idempotent calls while already started would duplicate listeners;
    /// callers are expected to start a node exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Transport`] if the TCP listener cannot bind, or
    /// [`NodeError::Discovery`] if the multicast socket cannot be joined.
    pub async fn start(&self) -> Result<(), NodeError> {
        let resolver: Arc<dyn MacKeyResolver> = Arc::new(PeerTableMacResolver(self.peer_table.clone()));
        let (transport, bound_port, mut inbound_rx, mut transport_event_rx) =
            SessionTransport::start(self.config.listen_port, self.identity.node_id(), resolver).await?;

        let tcp_port = Arc::new(AtomicU16::new(bound_port));
        let announce_source: Arc<dyn AnnounceSource> = Arc::new(NodeAnnounceSource {
            identity: self.identity.clone(),
            transfer: self.transfer.clone(),
            tcp_port: tcp_port.clone(),
        });
        let (discovery_handle, mut discovery_rx) =
            archipel_discovery::start(self.config.discovery.clone(), self.identity.node_id(), announce_source)?;

        let ctx = DispatchContext {
            identity: self.identity.clone(),
            store: self.store.clone(),
            peer_table: self.peer_table.clone(),
            transport: transport.clone(),
            handshake: self.handshake.clone(),
            transfer: self.transfer.clone(),
            config: self.config.clone(),
            events: self.events_tx.clone(),
            announce_source: announce_source.clone(),
        };

        let mut tasks = Vec::with_capacity(4);

        let inbound_ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(inbound) = inbound_rx.recv().await {
                dispatch::handle_inbound_frame(&inbound_ctx, inbound).await;
            }
        }));

        let discovery_ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = discovery_rx.recv().await {
                dispatch::handle_discovery_event(&discovery_ctx, event).await;
            }
        }));

        let transport_ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = transport_event_rx.recv().await {
                dispatch::handle_transport_event(&transport_ctx, event).await;
            }
        }));

        let reap_ctx = ctx;
        let inactivity_timeout = self.config.transfer_inactivity_timeout;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAP_INTERVAL);
            loop {
                ticker.tick().await;
                for file_id in reap_ctx.transfer.reap_stalled(inactivity_timeout) {
                    let _ = reap_ctx.events.send(NodeEvent::TransferFailed {
                        file_id,
                        reason: "no chunk progress within the inactivity timeout".into(),
                    });
                }
            }
        }));

        let mut running = self.running.lock().unwrap();
        running.transport = Some(transport);
        running.discovery = Some(discovery_handle);
        running.tasks = tasks;
        Ok(())
    }

    /// Stop the discovery service and every background task this node
    /// spawned. Accepted connections that are still mid-flight finish their
    /// current read/write before their task notices the dispatcher is gone.
    pub async fn stop(&self) {
        let mut running = self.running.lock().unwrap();
        if let Some(handle) = running.discovery.take() {
            handle.shutdown();
        }
        for task in running.tasks.drain(..) {
            task.abort();
        }
        running.transport = None;
    }

    fn transport(&self) -> Result<Arc<SessionTransport>, NodeError> {
        self.running
            .lock()
            .unwrap()
            .transport
            .clone()
            .ok_or_else(|| NodeError::Unreachable("node has not been started".into()))
    }

    /// Send a chat message to `target`: direct if reachable, relayed through
    /// an active peer, or queued for later delivery as a last resort.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::UnknownPeer`] if `target` has no peer-table
    /// entry, or [`NodeError::Unreachable`] if the node has not been
    /// started.
    pub async fn send(&self, target: NodeId, content: &str) -> Result<crate::messaging::SendOutcome, NodeError> {
        let transport = self.transport()?;
        crate::messaging::send_message(
            &self.identity,
            &self.store,
            &self.peer_table,
            &transport,
            self.config.relay_ttl.as_secs() as i64,
            target,
            content,
        )
        .await
    }

    /// Send to every currently-active peer, best-effort.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Unreachable`] if the node has not been started.
    pub async fn broadcast(&self, content: &str) -> Result<(), NodeError> {
        let transport = self.transport()?;
        crate::messaging::broadcast(
            &self.identity,
            &self.store,
            &self.peer_table,
            &transport,
            self.config.relay_ttl.as_secs() as i64,
            content,
        )
        .await;
        Ok(())
    }

    /// Chunk and register a local file for sharing. Callers typically follow
    /// this with [`Self::offer_file`] to advertise it to a specific peer.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Files`] if the file cannot be read.
    pub async fn share_file(&self, path: impl AsRef<Path>) -> Result<Manifest, NodeError> {
        Ok(self.transfer.share_file(path).await?)
    }

    /// Send a `MANIFEST` frame for a previously-shared file to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::UnknownFile`] if `file_id` is not a file this
    /// node shares, or [`NodeError::UnknownPeer`] if `target` is not known.
    pub async fn offer_file(&self, target: NodeId, file_id: [u8; 32]) -> Result<(), NodeError> {
        let transport = self.transport()?;
        let manifest = self
            .transfer
            .shared_manifests()
            .into_iter()
            .find(|m| m.file_id == file_id)
            .ok_or_else(|| NodeError::UnknownFile(hex::encode(file_id)))?;

        let peer = self.peer_table.get(&target).ok_or_else(|| NodeError::UnknownPeer(archipel_crypto::node_id_hex(&target)))?;
        let addr = SocketAddr::new(peer.address.ip(), peer.tcp_port);
        let payload_bytes = serde_json::to_vec(&manifest.to_payload()).map_err(|e| NodeError::MalformedPayload(e.to_string()))?;
        let mac_key = peer.session_key.map(|k| k.to_vec()).unwrap_or_else(|| SHARED_MAC_KEY.to_vec());
        let wire_frame = frame::build(PacketType::Manifest, &self.identity.node_id(), &payload_bytes, &mac_key);
        transport.send_to(target, addr, wire_frame).await?;
        Ok(())
    }

    /// Begin downloading a file a peer has previously offered via
    /// [`NodeEvent::ManifestReceived`].
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::UnknownFile`] if no manifest was ever offered for
    /// `file_id`.
    pub async fn download_file(&self, file_id: [u8; 32]) -> Result<(), NodeError> {
        let transport = self.transport()?;
        let (manifest, source) = self
            .transfer
            .remote_manifest(&file_id)
            .ok_or_else(|| NodeError::UnknownFile(hex::encode(file_id)))?;
        self.transfer.begin_download(&self.identity, &self.peer_table, &transport, manifest, source).await
    }
}

async fn open_store(config: &NodeConfig) -> Result<Store, NodeError> {
    Ok(Store::open(config.data_dir.join("archipel.db")).await?)
}

/// Encode an identity for persistence: plaintext when no passphrase is
/// configured, otherwise each 32-byte seed independently Argon2id/AEAD
/// encrypted. Layout: `flag(1) | node_id(32) | seed-encoding...`.
fn encode_identity(identity: &Identity, passphrase: Option<&[u8]>) -> Result<Vec<u8>, NodeError> {
    let mut out = Vec::new();
    out.extend_from_slice(&identity.node_id());

    match passphrase {
        None => {
            out.insert(0, 0u8);
            out.extend_from_slice(&identity.signing_seed());
            out.extend_from_slice(&identity.dh_seed());
        }
        Some(passphrase) => {
            out.insert(0, 1u8);
            let signing_enc = EncryptedPrivateKey::encrypt(&identity.signing_seed(), passphrase, KeyEncryptionParams::default())?.to_bytes();
            let dh_enc = EncryptedPrivateKey::encrypt(&identity.dh_seed(), passphrase, KeyEncryptionParams::default())?.to_bytes();
            out.extend_from_slice(&(signing_enc.len() as u32).to_be_bytes());
            out.extend_from_slice(&signing_enc);
            out.extend_from_slice(&(dh_enc.len() as u32).to_be_bytes());
            out.extend_from_slice(&dh_enc);
        }
    }
    Ok(out)
}

fn decode_identity(blob: &[u8], passphrase: Option<&[u8]>) -> Result<Identity, NodeError> {
    if blob.len() < 33 {
        return Err(NodeError::MalformedPayload("identity blob is too short".into()));
    }
    let flag = blob[0];
    let mut node_id = [0u8; 32];
    node_id.copy_from_slice(&blob[1..33]);
    let rest = &blob[33..];

    match (flag, passphrase) {
        (0, _) => {
            if rest.len() != 64 {
                return Err(NodeError::MalformedPayload("identity blob has the wrong length".into()));
            }
            let mut signing_seed = [0u8; 32];
            let mut dh_seed = [0u8; 32];
            signing_seed.copy_from_slice(&rest[..32]);
            dh_seed.copy_from_slice(&rest[32..]);
            Ok(Identity::from_parts(signing_seed, dh_seed, node_id)?)
        }
        (1, Some(passphrase)) => {
            let (signing_bytes, dh_bytes) = split_length_prefixed(rest)?;
            let signing_seed = EncryptedPrivateKey::from_bytes(signing_bytes)?.decrypt(passphrase)?.into_bytes();
            let dh_seed = EncryptedPrivateKey::from_bytes(dh_bytes)?.decrypt(passphrase)?.into_bytes();
            Ok(Identity::from_parts(signing_seed, dh_seed, node_id)?)
        }
        (1, None) => Err(NodeError::MalformedPayload("identity is passphrase-encrypted but none was configured".into())),
        _ => Err(NodeError::MalformedPayload("unrecognized identity blob format".into())),
    }
}

fn split_length_prefixed(rest: &[u8]) -> Result<(&[u8], &[u8]), NodeError> {
    let bad = || NodeError::MalformedPayload("identity blob has a corrupt length prefix".into());
    if rest.len() < 4 {
        return Err(bad());
    }
    let signing_len = u32::from_be_bytes(rest[0..4].try_into().unwrap()) as usize;
    let signing_end = 4 + signing_len;
    if rest.len() < signing_end + 4 {
        return Err(bad());
    }
    let signing_bytes = &rest[4..signing_end];
    let dh_len = u32::from_be_bytes(rest[signing_end..signing_end + 4].try_into().unwrap()) as usize;
    let dh_start = signing_end + 4;
    if rest.len() < dh_start + dh_len {
        return Err(bad());
    }
    Ok((signing_bytes, &rest[dh_start..dh_start + dh_len]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> NodeConfig {
        NodeConfig {
            listen_port: 0,
            data_dir: dir.to_path_buf(),
            shared_dir: dir.join("shared"),
            downloads_dir: dir.join("downloads"),
            ..NodeConfig::default()
        }
    }

    #[test]
    fn plaintext_identity_round_trips() {
        let identity = Identity::generate();
        let blob = encode_identity(&identity, None).unwrap();
        let decoded = decode_identity(&blob, None).unwrap();
        assert_eq!(decoded.node_id(), identity.node_id());
    }

    #[test]
    fn encrypted_identity_round_trips_with_correct_passphrase() {
        let identity = Identity::generate();
        let blob = encode_identity(&identity, Some(b"correct horse battery staple")).unwrap();
        let decoded = decode_identity(&blob, Some(b"correct horse battery staple")).unwrap();
        assert_eq!(decoded.node_id(), identity.node_id());
    }

    #[test]
    fn encrypted_identity_rejects_wrong_passphrase() {
        let identity = Identity::generate();
        let blob = encode_identity(&identity, Some(b"right")).unwrap();
        assert!(decode_identity(&blob, Some(b"wrong")).is_err());
    }

    #[tokio::test]
    async fn new_random_persists_and_new_reloads_the_same_identity() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());

        let first = Node::new_random(config.clone()).await.unwrap();
        let node_id = first.node_id();
        drop(first);

        let reloaded = Node::new(config).await.unwrap();
        assert_eq!(reloaded.node_id(), node_id);
    }

    #[tokio::test]
    async fn a_fresh_node_has_no_peers_and_no_route_before_starting() {
        let dir = tempdir().unwrap();
        let node = Node::new_random(test_config(dir.path())).await.unwrap();
        assert!(node.peers().is_empty());

        let result = node.send([9u8; 32], "hello").await;
        assert!(matches!(result, Err(NodeError::Unreachable(_))));
    }

    #[tokio::test]
    async fn two_nodes_start_discover_and_exchange_a_chat_message() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();

        let mut config_a = test_config(dir_a.path());
        config_a.discovery.port = 17000;
        config_a.discovery.announce_interval = Duration::from_millis(50);
        config_a.discovery.prune_interval = Duration::from_secs(3600);

        let mut config_b = test_config(dir_b.path());
        config_b.discovery.port = 17000;
        config_b.discovery.announce_interval = Duration::from_millis(50);
        config_b.discovery.prune_interval = Duration::from_secs(3600);

        let node_a = Node::new_random(config_a).await.unwrap();
        let node_b = Node::new_random(config_b).await.unwrap();
        let node_id_b = node_b.node_id();

        let mut events_a = node_a.events().unwrap();

        node_a.start().await.unwrap();
        node_b.start().await.unwrap();

        let session_established = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events_a.recv().await {
                    Some(NodeEvent::SessionEstablished(id)) if id == node_id_b => return,
                    Some(_) => continue,
                    None => panic!("event channel closed before session established"),
                }
            }
        })
        .await;
        assert!(session_established.is_ok(), "timed out waiting for the two nodes to complete a handshake");

        node_a.send(node_id_b, "hello from a").await.unwrap();

        node_a.stop().await;
        node_b.stop().await;
    }
}
