//! The central inbound router: one place where every wire frame, discovery
//! event, and transport lifecycle event is turned into peer-table and
//! store mutations. Nothing outside this module mutates the peer table or
//! trust store in reaction to network input.

use std::net::SocketAddr;
use std::sync::Arc;

use archipel_crypto::{node_id_hex, Identity, NodeId};
use archipel_discovery::{AnnounceSource, AnnouncedPeer, DiscoveryEvent};
use archipel_files::manifest::Manifest;
use archipel_proto::payload::{
    ChunkDataPayload, ChunkRequestPayload, MsgPayload, PeerListPayload, RelayPayload,
};
use archipel_proto::{frame, PacketType, SHARED_MAC_KEY};
use archipel_store::{MessageRecord, RelayEnvelope, Store, TrustStatus};
use archipel_transport::{InboundFrame, SessionTransport, TransportEvent};
use tokio::sync::mpsc;

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::events::NodeEvent;
use crate::handshake::{HandshakeCoordinator, HandshakeInitFields};
use crate::peer::PeerTable;
use crate::transfer::{ChunkOutcome, TransferManager};
use crate::wire::{decode32, decode_node_id};

/// Everything dispatch needs to react to inbound network activity. Cheap to
/// clone: every field is an `Arc` or already internally shared.
#[derive(Clone)]
pub struct DispatchContext {
    /// This node's long-term identity.
    pub identity: Arc<Identity>,
    /// The persistent store.
    pub store: Store,
    /// The in-memory peer table.
    pub peer_table: Arc<PeerTable>,
    /// The session transport.
    pub transport: Arc<SessionTransport>,
    /// In-flight handshake state.
    pub handshake: Arc<HandshakeCoordinator>,
    /// In-flight and offered file transfers.
    pub transfer: Arc<TransferManager>,
    /// Node-wide tunables.
    pub config: Arc<NodeConfig>,
    /// Where application-facing events are published.
    pub events: mpsc::UnboundedSender<NodeEvent>,
    /// Builds this node's current `HELLO` payload, reused both for the
    /// periodic multicast announce and for the symmetric session-transport
    /// reply in [`handle_hello`].
    pub announce_source: Arc<dyn AnnounceSource>,
}

fn mac_key_for(ctx: &DispatchContext, node_id: &NodeId) -> Vec<u8> {
    ctx.peer_table.get(node_id).and_then(|p| p.session_key).map(|k| k.to_vec()).unwrap_or_else(|| SHARED_MAC_KEY.to_vec())
}

fn emit(ctx: &DispatchContext, event: NodeEvent) {
    let _ = ctx.events.send(event);
}

/// Handle one multicast discovery event.
pub async fn handle_discovery_event(ctx: &DispatchContext, event: DiscoveryEvent) {
    match event {
        DiscoveryEvent::Announced(peer) => handle_announced(ctx, peer).await,
        DiscoveryEvent::PruneTick => {
            let now = archipel_discovery::unix_timestamp();
            for dead in ctx.peer_table.prune_dead(now, ctx.config.peer_ttl.as_secs() as i64) {
                emit(ctx, NodeEvent::PeerLost(dead));
            }
        }
    }
}

async fn handle_announced(ctx: &DispatchContext, peer: AnnouncedPeer) {
    let now = archipel_discovery::unix_timestamp();
    let is_new = ctx.peer_table.upsert(
        peer.node_id,
        peer.source_addr,
        peer.tcp_port,
        Some(peer.signing_public_key),
        Some(peer.dh_public_key),
        peer.shared_files.clone(),
        now,
    );

    let _ = ctx
        .store
        .upsert_peer(&archipel_store::PersistedPeer {
            node_id: node_id_hex(&peer.node_id),
            address: peer.source_addr.to_string(),
            tcp_port: peer.tcp_port,
            signing_pub: Some(hex::encode(peer.signing_public_key)),
            dh_pub: Some(hex::encode(peer.dh_public_key)),
            shared_files: peer.shared_files,
            last_seen: now,
        })
        .await;

    if !is_new {
        return;
    }
    emit(ctx, NodeEvent::PeerDiscovered(peer.node_id));

    let addr = SocketAddr::new(peer.source_addr.ip(), peer.tcp_port);
    let (init_payload, rx) = ctx.handshake.initiate(&ctx.identity, peer.node_id);
    let Ok(payload_bytes) = serde_json::to_vec(&init_payload) else { return };
    let init_frame = frame::build(PacketType::Msg, &ctx.identity.node_id(), &payload_bytes, SHARED_MAC_KEY);

    if ctx.transport.send_to(peer.node_id, addr, init_frame).await.is_err() {
        ctx.handshake.abandon(&peer.node_id);
        return;
    }

    let ctx = ctx.clone();
    tokio::spawn(async move {
        match tokio::time::timeout(ctx.config.handshake_timeout, rx).await {
            Ok(Ok(Ok(session_key))) => {
                ctx.peer_table.set_session_key(&peer.node_id, session_key);
                emit(&ctx, NodeEvent::SessionEstablished(peer.node_id));
            }
            Ok(Ok(Err(_))) => {
                // The responder rejected the handshake; already logged at the
                // point of rejection.
            }
            Ok(Err(_)) | Err(_) => {
                ctx.handshake.abandon(&peer.node_id);
            }
        }
    });
}

/// Handle a session-transport lifecycle event.
pub async fn handle_transport_event(ctx: &DispatchContext, event: TransportEvent) {
    match event {
        TransportEvent::Connected(node_id) => flush_relay_queue(ctx, node_id).await,
        TransportEvent::Disconnected(_) => {}
    }
}

async fn flush_relay_queue(ctx: &DispatchContext, node_id: NodeId) {
    let Some(peer) = ctx.peer_table.get(&node_id) else { return };
    let now = archipel_discovery::unix_timestamp();
    let target_hex = node_id_hex(&node_id);
    let Ok(envelopes) = ctx.store.drain_relay_queue(&target_hex, now).await else { return };
    let addr = SocketAddr::new(peer.address.ip(), peer.tcp_port);
    for envelope in envelopes {
        let frame = frame::build(PacketType::Msg, &ctx.identity.node_id(), envelope.content.as_bytes(), &mac_key_for(ctx, &node_id));
        if let Err(error) = ctx.transport.send_to(node_id, addr, frame).await {
            tracing::debug!(%error, peer = %target_hex, "failed to flush a relayed envelope");
        }
    }
}

/// Handle one inbound wire frame.
pub async fn handle_inbound_frame(ctx: &DispatchContext, inbound: InboundFrame) {
    let packet = inbound.packet;
    let sender = *packet.sender_node_id();
    let now = archipel_discovery::unix_timestamp();

    match packet.packet_type() {
        PacketType::Hello => handle_hello(ctx, sender, inbound.peer_addr, packet.payload(), now).await,
        PacketType::PeerList => handle_peer_list(ctx, packet.payload(), now),
        PacketType::Msg => handle_msg(ctx, sender, inbound.peer_addr, packet.payload(), now).await,
        PacketType::Manifest => handle_manifest(ctx, sender, packet.payload()),
        PacketType::ChunkReq => handle_chunk_req(ctx, sender, packet.payload()).await,
        PacketType::ChunkData => handle_chunk_data(ctx, sender, packet.payload()).await,
        PacketType::Relay => handle_relay(ctx, packet.payload(), now).await,
        PacketType::Ack => {}
    }
}

async fn handle_hello(ctx: &DispatchContext, sender: NodeId, peer_addr: SocketAddr, payload: &[u8], now: i64) {
    let Ok(hello) = serde_json::from_slice::<archipel_proto::payload::HelloPayload>(payload) else { return };
    let Some(signing_pub) = decode32(&hello.signing_public_key) else { return };
    let Some(dh_pub) = decode32(&hello.dh_public_key) else { return };

    let is_new = ctx.peer_table.upsert(sender, peer_addr, hello.tcp_port, Some(signing_pub), Some(dh_pub), hello.shared_files, now);
    if !is_new {
        return;
    }
    emit(ctx, NodeEvent::PeerDiscovered(sender));

    // Symmetric reply so a peer that reached us directly (manual bootstrap,
    // or any HELLO outside the multicast announce loop) learns about us
    // without waiting for its own next announce tick.
    let reply_payload = ctx.announce_source.hello_payload();
    let Ok(payload_bytes) = serde_json::to_vec(&reply_payload) else { return };
    let reply_frame = frame::build(PacketType::Hello, &ctx.identity.node_id(), &payload_bytes, SHARED_MAC_KEY);
    if let Err(error) = ctx.transport.send_to(sender, peer_addr, reply_frame).await {
        tracing::debug!(%error, peer = %node_id_hex(&sender), "failed to send symmetric HELLO reply");
    }
}

fn handle_peer_list(ctx: &DispatchContext, payload: &[u8], now: i64) {
    let Ok(list) = serde_json::from_slice::<PeerListPayload>(payload) else { return };
    for summary in list.peers {
        let Some(node_id) = decode_node_id(&summary.node_id) else { continue };
        let Ok(addr) = summary.address.parse::<SocketAddr>() else { continue };
        let signing_pub = summary.signing_public_key.as_deref().and_then(decode32);
        let dh_pub = summary.dh_public_key.as_deref().and_then(decode32);
        ctx.peer_table.upsert(node_id, addr, addr.port(), signing_pub, dh_pub, summary.shared_files, now);
    }
}

async fn handle_msg(ctx: &DispatchContext, sender: NodeId, peer_addr: SocketAddr, payload: &[u8], now: i64) {
    let Ok(msg) = serde_json::from_slice::<MsgPayload>(payload) else { return };
    match &msg {
        MsgPayload::HandshakeInit { .. } => handle_handshake_init(ctx, peer_addr, &msg, now).await,
        MsgPayload::HandshakeResp { .. } => handle_handshake_resp(ctx, &msg, now).await,
        MsgPayload::Chat { .. } => handle_chat(ctx, sender, &msg),
        MsgPayload::Other => {}
    }
}

async fn handle_handshake_init(ctx: &DispatchContext, peer_addr: SocketAddr, msg: &MsgPayload, now: i64) {
    let Some(fields) = HandshakeInitFields::decode(msg) else { return };
    let node_id = fields.node_id;

    match ctx.handshake.accept_as_responder(&ctx.identity, &ctx.store, &fields, now).await {
        Ok((response, outcome)) => {
            let tcp_port = ctx.peer_table.get(&node_id).map(|p| p.tcp_port).unwrap_or(peer_addr.port());
            ctx.peer_table.upsert(node_id, peer_addr, tcp_port, Some(outcome.peer_signing_pub), Some(outcome.peer_dh_pub), vec![], now);
            ctx.peer_table.set_session_key(&node_id, outcome.session_key);

            let Ok(payload_bytes) = serde_json::to_vec(&response) else { return };
            let response_frame = frame::build(PacketType::Msg, &ctx.identity.node_id(), &payload_bytes, SHARED_MAC_KEY);
            if let Err(error) = ctx.transport.send_to(node_id, peer_addr, response_frame).await {
                tracing::debug!(%error, peer = %fields.node_id_hex, "failed to send HANDSHAKE_RESP");
                return;
            }

            emit(ctx, NodeEvent::SessionEstablished(node_id));
            if outcome.trust_status == TrustStatus::New {
                emit(ctx, NodeEvent::TrustChanged { node_id, status: outcome.trust_status });
            }
        }
        Err(error) => {
            tracing::debug!(%error, peer = %fields.node_id_hex, "rejected HANDSHAKE_INIT");
        }
    }
}

async fn handle_handshake_resp(ctx: &DispatchContext, msg: &MsgPayload, now: i64) {
    let Some(fields) = HandshakeInitFields::decode(msg) else { return };
    match ctx.handshake.complete_as_initiator(&ctx.identity, &ctx.store, &fields, now).await {
        Ok(outcome) => {
            ctx.peer_table.set_session_key(&fields.node_id, outcome.session_key);
        }
        Err(error) => {
            tracing::debug!(%error, peer = %fields.node_id_hex, "handshake response rejected");
        }
    }
}

fn handle_chat(ctx: &DispatchContext, sender: NodeId, msg: &MsgPayload) {
    let peer = ctx.peer_table.get(&sender);
    let session_key = peer.as_ref().and_then(|p| p.session_key);
    let signing_pub = peer.as_ref().and_then(|p| p.signing_pub);

    match crate::messaging::decode_chat_payload(msg, session_key, signing_pub) {
        Ok(decoded) => {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let now = archipel_discovery::unix_timestamp();
                let _ = ctx
                    .store
                    .append_message(&MessageRecord {
                        peer_id: node_id_hex(&sender),
                        sender: node_id_hex(&sender),
                        content: decoded.content.clone(),
                        encrypted: session_key.is_some(),
                        timestamp: now,
                    })
                    .await;
                emit(&ctx, NodeEvent::MessageReceived { from: sender, content: decoded.content });
            });
        }
        Err(error) => {
            tracing::debug!(%error, peer = %node_id_hex(&sender), "dropped an unreadable chat message");
        }
    }
}

fn handle_manifest(ctx: &DispatchContext, sender: NodeId, payload: &[u8]) {
    let Ok(manifest_payload) = serde_json::from_slice::<archipel_proto::payload::ManifestPayload>(payload) else { return };
    let Some(manifest) = Manifest::from_payload(&manifest_payload) else { return };
    let file_id = manifest.file_id;
    let file_name = manifest.file_name.clone();
    ctx.transfer.record_remote_manifest(manifest, sender);
    emit(ctx, NodeEvent::ManifestReceived { from: sender, file_id, file_name });
}

async fn handle_chunk_req(ctx: &DispatchContext, sender: NodeId, payload: &[u8]) {
    let Ok(request) = serde_json::from_slice::<ChunkRequestPayload>(payload) else { return };
    if let Err(error) = ctx.transfer.serve_chunk_request(&ctx.identity, &ctx.peer_table, &ctx.transport, sender, &request).await {
        tracing::debug!(%error, peer = %node_id_hex(&sender), "failed to serve a chunk request");
    }
}

async fn handle_chunk_data(ctx: &DispatchContext, sender: NodeId, payload: &[u8]) {
    let Ok(data) = serde_json::from_slice::<ChunkDataPayload>(payload) else { return };
    match ctx.transfer.handle_chunk_data(&ctx.identity, &ctx.peer_table, &ctx.transport, sender, &data).await {
        ChunkOutcome::Progress { file_id, received_chunks, total_chunks } => {
            emit(ctx, NodeEvent::TransferProgress { file_id, received_chunks, total_chunks });
        }
        ChunkOutcome::Complete { file_id, path } => {
            emit(ctx, NodeEvent::TransferComplete { file_id, path });
        }
        ChunkOutcome::Failed { file_id, reason } => {
            emit(ctx, NodeEvent::TransferFailed { file_id, reason });
        }
        ChunkOutcome::Ignored => {}
    }
}

async fn handle_relay(ctx: &DispatchContext, payload: &[u8], now: i64) {
    let Ok(relay) = serde_json::from_slice::<RelayPayload>(payload) else { return };
    let Some(target) = decode_node_id(&relay.target) else { return };
    let Some(sender) = decode_node_id(&relay.sender) else { return };

    if target == ctx.identity.node_id() {
        if let Ok(inner) = serde_json::from_str::<MsgPayload>(&relay.content) {
            handle_chat(ctx, sender, &inner);
        }
        return;
    }

    if let Ok(count) = ctx.store.count_relay_from_sender(&relay.sender).await {
        if count >= ctx.config.relay_queue_cap_per_sender {
            tracing::debug!(sender = %relay.sender, "dropped a relay envelope: per-sender queue cap reached");
            return;
        }
    }

    let _ = ctx
        .store
        .enqueue_relay(&RelayEnvelope {
            target_node_id: relay.target,
            sender_node_id: relay.sender,
            content: relay.content,
            created_at: now,
            expires_at: now + ctx.config.relay_ttl.as_secs() as i64,
        })
        .await;
}
