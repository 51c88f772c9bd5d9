//! The multicast discovery service: one recv task, one announce timer, one
//! prune timer.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use archipel_crypto::NodeId;
use archipel_proto::frame;
use archipel_proto::payload::HelloPayload;
use archipel_proto::{PacketType, SHARED_MAC_KEY};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::event::{AnnouncedPeer, DiscoveryEvent};

const MAX_DATAGRAM_SIZE: usize = 8 * 1024;

/// Supplies the current self-announcement payload. Regenerated on every
/// announce tick so that changes to the shared-file list or listening port
/// take effect without a restart.
pub trait AnnounceSource: Send + Sync {
    /// Build this node's current `HELLO` payload.
    fn hello_payload(&self) -> HelloPayload;
}

impl<F> AnnounceSource for F
where
    F: Fn() -> HelloPayload + Send + Sync,
{
    fn hello_payload(&self) -> HelloPayload {
        self()
    }
}

/// A running discovery service. Dropping this (or its socket) does not stop
/// the background tasks; call [`DiscoveryHandle::shutdown`] to stop them.
pub struct DiscoveryHandle {
    announce_task: tokio::task::JoinHandle<()>,
    prune_task: tokio::task::JoinHandle<()>,
    recv_task: tokio::task::JoinHandle<()>,
}

impl DiscoveryHandle {
    /// Abort all background tasks.
    pub fn shutdown(self) {
        self.announce_task.abort();
        self.prune_task.abort();
        self.recv_task.abort();
    }
}

/// Bind and join the well-known multicast group, per `config`.
pub fn bind_multicast_socket(config: &DiscoveryConfig) -> Result<UdpSocket, DiscoveryError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port);
    socket.bind(&bind_addr.into())?;
    socket.join_multicast_v4(&config.group, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_multicast_ttl_v4(super::config::MULTICAST_TTL)?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

/// Start the discovery service: joins the multicast group, spawns the recv
/// loop and both interval timers, and returns a handle plus the channel on
/// which [`DiscoveryEvent`]s arrive.
pub fn start(
    config: DiscoveryConfig,
    local_node_id: NodeId,
    announce_source: Arc<dyn AnnounceSource>,
) -> Result<(DiscoveryHandle, mpsc::Receiver<DiscoveryEvent>), DiscoveryError> {
    let socket = Arc::new(bind_multicast_socket(&config)?);
    let (tx, rx) = mpsc::channel(256);
    let multicast_addr = SocketAddr::V4(SocketAddrV4::new(config.group, config.port));

    let recv_task = tokio::spawn(recv_loop(socket.clone(), local_node_id, tx.clone()));
    let announce_task = tokio::spawn(announce_loop(
        socket.clone(),
        multicast_addr,
        local_node_id,
        announce_source,
        config.announce_interval,
    ));
    let prune_task = tokio::spawn(prune_loop(tx, config.prune_interval));

    Ok((
        DiscoveryHandle {
            announce_task,
            prune_task,
            recv_task,
        },
        rx,
    ))
}

async fn recv_loop(socket: Arc<UdpSocket>, local_node_id: NodeId, tx: mpsc::Sender<DiscoveryEvent>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let (len, source_addr) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(error) => {
                tracing::warn!(%error, "multicast recv failed");
                continue;
            }
        };

        let Some(packet) = frame::parse(&buf[..len], SHARED_MAC_KEY) else {
            continue;
        };
        if packet.packet_type() != PacketType::Hello {
            continue;
        }
        if *packet.sender_node_id() == local_node_id {
            continue;
        }

        let Ok(hello) = serde_json::from_slice::<HelloPayload>(packet.payload()) else {
            tracing::debug!("malformed HELLO payload, dropping");
            continue;
        };

        let Some(announced) = decode_announced_peer(&hello, *packet.sender_node_id(), source_addr, packet.unverified())
        else {
            tracing::debug!("HELLO payload had malformed key material, dropping");
            continue;
        };

        if tx.send(DiscoveryEvent::Announced(announced)).await.is_err() {
            return;
        }
    }
}

fn decode_announced_peer(
    hello: &HelloPayload,
    sender_node_id: NodeId,
    source_addr: SocketAddr,
    unverified: bool,
) -> Option<AnnouncedPeer> {
    let dh_public_key = decode_fixed_32(&hello.dh_public_key)?;
    let signing_public_key = decode_fixed_32(&hello.signing_public_key)?;

    Some(AnnouncedPeer {
        node_id: sender_node_id,
        source_addr,
        dh_public_key,
        signing_public_key,
        tcp_port: hello.tcp_port,
        shared_files: hello.shared_files.clone(),
        unverified,
    })
}

fn decode_fixed_32(hex_str: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(hex_str).ok()?;
    bytes.try_into().ok()
}

async fn announce_loop(
    socket: Arc<UdpSocket>,
    multicast_addr: SocketAddr,
    local_node_id: NodeId,
    announce_source: Arc<dyn AnnounceSource>,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let hello = announce_source.hello_payload();
        let Ok(payload_bytes) = serde_json::to_vec(&hello) else {
            tracing::warn!("failed to encode HELLO payload");
            continue;
        };
        let frame = frame::build(PacketType::Hello, &local_node_id, &payload_bytes, SHARED_MAC_KEY);
        if let Err(error) = socket.send_to(&frame, multicast_addr).await {
            tracing::warn!(%error, "failed to send multicast announcement");
        }
    }
}

async fn prune_loop(tx: mpsc::Sender<DiscoveryEvent>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if tx.send(DiscoveryEvent::PruneTick).await.is_err() {
            return;
        }
    }
}

/// Current Unix timestamp, seconds. Used when building a `HELLO` payload.
#[must_use]
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
