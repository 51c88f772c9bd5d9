//! The reliable byte-stream session transport: listener, connector, and the
//! per-peer socket registry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use archipel_crypto::NodeId;
use dashmap::DashMap;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::error::{TransportError, TransportResult};
use crate::reassembly::FrameReassembler;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const KEEPALIVE_PROBE_INTERVAL: Duration = Duration::from_secs(15);
const READ_BUF_SIZE: usize = 64 * 1024;
const LISTEN_RETRY_ATTEMPTS: u16 = 64;

/// Resolves the MAC key used to authenticate frames from a given sender.
/// Implemented by the core layer, which knows the peer table: a peer with
/// an established session uses its session key, everyone else the shared
/// discovery key.
pub trait MacKeyResolver: Send + Sync {
    /// The key to use when parsing a frame claiming to be from
    /// `sender_node_id`.
    fn resolve(&self, sender_node_id: &NodeId) -> Vec<u8>;
}

/// One frame that arrived on some connection, handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// The parsed, authenticated (or discovery-exempted) packet.
    pub packet: archipel_proto::Packet,
    /// The remote address the frame arrived from.
    pub peer_addr: SocketAddr,
}

/// Notable transport lifecycle events the core layer reacts to.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A socket to `node_id` was opened (inbound or outbound) and
    /// registered. The core layer should flush any relay-queue entries
    /// addressed to this peer.
    Connected(NodeId),
    /// The socket to `node_id` was closed and its registry entry removed.
    Disconnected(NodeId),
}

struct Registry {
    by_node: DashMap<NodeId, mpsc::UnboundedSender<Vec<u8>>>,
}

impl Registry {
    fn new() -> Self {
        Self {
            by_node: DashMap::new(),
        }
    }

    fn get(&self, node_id: &NodeId) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
        self.by_node.get(node_id).map(|entry| entry.clone())
    }

    fn insert(&self, node_id: NodeId, tx: mpsc::UnboundedSender<Vec<u8>>) {
        self.by_node.insert(node_id, tx);
    }

    fn remove(&self, node_id: &NodeId) {
        self.by_node.remove(node_id);
    }
}

/// A running session transport.
pub struct SessionTransport {
    registry: Arc<Registry>,
    mac_key_resolver: Arc<dyn MacKeyResolver>,
    inbound_tx: mpsc::Sender<InboundFrame>,
    event_tx: mpsc::Sender<TransportEvent>,
    local_node_id: NodeId,
}

impl SessionTransport {
    /// Bind a listener starting at `preferred_port`, incrementing on bind
    /// conflict up to [`LISTEN_RETRY_ATTEMPTS`] times, and spawn the accept
    /// loop. Returns the transport handle, the bound port, the inbound
    /// frame channel, and the lifecycle event channel.
    pub async fn start(
        preferred_port: u16,
        local_node_id: NodeId,
        mac_key_resolver: Arc<dyn MacKeyResolver>,
    ) -> TransportResult<(Arc<Self>, u16, mpsc::Receiver<InboundFrame>, mpsc::Receiver<TransportEvent>)> {
        let (listener, bound_port) = bind_with_retry(preferred_port).await?;

        let (inbound_tx, inbound_rx) = mpsc::channel(1024);
        let (event_tx, event_rx) = mpsc::channel(256);

        let transport = Arc::new(Self {
            registry: Arc::new(Registry::new()),
            mac_key_resolver,
            inbound_tx,
            event_tx,
            local_node_id,
        });

        tokio::spawn(transport.clone().accept_loop(listener));

        Ok((transport, bound_port, inbound_rx, event_rx))
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let transport = self.clone();
                    let (write_tx, write_rx) = mpsc::unbounded_channel::<Vec<u8>>();
                    tokio::spawn(async move {
                        transport.run_connection(stream, peer_addr, None, None, write_tx, write_rx).await;
                    });
                }
                Err(error) => {
                    tracing::warn!(%error, "accept failed");
                }
            }
        }
    }

    /// Send `frame` to `node_id`, reusing an open socket if one is
    /// registered; otherwise connects to `addr` with a 5 s timeout,
    /// registers the new socket, and emits [`TransportEvent::Connected`]
    /// before sending.
    pub async fn send_to(&self, node_id: NodeId, addr: SocketAddr, frame: Vec<u8>) -> TransportResult<()> {
        if let Some(tx) = self.registry.get(&node_id) {
            if tx.send(frame).is_ok() {
                return Ok(());
            }
            // stale entry from a socket that already closed
            self.registry.remove(&node_id);
        }

        self.connect_and_register(node_id, addr).await?;
        let tx = self.registry.get(&node_id).ok_or(TransportError::NoKnownAddress)?;
        tx.send(frame).map_err(|_| TransportError::ConnectTimeout)?;
        Ok(())
    }

    /// Open a connection to `addr` and immediately send a raw frame
    /// (typically a local HELLO), without requiring the peer's `NodeId` up
    /// front. Used for manual bootstrap. The same connection is then kept
    /// open to read the peer's reply.
    pub async fn send_to_address(&self, addr: SocketAddr, frame: Vec<u8>) -> TransportResult<()> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout)??;
        apply_keepalive(&stream);

        let (write_tx, write_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let transport = self.arc_self();
        tokio::spawn(async move {
            transport.run_connection(stream, addr, None, Some(frame), write_tx, write_rx).await;
        });
        Ok(())
    }

    /// Connect to `addr`, then register the write half of the connection
    /// under `node_id` *before* returning, so a caller that immediately
    /// calls [`Self::send_to`] afterwards always finds a live entry — even
    /// on a current-thread runtime where the connection task has not yet
    /// been polled.
    async fn connect_and_register(&self, node_id: NodeId, addr: SocketAddr) -> TransportResult<()> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout)??;
        apply_keepalive(&stream);

        let (write_tx, write_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        self.registry.insert(node_id, write_tx.clone());
        let _ = self.event_tx.send(TransportEvent::Connected(node_id)).await;

        let transport = self.arc_self();
        tokio::spawn(async move {
            transport.run_connection(stream, addr, Some(node_id), None, write_tx, write_rx).await;
        });
        Ok(())
    }

    /// One task per connection: owns the socket for its whole lifetime,
    /// reassembling inbound frames and draining an outbound write queue.
    /// `initial_frame`, when present, is written before the connection
    /// enters its read/write loop (the `sendToAddress` bootstrap path).
    /// `known_node_id`, when present, means the caller already registered
    /// `write_tx` under that id and emitted `Connected` synchronously; this
    /// task only needs to remove the entry and emit `Disconnected` on exit.
    async fn run_connection(
        self: Arc<Self>,
        mut stream: TcpStream,
        peer_addr: SocketAddr,
        known_node_id: Option<NodeId>,
        initial_frame: Option<Vec<u8>>,
        write_tx: mpsc::UnboundedSender<Vec<u8>>,
        mut write_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        apply_keepalive(&stream);

        let mut registered_node_id = known_node_id;

        if let Some(frame) = initial_frame {
            if let Err(error) = stream.write_all(&frame).await {
                tracing::debug!(%error, %peer_addr, "initial frame write failed");
                return;
            }
        }

        let mut reassembler = FrameReassembler::new();
        let mut read_buf = vec![0u8; READ_BUF_SIZE];

        loop {
            tokio::select! {
                read_result = stream.read(&mut read_buf) => {
                    match read_result {
                        Ok(0) => break, // peer closed
                        Ok(n) => {
                            reassembler.feed(&read_buf[..n]);
                            for raw_frame in reassembler.drain_frames() {
                                self.handle_raw_frame(&raw_frame, peer_addr, &write_tx, &mut registered_node_id).await;
                            }
                        }
                        Err(error) => {
                            tracing::debug!(%error, %peer_addr, "connection read error");
                            break;
                        }
                    }
                }
                maybe_frame = write_rx.recv() => {
                    match maybe_frame {
                        Some(frame) => {
                            if let Err(error) = stream.write_all(&frame).await {
                                tracing::debug!(%error, %peer_addr, "connection write error");
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        if let Some(node_id) = registered_node_id {
            self.registry.remove(&node_id);
            let _ = self.event_tx.send(TransportEvent::Disconnected(node_id)).await;
        }
    }

    async fn handle_raw_frame(
        &self,
        raw_frame: &[u8],
        peer_addr: SocketAddr,
        write_tx: &mpsc::UnboundedSender<Vec<u8>>,
        registered_node_id: &mut Option<NodeId>,
    ) {
        // The sender's claimed NodeId lives at a fixed offset regardless of
        // whether the MAC verifies, so we can key the resolver lookup
        // before we know if the frame is trustworthy.
        let Some(claimed_sender) = peek_sender_node_id(raw_frame) else {
            return;
        };
        if claimed_sender == self.local_node_id {
            return;
        }

        let key = self.mac_key_resolver.resolve(&claimed_sender);
        let Some(packet) = archipel_proto::frame::parse(raw_frame, &key) else {
            return;
        };

        if registered_node_id.is_none() {
            *registered_node_id = Some(claimed_sender);
            self.registry.insert(claimed_sender, write_tx.clone());
            let _ = self.event_tx.send(TransportEvent::Connected(claimed_sender)).await;
        }

        let _ = self.inbound_tx.send(InboundFrame { packet, peer_addr }).await;
    }

    fn arc_self(&self) -> Arc<Self> {
        // SessionTransport is always held behind an Arc by its caller
        // (returned from `start`); this clones that same allocation's
        // registry/channel handles into a fresh Arc for a spawned task.
        Arc::new(Self {
            registry: self.registry.clone(),
            mac_key_resolver: self.mac_key_resolver.clone(),
            inbound_tx: self.inbound_tx.clone(),
            event_tx: self.event_tx.clone(),
            local_node_id: self.local_node_id,
        })
    }
}

fn peek_sender_node_id(raw_frame: &[u8]) -> Option<NodeId> {
    const OFFSET: usize = 5; // magic(4) + type(1)
    if raw_frame.len() < OFFSET + 32 {
        return None;
    }
    let mut node_id = [0u8; 32];
    node_id.copy_from_slice(&raw_frame[OFFSET..OFFSET + 32]);
    Some(node_id)
}

fn apply_keepalive(stream: &TcpStream) {
    let sock_ref = SockRef::from(stream);
    let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_PROBE_INTERVAL);
    if let Err(error) = sock_ref.set_tcp_keepalive(&keepalive) {
        tracing::debug!(%error, "failed to set SO_KEEPALIVE");
    }
}

async fn bind_with_retry(preferred_port: u16) -> TransportResult<(TcpListener, u16)> {
    let mut port = preferred_port;
    for _ in 0..LISTEN_RETRY_ATTEMPTS {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok((listener, port)),
            Err(error) if error.kind() == std::io::ErrorKind::AddrInUse => {
                port = port.wrapping_add(1);
            }
            Err(error) => return Err(TransportError::BindFailed(error.to_string())),
        }
    }
    Err(TransportError::BindFailed(format!(
        "no free port found starting at {preferred_port}"
    )))
}
