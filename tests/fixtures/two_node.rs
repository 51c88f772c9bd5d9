//! Two-node test fixture for integration testing.
//!
//! Provides reusable infrastructure for exercising discovery, handshake, and
//! chat/transfer scenarios between a pair of ARCHIPEL nodes on loopback
//! multicast.
//!
//! # Example
//!
//! ```no_run
//! use archipel_integration_tests::fixtures::TwoNodeFixture;
//!
//! #[tokio::test]
//! async fn test_basic_session() {
//!     let mut fixture = TwoNodeFixture::new().await.unwrap();
//!     fixture.start().await.unwrap();
//!     fixture.wait_for_session(std::time::Duration::from_secs(5)).await;
//!     fixture.cleanup().await;
//! }
//! ```

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use archipel_core::{Node, NodeConfig, NodeEvent};
use archipel_crypto::NodeId;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Global multicast-port allocator so concurrently-running tests never share
/// a discovery group.
static NEXT_DISCOVERY_PORT: AtomicU16 = AtomicU16::new(18000);

fn allocate_discovery_port() -> u16 {
    NEXT_DISCOVERY_PORT.fetch_add(1, Ordering::SeqCst)
}

fn test_config(data_dir: &std::path::Path, discovery_port: u16) -> NodeConfig {
    let mut config = NodeConfig {
        listen_port: 0,
        data_dir: data_dir.to_path_buf(),
        shared_dir: data_dir.join("shared"),
        downloads_dir: data_dir.join("downloads"),
        ..NodeConfig::default()
    };
    config.discovery.port = discovery_port;
    config.discovery.announce_interval = Duration::from_millis(50);
    config.discovery.prune_interval = Duration::from_secs(3600);
    config
}

/// A pair of ARCHIPEL nodes sharing a private loopback multicast group,
/// isolated from any other fixture running concurrently.
pub struct TwoNodeFixture {
    pub initiator: Node,
    pub responder: Node,
    initiator_events: mpsc::UnboundedReceiver<NodeEvent>,
    responder_events: mpsc::UnboundedReceiver<NodeEvent>,
    _initiator_dir: TempDir,
    _responder_dir: TempDir,
}

impl TwoNodeFixture {
    /// Build a fresh fixture with random identities and an isolated
    /// discovery group. Nodes are constructed but not yet started.
    ///
    /// # Errors
    ///
    /// Returns [`archipel_core::NodeError`] if either node's store cannot be
    /// opened.
    pub async fn new() -> Result<Self, archipel_core::NodeError> {
        let initiator_dir = tempfile::tempdir().expect("tempdir");
        let responder_dir = tempfile::tempdir().expect("tempdir");
        let discovery_port = allocate_discovery_port();

        let initiator = Node::new_random(test_config(initiator_dir.path(), discovery_port)).await?;
        let responder = Node::new_random(test_config(responder_dir.path(), discovery_port)).await?;

        let initiator_events = initiator.events().expect("events taken once");
        let responder_events = responder.events().expect("events taken once");

        Ok(Self {
            initiator,
            responder,
            initiator_events,
            responder_events,
            _initiator_dir: initiator_dir,
            _responder_dir: responder_dir,
        })
    }

    /// Start both nodes' discovery and transport.
    ///
    /// # Errors
    ///
    /// Returns [`archipel_core::NodeError`] if either node fails to bind.
    pub async fn start(&self) -> Result<(), archipel_core::NodeError> {
        self.initiator.start().await?;
        self.responder.start().await?;
        Ok(())
    }

    /// This fixture's responder node id.
    #[must_use]
    pub fn responder_id(&self) -> NodeId {
        self.responder.node_id()
    }

    /// This fixture's initiator node id.
    #[must_use]
    pub fn initiator_id(&self) -> NodeId {
        self.initiator.node_id()
    }

    /// Wait until the initiator reports a session established with the
    /// responder (and vice versa), or time out.
    ///
    /// # Panics
    ///
    /// Panics if the wait times out or either event channel closes early.
    pub async fn wait_for_session(&mut self, timeout: Duration) {
        let responder_id = self.responder_id();
        let initiator_id = self.initiator_id();

        tokio::time::timeout(timeout, wait_for_established(&mut self.initiator_events, responder_id))
            .await
            .expect("timed out waiting for the initiator's session to establish");
        tokio::time::timeout(timeout, wait_for_established(&mut self.responder_events, initiator_id))
            .await
            .expect("timed out waiting for the responder's session to establish");
    }

    /// Drain and return every event currently buffered for the initiator,
    /// without blocking.
    pub fn drain_initiator_events(&mut self) -> Vec<NodeEvent> {
        drain(&mut self.initiator_events)
    }

    /// Drain and return every event currently buffered for the responder,
    /// without blocking.
    pub fn drain_responder_events(&mut self) -> Vec<NodeEvent> {
        drain(&mut self.responder_events)
    }

    /// Await the next event on the initiator's event stream, blocking.
    pub async fn next_initiator_event(&mut self) -> Option<NodeEvent> {
        self.initiator_events.recv().await
    }

    /// Await the next event on the responder's event stream, blocking.
    pub async fn next_responder_event(&mut self) -> Option<NodeEvent> {
        self.responder_events.recv().await
    }

    /// Stop both nodes.
    pub async fn cleanup(self) {
        self.initiator.stop().await;
        self.responder.stop().await;
    }
}

async fn wait_for_established(events: &mut mpsc::UnboundedReceiver<NodeEvent>, peer: NodeId) {
    loop {
        match events.recv().await {
            Some(NodeEvent::SessionEstablished(id)) if id == peer => return,
            Some(_) => continue,
            None => panic!("event channel closed before session established"),
        }
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<NodeEvent>) -> Vec<NodeEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_allocates_distinct_discovery_groups() {
        let fixture1 = TwoNodeFixture::new().await.unwrap();
        let fixture2 = TwoNodeFixture::new().await.unwrap();
        assert_ne!(fixture1.initiator_id(), fixture2.initiator_id());
        fixture1.cleanup().await;
        fixture2.cleanup().await;
    }

    #[tokio::test]
    async fn fixture_establishes_a_session_both_ways() {
        let mut fixture = TwoNodeFixture::new().await.unwrap();
        fixture.start().await.unwrap();
        fixture.wait_for_session(Duration::from_secs(5)).await;
        fixture.cleanup().await;
    }
}
