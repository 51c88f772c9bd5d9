//! # ARCHIPEL Core
//!
//! Central node orchestration for ARCHIPEL, a LAN peer-to-peer messaging and
//! file-transfer protocol built on multicast discovery, a TOFU trust model,
//! and an authenticated-handshake session layer.
//!
//! This crate provides:
//! - **Node API**: the single entry point wiring discovery, transport,
//!   storage, crypto, and file transfer together
//! - **Handshake**: the two-leg ephemeral+static X25519 key agreement that
//!   derives per-peer session keys
//! - **Peer table**: the in-memory view of every peer seen this run
//! - **Messaging**: direct send, opportunistic relay fallback, and broadcast
//! - **Transfer**: chunked file download/upload orchestration
//! - **Dispatch**: the central frame-type router tying all of the above
//!   together around one inbound frame stream
//!
//! ## Quick Start
//!
//! ```no_run
//! use archipel_core::{Node, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = Node::new_random(NodeConfig::default()).await?;
//!     node.start().await?;
//!
//!     let peers = node.peers();
//!     if let Some(peer) = peers.first() {
//!         node.send(peer.node_id, "hello").await?;
//!     }
//!
//!     node.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Node (Orchestration)                        │
//! ├───────────────┬───────────────┬───────────────┬─────────────────┤
//! │  discovery     │  handshake    │  messaging    │  transfer        │
//! │  (multicast)   │  (X25519 DH)  │  (chat/relay) │  (chunked files) │
//! ├───────────────┴───────────────┴───────────────┴─────────────────┤
//! │                  dispatch (central frame router)                 │
//! ├────────────────────────────────────────────────────────────────-┤
//! │            transport (TCP sessions) · proto (wire frames)         │
//! ├────────────────────────────────────────────────────────────────-┤
//! │              store (SQLite) · crypto (Ed25519/X25519/AEAD)       │
//! └────────────────────────────────────────────────────────────────-┘
//! ```
//!
//! ## Module Structure
//!
//! - [`node`]: the `Node` handle applications construct and drive
//! - [`dispatch`]: the central inbound-frame router
//! - [`handshake`]: session-key agreement and its pending-response tracking
//! - [`messaging`]: chat send/receive, relay fallback, broadcast
//! - [`transfer`]: chunked download/upload orchestration
//! - [`peer`]: the in-memory peer table
//! - [`config`]: node-wide tunables
//! - [`events`]: the application-facing event stream
//! - [`error`]: the node-wide error type
//! - [`wire`]: small hex-decoding helpers shared across modules

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handshake;
pub mod messaging;
pub mod node;
pub mod peer;
pub mod transfer;
pub mod wire;

pub use config::NodeConfig;
pub use error::NodeError;
pub use events::NodeEvent;
pub use messaging::SendOutcome;
pub use node::Node;
pub use peer::{PeerEntry, PeerTable};
