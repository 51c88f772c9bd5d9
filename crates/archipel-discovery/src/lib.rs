//! # ARCHIPEL Discovery
//!
//! Multicast UDP peer discovery. Joins a fixed well-known group, announces
//! this node's presence on a timer, and reports observed announcements and
//! pruning ticks to the core layer over a channel. Holds no peer table of
//! its own.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod event;
pub mod service;

pub use config::DiscoveryConfig;
pub use error::DiscoveryError;
pub use event::{AnnouncedPeer, DiscoveryEvent};
pub use service::{AnnounceSource, DiscoveryHandle, bind_multicast_socket, start, unix_timestamp};
