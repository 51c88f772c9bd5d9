//! # ARCHIPEL Transport
//!
//! The reliable byte-stream session transport: a TCP listener with
//! bind-conflict retry, an outbound connector with a 5 s timeout, and a
//! per-peer frame reassembler and socket registry. Has no knowledge of
//! handshakes, messaging, or file transfer semantics — it only moves
//! authenticated frames in and out and reports connection lifecycle events.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod reassembly;
pub mod session;

pub use error::{TransportError, TransportResult};
pub use reassembly::FrameReassembler;
pub use session::{InboundFrame, MacKeyResolver, SessionTransport, TransportEvent};
