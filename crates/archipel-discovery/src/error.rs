//! Error types for multicast discovery.

use thiserror::Error;

/// Errors raised while setting up or running discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Joining or binding the multicast socket failed.
    #[error("multicast socket error: {0}")]
    Socket(#[from] std::io::Error),
}
