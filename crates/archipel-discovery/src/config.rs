//! Discovery configuration.

use std::net::Ipv4Addr;
use std::time::Duration;

/// Well-known multicast group every ARCHIPEL node joins on the local
/// broadcast domain.
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 42, 99);

/// Well-known multicast port.
pub const DEFAULT_MULTICAST_PORT: u16 = 6000;

/// Multicast TTL for outgoing announcements: large enough to cross any
/// reasonable LAN segment, still bounded to the local network in practice.
pub const MULTICAST_TTL: u32 = 128;

/// Tunable discovery parameters.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Multicast group address.
    pub group: Ipv4Addr,
    /// Multicast port.
    pub port: u16,
    /// Interval between periodic self-announcements.
    pub announce_interval: Duration,
    /// Interval between peer-table pruning sweeps.
    pub prune_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_MULTICAST_GROUP,
            port: DEFAULT_MULTICAST_PORT,
            announce_interval: Duration::from_secs(30),
            prune_interval: Duration::from_secs(30),
        }
    }
}
