//! On-disk CLI configuration: loaded from an optional TOML file, overridden
//! by CLI flags, falling back to [`archipel_core::NodeConfig`]'s documented
//! defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use archipel_core::NodeConfig;
use archipel_discovery::DiscoveryConfig;
use serde::{Deserialize, Serialize};

/// The CLI's persisted configuration shape. Every field is optional so a
/// partial file only overrides what it mentions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Directory holding the identity file and SQLite database.
    pub data_dir: Option<PathBuf>,
    /// Directory of files this node offers to peers.
    pub shared_dir: Option<PathBuf>,
    /// Directory completed downloads are assembled into.
    pub downloads_dir: Option<PathBuf>,
    /// Preferred session-transport TCP port.
    pub listen_port: Option<u16>,
    /// Multicast discovery group address.
    pub discovery_group: Option<String>,
    /// Multicast discovery port.
    pub discovery_port: Option<u16>,
    /// `tracing` env-filter directive, e.g. `"info"` or `"debug"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CliConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load from the default path, or fall back to defaults if it doesn't
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Where the CLI looks for its config file absent an explicit
    /// `--config` flag.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("archipel/config.toml")
    }

    /// Where the node's identity and database live absent an explicit
    /// `data_dir`.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("archipel")
    }

    /// Build the real node configuration this CLI config describes,
    /// layering onto [`NodeConfig::default`].
    #[must_use]
    pub fn to_node_config(&self, identity_passphrase: Option<Vec<u8>>) -> NodeConfig {
        let mut config = NodeConfig::default();

        let data_dir = self.data_dir.clone().unwrap_or_else(Self::default_data_dir);
        config.shared_dir = self.shared_dir.clone().unwrap_or_else(|| data_dir.join("shared"));
        config.downloads_dir = self.downloads_dir.clone().unwrap_or_else(|| data_dir.join("downloads"));
        config.data_dir = data_dir;

        if let Some(port) = self.listen_port {
            config.listen_port = port;
        }

        let mut discovery = DiscoveryConfig::default();
        if let Some(group) = &self.discovery_group {
            if let Ok(parsed) = group.parse() {
                discovery.group = parsed;
            }
        }
        if let Some(port) = self.discovery_port {
            discovery.port = port;
        }
        config.discovery = discovery;

        config.identity_passphrase = identity_passphrase;
        config
    }
}

/// Parse a `tracing` env-filter directive, defaulting to `"info"` on an
/// empty string.
#[must_use]
pub fn log_filter(verbose: bool, configured: &str) -> String {
    if verbose {
        "debug".to_string()
    } else if configured.is_empty() {
        "info".to_string()
    } else {
        configured.to_string()
    }
}

/// Shorthand for the discovery timing fields a CLI config cannot (yet)
/// override; kept here so future flags have a documented home.
#[must_use]
pub fn default_handshake_timeout() -> Duration {
    NodeConfig::default().handshake_timeout
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_a_usable_node_config() {
        let config = CliConfig::default();
        let node_config = config.to_node_config(None);
        assert_eq!(node_config.listen_port, NodeConfig::default().listen_port);
        assert!(node_config.identity_passphrase.is_none());
    }

    #[test]
    fn listen_port_override_is_applied() {
        let mut config = CliConfig::default();
        config.listen_port = Some(9999);
        let node_config = config.to_node_config(None);
        assert_eq!(node_config.listen_port, 9999);
    }

    #[test]
    fn toml_round_trips() {
        let config = CliConfig {
            data_dir: Some(PathBuf::from("/tmp/archipel-test")),
            listen_port: Some(7778),
            log_level: "debug".into(),
            ..CliConfig::default()
        };
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: CliConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.listen_port, config.listen_port);
    }
}
