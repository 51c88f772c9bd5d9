//! ARCHIPEL CLI
//!
//! A thin `clap` translator over [`archipel_core::Node`]. Carries no
//! protocol logic of its own: every command starts a node, drives its
//! public API, and relays [`archipel_core::NodeEvent`]s to the terminal.

mod config;
mod progress;

use std::path::PathBuf;
use std::time::Duration;

use archipel_core::{Node, NodeEvent};
use clap::{Parser, Subcommand};
use config::CliConfig;
use console::style;
use progress::format_bytes;

/// ARCHIPEL - LAN-only peer-to-peer messaging and file transfer
#[derive(Parser)]
#[command(name = "archipel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Prompt for a passphrase and encrypt the identity file at rest
    #[arg(long)]
    encrypt_identity: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node in the foreground until interrupted, logging peer and
    /// transfer activity.
    Run,

    /// Send a chat message to a peer, waiting for it to be discovered.
    Send {
        /// Recipient's hex-encoded node id
        node_id: String,
        /// Message content
        message: String,
        /// Seconds to wait for discovery before giving up
        #[arg(long, default_value_t = 30)]
        wait: u64,
    },

    /// Broadcast a chat message to every peer discovered within the wait
    /// window.
    Broadcast {
        /// Message content
        message: String,
        /// Seconds to wait for discovery before sending
        #[arg(long, default_value_t = 10)]
        wait: u64,
    },

    /// Share a local file, optionally offering it directly to a peer.
    Share {
        /// File to share
        file: PathBuf,
        /// Recipient's hex-encoded node id to offer the manifest to
        #[arg(long)]
        to: Option<String>,
        /// Seconds to wait for the recipient to be discovered
        #[arg(long, default_value_t = 30)]
        wait: u64,
    },

    /// List peers discovered within the wait window.
    Peers {
        /// Seconds to listen for discovery before printing results
        #[arg(long, default_value_t = 10)]
        wait: u64,
    },

    /// Print this node's identity.
    Whoami,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cli_config = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::load_or_default()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(config::log_filter(cli.verbose, &cli_config.log_level))
        .init();

    let passphrase = if cli.encrypt_identity {
        Some(rpassword::prompt_password("Identity passphrase: ")?.into_bytes())
    } else {
        None
    };
    let node_config = cli_config.to_node_config(passphrase);

    match cli.command {
        Commands::Run => run(node_config).await,
        Commands::Send { node_id, message, wait } => send(node_config, &node_id, &message, wait).await,
        Commands::Broadcast { message, wait } => broadcast(node_config, &message, wait).await,
        Commands::Share { file, to, wait } => share(node_config, file, to, wait).await,
        Commands::Peers { wait } => peers(node_config, wait).await,
        Commands::Whoami => whoami(node_config).await,
    }
}

async fn whoami(node_config: archipel_core::NodeConfig) -> anyhow::Result<()> {
    let node = Node::new(node_config).await?;
    println!("{}", archipel_crypto::node_id_hex(&node.node_id()));
    Ok(())
}

async fn run(node_config: archipel_core::NodeConfig) -> anyhow::Result<()> {
    let node = Node::new(node_config).await?;
    println!("node id: {}", style(archipel_crypto::node_id_hex(&node.node_id())).green());

    let mut events = node.events().expect("events receiver taken exactly once");
    node.start().await?;
    println!("listening for peers, press Ctrl+C to stop");

    let log_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    tokio::signal::ctrl_c().await?;
    log_task.abort();
    node.stop().await;
    println!("\nstopped");
    Ok(())
}

async fn send(node_config: archipel_core::NodeConfig, node_id_hex: &str, message: &str, wait_secs: u64) -> anyhow::Result<()> {
    let node = Node::new(node_config).await?;
    node.start().await?;

    let target = decode_node_id(node_id_hex)?;
    wait_for_peer(&node, &target, Duration::from_secs(wait_secs)).await?;

    let outcome = node.send(target, message).await?;
    let summary = match (outcome.relayed, outcome.encrypted) {
        (true, _) => "message relayed (peer unreachable directly)".to_string(),
        (false, true) => "message sent (encrypted)".to_string(),
        (false, false) => "message sent (unencrypted)".to_string(),
    };
    println!("{}", style(summary).green());

    node.stop().await;
    Ok(())
}

async fn broadcast(node_config: archipel_core::NodeConfig, message: &str, wait_secs: u64) -> anyhow::Result<()> {
    let node = Node::new(node_config).await?;
    node.start().await?;

    tokio::time::sleep(Duration::from_secs(wait_secs)).await;
    node.broadcast(message).await?;
    println!("{}", style(format!("broadcast sent to {} peers", node.peers().len())).green());

    node.stop().await;
    Ok(())
}

async fn share(node_config: archipel_core::NodeConfig, file: PathBuf, to: Option<String>, wait_secs: u64) -> anyhow::Result<()> {
    let node = Node::new(node_config).await?;
    node.start().await?;

    let file_name = file.file_name().and_then(|n| n.to_str()).unwrap_or("unknown").to_string();
    let manifest = node.share_file(&file).await?;
    println!(
        "sharing {} ({}), file id {}",
        file_name,
        format_bytes(manifest.file_size),
        hex::encode(manifest.file_id)
    );

    if let Some(node_id_hex) = to {
        let target = decode_node_id(&node_id_hex)?;
        wait_for_peer(&node, &target, Duration::from_secs(wait_secs)).await?;
        node.offer_file(target, manifest.file_id).await?;
        println!("{}", style(format!("offered to {node_id_hex}")).green());
    }

    node.stop().await;
    Ok(())
}

async fn peers(node_config: archipel_core::NodeConfig, wait_secs: u64) -> anyhow::Result<()> {
    let node = Node::new(node_config).await?;
    node.start().await?;

    tokio::time::sleep(Duration::from_secs(wait_secs)).await;

    let peers = node.peers();
    if peers.is_empty() {
        println!("no peers discovered");
    } else {
        for peer in &peers {
            println!(
                "{}  {}  reputation={}  files={}",
                archipel_crypto::node_id_hex(&peer.node_id),
                peer.address,
                peer.reputation,
                peer.shared_files.len()
            );
        }
    }

    node.stop().await;
    Ok(())
}

async fn wait_for_peer(node: &Node, target: &archipel_crypto::NodeId, timeout: Duration) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if node.peers().iter().any(|p| &p.node_id == target) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timed out waiting to discover peer {}", hex::encode(target));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

fn decode_node_id(hex_str: &str) -> anyhow::Result<archipel_crypto::NodeId> {
    let bytes = hex::decode(hex_str)?;
    bytes.try_into().map_err(|_| anyhow::anyhow!("node id must be 32 bytes (64 hex characters)"))
}

fn log_event(event: &NodeEvent) {
    match event {
        NodeEvent::PeerDiscovered(node_id) => {
            println!("{} peer discovered: {}", style("+").green(), archipel_crypto::node_id_hex(node_id));
        }
        NodeEvent::PeerLost(node_id) => {
            println!("{} peer lost: {}", style("-").red(), archipel_crypto::node_id_hex(node_id));
        }
        NodeEvent::SessionEstablished(node_id) => {
            println!("{} session established with {}", style("*").cyan(), archipel_crypto::node_id_hex(node_id));
        }
        NodeEvent::MessageReceived { from, content } => {
            println!("{} {}: {}", style("<").yellow(), archipel_crypto::node_id_hex(from), content);
        }
        NodeEvent::ManifestReceived { from, file_id, file_name } => {
            println!(
                "{} {} offered {} (file id {})",
                style("#").magenta(),
                archipel_crypto::node_id_hex(from),
                file_name,
                hex::encode(file_id)
            );
        }
        NodeEvent::TransferProgress { file_id, received_chunks, total_chunks } => {
            println!("  transfer {} : {}/{} chunks", hex::encode(file_id), received_chunks, total_chunks);
        }
        NodeEvent::TransferComplete { file_id, path } => {
            println!("{} transfer {} complete -> {}", style("=").green(), hex::encode(file_id), path.display());
        }
        NodeEvent::TransferFailed { file_id, reason } => {
            println!("{} transfer {} failed: {}", style("!").red(), hex::encode(file_id), reason);
        }
        NodeEvent::TrustChanged { node_id, status } => {
            println!("  trust for {} is now {:?}", archipel_crypto::node_id_hex(node_id), status);
        }
    }
}
