//! braid daemon: runs one gossip node from a peer-table file.

use anyhow::Context;
use braid_network::TcpTransport;
use braid_node::{
    init_logging, BraidNode, LogFormat, NodeConfig, NodeIdentity, NodePorts, NoopPeerTable,
    PeerTableSink, TomlPeerTable,
};
use braid_types::{PeerAddress, PeerId, SystemClock};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Time allowed for GOODBYE and the mempool handoff to leave the outbox.
const DEPARTURE_GRACE: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Normal,
    Malicious,
}

#[derive(Parser)]
#[command(name = "braid-daemon", about = "braid gossip node daemon")]
struct Cli {
    /// Peer id of this node; conventionally its listening port.
    #[arg(long, env = "BRAID_ID")]
    id: String,

    /// Path to the TOML peer table. Newly discovered peers are written back.
    #[arg(long, env = "BRAID_CONFIG")]
    config: Option<PathBuf>,

    /// Gossip fanout.
    #[arg(long, env = "BRAID_FANOUT")]
    fanout: Option<usize>,

    /// `malicious` stamps generated blocks with forged ids.
    #[arg(long, value_enum, env = "BRAID_MODE")]
    mode: Option<Mode>,

    /// Only reachable through a relay.
    #[arg(long, env = "BRAID_NAT")]
    nat: bool,

    /// Store headers only and skip transaction gossip.
    #[arg(long, env = "BRAID_LIGHT")]
    light: bool,

    /// Listen address.
    #[arg(long, env = "BRAID_IP")]
    ip: Option<String>,

    /// Listen port.
    #[arg(long, env = "BRAID_PORT")]
    port: Option<u16>,

    /// Log output: "human" or "json".
    #[arg(long, env = "BRAID_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log filter, e.g. "info" or "debug,braid_network=trace".
    #[arg(long, env = "BRAID_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of the identity read from the file.
    fn apply(&self, identity: &mut NodeIdentity) {
        if let Some(fanout) = self.fanout {
            identity.fanout = fanout;
        }
        if let Some(mode) = self.mode {
            identity.malicious = mode == Mode::Malicious;
        }
        identity.flags.nat |= self.nat;
        identity.flags.light |= self.light;
        if self.ip.is_some() || self.port.is_some() {
            identity.address = PeerAddress::new(
                self.ip.clone().unwrap_or_else(|| identity.address.ip.clone()),
                self.port.unwrap_or(identity.address.port),
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => NodeConfig::default(),
    };
    if let Some(format) = &cli.log_format {
        config.log_format = format.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    let format: LogFormat = config.log_format.parse()?;
    init_logging(format, &config.log_level)?;

    let id = PeerId::from(cli.id.as_str());
    let mut identity = NodeIdentity::from_config(&config, &id)?;
    cli.apply(&mut identity);

    let peer_table: Arc<dyn PeerTableSink> = match &cli.config {
        Some(path) => Arc::new(TomlPeerTable::new(path)),
        None => Arc::new(NoopPeerTable),
    };
    let ports = NodePorts {
        clock: Arc::new(SystemClock),
        transport: Arc::new(TcpTransport::default()),
        peer_table,
    };

    tracing::info!(
        id = %identity.id,
        address = %identity.address,
        nat = identity.flags.nat,
        light = identity.flags.light,
        malicious = identity.malicious,
        new_node = identity.new_node,
        fanout = identity.fanout,
        "starting braid node"
    );
    let mut node = BraidNode::with_ports(config, identity, ports)?;
    let bound = node.start().await?;
    tracing::info!(%bound, "listening");

    node.shutdown_controller().wait_for_signal().await;
    tracing::info!("shutdown signal received");
    node.stop(DEPARTURE_GRACE).await;

    tracing::info!("braid daemon exited cleanly");
    Ok(())
}
