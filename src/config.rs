use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::blockchain::storage::validate_peer_id;

/// Errors in the command line configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Please specify a node ID using --NODE_ID flag")]
    MissingNodeId,

    #[error("Invalid node ID {0:?}")]
    InvalidNodeId(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// How mined blocks reach other peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Write directly into each peer's replication file
    Local,
    /// POST to each peer's /sync endpoint
    Http,
}

#[derive(Parser, Debug)]
#[command(name = "ledger_relay")]
#[command(about = "Replicated append-only ledger node")]
pub struct Args {
    /// Id of this node; enables the mining loop
    #[arg(long = "NODE_ID", env = "NODE_ID")]
    pub node_id: Option<String>,

    /// Serve the HTTP API
    #[arg(long = "HTTP")]
    pub http: bool,

    /// HTTP bind address
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// HTTP bind port
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Shared node registry file
    #[arg(long, default_value = "nodes.json")]
    pub nodes_file: PathBuf,

    /// Directory of per-peer block logs
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Seconds between mined blocks
    #[arg(long, default_value_t = 5)]
    pub interval_secs: u64,

    /// Block propagation transport
    #[arg(long, value_enum, default_value = "local")]
    pub transport: TransportKind,

    /// Port peers serve /sync on
    #[arg(long, default_value_t = 8080)]
    pub peer_port: u16,

    /// Seconds before a peer delivery is abandoned
    #[arg(long, default_value_t = 5)]
    pub peer_timeout_secs: u64,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: Option<String>,
    pub serve_http: bool,
    pub host: String,
    pub port: u16,
    pub nodes_file: PathBuf,
    pub data_dir: PathBuf,
    pub mining_interval: Duration,
    pub transport: TransportKind,
    pub peer_port: u16,
    pub peer_timeout: Duration,
}

impl NodeConfig {
    /// Whether the background mining loop runs
    pub fn runs_miner(&self) -> bool {
        self.node_id.is_some()
    }
}

impl TryFrom<Args> for NodeConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let node_id = args.node_id.filter(|id| !id.trim().is_empty());

        match &node_id {
            Some(id) => {
                validate_peer_id(id).map_err(|_| ConfigError::InvalidNodeId(id.clone()))?;
            }
            None if !args.http => return Err(ConfigError::MissingNodeId),
            None => {}
        }

        if args.interval_secs == 0 {
            return Err(ConfigError::InvalidValue("--interval-secs must be positive".to_string()));
        }
        if args.peer_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("--peer-timeout-secs must be positive".to_string()));
        }

        Ok(NodeConfig {
            node_id,
            serve_http: args.http || args.transport == TransportKind::Http,
            host: args.host,
            port: args.port,
            nodes_file: args.nodes_file,
            data_dir: args.data_dir,
            mining_interval: Duration::from_secs(args.interval_secs),
            transport: args.transport,
            peer_port: args.peer_port,
            peer_timeout: Duration::from_secs(args.peer_timeout_secs),
        })
    }
}
