mod config;
mod error;
mod genesis;
mod server;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use cryptonote_chain::{AddBlockResult, BlockchainCache};
use cryptonote_p2p::{NodeCore, ProtocolHandler};
use cryptonote_pool::TransactionPool;
use cryptonote_serial::io::Encode;
use cryptonote_store::{Store, StoreConfig};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::NodeConfig;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "cryptonote-node")]
#[command(about = "CryptoNote-family blockchain daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon: opens the chain store, applies genesis if
    /// needed, and serves the P2P protocol.
    Start {
        /// Directory holding the node's embedded database.
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// TCP port to listen for peer connections on.
        #[arg(long)]
        p2p_port: Option<u16>,
        /// Optional TOML config file layered under CLI flags.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Log level (trace, debug, info, warn, error).
        #[arg(long)]
        log_level: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Start { data_dir, p2p_port, config, log_level } => {
            start(data_dir, p2p_port, config.as_deref(), log_level).await
        }
    }
}

async fn start(
    data_dir: Option<PathBuf>,
    p2p_port: Option<u16>,
    config_path: Option<&std::path::Path>,
    log_level: Option<String>,
) -> Result<()> {
    let mut node_config = NodeConfig::load(config_path)?;
    if let Some(data_dir) = data_dir {
        node_config.data_dir = data_dir;
    }
    if let Some(p2p_port) = p2p_port {
        node_config.p2p_port = p2p_port;
    }
    if let Some(log_level) = log_level {
        node_config.log_level = log_level;
    }

    let level = node_config.log_level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    info!(data_dir = %node_config.data_dir.display(), "starting node");

    let store_config = StoreConfig::new(node_config.data_dir.clone());
    let store = Store::open(store_config)?;
    let mut chain = BlockchainCache::new(store);

    if chain.top_index().is_none() {
        let genesis = genesis::genesis_block();
        let raw_block = genesis.encode_to_vec();
        match chain.add_raw_block(raw_block, Vec::new())? {
            AddBlockResult::Added => info!("applied genesis block"),
            other => tracing::warn!(?other, "unexpected result applying genesis block"),
        }
    } else {
        info!(height = chain.top_index().map_or(0, |h| h + 1), "resuming existing chain");
    }

    let chain = Arc::new(Mutex::new(chain));
    let pool = Arc::new(TransactionPool::new());
    let core = Arc::new(NodeCore::new(chain, pool));
    let handler = Arc::new(ProtocolHandler::new(core, rand::random(), env!("CARGO_PKG_VERSION").to_string()));

    let listen_addr = node_config.p2p_listen_addr();
    let listener = TcpListener::bind(&listen_addr).await?;
    info!(%listen_addr, "listening for peers");

    server::run(listener, handler).await
}
