//! Noise Peer
//!
//! Generates static keys and runs either side of an encrypted demo exchange.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use noise_channel::{generate_keypair, DEFAULT_CURVE};
use noise_peer::config::{default_config_path, Config};
use noise_peer::keyfile::{load_key_pair, load_public_key, save_key_pair};
use noise_peer::peer::Peer;
use tokio::net::TcpListener;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Noise Peer - exchange encrypted messages over a Noise handshake.
#[derive(Parser, Debug)]
#[command(name = "noise-peer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Write a default configuration file
    InitConfig {
        /// Destination (defaults to --config, then the standard config path)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Generate a static key pair and write it as JSON
    Keygen {
        /// Output key file
        #[arg(long, short)]
        output: PathBuf,

        /// DH curve
        #[arg(long, default_value = DEFAULT_CURVE)]
        curve: String,
    },

    /// Accept connections and run the responder side
    Listen {
        /// Local key file
        #[arg(long, short)]
        key: PathBuf,

        /// Address to listen on (defaults to the configured peer.addr)
        #[arg(long)]
        addr: Option<SocketAddr>,
    },

    /// Connect to a listener and run the initiator side
    Connect {
        /// Local key file
        #[arg(long, short)]
        key: PathBuf,

        /// Key file holding the listener's public key
        #[arg(long, short)]
        remote_key: PathBuf,

        /// Address to connect to (defaults to the configured peer.addr)
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// Stop after sending and receiving this many messages
        #[arg(long)]
        count: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => Config::load(config_path)?,
        None => Config::load_default()?,
    };

    // Apply environment variable overrides
    let overrides = config.apply_env_overrides();

    // Validate configuration
    config.validate()?;

    let _guard = init_tracing(&config, cli.verbose)?;
    if let Some(config_path) = &cli.config {
        tracing::info!("Using config file: {:?}", config_path);
    }
    for (setting, value) in &overrides {
        tracing::info!("Overriding {} from environment: {}", setting, value);
    }

    match cli.command {
        Commands::InitConfig { output, force } => {
            let path = output
                .or(cli.config)
                .unwrap_or_else(default_config_path);
            Config::init_file(&path, force)?;
            println!("wrote {}", path.display());
        }
        Commands::Keygen { output, curve } => {
            let key_pair = generate_keypair(&curve)?;
            save_key_pair(&output, &key_pair)?;
            println!("saved {}", output.display());
            println!("public key: {}", key_pair.public_key_hex());
        }
        Commands::Listen { key, addr } => {
            let addr = resolve_addr(addr, &config)?;
            let peer = Peer::from_config(&config, load_key_pair(&key)?, None)?;
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to listen on {addr}"))?;

            tokio::select! {
                result = peer.serve(listener) => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Received shutdown signal"),
            }
        }
        Commands::Connect {
            key,
            remote_key,
            addr,
            count,
        } => {
            let addr = resolve_addr(addr, &config)?;
            let remote = load_public_key(&remote_key)?;
            let mut peer = Peer::from_config(&config, load_key_pair(&key)?, Some(remote))?;
            if let Some(count) = count {
                peer = peer.with_count(count);
            }

            let role = peer.role();
            tokio::select! {
                result = peer.connect(addr, |text| println!("{role} decrypted: {text}")) => {
                    let stats = result?;
                    tracing::info!(sent = stats.sent, received = stats.received, "exchange finished");
                }
                _ = tokio::signal::ctrl_c() => tracing::info!("Received shutdown signal"),
            }
        }
    }

    Ok(())
}

/// Installs the tracing subscriber.
///
/// `--verbose` forces `debug`; otherwise `RUST_LOG` wins over the configured
/// level. The returned guard flushes the log file on drop.
fn init_tracing(config: &Config, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()))
    };

    let Some(path) = &config.logging.file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(Some(guard))
}

fn resolve_addr(addr: Option<SocketAddr>, config: &Config) -> Result<SocketAddr> {
    match addr {
        Some(addr) => Ok(addr),
        None => config
            .peer
            .addr
            .parse()
            .with_context(|| format!("Invalid peer address: {}", config.peer.addr)),
    }
}
