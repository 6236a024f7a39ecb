//! # Noise Peer Library
//!
//! Building blocks for the `noise-peer` binary: a two-sided demo that
//! establishes a Noise channel over TCP and exchanges numbered messages.
//!
//! ## Overview
//!
//! - **Configuration**: TOML file with logging, protocol, handshake and peer sections
//! - **Key Files**: JSON key pairs with hex-encoded keys
//! - **Peers**: Listener (responder) and dialer (initiator) loops
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use noise_peer::{Config, Peer};
//! use noise_peer::keyfile::{load_key_pair, load_public_key};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     config.validate()?;
//!
//!     let key_pair = load_key_pair("initiator-keypair.json")?;
//!     let remote = load_public_key("responder-keypair.json")?;
//!
//!     let peer = Peer::from_config(&config, key_pair, Some(remote))?.with_count(5);
//!     let stats = peer
//!         .connect("127.0.0.1:14912".parse()?, |text| println!("decrypted: {text}"))
//!         .await?;
//!     println!("sent {} received {}", stats.sent, stats.received);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading, validation and defaults
//! - [`keyfile`]: Key file loading and saving
//! - [`peer`]: Handshake plus message exchange over TCP

pub mod config;
pub mod keyfile;
pub mod peer;

// Re-export the channel crate for convenience
pub use noise_channel;

pub use config::{Config, ConfigError};
pub use peer::{ExchangeSettings, ExchangeStats, Peer};
