//! Listen / connect loops.
//!
//! A [`Peer`] runs one handshake per connection and then exchanges numbered
//! demo messages (`"<role> message N"`) over the established channel,
//! handing every decrypted message to a callback.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use noise_channel::{
    create_session, framed, HandshakeOptions, KeyPair, MessageStream, Role, SecureChannel,
    SessionConfig,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::MissedTickBehavior;

use crate::config::{Config, ConfigError};

/// How demo messages are exchanged after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeSettings {
    /// Delay between outgoing messages.
    pub interval: Duration,

    /// Stop after sending and receiving this many messages. `None` runs
    /// until the peer disconnects.
    pub count: Option<u64>,
}

/// Message counters for one connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeStats {
    /// Messages encrypted and written to the stream.
    pub sent: u64,

    /// Messages read and decrypted.
    pub received: u64,
}

/// One side of the demo exchange.
#[derive(Debug, Clone)]
pub struct Peer {
    session: SessionConfig,
    options: HandshakeOptions,
    exchange: ExchangeSettings,
}

impl Peer {
    /// Creates a peer from an explicit session configuration.
    pub fn new(session: SessionConfig, options: HandshakeOptions, exchange: ExchangeSettings) -> Self {
        Self {
            session,
            options,
            exchange,
        }
    }

    /// Builds a peer from the configuration file settings.
    ///
    /// With a `remote_public_key` the peer acts as initiator.
    pub fn from_config(
        config: &Config,
        key_pair: KeyPair,
        remote_public_key: Option<Vec<u8>>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.session_config(key_pair, remote_public_key)?,
            config.handshake_options(),
            ExchangeSettings {
                interval: config.interval(),
                count: None,
            },
        ))
    }

    /// Limits the exchange to `count` messages in each direction.
    pub fn with_count(mut self, count: u64) -> Self {
        self.exchange.count = Some(count);
        self
    }

    /// Handshake role, set by whether a remote key was configured.
    pub fn role(&self) -> Role {
        self.session.mode
    }

    /// Runs the handshake over `stream`, then the message exchange.
    pub async fn run<S, F>(&self, mut stream: S, on_message: F) -> Result<ExchangeStats>
    where
        S: MessageStream,
        F: FnMut(&str),
    {
        let session = create_session(self.session.clone()).context("Failed to create session")?;
        tracing::info!(protocol = %session.protocol(), role = %self.role(), "starting handshake");

        let mut channel = session
            .handshake(&mut stream, self.options)
            .await
            .context("Handshake failed")?;

        tracing::info!(
            remote = %channel.remote_public_key().map(hex::encode).unwrap_or_default(),
            hash = %hex::encode(channel.handshake_hash()),
            "{} handshake success",
            self.role()
        );

        exchange(&mut channel, &mut stream, self.role(), &self.exchange, on_message).await
    }

    /// Connects to `addr` and runs the exchange.
    pub async fn connect<F>(&self, addr: SocketAddr, on_message: F) -> Result<ExchangeStats>
    where
        F: FnMut(&str),
    {
        let socket = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to connect to {addr}"))?;
        tracing::info!("{} connected to {}", self.role(), addr);

        self.run(framed(socket), on_message).await
    }

    /// Accepts connections forever, running each on its own task.
    ///
    /// Per-connection failures are logged and do not stop the listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("Failed to read listener address")?;
        tracing::info!("{} listening on {}", self.role(), local);

        loop {
            let (socket, remote) = listener
                .accept()
                .await
                .context("Failed to accept connection")?;
            tracing::info!("accepted connection from {}", remote);

            let peer = self.clone();
            tokio::spawn(async move {
                let role = peer.role();
                let result = peer
                    .run(framed(socket), |text| println!("{role} decrypted: {text}"))
                    .await;
                match result {
                    Ok(stats) => tracing::info!(
                        sent = stats.sent,
                        received = stats.received,
                        "connection from {} finished",
                        remote
                    ),
                    Err(err) => tracing::warn!("connection from {} failed: {:#}", remote, err),
                }
            });
        }
    }
}

/// Sends a numbered message every interval while decrypting whatever the
/// peer sends.
///
/// Returns when the configured count is reached in both directions or the
/// peer closes the stream. Once `count` messages have arrived, further
/// frames are left unread until sending finishes.
pub async fn exchange<S, F>(
    channel: &mut SecureChannel,
    stream: &mut S,
    role: Role,
    settings: &ExchangeSettings,
    mut on_message: F,
) -> Result<ExchangeStats>
where
    S: MessageStream,
    F: FnMut(&str),
{
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats = ExchangeStats::default();

    loop {
        let sending = settings.count.map_or(true, |count| stats.sent < count);
        let receiving = settings.count.map_or(true, |count| stats.received < count);
        if !sending && !receiving {
            break;
        }

        tokio::select! {
            _ = ticker.tick(), if sending => {
                let text = format!("{role} message {}", stats.sent);
                let ciphertext = channel.encrypt(text.as_bytes())?;
                stream
                    .send(Bytes::from(ciphertext))
                    .await
                    .context("Failed to send message")?;
                tracing::debug!(counter = stats.sent, "sent message");
                stats.sent += 1;
            }
            frame = stream.next(), if receiving => match frame {
                Some(frame) => {
                    let frame = frame.context("Failed to read message")?;
                    let plaintext = channel.decrypt(&frame)?;
                    on_message(&String::from_utf8_lossy(&plaintext));
                    stats.received += 1;
                }
                None => {
                    tracing::info!("peer closed the connection");
                    break;
                }
            },
        }
    }

    Ok(stats)
}
