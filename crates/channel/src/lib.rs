//! # Noise Channel
//!
//! Drives a Noise Protocol Framework handshake over an ordered message
//! stream and yields an authenticated, encrypted channel.
//!
//! ## Overview
//!
//! - **Configuration**: Resolve a protocol name, keys, prologue and PSK into a [`Session`]
//! - **Handshake Driver**: Act on the engine's next action for every stream event
//! - **Secure Channel**: Per-direction AEAD sessions with bound associated data
//! - **Key Generation**: Static key pairs for the supported curves
//! - **Framing**: 2-byte length-prefixed messages over any byte stream
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Application Messages          │
//! ├─────────────────────────────────────────┤
//! │       SecureChannel (AEAD + AD)         │  ChaChaPoly / AESGCM
//! ├─────────────────────────────────────────┤
//! │  HandshakeDriver ── HandshakeEngine     │  snow
//! ├─────────────────────────────────────────┤
//! │     Framing (u16 length prefix)         │
//! ├─────────────────────────────────────────┤
//! │        Transport (TCP, pipes)           │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use noise_channel::{create_session, framed, HandshakeOptions, KeyPair, SessionConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> noise_channel::Result<()> {
//! let server_keys = KeyPair::generate()?;
//! let client_keys = KeyPair::generate()?;
//!
//! let responder = create_session(SessionConfig::new(server_keys.clone()))?;
//! let initiator = create_session(
//!     SessionConfig::new(client_keys).initiator(server_keys.public_key.clone()),
//! )?;
//!
//! let (a, b) = tokio::io::duplex(4096);
//! let (mut client_io, mut server_io) = (framed(a), framed(b));
//!
//! let (client, server) = tokio::join!(
//!     initiator.handshake(&mut client_io, HandshakeOptions::default()),
//!     responder.handshake(&mut server_io, HandshakeOptions::default()),
//! );
//! let (mut client, mut server) = (client?, server?);
//!
//! let ciphertext = client.encrypt(b"initiator message 0")?;
//! assert_eq!(server.decrypt(&ciphertext)?, b"initiator message 0");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Protocol names, session configuration, session creation
//! - [`handshake`]: Event-driven handshake driver and async runner
//! - [`engine`]: Engine trait and the snow-backed implementation
//! - [`channel`]: Cipher sessions and the established channel
//! - [`keys`]: Key pair generation and serialization
//! - [`stream`]: Message stream trait and framing
//! - [`error`]: Error types

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod keys;
pub mod stream;

pub use channel::{
    CipherSession, ReceiveHalf, SecureChannel, SendHalf, MAX_NOISE_MESSAGE_SIZE,
    MAX_PLAINTEXT_SIZE, TAG_LENGTH,
};
pub use config::{create_session, ProtocolName, Role, Session, SessionConfig};
pub use engine::{Action, HandshakeEngine, SnowHandshake};
pub use error::{ChannelError, Result};
pub use handshake::{
    handshake, Completion, HandshakeDriver, HandshakeOptions, DEFAULT_MAX_HANDSHAKE_OPERATIONS,
};
pub use keys::{generate_keypair, KeyPair, DEFAULT_CURVE};
pub use stream::{framed, MessageStream};
