//! Binding between the handshake driver and the cryptographic engine.
//!
//! The driver only sees the [`HandshakeEngine`] trait: "what should happen
//! next" plus the primitive operations that make it happen. [`SnowHandshake`]
//! implements it on top of `snow::HandshakeState`.

use snow::params::CipherChoice;
use snow::HandshakeState;

use crate::channel::{CipherSession, MAX_NOISE_MESSAGE_SIZE};
use crate::config::Role;
use crate::error::{ChannelError, Result};

/// The next step a handshake state requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// A handshake message must be written to the peer.
    WriteMessage,
    /// A handshake message must be read from the peer.
    ReadMessage,
    /// The handshake is complete and the state can be split.
    Split,
    /// The engine rejected an exchanged message; the handshake cannot continue.
    Failed,
}

/// Capabilities the handshake driver needs from a handshake state.
pub trait HandshakeEngine {
    /// Returns what the handshake needs next.
    fn action(&self) -> Action;

    /// Produces the next outgoing handshake message.
    fn write_message(&mut self) -> Result<Vec<u8>>;

    /// Consumes an incoming handshake message.
    fn read_message(&mut self, message: &[u8]) -> Result<()>;

    /// Derives the `(send, receive)` cipher sessions for the local role.
    ///
    /// Succeeds at most once per handshake state.
    fn split(&mut self) -> Result<(CipherSession, CipherSession)>;

    /// The peer's static public key, if known.
    fn remote_public_key(&self) -> Option<Vec<u8>>;

    /// The handshake transcript hash.
    fn handshake_hash(&self) -> Vec<u8>;
}

/// [`HandshakeEngine`] backed by `snow`.
pub struct SnowHandshake {
    state: HandshakeState,
    cipher: CipherChoice,
    failed: bool,
    split: bool,
    buffer: Vec<u8>,
}

impl SnowHandshake {
    /// Wraps an initialized snow handshake state.
    pub fn new(state: HandshakeState, cipher: CipherChoice) -> Self {
        Self {
            state,
            cipher,
            failed: false,
            split: false,
            buffer: vec![0u8; MAX_NOISE_MESSAGE_SIZE],
        }
    }

    /// Role this state was built for.
    pub fn role(&self) -> Role {
        if self.state.is_initiator() {
            Role::Initiator
        } else {
            Role::Responder
        }
    }

    fn fail(&mut self, err: snow::Error) -> ChannelError {
        self.failed = true;
        ChannelError::HandshakeActionFailed(err.to_string())
    }
}

impl HandshakeEngine for SnowHandshake {
    fn action(&self) -> Action {
        if self.failed {
            Action::Failed
        } else if self.state.is_handshake_finished() {
            Action::Split
        } else if self.state.is_my_turn() {
            Action::WriteMessage
        } else {
            Action::ReadMessage
        }
    }

    fn write_message(&mut self) -> Result<Vec<u8>> {
        match self.state.write_message(&[], &mut self.buffer) {
            Ok(len) => Ok(self.buffer[..len].to_vec()),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn read_message(&mut self, message: &[u8]) -> Result<()> {
        // Handshake payloads are not used; the returned length is ignored.
        match self.state.read_message(message, &mut self.buffer) {
            Ok(_) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn split(&mut self) -> Result<(CipherSession, CipherSession)> {
        if self.split {
            return Err(ChannelError::SplitAlreadyPerformed);
        }
        if self.action() != Action::Split {
            return Err(ChannelError::HandshakeActionFailed(
                "split requested before the handshake finished".to_string(),
            ));
        }

        // Raw split yields (initiator -> responder, responder -> initiator).
        let (initiator_key, responder_key) = self.state.dangerously_get_raw_split();
        self.split = true;

        let (send_key, receive_key) = match self.role() {
            Role::Initiator => (initiator_key, responder_key),
            Role::Responder => (responder_key, initiator_key),
        };

        Ok((
            CipherSession::new(self.cipher, &send_key)?,
            CipherSession::new(self.cipher, &receive_key)?,
        ))
    }

    fn remote_public_key(&self) -> Option<Vec<u8>> {
        self.state.get_remote_static().map(<[u8]>::to_vec)
    }

    fn handshake_hash(&self) -> Vec<u8> {
        self.state.get_handshake_hash().to_vec()
    }
}

impl std::fmt::Debug for SnowHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowHandshake")
            .field("role", &self.role())
            .field("action", &self.action())
            .field("cipher", &self.cipher)
            .finish()
    }
}
