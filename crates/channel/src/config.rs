//! Session configuration and handshake-state construction.
//!
//! A [`SessionConfig`] names the protocol (pattern, curve, cipher, hash), the
//! local role, the keys and the optional prologue/psk. [`create_session`]
//! resolves it into a [`Session`] holding an initialized handshake state,
//! ready to be driven over a stream.

use serde::{Deserialize, Serialize};
use snow::params::{HandshakeModifier, NoiseParams};
use snow::Builder;

use crate::channel::SecureChannel;
use crate::engine::SnowHandshake;
use crate::error::{ChannelError, Result};
use crate::handshake::{self, Completion, HandshakeDriver, HandshakeOptions};
use crate::keys::{key_lengths, KeyPair};
use crate::stream::MessageStream;

/// Default handshake pattern.
pub const DEFAULT_PATTERN: &str = "XK";
/// Default DH curve.
pub const DEFAULT_CURVE: &str = crate::keys::DEFAULT_CURVE;
/// Default AEAD cipher.
pub const DEFAULT_CIPHER: &str = "ChaChaPoly";
/// Default hash function.
pub const DEFAULT_HASH: &str = "BLAKE2b";

/// Role in the Noise handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sends the first handshake message.
    Initiator,
    /// Waits for the initiator's first message.
    #[default]
    Responder,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

/// The algorithm choices that make up a Noise protocol name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolName {
    /// Handshake pattern, including modifiers (e.g. `XK`, `XKpsk3`).
    pub pattern: String,
    /// DH curve identifier.
    pub curve: String,
    /// AEAD cipher name.
    pub cipher: String,
    /// Hash function name.
    pub hash: String,
}

impl Default for ProtocolName {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            curve: DEFAULT_CURVE.to_string(),
            cipher: DEFAULT_CIPHER.to_string(),
            hash: DEFAULT_HASH.to_string(),
        }
    }
}

impl ProtocolName {
    /// Creates a protocol name from its four components.
    pub fn new(
        pattern: impl Into<String>,
        curve: impl Into<String>,
        cipher: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            curve: curve.into(),
            cipher: cipher.into(),
            hash: hash.into(),
        }
    }

    /// Parses the name into engine parameters.
    pub fn params(&self) -> Result<NoiseParams> {
        self.to_string().parse().map_err(|e: snow::Error| {
            ChannelError::Configuration(format!("invalid protocol name {}: {}", self, e))
        })
    }
}

impl std::fmt::Display for ProtocolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Noise_{}_{}_{}_{}",
            self.pattern, self.curve, self.cipher, self.hash
        )
    }
}

/// Everything needed to start one handshake.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Protocol algorithm choices.
    pub protocol: ProtocolName,
    /// Context bytes mixed into the handshake transcript.
    pub prologue: Option<Vec<u8>>,
    /// Pre-shared symmetric key, for `pskN` patterns.
    pub psk: Option<Vec<u8>>,
    /// Local role.
    pub mode: Role,
    /// Local static key pair.
    pub key_pair: KeyPair,
    /// Peer's static public key, required by initiators of patterns like `XK`.
    pub remote_public_key: Option<Vec<u8>>,
    /// Associated data bound to every transport message.
    pub associated_data: Vec<u8>,
}

impl SessionConfig {
    /// Creates a responder configuration with default algorithms.
    pub fn new(key_pair: KeyPair) -> Self {
        Self {
            protocol: ProtocolName::default(),
            prologue: None,
            psk: None,
            mode: Role::default(),
            key_pair,
            remote_public_key: None,
            associated_data: Vec::new(),
        }
    }

    /// Switches to the initiator role, talking to `remote_public_key`.
    pub fn initiator(mut self, remote_public_key: impl Into<Vec<u8>>) -> Self {
        self.mode = Role::Initiator;
        self.remote_public_key = Some(remote_public_key.into());
        self
    }

    /// Sets the protocol algorithm choices.
    pub fn protocol(mut self, protocol: ProtocolName) -> Self {
        self.protocol = protocol;
        self
    }

    /// Sets the prologue.
    pub fn prologue(mut self, prologue: impl Into<Vec<u8>>) -> Self {
        self.prologue = Some(prologue.into());
        self
    }

    /// Sets the pre-shared key.
    pub fn psk(mut self, psk: impl Into<Vec<u8>>) -> Self {
        self.psk = Some(psk.into());
        self
    }

    /// Sets the associated data used by the secure channel.
    pub fn associated_data(mut self, associated_data: impl Into<Vec<u8>>) -> Self {
        self.associated_data = associated_data.into();
        self
    }
}

/// A configured session whose handshake has not started yet.
#[derive(Debug)]
pub struct Session {
    protocol: ProtocolName,
    role: Role,
    engine: SnowHandshake,
    associated_data: Vec<u8>,
}

/// Resolves a configuration into a session with an initialized handshake state.
pub fn create_session(config: SessionConfig) -> Result<Session> {
    let params = config.protocol.params()?;
    let pattern = params.handshake.pattern;
    let initiator = config.mode == Role::Initiator;

    if config.remote_public_key.is_none() && pattern.need_known_remote_pubkey(initiator) {
        return Err(ChannelError::Configuration(format!(
            "remote public key is required for the {} of {}",
            config.mode, config.protocol
        )));
    }

    let (private_len, public_len) = key_lengths(&config.protocol.curve)?;
    let remote_len_ok = config
        .remote_public_key
        .as_ref()
        .map_or(true, |key| key.len() == public_len);
    if config.key_pair.private_key.len() != private_len || !remote_len_ok {
        return Err(ChannelError::Engine(snow::Error::Init(
            snow::error::InitStage::ValidateKeyLengths,
        )));
    }

    let psk_locations: Vec<u8> = params
        .handshake
        .modifiers
        .list
        .iter()
        .filter_map(|modifier| match modifier {
            HandshakeModifier::Psk(location) => Some(*location),
            _ => None,
        })
        .collect();

    match (&config.psk, psk_locations.is_empty()) {
        (Some(_), true) => {
            return Err(ChannelError::Configuration(format!(
                "a pre-shared key was supplied but {} has no psk modifier",
                config.protocol
            )));
        }
        (None, false) => {
            return Err(ChannelError::Configuration(format!(
                "{} requires a pre-shared key",
                config.protocol
            )));
        }
        _ => {}
    }
    if psk_locations.iter().any(|location| *location > 9) {
        return Err(ChannelError::Configuration(format!(
            "unsupported psk position in {}",
            config.protocol
        )));
    }

    let cipher = params.cipher;
    let mut builder = Builder::new(params).local_private_key(&config.key_pair.private_key);
    if let Some(prologue) = &config.prologue {
        builder = builder.prologue(prologue);
    }
    if let Some(remote) = &config.remote_public_key {
        builder = builder.remote_public_key(remote);
    }
    if let Some(psk) = &config.psk {
        for location in &psk_locations {
            builder = builder.psk(*location, psk);
        }
    }

    let state = match config.mode {
        Role::Initiator => builder.build_initiator()?,
        Role::Responder => builder.build_responder()?,
    };

    tracing::debug!(protocol = %config.protocol, role = %config.mode, "session created");

    Ok(Session {
        protocol: config.protocol,
        role: config.mode,
        engine: SnowHandshake::new(state, cipher),
        associated_data: config.associated_data,
    })
}

impl Session {
    /// The resolved protocol name.
    pub fn protocol(&self) -> &ProtocolName {
        &self.protocol
    }

    /// The local role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Turns the session into an event-driven handshake driver.
    pub fn into_driver(self, options: HandshakeOptions) -> (HandshakeDriver<SnowHandshake>, Completion) {
        HandshakeDriver::new(self.engine, self.role, self.associated_data, options)
    }

    /// Runs the handshake over `stream` and returns the established channel.
    pub async fn handshake<S: MessageStream>(
        self,
        stream: &mut S,
        options: HandshakeOptions,
    ) -> Result<SecureChannel> {
        let (driver, completion) = self.into_driver(options);
        handshake::handshake(driver, completion, stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Action, HandshakeEngine};

    #[test]
    fn test_default_protocol_name() {
        assert_eq!(
            ProtocolName::default().to_string(),
            "Noise_XK_25519_ChaChaPoly_BLAKE2b"
        );
    }

    #[test]
    fn test_protocol_name_params() {
        let name = ProtocolName::new("XXpsk3", "25519", "AESGCM", "SHA256");
        let params = name.params().unwrap();
        assert_eq!(params.name, "Noise_XXpsk3_25519_AESGCM_SHA256");
        assert!(params.handshake.is_psk());
    }

    #[test]
    fn test_invalid_protocol_name() {
        let name = ProtocolName::new("ZZ", "25519", "ChaChaPoly", "BLAKE2b");
        assert!(matches!(
            name.params(),
            Err(ChannelError::Configuration(_))
        ));
    }

    #[test]
    fn test_role_default_is_responder() {
        assert_eq!(Role::default(), Role::Responder);
        assert_eq!(SessionConfig::new(KeyPair::generate().unwrap()).mode, Role::Responder);
    }

    #[test]
    fn test_protocol_name_deserializes_with_defaults() {
        let name: ProtocolName = serde_json::from_str(r#"{"hash":"SHA512"}"#).unwrap();
        assert_eq!(name.to_string(), "Noise_XK_25519_ChaChaPoly_SHA512");
    }

    #[test]
    fn test_responder_session() {
        let session = create_session(SessionConfig::new(KeyPair::generate().unwrap())).unwrap();
        assert_eq!(session.role(), Role::Responder);
        assert_eq!(session.engine.action(), Action::ReadMessage);
    }

    #[test]
    fn test_initiator_session() {
        let remote = KeyPair::generate().unwrap();
        let config = SessionConfig::new(KeyPair::generate().unwrap()).initiator(remote.public_key);
        let session = create_session(config).unwrap();
        assert_eq!(session.role(), Role::Initiator);
        assert_eq!(session.engine.action(), Action::WriteMessage);
    }

    #[test]
    fn test_initiator_requires_remote_key() {
        let mut config = SessionConfig::new(KeyPair::generate().unwrap());
        config.mode = Role::Initiator;
        let err = create_session(config).unwrap_err();
        assert!(matches!(err, ChannelError::Configuration(_)));
    }

    #[test]
    fn test_xx_initiator_needs_no_remote_key() {
        let mut config = SessionConfig::new(KeyPair::generate().unwrap())
            .protocol(ProtocolName::new("XX", "25519", "ChaChaPoly", "BLAKE2b"));
        config.mode = Role::Initiator;
        assert!(create_session(config).is_ok());
    }

    #[test]
    fn test_malformed_private_key() {
        let mut key_pair = KeyPair::generate().unwrap();
        key_pair.private_key.truncate(16);
        let err = create_session(SessionConfig::new(key_pair)).unwrap_err();
        assert!(matches!(err, ChannelError::Engine(_)));
    }

    #[test]
    fn test_malformed_remote_key() {
        let config = SessionConfig::new(KeyPair::generate().unwrap()).initiator(vec![1u8; 64]);
        let err = create_session(config).unwrap_err();
        assert!(matches!(err, ChannelError::Engine(_)));
    }

    #[test]
    fn test_unsupported_curve() {
        let config = SessionConfig::new(KeyPair::generate().unwrap())
            .protocol(ProtocolName::new("XK", "448", "ChaChaPoly", "BLAKE2b"));
        let err = create_session(config).unwrap_err();
        assert!(matches!(err, ChannelError::UnsupportedCurve(_)));
    }

    #[test]
    fn test_psk_without_modifier_rejected() {
        let config = SessionConfig::new(KeyPair::generate().unwrap()).psk(vec![0u8; 32]);
        let err = create_session(config).unwrap_err();
        assert!(matches!(err, ChannelError::Configuration(_)));
    }

    #[test]
    fn test_psk_modifier_without_key_rejected() {
        let config = SessionConfig::new(KeyPair::generate().unwrap())
            .protocol(ProtocolName::new("XKpsk3", "25519", "ChaChaPoly", "BLAKE2b"));
        let err = create_session(config).unwrap_err();
        assert!(matches!(err, ChannelError::Configuration(_)));
    }

    #[test]
    fn test_psk_wrong_length_is_engine_error() {
        let config = SessionConfig::new(KeyPair::generate().unwrap())
            .protocol(ProtocolName::new("XKpsk3", "25519", "ChaChaPoly", "BLAKE2b"))
            .psk(vec![0u8; 12]);
        let err = create_session(config).unwrap_err();
        assert!(matches!(err, ChannelError::Engine(_)));
    }

    #[test]
    fn test_session_keeps_protocol() {
        let config = SessionConfig::new(KeyPair::generate().unwrap())
            .protocol(ProtocolName::new("NN", "25519", "AESGCM", "SHA256"))
            .prologue(b"context".to_vec())
            .associated_data(b"ad".to_vec());
        let session = create_session(config).unwrap();
        assert_eq!(
            session.protocol().to_string(),
            "Noise_NN_25519_AESGCM_SHA256"
        );
    }
}
