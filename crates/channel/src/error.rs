//! Error types for the noise-channel crate.

use thiserror::Error;

/// Channel error type covering every handshake and transport failure mode.
#[derive(Debug, Error)]
pub enum ChannelError {
    // Configuration errors
    /// The session configuration is missing a value or is inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The cryptographic engine rejected an input (key lengths, psk size, ...).
    #[error("noise engine error: {0}")]
    Engine(#[source] snow::Error),

    /// The requested DH curve is unknown or not provided by the engine.
    #[error("unsupported curve: {0}")]
    UnsupportedCurve(String),

    // Handshake errors
    /// The handshake needed more write/read operations than allowed.
    #[error("handshake operations exceeded the limit of {limit}")]
    HandshakeBudgetExceeded {
        /// Configured operation ceiling.
        limit: usize,
    },

    /// The engine rejected the last handshake message or entered its failed state.
    #[error("handshake action failed: {0}")]
    HandshakeActionFailed(String),

    /// The handshake state was already split into cipher sessions.
    #[error("handshake state has already been split")]
    SplitAlreadyPerformed,

    /// The handshake driver was dropped before it reached a result.
    #[error("handshake abandoned before completion")]
    HandshakeAbandoned,

    // Transport errors
    /// AEAD tag verification failed (tampering, reordering or mismatched associated data).
    #[error("authentication failed: ciphertext could not be verified")]
    AuthenticationFailed,

    /// The directional nonce counter is exhausted.
    #[error("nonce sequence exhausted")]
    SequenceExhausted,

    /// Message exceeds the Noise message size limit.
    #[error("message too large: {size} bytes exceeds maximum of {max} bytes")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    // Connection errors
    /// The stream ended before the handshake completed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// I/O error raised by the underlying stream.
    #[error("stream i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

impl From<snow::Error> for ChannelError {
    fn from(err: snow::Error) -> Self {
        use snow::error::{PatternProblem, StateProblem};

        match err {
            snow::Error::Decrypt => ChannelError::AuthenticationFailed,
            snow::Error::State(StateProblem::Exhausted) => ChannelError::SequenceExhausted,
            snow::Error::Pattern(PatternProblem::UnsupportedDhType) => {
                ChannelError::UnsupportedCurve(err.to_string())
            }
            other => ChannelError::Engine(other),
        }
    }
}
