//! Transport-phase encryption.
//!
//! After a handshake splits, each direction gets its own [`CipherSession`]:
//! a symmetric key plus a 64-bit nonce counter. [`SecureChannel`] owns the
//! send/receive pair and binds the configured associated data to every
//! operation.
//!
//! Nonces advance on every successful call, so ciphertexts must be decrypted
//! in exactly the order the peer produced them.

use snow::params::CipherChoice;
use snow::resolvers::{CryptoResolver, DefaultResolver};
use snow::types::Cipher;

use crate::error::{ChannelError, Result};

/// Maximum size of a Noise message, ciphertext and tag included.
pub const MAX_NOISE_MESSAGE_SIZE: usize = 65535;

/// Length of the AEAD authentication tag appended to each ciphertext.
pub const TAG_LENGTH: usize = 16;

/// Length of a cipher session key.
pub const CIPHER_KEY_LENGTH: usize = 32;

/// Largest plaintext that fits in a single Noise message.
pub const MAX_PLAINTEXT_SIZE: usize = MAX_NOISE_MESSAGE_SIZE - TAG_LENGTH;

/// One direction of an established channel.
pub struct CipherSession {
    cipher: Box<dyn Cipher>,
    nonce: u64,
}

impl CipherSession {
    /// Creates a cipher session from a raw split key.
    pub fn new(choice: CipherChoice, key: &[u8; CIPHER_KEY_LENGTH]) -> Result<Self> {
        let mut cipher = DefaultResolver.resolve_cipher(&choice).ok_or_else(|| {
            ChannelError::Engine(snow::Error::Init(snow::error::InitStage::GetCipherImpl))
        })?;
        cipher.set(key);
        Ok(Self { cipher, nonce: 0 })
    }

    /// Returns the nonce that the next operation will use.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Encrypts `plaintext`, authenticating `associated_data` alongside it.
    pub fn encrypt_with_ad(&mut self, associated_data: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.check_exhausted()?;

        if plaintext.len() > MAX_PLAINTEXT_SIZE {
            return Err(ChannelError::MessageTooLarge {
                size: plaintext.len(),
                max: MAX_PLAINTEXT_SIZE,
            });
        }

        let mut out = vec![0u8; plaintext.len() + TAG_LENGTH];
        let len = self
            .cipher
            .encrypt(self.nonce, associated_data, plaintext, &mut out);
        out.truncate(len);
        self.nonce += 1;
        Ok(out)
    }

    /// Decrypts `ciphertext`, verifying it against `associated_data`.
    ///
    /// The nonce is only advanced when verification succeeds.
    pub fn decrypt_with_ad(
        &mut self,
        associated_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        self.check_exhausted()?;

        if ciphertext.len() > MAX_NOISE_MESSAGE_SIZE {
            return Err(ChannelError::MessageTooLarge {
                size: ciphertext.len(),
                max: MAX_NOISE_MESSAGE_SIZE,
            });
        }
        if ciphertext.len() < TAG_LENGTH {
            return Err(ChannelError::AuthenticationFailed);
        }

        let mut out = vec![0u8; ciphertext.len() - TAG_LENGTH];
        let len = self
            .cipher
            .decrypt(self.nonce, associated_data, ciphertext, &mut out)
            .map_err(|_| ChannelError::AuthenticationFailed)?;
        out.truncate(len);
        self.nonce += 1;
        Ok(out)
    }

    // u64::MAX is reserved by Noise and never used as a nonce.
    fn check_exhausted(&self) -> Result<()> {
        if self.nonce == u64::MAX {
            return Err(ChannelError::SequenceExhausted);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
    }
}

impl std::fmt::Debug for CipherSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherSession")
            .field("cipher", &self.cipher.name())
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// An established, bidirectional encrypted channel.
///
/// Produced by a completed handshake. Encryption uses the send session and
/// decryption the receive session; the peer's pairing is the mirror image.
#[derive(Debug)]
pub struct SecureChannel {
    send: CipherSession,
    receive: CipherSession,
    associated_data: Vec<u8>,
    remote_public_key: Option<Vec<u8>>,
    handshake_hash: Vec<u8>,
}

impl SecureChannel {
    /// Assembles a channel from split cipher sessions and the handshake results.
    pub fn new(
        send: CipherSession,
        receive: CipherSession,
        associated_data: Vec<u8>,
        remote_public_key: Option<Vec<u8>>,
        handshake_hash: Vec<u8>,
    ) -> Self {
        Self {
            send,
            receive,
            associated_data,
            remote_public_key,
            handshake_hash,
        }
    }

    /// Encrypts a message for the peer.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.send.encrypt_with_ad(&self.associated_data, plaintext)
    }

    /// Decrypts a message from the peer.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.receive.decrypt_with_ad(&self.associated_data, ciphertext)
    }

    /// The peer's static public key, when the pattern transmits or presupposes one.
    pub fn remote_public_key(&self) -> Option<&[u8]> {
        self.remote_public_key.as_deref()
    }

    /// Transcript hash of the completed handshake.
    ///
    /// Both peers hold identical values; comparing them out of band detects
    /// a manipulated handshake.
    pub fn handshake_hash(&self) -> &[u8] {
        &self.handshake_hash
    }

    /// Associated data bound to every message.
    pub fn associated_data(&self) -> &[u8] {
        &self.associated_data
    }

    /// Splits the channel into independently owned send and receive halves.
    pub fn into_halves(self) -> (SendHalf, ReceiveHalf) {
        (
            SendHalf {
                session: self.send,
                associated_data: self.associated_data.clone(),
            },
            ReceiveHalf {
                session: self.receive,
                associated_data: self.associated_data,
            },
        )
    }
}

/// Encrypting half of a [`SecureChannel`].
#[derive(Debug)]
pub struct SendHalf {
    session: CipherSession,
    associated_data: Vec<u8>,
}

impl SendHalf {
    /// Encrypts a message for the peer.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.session.encrypt_with_ad(&self.associated_data, plaintext)
    }
}

/// Decrypting half of a [`SecureChannel`].
#[derive(Debug)]
pub struct ReceiveHalf {
    session: CipherSession,
    associated_data: Vec<u8>,
}

impl ReceiveHalf {
    /// Decrypts a message from the peer.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.session.decrypt_with_ad(&self.associated_data, ciphertext)
    }
}
