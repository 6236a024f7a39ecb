//! Static key pair generation.
//!
//! Key pairs are opaque byte vectors produced by the engine's DH
//! implementation for a given curve identifier. They serialize as hex strings
//! under `privateKey` / `publicKey` so they can be stored in JSON key files.

use serde::{Deserialize, Serialize};
use snow::params::DHChoice;
use snow::resolvers::{CryptoResolver, DefaultResolver};
use snow::types::Dh;

use crate::error::{ChannelError, Result};

/// Curve used when none is specified.
pub const DEFAULT_CURVE: &str = "25519";

/// A static DH key pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    /// Private key bytes.
    #[serde(with = "hex::serde")]
    pub private_key: Vec<u8>,
    /// Public key bytes.
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
}

impl KeyPair {
    /// Generates a key pair on the default curve (`25519`).
    pub fn generate() -> Result<Self> {
        generate_keypair(DEFAULT_CURVE)
    }

    /// Rebuilds a key pair from a private key, deriving the public half.
    pub fn from_private_key(curve: &str, private_key: &[u8]) -> Result<Self> {
        let mut dh = resolve_dh(curve)?;
        if private_key.len() != dh.priv_len() {
            return Err(ChannelError::Engine(snow::Error::Init(
                snow::error::InitStage::ValidateKeyLengths,
            )));
        }
        dh.set(private_key);

        Ok(Self {
            private_key: dh.privkey().to_vec(),
            public_key: dh.pubkey().to_vec(),
        })
    }

    /// Returns the public key as lowercase hex.
    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"[REDACTED]")
            .field("public_key", &self.public_key_hex())
            .finish()
    }
}

/// Generates a fresh key pair for the given curve identifier.
///
/// Fails with [`ChannelError::UnsupportedCurve`] when the identifier is not a
/// Noise curve name or the engine has no implementation for it.
pub fn generate_keypair(curve: &str) -> Result<KeyPair> {
    let mut dh = resolve_dh(curve)?;
    let mut rng = DefaultResolver.resolve_rng().ok_or_else(|| {
        ChannelError::Engine(snow::Error::Init(snow::error::InitStage::GetRngImpl))
    })?;
    dh.generate(rng.as_mut());

    tracing::debug!(curve, "generated static key pair");

    Ok(KeyPair {
        private_key: dh.privkey().to_vec(),
        public_key: dh.pubkey().to_vec(),
    })
}

/// Returns the private/public key lengths for a curve.
pub(crate) fn key_lengths(curve: &str) -> Result<(usize, usize)> {
    let dh = resolve_dh(curve)?;
    Ok((dh.priv_len(), dh.pub_len()))
}

fn resolve_dh(curve: &str) -> Result<Box<dyn Dh>> {
    let choice: DHChoice = curve
        .parse()
        .map_err(|_| ChannelError::UnsupportedCurve(curve.to_string()))?;

    DefaultResolver
        .resolve_dh(&choice)
        .ok_or_else(|| ChannelError::UnsupportedCurve(curve.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_default_curve() {
        let kp = KeyPair::generate().unwrap();
        assert_eq!(kp.private_key.len(), 32);
        assert_eq!(kp.public_key.len(), 32);
    }

    #[test]
    fn test_generated_keys_differ() {
        let a = generate_keypair("25519").unwrap();
        let b = generate_keypair("25519").unwrap();
        assert_ne!(a.private_key, b.private_key);
        assert_ne!(a.public_key, b.public_key);
    }

    #[test]
    fn test_unknown_curve_fails() {
        let err = generate_keypair("Eddy Two Five Five One Niner").unwrap_err();
        assert!(matches!(err, ChannelError::UnsupportedCurve(_)));
    }

    #[test]
    fn test_curve_without_engine_support_fails() {
        let err = generate_keypair("448").unwrap_err();
        assert!(matches!(err, ChannelError::UnsupportedCurve(ref c) if c == "448"));
    }

    #[test]
    fn test_from_private_key_derives_public() {
        let kp = KeyPair::generate().unwrap();
        let rebuilt = KeyPair::from_private_key(DEFAULT_CURVE, &kp.private_key).unwrap();
        assert_eq!(rebuilt, kp);
    }

    #[test]
    fn test_from_private_key_wrong_length() {
        let err = KeyPair::from_private_key(DEFAULT_CURVE, &[1u8; 31]).unwrap_err();
        assert!(matches!(err, ChannelError::Engine(_)));
    }

    #[test]
    fn test_json_uses_hex_and_camel_case() {
        let kp = KeyPair {
            private_key: vec![0xab; 2],
            public_key: vec![0x01, 0x02],
        };
        let json = serde_json::to_string(&kp).unwrap();
        assert_eq!(json, r#"{"privateKey":"abab","publicKey":"0102"}"#);

        let parsed: KeyPair = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, kp);
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let kp = KeyPair {
            private_key: vec![0xde, 0xad],
            public_key: vec![0xbe, 0xef],
        };
        let debug = format!("{:?}", kp);
        assert!(debug.contains("REDACTED"));
        assert!(debug.contains("beef"));
        assert!(!debug.contains("dead"));
    }
}
