//! JSON key files.
//!
//! A key file holds one static key pair as
//! `{"privateKey": "<hex>", "publicKey": "<hex>"}`. The peer's key is read
//! from the same format; only its `publicKey` field is used.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use noise_channel::{KeyPair, DEFAULT_CURVE};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyFile {
    #[serde(with = "hex::serde")]
    public_key: Vec<u8>,
}

/// Loads a key pair from a JSON key file.
///
/// The stored public key must be the one derived from the private key.
pub fn load_key_pair<P: AsRef<Path>>(path: P) -> Result<KeyPair> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file: {}", path.display()))?;

    let stored: KeyPair = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse key file: {}", path.display()))?;
    let derived = KeyPair::from_private_key(DEFAULT_CURVE, &stored.private_key)
        .with_context(|| format!("Invalid private key in: {}", path.display()))?;

    if derived.public_key != stored.public_key {
        bail!(
            "Key file {} holds a public key that does not match its private key",
            path.display()
        );
    }

    Ok(derived)
}

/// Loads just the public key from a JSON key file.
pub fn load_public_key<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file: {}", path.display()))?;

    let file: PublicKeyFile = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse public key in: {}", path.display()))?;
    Ok(file.public_key)
}

/// Saves a key pair as JSON, readable only by the owner on unix.
///
/// Creates parent directories if they don't exist.
pub fn save_key_pair<P: AsRef<Path>>(path: P, key_pair: &KeyPair) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create key directory: {}", parent.display()))?;
    }

    let contents = serde_json::to_string(key_pair).context("Failed to serialize key pair")?;
    fs::write(path, contents)
        .with_context(|| format!("Failed to write key file: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict key file: {}", path.display()))?;
    }

    tracing::debug!("Key pair saved to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_key_pair() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keys").join("responder.json");

        let key_pair = KeyPair::generate().unwrap();
        save_key_pair(&path, &key_pair).unwrap();

        assert_eq!(load_key_pair(&path).unwrap(), key_pair);
        assert_eq!(load_public_key(&path).unwrap(), key_pair.public_key);
    }

    #[test]
    fn test_file_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("key.json");

        let key_pair = KeyPair::generate().unwrap();
        save_key_pair(&path, &key_pair).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["publicKey"], key_pair.public_key_hex());
        assert_eq!(
            value["privateKey"].as_str().unwrap(),
            hex::encode(&key_pair.private_key)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("key.json");
        save_key_pair(&path, &KeyPair::generate().unwrap()).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_public_key_only_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("remote.json");
        fs::write(&path, format!(r#"{{"publicKey":"{}"}}"#, "ab".repeat(32))).unwrap();

        assert_eq!(load_public_key(&path).unwrap(), vec![0xab; 32]);
        assert!(load_key_pair(&path).is_err());
    }

    #[test]
    fn test_mismatched_halves_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mixed.json");

        let first = KeyPair::generate().unwrap();
        let second = KeyPair::generate().unwrap();
        let mixed = KeyPair {
            private_key: first.private_key,
            public_key: second.public_key,
        };
        fs::write(&path, serde_json::to_string(&mixed).unwrap()).unwrap();

        let err = load_key_pair(&path).unwrap_err().to_string();
        assert!(err.contains("does not match its private key"));
    }

    #[test]
    fn test_short_private_key_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("short.json");
        fs::write(
            &path,
            format!(r#"{{"privateKey":"{}","publicKey":"{}"}}"#, "01".repeat(16), "02".repeat(32)),
        )
        .unwrap();

        let err = load_key_pair(&path).unwrap_err().to_string();
        assert!(err.contains("Invalid private key"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_key_pair("/nonexistent/key.json").unwrap_err().to_string();
        assert!(err.contains("Failed to read key file"));
    }

    #[test]
    fn test_invalid_hex() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        fs::write(&path, r#"{"privateKey":"zz","publicKey":"zz"}"#).unwrap();

        let err = load_key_pair(&path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse key file"));
    }
}
