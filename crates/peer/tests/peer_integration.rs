//! End-to-end tests for the noise peer.
//!
//! These tests verify complete flows over TCP loopback:
//! - Key files written by keygen feed both sides
//! - A listener serves several dialers
//! - Configuration mismatches surface as handshake failures

use std::time::Duration;

use noise_peer::keyfile::{load_key_pair, load_public_key, save_key_pair};
use noise_peer::noise_channel::{generate_keypair, KeyPair};
use noise_peer::{Config, Peer};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Writes a responder and an initiator key file into a temporary directory.
fn create_key_files() -> (TempDir, KeyPair, KeyPair, Vec<u8>) {
    let temp_dir = TempDir::new().unwrap();
    let responder_path = temp_dir.path().join("responder-keypair.json");
    let initiator_path = temp_dir.path().join("initiator-keypair.json");

    save_key_pair(&responder_path, &generate_keypair("25519").unwrap()).unwrap();
    save_key_pair(&initiator_path, &generate_keypair("25519").unwrap()).unwrap();

    let responder = load_key_pair(&responder_path).unwrap();
    let initiator = load_key_pair(&initiator_path).unwrap();
    let remote = load_public_key(&responder_path).unwrap();
    (temp_dir, responder, initiator, remote)
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.peer.interval_ms = 5;
    config
}

async fn spawn_listener(peer: Peer) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { peer.serve(listener).await });
    addr
}

// =============================================================================
// Exchange Tests
// =============================================================================

#[tokio::test]
async fn test_connect_exchanges_messages_with_listener() {
    let (_temp_dir, responder_keys, initiator_keys, remote) = create_key_files();
    let config = fast_config();

    let listener = Peer::from_config(&config, responder_keys, None)
        .unwrap()
        .with_count(3);
    let addr = spawn_listener(listener).await;

    let dialer = Peer::from_config(&config, initiator_keys, Some(remote))
        .unwrap()
        .with_count(3);
    let mut inbox = Vec::new();
    let stats = dialer
        .connect(addr, |text| inbox.push(text.to_string()))
        .await
        .unwrap();

    assert_eq!(stats.sent, 3);
    assert_eq!(stats.received, 3);
    assert_eq!(
        inbox,
        vec![
            "responder message 0",
            "responder message 1",
            "responder message 2"
        ]
    );
}

#[tokio::test]
async fn test_listener_serves_multiple_connections() {
    let (_temp_dir, responder_keys, initiator_keys, remote) = create_key_files();
    let config = fast_config();

    let listener = Peer::from_config(&config, responder_keys, None)
        .unwrap()
        .with_count(2);
    let addr = spawn_listener(listener).await;

    let dialer = Peer::from_config(&config, initiator_keys, Some(remote))
        .unwrap()
        .with_count(2);
    for _ in 0..3 {
        let stats = dialer.connect(addr, |_| {}).await.unwrap();
        assert_eq!(stats.received, 2);
    }
}

#[tokio::test]
async fn test_custom_protocol_and_context() {
    let (_temp_dir, responder_keys, initiator_keys, remote) = create_key_files();
    let mut config = fast_config();
    config.protocol.pattern = "XKpsk3".to_string();
    config.protocol.cipher = "AESGCM".to_string();
    config.protocol.hash = "SHA256".to_string();
    config.session.prologue = Some("noise-peer test".to_string());
    config.session.psk = Some("42".repeat(32));
    config.session.associated_data = "channel-7".to_string();
    config.validate().unwrap();

    let listener = Peer::from_config(&config, responder_keys, None)
        .unwrap()
        .with_count(1);
    let addr = spawn_listener(listener).await;

    let dialer = Peer::from_config(&config, initiator_keys, Some(remote))
        .unwrap()
        .with_count(1);
    let stats = dialer.connect(addr, |_| {}).await.unwrap();
    assert_eq!(stats.received, 1);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[tokio::test]
async fn test_wrong_remote_key_fails_handshake() {
    let (_temp_dir, responder_keys, initiator_keys, _) = create_key_files();
    let config = fast_config();

    let listener = Peer::from_config(&config, responder_keys, None)
        .unwrap()
        .with_count(1);
    let addr = spawn_listener(listener).await;

    let stranger = KeyPair::generate().unwrap();
    let dialer = Peer::from_config(&config, initiator_keys, Some(stranger.public_key))
        .unwrap()
        .with_count(1);

    let result = tokio::time::timeout(Duration::from_secs(10), dialer.connect(addr, |_| {}))
        .await
        .expect("handshake should not hang");
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("Handshake failed"));
}

#[tokio::test]
async fn test_connect_without_listener_fails() {
    let (_temp_dir, _, initiator_keys, remote) = create_key_files();

    // Bind then drop to get a port nobody listens on.
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();

    let dialer = Peer::from_config(&fast_config(), initiator_keys, Some(remote)).unwrap();
    let err = dialer.connect(addr, |_| {}).await.unwrap_err();
    assert!(err.to_string().contains("Failed to connect"));
}
