//! End-to-end control-plane tests: a real vault manager listening on
//! loopback, raw framed clients, and a fake launcher standing in for the
//! vault binary.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use cove_core::codes::ErrorCode;
use cove_core::config::{ManagerConfig, CONFIG_FILENAME};
use cove_core::crypto::Keypair;
use cove_core::message::{
    decode_body, encode_message, unwrap_message, MessageKind, StartVaultRequest,
    StartVaultResponse, StopVaultRequest, StopVaultResponse, UpdateIntervalRequest,
    UpdateIntervalResponse, VaultIdentityRequest, VaultIdentityResponse,
};
use cove_core::wire;

use coved::manager::{ManagerOptions, VaultManager};
use coved::process::{ProcessHandle, ProcessLauncher, ProcessSpec};
use coved::updater::Downloader;

// ── Test doubles ──────────────────────────────────────────────────────────────

struct StubDownloader;

#[async_trait::async_trait]
impl Downloader for StubDownloader {
    async fn update_and_verify(&self, _current: &str, _target_dir: &Path) -> Option<String> {
        None
    }
}

struct NoopHandle;

#[async_trait::async_trait]
impl ProcessHandle for NoopHandle {
    async fn kill(&mut self) {}
}

/// Stands in for the vault binary: "spawning" connects back to the
/// manager and claims the identity, as a real vault would on startup.
struct FakeVaultLauncher {
    handed_accounts: Arc<Mutex<Vec<String>>>,
    launches: AtomicU32,
}

impl FakeVaultLauncher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            handed_accounts: Arc::new(Mutex::new(Vec::new())),
            launches: AtomicU32::new(0),
        })
    }
}

#[async_trait::async_trait]
impl ProcessLauncher for FakeVaultLauncher {
    async fn launch(
        &self,
        _spec: &ProcessSpec,
        index: u32,
        notification_port: u16,
    ) -> Result<Box<dyn ProcessHandle>, ErrorCode> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let handed = self.handed_accounts.clone();
        tokio::spawn(async move {
            let payload = encode_message(
                MessageKind::VaultIdentityRequest,
                &VaultIdentityRequest {
                    process_index: index,
                },
            )
            .unwrap();
            let reply = exchange(notification_port, payload).await;
            let (kind, body) = unwrap_message(&reply).unwrap();
            assert_eq!(kind, MessageKind::VaultIdentityResponse);
            let response: VaultIdentityResponse = decode_body(body).unwrap();
            assert!(!response.keys.is_empty(), "identity hand-off was empty");
            handed.lock().unwrap().push(response.account_name);
        });
        Ok(Box::new(NoopHandle))
    }
}

/// Launcher whose "vault" never comes back to claim its identity.
struct SilentLauncher;

#[async_trait::async_trait]
impl ProcessLauncher for SilentLauncher {
    async fn launch(
        &self,
        _spec: &ProcessSpec,
        _index: u32,
        _notification_port: u16,
    ) -> Result<Box<dyn ProcessHandle>, ErrorCode> {
        Ok(Box::new(NoopHandle))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn test_options(
    dir: &Path,
    launcher: Arc<dyn ProcessLauncher>,
) -> ManagerOptions {
    // The start-vault flow copies this file per vault.
    std::fs::write(dir.join("bootstrap-global.dat"), b"bootstrap contacts").unwrap();
    ManagerOptions {
        config_path: Some(dir.join(CONFIG_FILENAME)),
        port_range: (25483, 25582),
        system_app_dir: dir.to_path_buf(),
        downloader: Arc::new(StubDownloader),
        launcher,
    }
}

async fn exchange(port: u16, payload: Vec<u8>) -> Vec<u8> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let mut stream = TcpStream::connect(addr).await.expect("connect failed");
    let frame = wire::encode_frame(&payload).unwrap();
    stream.write_all(&frame).await.unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        let mut header = [0u8; wire::FRAME_HEADER_LEN];
        stream.read_exact(&mut header).await.unwrap();
        let len = wire::decode_frame_len(&header).unwrap();
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.unwrap();
        body
    })
    .await
    .expect("no reply from the vault manager")
}

fn fresh_keys() -> Keypair {
    let mut identity = vec![0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut identity);
    Keypair::generate(identity)
}

fn start_request(account: &str, keys: &Keypair) -> Vec<u8> {
    encode_message(
        MessageKind::StartVaultRequest,
        &StartVaultRequest {
            account_name: account.to_string(),
            keys: keys.to_blob().unwrap(),
            bootstrap_endpoint: String::new(),
        },
    )
    .unwrap()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ping_echoes_the_payload() {
    let dir = tempfile::tempdir().unwrap();
    let manager = VaultManager::start(test_options(dir.path(), Arc::new(SilentLauncher)))
        .await
        .unwrap();

    let reply = exchange(
        manager.local_port(),
        cove_core::message::wrap_message(MessageKind::Ping, b"hello?"),
    )
    .await;
    let (kind, body) = unwrap_message(&reply).unwrap();
    assert_eq!(kind, MessageKind::Ping);
    assert_eq!(body, b"hello?");

    manager.shutdown().await;
}

#[tokio::test]
async fn start_vault_handshake_completes() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeVaultLauncher::new();
    let manager = VaultManager::start(test_options(dir.path(), launcher.clone()))
        .await
        .unwrap();

    let keys = fresh_keys();
    let reply = exchange(manager.local_port(), start_request("alice", &keys)).await;
    let (kind, body) = unwrap_message(&reply).unwrap();
    assert_eq!(kind, MessageKind::StartVaultResponse);
    let response: StartVaultResponse = decode_body(body).unwrap();
    assert!(response.result, "handshake should succeed");

    assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);

    // The fake vault records the hand-off on its own task; give it a beat.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if !launcher.handed_accounts.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("identity hand-off never observed");
    assert_eq!(
        launcher.handed_accounts.lock().unwrap().as_slice(),
        &["alice".to_string()]
    );

    // The vault landed in the persisted config.
    let config = ManagerConfig::load(manager.config_path()).unwrap();
    assert_eq!(config.vault_info.len(), 1);
    assert_eq!(config.vault_info[0].account_name, "alice");
    assert!(config.vault_info[0].requested_to_run);

    // Its bootstrap copy and chunkstore directory exist.
    let vault_id = cove_core::crypto::short_id(&keys.identity);
    assert!(dir.path().join(&vault_id).is_dir());
    assert!(dir.path().join(format!("bootstrap-{vault_id}.dat")).is_file());

    manager.shutdown().await;
}

#[tokio::test]
async fn start_vault_fails_when_the_vault_never_reports() {
    let dir = tempfile::tempdir().unwrap();
    let manager = VaultManager::start(test_options(dir.path(), Arc::new(SilentLauncher)))
        .await
        .unwrap();

    let keys = fresh_keys();
    let started = std::time::Instant::now();
    let reply = exchange(manager.local_port(), start_request("bob", &keys)).await;
    let (_, body) = unwrap_message(&reply).unwrap();
    let response: StartVaultResponse = decode_body(body).unwrap();
    assert!(!response.result, "no identity claim means failure");
    assert!(
        started.elapsed() >= Duration::from_secs(3),
        "failure should come after the 3 second wait"
    );

    manager.shutdown().await;
}

#[tokio::test]
async fn stop_vault_clears_requested_to_run_in_the_config() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeVaultLauncher::new();
    let manager = VaultManager::start(test_options(dir.path(), launcher))
        .await
        .unwrap();

    let keys = fresh_keys();
    exchange(manager.local_port(), start_request("carol", &keys)).await;

    // Wrong signature is refused.
    let forged = encode_message(
        MessageKind::StopVaultRequest,
        &StopVaultRequest {
            identity: keys.identity.clone(),
            data: b"stop".to_vec(),
            signature: vec![0u8; 64],
        },
    )
    .unwrap();
    let reply = exchange(manager.local_port(), forged).await;
    let (kind, body) = unwrap_message(&reply).unwrap();
    assert_eq!(kind, MessageKind::VaultShutdownResponse);
    let response: StopVaultResponse = decode_body(body).unwrap();
    assert!(!response.result);

    // A properly signed request succeeds.
    let token = b"stop".to_vec();
    let signed = encode_message(
        MessageKind::StopVaultRequest,
        &StopVaultRequest {
            identity: keys.identity.clone(),
            signature: keys.sign(&token),
            data: token,
        },
    )
    .unwrap();
    let reply = exchange(manager.local_port(), signed).await;
    let (_, body) = unwrap_message(&reply).unwrap();
    let response: StopVaultResponse = decode_body(body).unwrap();
    assert!(response.result);

    // Subsequent config reads observe requested_to_run = false.
    let config = ManagerConfig::load(manager.config_path()).unwrap();
    assert_eq!(config.vault_info.len(), 1);
    assert!(!config.vault_info[0].requested_to_run);

    manager.shutdown().await;
}

#[tokio::test]
async fn stop_vault_for_unknown_identity_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let manager = VaultManager::start(test_options(dir.path(), Arc::new(SilentLauncher)))
        .await
        .unwrap();

    let keys = fresh_keys();
    let token = b"stop".to_vec();
    let payload = encode_message(
        MessageKind::StopVaultRequest,
        &StopVaultRequest {
            identity: keys.identity.clone(),
            signature: keys.sign(&token),
            data: token,
        },
    )
    .unwrap();
    let reply = exchange(manager.local_port(), payload).await;
    let (_, body) = unwrap_message(&reply).unwrap();
    let response: StopVaultResponse = decode_body(body).unwrap();
    assert!(!response.result);

    manager.shutdown().await;
}

#[tokio::test]
async fn update_interval_read_set_and_reject() {
    let dir = tempfile::tempdir().unwrap();
    let manager = VaultManager::start(test_options(dir.path(), Arc::new(SilentLauncher)))
        .await
        .unwrap();
    let port = manager.local_port();

    let read = |set: Option<u64>| {
        encode_message(
            MessageKind::UpdateIntervalRequest,
            &UpdateIntervalRequest {
                new_update_interval: set,
            },
        )
        .unwrap()
    };
    let parse = |reply: Vec<u8>| -> u64 {
        let (kind, body) = unwrap_message(&reply).unwrap();
        assert_eq!(kind, MessageKind::UpdateIntervalResponse);
        let response: UpdateIntervalResponse = decode_body(body).unwrap();
        response.update_interval
    };

    // Default cadence from the fresh config.
    assert_eq!(parse(exchange(port, read(None)).await), 24 * 60 * 60);

    // A valid change sticks.
    assert_eq!(parse(exchange(port, read(Some(3600))).await), 3600);
    assert_eq!(parse(exchange(port, read(None)).await), 3600);

    // Below five minutes: rejected sentinel, value unchanged.
    assert_eq!(parse(exchange(port, read(Some(10))).await), 0);
    assert_eq!(parse(exchange(port, read(None)).await), 3600);

    // Above seven days: rejected as well.
    assert_eq!(parse(exchange(port, read(Some(8 * 24 * 60 * 60))).await), 0);

    manager.shutdown().await;
}

#[tokio::test]
async fn malformed_requests_are_dropped_without_reply() {
    let dir = tempfile::tempdir().unwrap();
    let manager = VaultManager::start(test_options(dir.path(), Arc::new(SilentLauncher)))
        .await
        .unwrap();

    let addr = SocketAddr::from(([127, 0, 0, 1], manager.local_port()));
    let mut stream = TcpStream::connect(addr).await.unwrap();
    // Unknown message tag.
    let frame = wire::encode_frame(&[0x7f, 1, 2, 3]).unwrap();
    stream.write_all(&frame).await.unwrap();

    // The manager closes without replying.
    let mut probe = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut probe))
        .await
        .expect("connection should close, not hang");
    assert_eq!(read.unwrap(), 0);

    manager.shutdown().await;
}

#[tokio::test]
async fn configured_vaults_are_restarted_on_boot() {
    let dir = tempfile::tempdir().unwrap();

    // First life: start a vault.
    {
        let launcher = FakeVaultLauncher::new();
        let manager = VaultManager::start(test_options(dir.path(), launcher))
            .await
            .unwrap();
        let keys = fresh_keys();
        let reply = exchange(manager.local_port(), start_request("dave", &keys)).await;
        let (_, body) = unwrap_message(&reply).unwrap();
        let response: StartVaultResponse = decode_body(body).unwrap();
        assert!(response.result);
        manager.shutdown().await;
    }

    // Second life: the configured vault is brought back up.
    let launcher = FakeVaultLauncher::new();
    let manager = VaultManager::start(test_options(dir.path(), launcher.clone()))
        .await
        .unwrap();
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
    manager.shutdown().await;
}
