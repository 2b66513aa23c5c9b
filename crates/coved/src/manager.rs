//! The vault manager: control-plane server, config lifecycle, and the
//! start-vault identity hand-off.
//!
//! Malformed or unrecognized requests are dropped without a reply; a
//! client that hears nothing treats the operation as failed. Typed
//! `result = false` responses mean the request was understood and
//! refused.
//!
//! Lock order: `vault_infos` before `update_interval`, never the reverse.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::JoinHandle;

use cove_core::codes::ErrorCode;
use cove_core::config::{resolve_config_path, ManagerConfig, VaultEntry};
use cove_core::crypto::{check_signature, short_id, Keypair};
use cove_core::message::{
    decode_body, encode_message, unwrap_message, MessageKind, StartVaultRequest,
    StartVaultResponse, StopVaultRequest, StopVaultResponse, UpdateIntervalRequest,
    UpdateIntervalResponse, VaultIdentityRequest, VaultIdentityResponse,
};
use cove_transport::{Response, TcpTransport, TransportHandler};

use crate::process::{ProcessLauncher, ProcessManager, ProcessSpec};
use crate::updater::{self, Downloader, HttpDownloader, BOOTSTRAP_GLOBAL};
use crate::version::VAULT_NAME;

/// Bounds on the update-poll cadence.
pub const MIN_UPDATE_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const MAX_UPDATE_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// How long a start-vault request waits for the spawned vault to claim
/// its identity before reporting failure to the client.
pub const START_VAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Release server queried by the production downloader. Overridable via
/// `$COVE_UPDATE_URL`.
pub const DEFAULT_UPDATE_URL: &str = "https://releases.cove.network/current";

pub struct ManagerOptions {
    /// Explicit config file location; `None` resolves per the usual order.
    pub config_path: Option<PathBuf>,
    /// Inclusive port range scanned for a listening socket.
    pub port_range: (u16, u16),
    /// Where current-version symlinks live.
    pub system_app_dir: PathBuf,
    pub downloader: Arc<dyn Downloader>,
    pub launcher: Arc<dyn ProcessLauncher>,
}

impl ManagerOptions {
    pub fn production() -> Self {
        let update_url =
            std::env::var("COVE_UPDATE_URL").unwrap_or_else(|_| DEFAULT_UPDATE_URL.to_string());
        Self {
            config_path: None,
            port_range: (cove_core::wire::MIN_PORT, cove_core::wire::MAX_PORT),
            system_app_dir: crate::paths::system_app_dir(),
            downloader: Arc::new(HttpDownloader::new(update_url)),
            launcher: Arc::new(crate::process::TokioLauncher),
        }
    }
}

// ── Supervisor records ────────────────────────────────────────────────────────

struct VaultInfo {
    process_index: u32,
    account_name: String,
    keys: Keypair,
    chunkstore_path: PathBuf,
    chunkstore_capacity: u64,
    client_port: AtomicU16,
    vault_port: AtomicU16,
    requested_to_run: AtomicBool,
    /// Set once, when the spawned vault claims its identity.
    vault_requested: AtomicBool,
    /// Completes the start-vault handler waiting on this record.
    pending_start: std::sync::Mutex<Option<oneshot::Sender<()>>>,
}

struct Inner {
    config_path: PathBuf,
    system_app_dir: PathBuf,
    process_manager: ProcessManager,
    vault_infos: Mutex<Vec<Arc<VaultInfo>>>,
    update_interval: Mutex<Duration>,
    update_changed: Notify,
    downloader: Arc<dyn Downloader>,
    local_port: AtomicU16,
}

pub struct VaultManager {
    inner: Arc<Inner>,
    transport: TcpTransport,
    update_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl VaultManager {
    /// Bootstrap: resolve and load (or create) the config, bind the first
    /// free port in range, register and start configured vaults, run one
    /// synchronous update pass, then arm the update loop.
    pub async fn start(options: ManagerOptions) -> anyhow::Result<Self> {
        let config_path = options
            .config_path
            .unwrap_or_else(|| resolve_config_path(&options.system_app_dir));

        if !config_path.exists() {
            ManagerConfig::default()
                .save(&config_path)
                .with_context(|| format!("failed to write fresh config at {}", config_path.display()))?;
            tracing::info!(path = %config_path.display(), "wrote fresh config");
        }

        let config = ManagerConfig::load(&config_path)
            .with_context(|| format!("failed to read config at {}", config_path.display()))?;

        let inner = Arc::new(Inner {
            config_path,
            system_app_dir: options.system_app_dir,
            process_manager: ProcessManager::new(options.launcher),
            vault_infos: Mutex::new(Vec::new()),
            update_interval: Mutex::new(Duration::from_secs(config.update_interval_secs)),
            update_changed: Notify::new(),
            downloader: options.downloader,
            local_port: AtomicU16::new(0),
        });

        // Bind before spawning anything so children are told the real
        // port, not the first candidate.
        let transport = TcpTransport::new(inner.clone() as Arc<dyn TransportHandler>);
        let mut bound = None;
        for port in options.port_range.0..=options.port_range.1 {
            match transport.start_listening(SocketAddr::from(([127, 0, 0, 1], port))) {
                Ok(port) => {
                    bound = Some(port);
                    break;
                }
                Err(code) => tracing::debug!(port, %code, "port unavailable"),
            }
        }
        let local_port = bound.with_context(|| {
            format!(
                "listening failed on all ports in range {} - {}",
                options.port_range.0, options.port_range.1
            )
        })?;
        inner.local_port.store(local_port, Ordering::SeqCst);

        for entry in config.vault_info {
            inner.add_configured_vault(entry).await;
        }

        updater::check_for_updates(
            inner.downloader.as_ref(),
            inner.config_dir(),
            &inner.system_app_dir,
        )
        .await;

        let update_task = tokio::spawn(run_update_loop(inner.clone()));

        tracing::info!(port = local_port, "vault manager started");
        Ok(Self {
            inner,
            transport,
            update_task: std::sync::Mutex::new(Some(update_task)),
        })
    }

    pub fn local_port(&self) -> u16 {
        self.inner.local_port.load(Ordering::SeqCst)
    }

    pub fn config_path(&self) -> &Path {
        &self.inner.config_path
    }

    /// Graceful shutdown: children die, the listener closes, the update
    /// loop stops.
    pub async fn shutdown(&self) {
        self.inner.process_manager.let_all_die().await;
        self.transport.stop_listening();
        if let Some(task) = self.update_task.lock().unwrap().take() {
            task.abort();
        }
        tracing::info!("vault manager stopped");
    }
}

// ── Message handling ──────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl TransportHandler for Inner {
    async fn on_message_received(&self, payload: Bytes, peer: SocketAddr) -> Option<Response> {
        let (kind, body) = match unwrap_message(&payload) {
            Ok(parts) => parts,
            Err(_) => {
                tracing::error!(peer = %peer, "failed to unwrap incoming message");
                return None;
            }
        };
        tracing::debug!(peer = %peer, ?kind, "control message received");

        match kind {
            MessageKind::Ping => {
                // Echo the payload back unchanged.
                Some(Response::terminal(cove_core::message::wrap_message(
                    MessageKind::Ping,
                    body,
                )))
            }
            MessageKind::StartVaultRequest => self.handle_start_vault(body, peer).await,
            MessageKind::VaultIdentityRequest => self.handle_vault_identity(body, peer).await,
            MessageKind::StopVaultRequest => self.handle_stop_vault(body).await,
            MessageKind::UpdateIntervalRequest => self.handle_update_interval(body).await,
            other => {
                tracing::error!(peer = %peer, ?other, "unexpected message kind, dropping");
                None
            }
        }
    }

    fn on_error(&self, code: ErrorCode, peer: Option<SocketAddr>) {
        match peer {
            Some(peer) => tracing::warn!(peer = %peer, %code, "transport error"),
            None => tracing::warn!(%code, "transport error"),
        }
    }
}

impl Inner {
    fn config_dir(&self) -> &Path {
        self.config_path.parent().unwrap_or_else(|| Path::new("."))
    }

    async fn handle_start_vault(&self, body: &[u8], peer: SocketAddr) -> Option<Response> {
        let request: StartVaultRequest = decode_body(body).ok().or_else(|| {
            tracing::error!("failed to parse start-vault request");
            None
        })?;
        let keys = Keypair::from_blob(&request.keys).ok().or_else(|| {
            tracing::error!("start-vault request carries unusable keys");
            None
        })?;

        let respond = |result: bool| {
            encode_message(
                MessageKind::StartVaultResponse,
                &StartVaultResponse { result },
            )
            .ok()
            .map(Response::terminal)
        };

        let vault_id = short_id(&keys.identity);
        let config_dir = self.config_dir().to_path_buf();
        if !handle_bootstrap_file(&vault_id, &config_dir) {
            tracing::error!(vault_id, "failed to set up bootstrap file");
            return respond(false);
        }

        let chunkstore_path = config_dir.join(&vault_id);
        let chunkstore_capacity = 0;
        let spec = vault_process_spec(
            &config_dir,
            &chunkstore_path,
            chunkstore_capacity,
            &request.bootstrap_endpoint,
        );
        let index = self
            .process_manager
            .add(spec, self.local_port.load(Ordering::SeqCst))
            .await;

        let (started_tx, started_rx) = oneshot::channel();
        let info = Arc::new(VaultInfo {
            process_index: index,
            account_name: request.account_name.clone(),
            keys,
            chunkstore_path,
            chunkstore_capacity,
            client_port: AtomicU16::new(peer.port()),
            vault_port: AtomicU16::new(0),
            requested_to_run: AtomicBool::new(true),
            vault_requested: AtomicBool::new(false),
            pending_start: std::sync::Mutex::new(Some(started_tx)),
        });

        // Register before starting so the vault's identity request cannot
        // race the lookup.
        self.vault_infos.lock().await.push(info.clone());

        if let Err(code) = self.process_manager.start(index).await {
            tracing::error!(index, %code, "failed to start vault process");
            self.vault_infos
                .lock()
                .await
                .retain(|candidate| candidate.process_index != index);
            return respond(false);
        }

        self.write_config().await;

        // Block this connection until the spawned vault claims its
        // identity, or give up.
        match tokio::time::timeout(START_VAULT_TIMEOUT, started_rx).await {
            Ok(Ok(())) => respond(true),
            _ => {
                tracing::error!(index, "wait for vault identity request timed out");
                respond(false)
            }
        }
    }

    async fn handle_vault_identity(&self, body: &[u8], peer: SocketAddr) -> Option<Response> {
        let request: VaultIdentityRequest = decode_body(body).ok().or_else(|| {
            tracing::error!("failed to parse vault-identity request");
            None
        })?;

        let empty = VaultIdentityResponse {
            account_name: String::new(),
            keys: Vec::new(),
        };

        let response = {
            let infos = self.vault_infos.lock().await;
            match infos
                .iter()
                .find(|info| info.process_index == request.process_index)
            {
                None => {
                    tracing::error!(
                        process_index = request.process_index,
                        "identity requested for unknown vault"
                    );
                    empty
                }
                Some(info) => match info.keys.to_blob() {
                    Err(e) => {
                        tracing::error!(process_index = request.process_index, error = %e,
                            "failed to serialize vault keys");
                        empty
                    }
                    Ok(blob) => {
                        info.vault_port.store(peer.port(), Ordering::SeqCst);
                        if info.vault_requested.swap(true, Ordering::SeqCst) {
                            tracing::warn!(
                                process_index = request.process_index,
                                "vault re-requested its identity"
                            );
                        }
                        // Wake the client handler blocked in start-vault.
                        if let Some(tx) = info.pending_start.lock().unwrap().take() {
                            let _ = tx.send(());
                        }
                        VaultIdentityResponse {
                            account_name: info.account_name.clone(),
                            keys: blob,
                        }
                    }
                },
            }
        };

        encode_message(MessageKind::VaultIdentityResponse, &response)
            .ok()
            .map(Response::terminal)
    }

    async fn handle_stop_vault(&self, body: &[u8]) -> Option<Response> {
        let request: StopVaultRequest = decode_body(body).ok().or_else(|| {
            tracing::error!("failed to parse stop-vault request");
            None
        })?;

        let stop_index = {
            let infos = self.vault_infos.lock().await;
            match infos
                .iter()
                .find(|info| info.keys.identity == request.identity)
            {
                None => {
                    tracing::error!(
                        identity = %hex::encode(&request.identity[..request.identity.len().min(4)]),
                        "stop requested for unknown vault"
                    );
                    None
                }
                Some(info) => {
                    if check_signature(&request.data, &request.signature, &info.keys.public) {
                        tracing::debug!(
                            client_port = info.client_port.load(Ordering::SeqCst),
                            "stop-vault signature accepted"
                        );
                        info.requested_to_run.store(false, Ordering::SeqCst);
                        Some(info.process_index)
                    } else {
                        tracing::error!("stop-vault request failed signature validation");
                        None
                    }
                }
            }
        };

        let result = stop_index.is_some();
        if let Some(index) = stop_index {
            tracing::info!(index, "shutting down vault");
            if let Err(code) = self.process_manager.stop(index).await {
                tracing::warn!(index, %code, "vault process was not running");
            }
            self.write_config().await;
        }

        encode_message(
            MessageKind::VaultShutdownResponse,
            &StopVaultResponse { result },
        )
        .ok()
        .map(Response::terminal)
    }

    async fn handle_update_interval(&self, body: &[u8]) -> Option<Response> {
        let request: UpdateIntervalRequest = decode_body(body).ok().or_else(|| {
            tracing::error!("failed to parse update-interval request");
            None
        })?;

        let response = match request.new_update_interval {
            Some(secs) => {
                let requested = Duration::from_secs(secs);
                if (MIN_UPDATE_INTERVAL..=MAX_UPDATE_INTERVAL).contains(&requested) {
                    *self.update_interval.lock().await = requested;
                    self.update_changed.notify_one();
                    UpdateIntervalResponse {
                        update_interval: secs,
                    }
                } else {
                    tracing::error!(secs, "rejected out-of-range update interval");
                    UpdateIntervalResponse { update_interval: 0 }
                }
            }
            None => UpdateIntervalResponse {
                update_interval: self.update_interval.lock().await.as_secs(),
            },
        };

        encode_message(MessageKind::UpdateIntervalResponse, &response)
            .ok()
            .map(Response::terminal)
    }

    /// Register a vault read from the config file, starting it when asked.
    async fn add_configured_vault(&self, entry: VaultEntry) {
        let keys = match hex::decode(&entry.keys)
            .ok()
            .and_then(|blob| Keypair::from_blob(&blob).ok())
        {
            Some(keys) => keys,
            None => {
                tracing::error!(account = %entry.account_name, "skipping vault with unusable keys");
                return;
            }
        };

        let spec = vault_process_spec(
            self.config_dir(),
            &entry.chunkstore_path,
            entry.chunkstore_capacity,
            "",
        );
        let index = self
            .process_manager
            .add(spec, self.local_port.load(Ordering::SeqCst))
            .await;

        let info = Arc::new(VaultInfo {
            process_index: index,
            account_name: entry.account_name,
            keys,
            chunkstore_path: entry.chunkstore_path,
            chunkstore_capacity: entry.chunkstore_capacity,
            client_port: AtomicU16::new(0),
            vault_port: AtomicU16::new(0),
            requested_to_run: AtomicBool::new(entry.requested_to_run),
            vault_requested: AtomicBool::new(false),
            pending_start: std::sync::Mutex::new(None),
        });
        self.vault_infos.lock().await.push(info);

        if entry.requested_to_run {
            if let Err(code) = self.process_manager.start(index).await {
                tracing::error!(index, %code, "failed to start configured vault");
            }
        }
    }

    /// Snapshot the in-memory set and replace the config file whole.
    /// Runtime write failures are logged and skipped.
    async fn write_config(&self) {
        let config = {
            let infos = self.vault_infos.lock().await;
            let update_interval_secs = self.update_interval.lock().await.as_secs();
            ManagerConfig {
                update_interval_secs,
                vault_info: infos
                    .iter()
                    .filter_map(|info| {
                        let keys = match info.keys.to_blob() {
                            Ok(blob) => hex::encode(blob),
                            Err(e) => {
                                tracing::error!(account = %info.account_name, error = %e,
                                    "skipping vault in config write");
                                return None;
                            }
                        };
                        Some(VaultEntry {
                            account_name: info.account_name.clone(),
                            keys,
                            chunkstore_path: info.chunkstore_path.clone(),
                            chunkstore_capacity: info.chunkstore_capacity,
                            requested_to_run: info.requested_to_run.load(Ordering::SeqCst),
                        })
                    })
                    .collect(),
            }
        };

        if let Err(e) = config.save(&self.config_path) {
            tracing::error!(path = %self.config_path.display(), error = %e,
                "failed to write config file");
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Ensure the per-vault directory exists and the vault has its own copy
/// of the global bootstrap file.
fn handle_bootstrap_file(vault_id: &str, config_dir: &Path) -> bool {
    let vault_dir = config_dir.join(vault_id);
    if let Err(e) = std::fs::create_dir_all(&vault_dir) {
        tracing::error!(dir = %vault_dir.display(), error = %e, "failed to create vault directory");
        return false;
    }

    let vault_bootstrap = config_dir.join(format!("bootstrap-{vault_id}.dat"));
    if vault_bootstrap.exists() {
        return true;
    }
    match std::fs::copy(config_dir.join(BOOTSTRAP_GLOBAL), &vault_bootstrap) {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(error = %e, "failed to copy global bootstrap file");
            false
        }
    }
}

fn vault_process_spec(
    config_dir: &Path,
    chunkstore_path: &Path,
    chunkstore_capacity: u64,
    bootstrap_endpoint: &str,
) -> ProcessSpec {
    let mut spec = ProcessSpec::new(config_dir.join(VAULT_NAME));
    if !bootstrap_endpoint.is_empty() {
        spec = spec.arg("--peer").arg(bootstrap_endpoint);
    }
    spec.arg("--chunk_path")
        .arg(chunkstore_path.display().to_string())
        .arg("--chunk_capacity")
        .arg(chunkstore_capacity.to_string())
        .arg("--start")
}

/// Periodic update pass. Interval changes wake the loop so the new
/// cadence applies immediately; errors never disarm it.
async fn run_update_loop(inner: Arc<Inner>) {
    loop {
        let interval = *inner.update_interval.lock().await;
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                updater::check_for_updates(
                    inner.downloader.as_ref(),
                    inner.config_dir(),
                    &inner.system_app_dir,
                )
                .await;
            }
            _ = inner.update_changed.notified() => {}
        }
    }
}
