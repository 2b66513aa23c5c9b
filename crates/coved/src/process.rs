//! Child-process bookkeeping.
//!
//! Processes are tracked by an opaque index. The manager starts, stops,
//! and restarts them; it never interprets exits — liveness is observed by
//! higher layers through inbound control messages. The launcher is a seam
//! so tests can stand in for a real vault binary.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::Mutex;

use cove_core::codes::ErrorCode;

/// Reserved sentinel; valid indices start at 1.
pub const INVALID_INDEX: u32 = 0;

/// What to run and how.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub executable: PathBuf,
    pub args: Vec<String>,
}

impl ProcessSpec {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// A running child. Killing is the only interaction; exits are not
/// observed here.
#[async_trait::async_trait]
pub trait ProcessHandle: Send {
    async fn kill(&mut self);
}

#[async_trait::async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Launch `spec`, telling the child its index and the manager's port
    /// so it can come back and claim its identity.
    async fn launch(
        &self,
        spec: &ProcessSpec,
        index: u32,
        notification_port: u16,
    ) -> Result<Box<dyn ProcessHandle>, ErrorCode>;
}

// ── Production launcher ───────────────────────────────────────────────────────

pub struct TokioLauncher;

struct TokioChild {
    child: tokio::process::Child,
}

#[async_trait::async_trait]
impl ProcessHandle for TokioChild {
    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, "failed to kill child process");
        }
    }
}

#[async_trait::async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn launch(
        &self,
        spec: &ProcessSpec,
        index: u32,
        notification_port: u16,
    ) -> Result<Box<dyn ProcessHandle>, ErrorCode> {
        let mut cmd = Command::new(&spec.executable);
        cmd.args(&spec.args)
            .arg("--vault_id")
            .arg(index.to_string())
            .arg("--manager_port")
            .arg(notification_port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            tracing::error!(executable = %spec.executable.display(), error = %e, "spawn failed");
            ErrorCode::GeneralError
        })?;
        tracing::info!(
            executable = %spec.executable.display(),
            pid = child.id().unwrap_or(0),
            index,
            "vault process started"
        );
        Ok(Box::new(TokioChild { child }))
    }
}

// ── Manager ───────────────────────────────────────────────────────────────────

struct ManagedProcess {
    spec: ProcessSpec,
    notification_port: u16,
    handle: Option<Box<dyn ProcessHandle>>,
}

pub struct ProcessManager {
    launcher: Arc<dyn ProcessLauncher>,
    table: Mutex<HashMap<u32, ManagedProcess>>,
    next_index: AtomicU32,
}

impl ProcessManager {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            launcher,
            table: Mutex::new(HashMap::new()),
            next_index: AtomicU32::new(INVALID_INDEX + 1),
        }
    }

    /// Register a process without starting it. Returns its index.
    pub async fn add(&self, spec: ProcessSpec, notification_port: u16) -> u32 {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        self.table.lock().await.insert(
            index,
            ManagedProcess {
                spec,
                notification_port,
                handle: None,
            },
        );
        index
    }

    /// Start a registered process. Starting an unknown or already-running
    /// index is an error.
    pub async fn start(&self, index: u32) -> Result<(), ErrorCode> {
        let mut table = self.table.lock().await;
        let entry = table.get_mut(&index).ok_or(ErrorCode::GeneralError)?;
        if entry.handle.is_some() {
            return Err(ErrorCode::AlreadyStarted);
        }
        let handle = self
            .launcher
            .launch(&entry.spec, index, entry.notification_port)
            .await?;
        entry.handle = Some(handle);
        Ok(())
    }

    /// Stop a started process. The entry stays registered.
    pub async fn stop(&self, index: u32) -> Result<(), ErrorCode> {
        let mut table = self.table.lock().await;
        let entry = table.get_mut(&index).ok_or(ErrorCode::GeneralError)?;
        match entry.handle.take() {
            Some(mut handle) => {
                handle.kill().await;
                Ok(())
            }
            None => Err(ErrorCode::GeneralError),
        }
    }

    pub async fn restart(&self, index: u32) -> Result<(), ErrorCode> {
        self.stop(index).await?;
        self.start(index).await
    }

    /// Kill every running child. Entries stay registered so shutdown can
    /// be observed in tests.
    pub async fn let_all_die(&self) {
        let mut table = self.table.lock().await;
        for (index, entry) in table.iter_mut() {
            if let Some(mut handle) = entry.handle.take() {
                tracing::debug!(index, "killing vault process");
                handle.kill().await;
            }
        }
    }

    pub async fn running_count(&self) -> usize {
        self.table
            .lock()
            .await
            .values()
            .filter(|entry| entry.handle.is_some())
            .count()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
