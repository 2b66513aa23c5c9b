//! Simulation-mode chunk front end.
//!
//! Performs authority checks against a local chunk store, with an
//! artificial delay approximating network latency and a cross-process
//! lock file per chunk so sibling simulators on the same host serialize
//! their actions.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use cove_core::chunk::short_name;
use cove_core::codes::ErrorCode;
use cove_core::crypto::Keypair;
use cove_core::records::{self, SignedData};

use crate::authority::{ChunkActionAuthority, GetOutcome};
use crate::store::ChunkStore;

/// A lock file older than this is presumed abandoned by a dead simulator
/// and is broken.
const LOCK_EXPIRY: Duration = Duration::from_secs(10);

/// Poll interval while waiting on a peer's lock.
const LOCK_RETRY: Duration = Duration::from_millis(50);

pub struct LocalChunkManager {
    store: Arc<dyn ChunkStore>,
    authority: ChunkActionAuthority,
    lock_directory: PathBuf,
    get_wait: Duration,
    action_wait: Duration,
}

impl LocalChunkManager {
    /// `lock_directory` is shared with peer simulators; the store is
    /// exclusively this manager's.
    pub fn new(
        store: Arc<dyn ChunkStore>,
        lock_directory: impl Into<PathBuf>,
        get_wait: Duration,
        action_wait: Duration,
    ) -> Result<Self, ErrorCode> {
        let lock_directory = lock_directory.into();
        std::fs::create_dir_all(&lock_directory).map_err(|_| ErrorCode::GeneralError)?;
        Ok(Self {
            authority: ChunkActionAuthority::new(store.clone()),
            store,
            lock_directory,
            get_wait,
            action_wait,
        })
    }

    pub async fn get_chunk(
        &self,
        name: &[u8],
        local_version: &[u8],
        keys: &Keypair,
        lock: bool,
    ) -> Result<Bytes, ErrorCode> {
        tokio::time::sleep(self.get_wait).await;
        let _guard = if lock {
            Some(self.acquire_lock(name).await?)
        } else {
            None
        };
        let outcome = self.authority.get(name, local_version, &keys.public)?;
        if let GetOutcome::NotOwner(_) = outcome {
            tracing::debug!(name = %short_name(name), "get served the non-owner view");
        }
        Ok(Bytes::from(outcome.into_bytes()))
    }

    pub async fn store_chunk(
        &self,
        name: &[u8],
        content: &[u8],
        keys: &Keypair,
    ) -> Result<(), ErrorCode> {
        tokio::time::sleep(self.action_wait).await;
        let _guard = self.acquire_lock(name).await?;
        self.authority.store(name, content, &keys.public)?;
        self.store.store(name, content)
    }

    /// Deletion proof is composed here: the chunk name signed with the
    /// caller's key.
    pub async fn delete_chunk(&self, name: &[u8], keys: &Keypair) -> Result<(), ErrorCode> {
        tokio::time::sleep(self.action_wait).await;
        let _guard = self.acquire_lock(name).await?;
        let proof = SignedData::new(name.to_vec(), keys.sign(name));
        self.authority
            .delete(name, b"", &records::encode(&proof)?, &keys.public)?;
        self.store.delete(name)
    }

    pub async fn modify_chunk(
        &self,
        name: &[u8],
        content: &[u8],
        keys: &Keypair,
    ) -> Result<(), ErrorCode> {
        tokio::time::sleep(self.action_wait).await;
        let _guard = self.acquire_lock(name).await?;
        let new_body = self.authority.modify(name, content, b"", &keys.public)?;
        self.store.modify(name, &new_body)
    }

    pub fn storage_size(&self) -> u64 {
        self.store.size()
    }

    pub fn storage_capacity(&self) -> u64 {
        self.store.capacity()
    }

    async fn acquire_lock(&self, name: &[u8]) -> Result<LockGuard, ErrorCode> {
        let path = self.lock_directory.join(format!("{}.lock", hex::encode(name)));
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok(LockGuard { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        tracing::warn!(lock = %path.display(), "breaking stale chunk lock");
                        let _ = std::fs::remove_file(&path);
                        continue;
                    }
                    tokio::time::sleep(LOCK_RETRY).await;
                }
                Err(_) => return Err(ErrorCode::GeneralError),
            }
        }
    }
}

fn lock_is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age > LOCK_EXPIRY)
        .unwrap_or(false)
}

struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
