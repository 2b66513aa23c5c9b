//! Byte-addressable chunk stores.
//!
//! A store maps opaque chunk names to byte strings and knows nothing about
//! chunk types or ownership — policy lives in the authority. Two
//! implementations: a file-backed store with the two-level fanout layout,
//! and an in-memory store for tests.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use bytes::Bytes;
use memmap2::Mmap;

use cove_core::codes::ErrorCode;

/// The storage-engine seam. Callers never mutate a chunk without an
/// authority decision first.
pub trait ChunkStore: Send + Sync {
    /// The chunk's bytes, or `None` if absent.
    fn get(&self, name: &[u8]) -> Option<Bytes>;

    fn has(&self, name: &[u8]) -> bool;

    /// Write a new chunk. Overwrites are permitted at this layer; the
    /// authority is responsible for refusing duplicate stores.
    fn store(&self, name: &[u8], content: &[u8]) -> Result<(), ErrorCode>;

    /// Remove a chunk. Removing an absent chunk is a no-op.
    fn delete(&self, name: &[u8]) -> Result<(), ErrorCode>;

    /// Replace an existing chunk's bytes.
    fn modify(&self, name: &[u8], content: &[u8]) -> Result<(), ErrorCode>;

    /// Total bytes currently stored.
    fn size(&self) -> u64;

    /// Capacity bound in bytes. 0 means unbounded.
    fn capacity(&self) -> u64;
}

// ── File store ────────────────────────────────────────────────────────────────

/// File-backed chunk store.
///
/// Chunks live in a two-level directory structure keyed by the hex of the
/// chunk name: `root/{hex[0..2]}/{full_hex}`. Writes are atomic (temp file
/// then rename); reads go through mmap so page faults bring data from disk
/// on demand.
pub struct FileChunkStore {
    root: PathBuf,
    size: AtomicU64,
    capacity: u64,
}

impl FileChunkStore {
    /// Open (or create) a store rooted at `root`. Walks the tree once to
    /// recover the running size.
    pub fn open(root: impl Into<PathBuf>, capacity: u64) -> Result<Self, ErrorCode> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|_| ErrorCode::GeneralError)?;
        let size = scan_size(&root);
        Ok(Self {
            root,
            size: AtomicU64::new(size),
            capacity,
        })
    }

    fn chunk_path(&self, name: &[u8]) -> PathBuf {
        let hex = hex::encode(name);
        let fanout = if hex.len() >= 2 { &hex[..2] } else { "00" };
        self.root.join(fanout).join(&hex)
    }

    fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<(), ErrorCode> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| ErrorCode::GeneralError)?;
        }
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path).map_err(|_| ErrorCode::GeneralError)?;
            file.write_all(content).map_err(|_| ErrorCode::GeneralError)?;
            file.sync_all().map_err(|_| ErrorCode::GeneralError)?;
        }
        fs::rename(&tmp_path, path).map_err(|_| ErrorCode::GeneralError)
    }
}

fn scan_size(root: &Path) -> u64 {
    let mut total = 0u64;
    if let Ok(entries) = fs::read_dir(root) {
        for entry in entries.flatten() {
            if let Ok(subdir) = fs::read_dir(entry.path()) {
                for chunk in subdir.flatten() {
                    if let Ok(meta) = chunk.metadata() {
                        total += meta.len();
                    }
                }
            }
        }
    }
    total
}

impl ChunkStore for FileChunkStore {
    fn get(&self, name: &[u8]) -> Option<Bytes> {
        let path = self.chunk_path(name);
        let file = fs::File::open(&path).ok()?;
        // Safety: opened read-only and never mutated through the map.
        let mmap = unsafe { Mmap::map(&file).ok()? };
        Some(Bytes::copy_from_slice(&mmap))
    }

    fn has(&self, name: &[u8]) -> bool {
        self.chunk_path(name).exists()
    }

    fn store(&self, name: &[u8], content: &[u8]) -> Result<(), ErrorCode> {
        let previous = fs::metadata(self.chunk_path(name))
            .map(|meta| meta.len())
            .unwrap_or(0);
        let projected =
            self.size.load(Ordering::Relaxed).saturating_sub(previous) + content.len() as u64;
        if self.capacity != 0 && projected > self.capacity {
            return Err(ErrorCode::GeneralError);
        }
        self.write_atomic(&self.chunk_path(name), content)?;
        self.size.store(projected, Ordering::Relaxed);
        Ok(())
    }

    fn delete(&self, name: &[u8]) -> Result<(), ErrorCode> {
        let path = self.chunk_path(name);
        match fs::metadata(&path) {
            Ok(meta) => {
                fs::remove_file(&path).map_err(|_| ErrorCode::GeneralError)?;
                self.size.fetch_sub(meta.len(), Ordering::Relaxed);
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }

    fn modify(&self, name: &[u8], content: &[u8]) -> Result<(), ErrorCode> {
        if !self.has(name) {
            return Err(ErrorCode::FailedToFindChunk);
        }
        self.store(name, content)
    }

    fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}

// ── Memory store ──────────────────────────────────────────────────────────────

/// HashMap-backed store for tests and short-lived simulations.
#[derive(Default)]
pub struct MemChunkStore {
    chunks: RwLock<HashMap<Vec<u8>, Bytes>>,
    capacity: u64,
}

impl MemChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_bound(capacity: u64) -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            capacity,
        }
    }
}

impl ChunkStore for MemChunkStore {
    fn get(&self, name: &[u8]) -> Option<Bytes> {
        self.chunks.read().unwrap().get(name).cloned()
    }

    fn has(&self, name: &[u8]) -> bool {
        self.chunks.read().unwrap().contains_key(name)
    }

    fn store(&self, name: &[u8], content: &[u8]) -> Result<(), ErrorCode> {
        let mut chunks = self.chunks.write().unwrap();
        let previous = chunks.get(name).map(|c| c.len() as u64).unwrap_or(0);
        let current: u64 = chunks.values().map(|c| c.len() as u64).sum();
        if self.capacity != 0 && current - previous + content.len() as u64 > self.capacity {
            return Err(ErrorCode::GeneralError);
        }
        chunks.insert(name.to_vec(), Bytes::copy_from_slice(content));
        Ok(())
    }

    fn delete(&self, name: &[u8]) -> Result<(), ErrorCode> {
        self.chunks.write().unwrap().remove(name);
        Ok(())
    }

    fn modify(&self, name: &[u8], content: &[u8]) -> Result<(), ErrorCode> {
        let mut chunks = self.chunks.write().unwrap();
        if !chunks.contains_key(name) {
            return Err(ErrorCode::FailedToFindChunk);
        }
        chunks.insert(name.to_vec(), Bytes::copy_from_slice(content));
        Ok(())
    }

    fn size(&self) -> u64 {
        self.chunks.read().unwrap().values().map(|c| c.len() as u64).sum()
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileChunkStore::open(dir.path().join("chunks"), 0).unwrap();

        assert!(!store.has(b"name-a"));
        store.store(b"name-a", b"payload").unwrap();
        assert!(store.has(b"name-a"));
        assert_eq!(store.get(b"name-a").unwrap().as_ref(), b"payload");
        assert_eq!(store.size(), 7);

        store.delete(b"name-a").unwrap();
        assert!(!store.has(b"name-a"));
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn file_store_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileChunkStore::open(dir.path().join("chunks"), 0).unwrap();
        store.delete(b"never-stored").unwrap();
    }

    #[test]
    fn file_store_modify_requires_presence() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileChunkStore::open(dir.path().join("chunks"), 0).unwrap();
        assert_eq!(
            store.modify(b"ghost", b"x"),
            Err(ErrorCode::FailedToFindChunk)
        );
        store.store(b"ghost", b"old").unwrap();
        store.modify(b"ghost", b"newer").unwrap();
        assert_eq!(store.get(b"ghost").unwrap().as_ref(), b"newer");
        assert_eq!(store.size(), 5);
    }

    #[test]
    fn file_store_recovers_size_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("chunks");
        {
            let store = FileChunkStore::open(&root, 0).unwrap();
            store.store(b"a", b"12345").unwrap();
            store.store(b"b", b"678").unwrap();
        }
        let reopened = FileChunkStore::open(&root, 0).unwrap();
        assert_eq!(reopened.size(), 8);
    }

    #[test]
    fn capacity_bound_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileChunkStore::open(dir.path().join("chunks"), 4).unwrap();
        store.store(b"a", b"1234").unwrap();
        assert!(store.store(b"b", b"5").is_err());
        // Replacing within the bound is fine.
        store.store(b"a", b"12").unwrap();
        store.store(b"b", b"5").unwrap();
    }

    #[test]
    fn mem_store_round_trip() {
        let store = MemChunkStore::new();
        store.store(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap().as_ref(), b"v");
        assert_eq!(store.size(), 1);
        store.delete(b"k").unwrap();
        assert!(store.get(b"k").is_none());
    }
}
