//! Per-chunk-type policy handlers.
//!
//! The registry is a total mapping from type tag to handler: one module per
//! chunk type, dispatched through exhaustive matches so adding a type
//! without wiring every operation fails to compile. Handlers are pure —
//! they read the store and compute outcomes or post-images, they never
//! write.

pub mod appendable;
pub mod default;
pub mod modifiable;
pub mod signature;

use cove_core::chunk::ChunkType;
use cove_core::codes::ErrorCode;

use crate::store::ChunkStore;

/// What a get hands back: the serialized bytes plus whether the caller
/// proved ownership. Non-owners of some chunk types receive a filtered
/// view; the `NotOwner` case is informative, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOutcome {
    Owner(Vec<u8>),
    NotOwner(Vec<u8>),
}

impl GetOutcome {
    pub fn bytes(&self) -> &[u8] {
        match self {
            GetOutcome::Owner(bytes) | GetOutcome::NotOwner(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            GetOutcome::Owner(bytes) | GetOutcome::NotOwner(bytes) => bytes,
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

pub fn is_cacheable(chunk_type: ChunkType) -> bool {
    match chunk_type {
        ChunkType::Default => default::is_cacheable(),
        ChunkType::AppendableByAll => appendable::is_cacheable(),
        ChunkType::SignaturePacket => signature::is_cacheable(),
        ChunkType::ModifiableByOwner => modifiable::is_cacheable(),
    }
}

pub fn is_valid(chunk_type: ChunkType, name: &[u8], store: &dyn ChunkStore) -> bool {
    match chunk_type {
        ChunkType::Default => default::is_valid(name, store),
        ChunkType::AppendableByAll => appendable::is_valid(name, store),
        ChunkType::SignaturePacket => signature::is_valid(name, store),
        ChunkType::ModifiableByOwner => modifiable::is_valid(name, store),
    }
}

/// Content-hash summary of the stored bytes. Empty when absent. Every
/// chunk type reports the same Tiger digest of its stored body.
pub fn version(_chunk_type: ChunkType, name: &[u8], store: &dyn ChunkStore) -> Vec<u8> {
    store
        .get(name)
        .map(|content| cove_core::crypto::version_hash(&content))
        .unwrap_or_default()
}

pub fn process_get(
    chunk_type: ChunkType,
    name: &[u8],
    version: &[u8],
    public_key: &[u8],
    store: &dyn ChunkStore,
) -> Result<GetOutcome, ErrorCode> {
    match chunk_type {
        ChunkType::Default => default::process_get(name, version, public_key, store),
        ChunkType::AppendableByAll => appendable::process_get(name, version, public_key, store),
        ChunkType::SignaturePacket => signature::process_get(name, version, public_key, store),
        ChunkType::ModifiableByOwner => modifiable::process_get(name, version, public_key, store),
    }
}

pub fn process_store(
    chunk_type: ChunkType,
    name: &[u8],
    content: &[u8],
    public_key: &[u8],
    store: &dyn ChunkStore,
) -> Result<(), ErrorCode> {
    match chunk_type {
        ChunkType::Default => default::process_store(name, content, public_key, store),
        ChunkType::AppendableByAll => appendable::process_store(name, content, public_key, store),
        ChunkType::SignaturePacket => signature::process_store(name, content, public_key, store),
        ChunkType::ModifiableByOwner => modifiable::process_store(name, content, public_key, store),
    }
}

pub fn process_delete(
    chunk_type: ChunkType,
    name: &[u8],
    version: &[u8],
    ownership_proof: &[u8],
    public_key: &[u8],
    store: &dyn ChunkStore,
) -> Result<(), ErrorCode> {
    match chunk_type {
        ChunkType::Default => {
            default::process_delete(name, version, ownership_proof, public_key, store)
        }
        ChunkType::AppendableByAll => {
            appendable::process_delete(name, version, ownership_proof, public_key, store)
        }
        ChunkType::SignaturePacket => {
            signature::process_delete(name, version, ownership_proof, public_key, store)
        }
        ChunkType::ModifiableByOwner => {
            modifiable::process_delete(name, version, ownership_proof, public_key, store)
        }
    }
}

/// Compute the post-image of a modify. The caller commits it.
pub fn process_modify(
    chunk_type: ChunkType,
    name: &[u8],
    content: &[u8],
    version: &[u8],
    public_key: &[u8],
    store: &dyn ChunkStore,
) -> Result<Vec<u8>, ErrorCode> {
    match chunk_type {
        ChunkType::Default => default::process_modify(name, content, version, public_key, store),
        ChunkType::AppendableByAll => {
            appendable::process_modify(name, content, version, public_key, store)
        }
        ChunkType::SignaturePacket => {
            signature::process_modify(name, content, version, public_key, store)
        }
        ChunkType::ModifiableByOwner => {
            modifiable::process_modify(name, content, version, public_key, store)
        }
    }
}

pub fn process_has(
    chunk_type: ChunkType,
    name: &[u8],
    version: &[u8],
    public_key: &[u8],
    store: &dyn ChunkStore,
) -> Result<(), ErrorCode> {
    match chunk_type {
        ChunkType::Default => default::process_has(name, version, public_key, store),
        ChunkType::AppendableByAll => appendable::process_has(name, version, public_key, store),
        ChunkType::SignaturePacket => signature::process_has(name, version, public_key, store),
        ChunkType::ModifiableByOwner => modifiable::process_has(name, version, public_key, store),
    }
}
