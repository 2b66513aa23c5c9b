//! Rules for `Default` chunks — immutable, content-addressed.
//!
//! The name body is the BLAKE3 hash of the content, so validity is
//! self-evident and a duplicate store of identical bytes is harmless.

use cove_core::chunk::short_name;
use cove_core::codes::ErrorCode;
use cove_core::crypto::{check_signature, content_hash, validate_key};
use cove_core::records::{self, SignedData};

use crate::rules::GetOutcome;
use crate::store::ChunkStore;

pub fn is_cacheable() -> bool {
    true
}

/// The name body must equal the hash of the stored bytes.
pub fn is_valid(name: &[u8], store: &dyn ChunkStore) -> bool {
    match store.get(name) {
        Some(content) => name_matches(name, &content),
        None => false,
    }
}

fn name_matches(name: &[u8], content: &[u8]) -> bool {
    name.len() == 33 && name[..32] == content_hash(content)
}

pub fn process_get(
    name: &[u8],
    _version: &[u8],
    _public_key: &[u8],
    store: &dyn ChunkStore,
) -> Result<GetOutcome, ErrorCode> {
    match store.get(name) {
        Some(content) => Ok(GetOutcome::Owner(content.to_vec())),
        None => Err(ErrorCode::FailedToFindChunk),
    }
}

pub fn process_store(
    name: &[u8],
    content: &[u8],
    public_key: &[u8],
    store: &dyn ChunkStore,
) -> Result<(), ErrorCode> {
    if !validate_key(public_key) {
        return Err(ErrorCode::InvalidPublicKey);
    }

    if !name_matches(name, content) {
        tracing::debug!(name = %short_name(name), "store: name does not hash the content");
        return Err(ErrorCode::GeneralError);
    }

    if let Some(existing) = store.get(name) {
        // Same bytes under the same hash: storing again is a no-op.
        return if existing.as_ref() == content {
            Ok(())
        } else {
            Err(ErrorCode::KeyNotUnique)
        };
    }

    Ok(())
}

pub fn process_delete(
    name: &[u8],
    _version: &[u8],
    ownership_proof: &[u8],
    public_key: &[u8],
    store: &dyn ChunkStore,
) -> Result<(), ErrorCode> {
    if !store.has(name) {
        return Ok(());
    }

    if !validate_key(public_key) {
        return Err(ErrorCode::InvalidPublicKey);
    }

    let proof: SignedData =
        records::decode(ownership_proof).map_err(|_| ErrorCode::NotOwner)?;
    if !check_signature(&proof.data, &proof.signature, public_key) {
        return Err(ErrorCode::NotOwner);
    }

    Ok(())
}

pub fn process_modify(
    _name: &[u8],
    _content: &[u8],
    _version: &[u8],
    _public_key: &[u8],
    _store: &dyn ChunkStore,
) -> Result<Vec<u8>, ErrorCode> {
    // Content-addressed chunks never change.
    Err(ErrorCode::InvalidModify)
}

pub fn process_has(
    name: &[u8],
    _version: &[u8],
    _public_key: &[u8],
    store: &dyn ChunkStore,
) -> Result<(), ErrorCode> {
    if !store.has(name) {
        return Err(ErrorCode::FailedToFindChunk);
    }
    Ok(())
}
