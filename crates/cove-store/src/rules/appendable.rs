//! Rules for `AppendableByAll` chunks — a drop-box under owner control.
//!
//! Ownership is proved by a signature that verifies against the stored
//! `allow_others_to_append` control field. Owners read the full record
//! (with the appendix log cleared in the returned copy), truncate the log
//! by re-asserting a control field, or replace a control field outright.
//! Outsiders see only the identity block and may append a single signed
//! record while the first byte of the control field allows it.

use cove_core::chunk::{short_name, APPENDABLE_BY_ALL_FLAG};
use cove_core::codes::ErrorCode;
use cove_core::crypto::{check_signature, validate_key};
use cove_core::records::{self, AppendableByAll, ModifyAppendableByAll, SignedData};

use crate::rules::GetOutcome;
use crate::store::ChunkStore;

pub fn is_cacheable() -> bool {
    false
}

pub fn is_valid(name: &[u8], store: &dyn ChunkStore) -> bool {
    match store.get(name) {
        Some(content) => !content.is_empty(),
        None => {
            tracing::debug!(name = %short_name(name), "no stored body to validate");
            false
        }
    }
}

fn is_owner(existing: &AppendableByAll, public_key: &[u8]) -> bool {
    check_signature(
        &existing.allow_others_to_append.data,
        &existing.allow_others_to_append.signature,
        public_key,
    )
}

pub fn process_get(
    name: &[u8],
    _version: &[u8],
    public_key: &[u8],
    store: &dyn ChunkStore,
) -> Result<GetOutcome, ErrorCode> {
    let Some(stored) = store.get(name) else {
        tracing::debug!(name = %short_name(name), "get: chunk not found");
        return Err(ErrorCode::FailedToFindChunk);
    };

    let existing: AppendableByAll =
        records::decode(&stored).map_err(|_| ErrorCode::GeneralError)?;

    if !validate_key(public_key) {
        return Err(ErrorCode::InvalidPublicKey);
    }

    if is_owner(&existing, public_key) {
        // Owner receives the record with the appendix log cleared. The
        // stored chunk itself is untouched.
        let mut view = existing;
        view.appendices.clear();
        Ok(GetOutcome::Owner(records::encode(&view)?))
    } else {
        // Outsiders see only the identity block.
        Ok(GetOutcome::NotOwner(records::encode(&existing.identity_key)?))
    }
}

pub fn process_store(
    name: &[u8],
    content: &[u8],
    public_key: &[u8],
    store: &dyn ChunkStore,
) -> Result<(), ErrorCode> {
    if store.has(name) {
        tracing::debug!(name = %short_name(name), "store: chunk already exists");
        return Err(ErrorCode::KeyNotUnique);
    }

    let chunk: AppendableByAll =
        records::decode(content).map_err(|_| ErrorCode::InvalidSignedData)?;

    if !validate_key(public_key) {
        return Err(ErrorCode::InvalidPublicKey);
    }

    if !check_signature(
        &chunk.allow_others_to_append.data,
        &chunk.allow_others_to_append.signature,
        public_key,
    ) {
        return Err(ErrorCode::SignatureVerificationFailure);
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
    let Some(stored) = store.get(name) else {
        tracing::debug!(name = %short_name(name), "delete: already absent");
        return Ok(());
    };

    let existing: AppendableByAll =
        records::decode(&stored).map_err(|_| ErrorCode::GeneralError)?;

    if !validate_key(public_key) {
        return Err(ErrorCode::InvalidPublicKey);
    }

    if !is_owner(&existing, public_key) {
        return Err(ErrorCode::SignatureVerificationFailure);
    }

    let proof: SignedData =
        records::decode(ownership_proof).map_err(|_| ErrorCode::NotOwner)?;
    if !check_signature(&proof.data, &proof.signature, public_key) {
        return Err(ErrorCode::NotOwner);
    }

    Ok(())
}

pub fn process_modify(
    name: &[u8],
    content: &[u8],
    _version: &[u8],
    public_key: &[u8],
    store: &dyn ChunkStore,
) -> Result<Vec<u8>, ErrorCode> {
    let Some(stored) = store.get(name) else {
        tracing::debug!(name = %short_name(name), "modify: chunk not found");
        return Err(ErrorCode::FailedToFindChunk);
    };

    let mut existing: AppendableByAll =
        records::decode(&stored).map_err(|_| ErrorCode::GeneralError)?;

    if !validate_key(public_key) {
        return Err(ErrorCode::InvalidPublicKey);
    }

    if is_owner(&existing, public_key) {
        let request: ModifyAppendableByAll =
            records::decode(content).map_err(|_| ErrorCode::ParseFailure)?;

        let append_field_empty = request.allow_others_to_append.data.is_empty();
        let identity_field_empty = request.identity_key.data.is_empty();

        // Exactly one control field per modify.
        if append_field_empty == identity_field_empty {
            return Err(ErrorCode::InvalidModify);
        }

        if !append_field_empty {
            if !check_signature(
                &request.allow_others_to_append.data,
                &request.allow_others_to_append.signature,
                public_key,
            ) {
                return Err(ErrorCode::SignatureVerificationFailure);
            }

            if request.allow_others_to_append.data == existing.allow_others_to_append.data {
                // Re-asserting the current value truncates the appendix log.
                existing.appendices.clear();
            } else {
                // Replace the control field, leave appendices untouched.
                existing.allow_others_to_append = request.allow_others_to_append;
            }
        } else {
            if !check_signature(
                &request.identity_key.data,
                &request.identity_key.signature,
                public_key,
            ) {
                return Err(ErrorCode::SignatureVerificationFailure);
            }

            if request.identity_key.data == existing.identity_key.data {
                existing.appendices.clear();
            } else {
                existing.identity_key = request.identity_key;
            }
        }

        records::encode(&existing)
    } else {
        let appendability = existing.allow_others_to_append.data.first().copied();
        if appendability != Some(APPENDABLE_BY_ALL_FLAG) {
            tracing::debug!(name = %short_name(name), "modify: appending disallowed by owner");
            return Err(ErrorCode::AppendDisallowed);
        }

        let appendix: SignedData =
            records::decode(content).map_err(|_| ErrorCode::InvalidSignedData)?;

        if !check_signature(&appendix.data, &appendix.signature, public_key) {
            return Err(ErrorCode::SignatureVerificationFailure);
        }

        existing.appendices.push(appendix);
        records::encode(&existing)
    }
}

pub fn process_has(
    name: &[u8],
    _version: &[u8],
    _public_key: &[u8],
    store: &dyn ChunkStore,
) -> Result<(), ErrorCode> {
    if !store.has(name) {
        tracing::debug!(name = %short_name(name), "has: chunk not found");
        return Err(ErrorCode::FailedToFindChunk);
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
