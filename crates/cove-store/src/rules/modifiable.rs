//! Rules for `ModifiableByOwner` chunks — a single-owner mutable blob.
//!
//! The stored body is one `SignedData` signed by the owner. Mutation and
//! deletion are gated on that signature; reads are open (confidentiality
//! of the payload is the owner's concern, not the substrate's).

use cove_core::codes::ErrorCode;
use cove_core::crypto::{check_signature, validate_key};
use cove_core::records::{self, SignedData};

use crate::rules::GetOutcome;
use crate::store::ChunkStore;

pub fn is_cacheable() -> bool {
    false
}

pub fn is_valid(name: &[u8], store: &dyn ChunkStore) -> bool {
    match store.get(name) {
        Some(content) => records::decode::<SignedData>(&content).is_ok(),
        None => false,
    }
}

pub fn process_get(
    name: &[u8],
    _version: &[u8],
    public_key: &[u8],
    store: &dyn ChunkStore,
) -> Result<GetOutcome, ErrorCode> {
    let Some(stored) = store.get(name) else {
        return Err(ErrorCode::FailedToFindChunk);
    };
    if !validate_key(public_key) {
        return Err(ErrorCode::InvalidPublicKey);
    }
    Ok(GetOutcome::Owner(stored.to_vec()))
}

pub fn process_store(
    name: &[u8],
    content: &[u8],
    public_key: &[u8],
    store: &dyn ChunkStore,
) -> Result<(), ErrorCode> {
    if store.has(name) {
        return Err(ErrorCode::KeyNotUnique);
    }

    let blob: SignedData = records::decode(content).map_err(|_| ErrorCode::InvalidSignedData)?;

    if !validate_key(public_key) {
        return Err(ErrorCode::InvalidPublicKey);
    }

    if !check_signature(&blob.data, &blob.signature, public_key) {
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
        return Ok(());
    };

    let existing: SignedData = records::decode(&stored).map_err(|_| ErrorCode::GeneralError)?;

    if !validate_key(public_key) {
        return Err(ErrorCode::InvalidPublicKey);
    }

    if !check_signature(&existing.data, &existing.signature, public_key) {
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
        return Err(ErrorCode::FailedToFindChunk);
    };

    let existing: SignedData = records::decode(&stored).map_err(|_| ErrorCode::GeneralError)?;

    if !validate_key(public_key) {
        return Err(ErrorCode::InvalidPublicKey);
    }

    if !check_signature(&existing.data, &existing.signature, public_key) {
        return Err(ErrorCode::NotOwner);
    }

    let replacement: SignedData =
        records::decode(content).map_err(|_| ErrorCode::InvalidSignedData)?;
    if !check_signature(&replacement.data, &replacement.signature, public_key) {
        return Err(ErrorCode::SignatureVerificationFailure);
    }

    records::encode(&replacement)
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

#[cfg(test)]
mod tests {
    use super::*;
    use cove_core::chunk::{make_name, ChunkType};
    use cove_core::crypto::Keypair;

    use crate::store::MemChunkStore;

    fn seeded() -> (MemChunkStore, Vec<u8>, Keypair) {
        let owner = Keypair::generate(vec![1; 20]);
        let store = MemChunkStore::new();
        let name = make_name(&[0x42; 32], ChunkType::ModifiableByOwner);
        let blob = SignedData::new(b"v1".to_vec(), owner.sign(b"v1"));
        store.store(&name, &records::encode(&blob).unwrap()).unwrap();
        (store, name, owner)
    }

    #[test]
    fn owner_can_replace_content() {
        let (store, name, owner) = seeded();
        let replacement = SignedData::new(b"v2".to_vec(), owner.sign(b"v2"));
        let new_body = process_modify(
            &name,
            &records::encode(&replacement).unwrap(),
            b"",
            &owner.public,
            &store,
        )
        .unwrap();
        let decoded: SignedData = records::decode(&new_body).unwrap();
        assert_eq!(decoded.data, b"v2");
    }

    #[test]
    fn outsider_cannot_modify() {
        let (store, name, _) = seeded();
        let outsider = Keypair::generate(vec![2; 20]);
        let replacement = SignedData::new(b"v2".to_vec(), outsider.sign(b"v2"));
        assert_eq!(
            process_modify(
                &name,
                &records::encode(&replacement).unwrap(),
                b"",
                &outsider.public,
                &store,
            ),
            Err(ErrorCode::NotOwner)
        );
    }

    #[test]
    fn get_is_open_to_any_valid_key() {
        let (store, name, _) = seeded();
        let outsider = Keypair::generate(vec![2; 20]);
        let outcome = process_get(&name, b"", &outsider.public, &store).unwrap();
        assert!(matches!(outcome, GetOutcome::Owner(_)));
    }
}
