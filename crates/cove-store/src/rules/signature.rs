//! Rules for `SignaturePacket` chunks — write-once, self-signed identity
//! packets. The packet's `data` is the subject public key and the
//! signature must verify against that same key.

use cove_core::codes::ErrorCode;
use cove_core::crypto::{check_signature, content_hash, validate_key};
use cove_core::records::{self, SignedData};

use crate::rules::GetOutcome;
use crate::store::ChunkStore;

pub fn is_cacheable() -> bool {
    false
}

pub fn is_valid(name: &[u8], store: &dyn ChunkStore) -> bool {
    let Some(content) = store.get(name) else {
        return false;
    };
    let Ok(packet) = records::decode::<SignedData>(&content) else {
        return false;
    };
    name_matches(name, &packet) && check_signature(&packet.data, &packet.signature, &packet.data)
}

/// Name body = hash(data || signature).
fn name_matches(name: &[u8], packet: &SignedData) -> bool {
    let mut bound = packet.data.clone();
    bound.extend_from_slice(&packet.signature);
    name.len() == 33 && name[..32] == content_hash(&bound)
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
    if store.has(name) {
        return Err(ErrorCode::KeyNotUnique);
    }

    let packet: SignedData =
        records::decode(content).map_err(|_| ErrorCode::InvalidSignedData)?;

    if !validate_key(public_key) {
        return Err(ErrorCode::InvalidPublicKey);
    }

    if !check_signature(&packet.data, &packet.signature, public_key) {
        return Err(ErrorCode::SignatureVerificationFailure);
    }

    if !name_matches(name, &packet) {
        return Err(ErrorCode::GeneralError);
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

    let packet: SignedData = records::decode(&stored).map_err(|_| ErrorCode::GeneralError)?;

    if !validate_key(public_key) {
        return Err(ErrorCode::InvalidPublicKey);
    }

    if !check_signature(&packet.data, &packet.signature, public_key) {
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
    _name: &[u8],
    _content: &[u8],
    _version: &[u8],
    _public_key: &[u8],
    _store: &dyn ChunkStore,
) -> Result<Vec<u8>, ErrorCode> {
    // Identity packets are replaced by storing under a new name, never
    // modified in place.
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

#[cfg(test)]
mod tests {
    use super::*;
    use cove_core::chunk::{make_name, ChunkType};
    use cove_core::crypto::Keypair;

    use crate::store::MemChunkStore;

    fn self_signed(keys: &Keypair) -> (Vec<u8>, Vec<u8>) {
        let packet = SignedData::new(keys.public.to_vec(), keys.sign(&keys.public));
        let mut bound = packet.data.clone();
        bound.extend_from_slice(&packet.signature);
        let name = make_name(&content_hash(&bound), ChunkType::SignaturePacket);
        (name, records::encode(&packet).unwrap())
    }

    #[test]
    fn store_accepts_a_self_signed_packet() {
        let keys = Keypair::generate(vec![1; 20]);
        let store = MemChunkStore::new();
        let (name, body) = self_signed(&keys);
        process_store(&name, &body, &keys.public, &store).unwrap();
        store.store(&name, &body).unwrap();
        assert!(is_valid(&name, &store));
    }

    #[test]
    fn store_rejects_wrong_name() {
        let keys = Keypair::generate(vec![1; 20]);
        let store = MemChunkStore::new();
        let (_, body) = self_signed(&keys);
        let wrong = make_name(&[0u8; 32], ChunkType::SignaturePacket);
        assert_eq!(
            process_store(&wrong, &body, &keys.public, &store),
            Err(ErrorCode::GeneralError)
        );
    }

    #[test]
    fn write_once() {
        let keys = Keypair::generate(vec![1; 20]);
        let store = MemChunkStore::new();
        let (name, body) = self_signed(&keys);
        store.store(&name, &body).unwrap();
        assert_eq!(
            process_store(&name, &body, &keys.public, &store),
            Err(ErrorCode::KeyNotUnique)
        );
        assert_eq!(
            process_modify(&name, &body, b"", &keys.public, &store),
            Err(ErrorCode::InvalidModify)
        );
    }
}
