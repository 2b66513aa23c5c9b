//! The chunk action authority.
//!
//! A stateless dispatcher: extract the type tag from the name, hand the
//! operation to that type's rules, return the decision. The authority
//! never writes to the store — callers commit what it prescribes.

use std::sync::Arc;

use cove_core::chunk::ChunkType;
use cove_core::codes::ErrorCode;

use crate::rules;
pub use crate::rules::GetOutcome;
use crate::store::ChunkStore;

pub struct ChunkActionAuthority {
    store: Arc<dyn ChunkStore>,
}

impl ChunkActionAuthority {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self { store }
    }

    pub fn store_ref(&self) -> &dyn ChunkStore {
        self.store.as_ref()
    }

    /// Whether chunks of this name's type may be cached by intermediaries.
    pub fn cacheable(&self, name: &[u8]) -> Result<bool, ErrorCode> {
        Ok(rules::is_cacheable(ChunkType::from_name(name)?))
    }

    /// Whether the stored chunk satisfies its type's validity rule.
    pub fn validate(&self, name: &[u8]) -> Result<bool, ErrorCode> {
        let chunk_type = ChunkType::from_name(name)?;
        Ok(rules::is_valid(chunk_type, name, self.store.as_ref()))
    }

    /// Content-hash summary of the stored bytes.
    pub fn version(&self, name: &[u8]) -> Result<Vec<u8>, ErrorCode> {
        let chunk_type = ChunkType::from_name(name)?;
        Ok(rules::version(chunk_type, name, self.store.as_ref()))
    }

    /// The bytes a caller with `public_key` is entitled to see.
    pub fn get(
        &self,
        name: &[u8],
        version: &[u8],
        public_key: &[u8],
    ) -> Result<GetOutcome, ErrorCode> {
        let chunk_type = ChunkType::from_name(name)?;
        rules::process_get(chunk_type, name, version, public_key, self.store.as_ref())
    }

    /// Whether `content` may be committed under `name`. `Ok(())` means the
    /// caller should write `content` as given.
    pub fn store(&self, name: &[u8], content: &[u8], public_key: &[u8]) -> Result<(), ErrorCode> {
        let chunk_type = ChunkType::from_name(name)?;
        rules::process_store(chunk_type, name, content, public_key, self.store.as_ref())
    }

    /// Whether the chunk may be removed. Deleting an absent chunk succeeds.
    pub fn delete(
        &self,
        name: &[u8],
        version: &[u8],
        ownership_proof: &[u8],
        public_key: &[u8],
    ) -> Result<(), ErrorCode> {
        let chunk_type = ChunkType::from_name(name)?;
        rules::process_delete(
            chunk_type,
            name,
            version,
            ownership_proof,
            public_key,
            self.store.as_ref(),
        )
    }

    /// The post-image the store must commit to apply this modify.
    pub fn modify(
        &self,
        name: &[u8],
        content: &[u8],
        version: &[u8],
        public_key: &[u8],
    ) -> Result<Vec<u8>, ErrorCode> {
        let chunk_type = ChunkType::from_name(name)?;
        rules::process_modify(
            chunk_type,
            name,
            content,
            version,
            public_key,
            self.store.as_ref(),
        )
    }

    /// Policy-aware existence check.
    pub fn has(&self, name: &[u8], version: &[u8], public_key: &[u8]) -> Result<(), ErrorCode> {
        let chunk_type = ChunkType::from_name(name)?;
        rules::process_has(chunk_type, name, version, public_key, self.store.as_ref())
    }
}
