//! Chunk body records.
//!
//! The schema of a chunk body is selected by the chunk's type tag. Records
//! are bincode-encoded; the encoding helpers map any codec failure to the
//! shared error set so handlers never see a serializer error type.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::codes::ErrorCode;

/// A byte string plus a signature over it. The unit of authenticated data
/// throughout the chunk layer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignedData {
    pub data: Vec<u8>,
    pub signature: Vec<u8>,
}

impl SignedData {
    pub fn new(data: Vec<u8>, signature: Vec<u8>) -> Self {
        Self { data, signature }
    }

    /// A record with no data. Used in modify requests to mark the control
    /// field that is NOT being replaced.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Body of an `AppendableByAll` chunk: a small append-log under owner
/// control.
///
/// `identity_key` is the owner's identity block. The first byte of
/// `allow_others_to_append.data` gates outsider appends. `appendices`
/// holds outsider contributions in insertion order and is visible only to
/// the owner on get.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendableByAll {
    pub identity_key: SignedData,
    pub allow_others_to_append: SignedData,
    pub appendices: Vec<SignedData>,
}

/// Owner's modify request for an `AppendableByAll` chunk. Exactly one of
/// the two fields must carry non-empty `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyAppendableByAll {
    pub allow_others_to_append: SignedData,
    pub identity_key: SignedData,
}

// ── Encoding ──────────────────────────────────────────────────────────────────

pub fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, ErrorCode> {
    bincode::serialize(record).map_err(|_| ErrorCode::GeneralError)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ErrorCode> {
    bincode::deserialize(bytes).map_err(|_| ErrorCode::ParseFailure)
}
