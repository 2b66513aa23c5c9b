//! Chunk naming.
//!
//! A chunk name is an opaque byte string. The only structure the substrate
//! imposes is the final byte: a type tag selecting the policy handler.
//! Everything else in the name (content hash, identifier) belongs to the
//! layer that minted it.

use crate::codes::ErrorCode;

/// Chunk type tag — the last byte of a chunk name.
///
/// The set is closed. A name whose tag byte matches none of these is
/// rejected at dispatch with `InvalidChunkType`; there is no catch-all
/// handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkType {
    /// Immutable content-addressed chunk. The name body is the BLAKE3 hash
    /// of the content.
    Default = 0,

    /// Owner-controlled append log. Outsiders may append signed records
    /// when the owner's control field allows it.
    AppendableByAll = 1,

    /// Self-signed identity packet. Write-once.
    SignaturePacket = 2,

    /// Single-owner mutable blob.
    ModifiableByOwner = 3,
}

/// Sentinel written as the first byte of the appendability control field
/// when outsiders may append. Equal to the `AppendableByAll` tag value.
pub const APPENDABLE_BY_ALL_FLAG: u8 = ChunkType::AppendableByAll as u8;

impl ChunkType {
    /// Decode a tag byte. Unknown values are an error, not a variant.
    pub fn from_tag(tag: u8) -> Result<Self, ErrorCode> {
        match tag {
            0 => Ok(ChunkType::Default),
            1 => Ok(ChunkType::AppendableByAll),
            2 => Ok(ChunkType::SignaturePacket),
            3 => Ok(ChunkType::ModifiableByOwner),
            _ => Err(ErrorCode::InvalidChunkType),
        }
    }

    /// Extract the type tag from a chunk name (its last byte).
    pub fn from_name(name: &[u8]) -> Result<Self, ErrorCode> {
        match name.last() {
            Some(&tag) => Self::from_tag(tag),
            None => Err(ErrorCode::InvalidChunkType),
        }
    }
}

/// Mint a name for a given tag: `body || tag`.
pub fn make_name(body: &[u8], chunk_type: ChunkType) -> Vec<u8> {
    let mut name = Vec::with_capacity(body.len() + 1);
    name.extend_from_slice(body);
    name.push(chunk_type as u8);
    name
}

/// Short printable form of a name for log lines.
pub fn short_name(name: &[u8]) -> String {
    hex::encode(&name[..name.len().min(4)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_last_byte() {
        let name = make_name(&[0xaa; 32], ChunkType::AppendableByAll);
        assert_eq!(name.len(), 33);
        assert_eq!(ChunkType::from_name(&name).unwrap(), ChunkType::AppendableByAll);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(ChunkType::from_tag(0xff), Err(ErrorCode::InvalidChunkType));
        assert_eq!(
            ChunkType::from_name(&[1, 2, 0x7f]),
            Err(ErrorCode::InvalidChunkType)
        );
    }

    #[test]
    fn empty_name_is_rejected() {
        assert_eq!(ChunkType::from_name(&[]), Err(ErrorCode::InvalidChunkType));
    }

    #[test]
    fn appendability_flag_matches_tag() {
        assert_eq!(APPENDABLE_BY_ALL_FLAG, 1);
    }
}
