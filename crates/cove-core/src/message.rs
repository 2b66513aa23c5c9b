//! Control-plane messages between clients, vaults, and the vault manager.
//!
//! A control message is a one-byte kind tag followed by a bincode body.
//! Unknown tags are the receiver's problem; the vault manager logs and
//! drops them.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::codes::ErrorCode;

/// Message kind tags. The numeric values are the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Ping = 1,
    StartVaultRequest = 2,
    StartVaultResponse = 3,
    VaultIdentityRequest = 4,
    VaultIdentityResponse = 5,
    StopVaultRequest = 6,
    VaultShutdownResponse = 7,
    UpdateIntervalRequest = 8,
    UpdateIntervalResponse = 9,
}

impl TryFrom<u8> for MessageKind {
    type Error = ErrorCode;

    fn try_from(value: u8) -> Result<Self, ErrorCode> {
        match value {
            1 => Ok(MessageKind::Ping),
            2 => Ok(MessageKind::StartVaultRequest),
            3 => Ok(MessageKind::StartVaultResponse),
            4 => Ok(MessageKind::VaultIdentityRequest),
            5 => Ok(MessageKind::VaultIdentityResponse),
            6 => Ok(MessageKind::StopVaultRequest),
            7 => Ok(MessageKind::VaultShutdownResponse),
            8 => Ok(MessageKind::UpdateIntervalRequest),
            9 => Ok(MessageKind::UpdateIntervalResponse),
            _ => Err(ErrorCode::ParseFailure),
        }
    }
}

/// Prefix a body with its kind tag.
pub fn wrap_message(kind: MessageKind, body: &[u8]) -> Vec<u8> {
    let mut wrapped = Vec::with_capacity(1 + body.len());
    wrapped.push(kind as u8);
    wrapped.extend_from_slice(body);
    wrapped
}

/// Split a wrapped message into kind and body.
pub fn unwrap_message(message: &[u8]) -> Result<(MessageKind, &[u8]), ErrorCode> {
    match message.split_first() {
        Some((&tag, body)) => Ok((MessageKind::try_from(tag)?, body)),
        None => Err(ErrorCode::ParseFailure),
    }
}

/// Encode a typed payload and wrap it in one step.
pub fn encode_message<T: Serialize>(kind: MessageKind, payload: &T) -> Result<Vec<u8>, ErrorCode> {
    let body = bincode::serialize(payload).map_err(|_| ErrorCode::GeneralError)?;
    Ok(wrap_message(kind, &body))
}

/// Decode a typed payload from an unwrapped body.
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ErrorCode> {
    bincode::deserialize(body).map_err(|_| ErrorCode::ParseFailure)
}

// ── Payloads ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartVaultRequest {
    pub account_name: String,
    /// Serialized keys blob (see `crypto::Keypair::to_blob`).
    pub keys: Vec<u8>,
    /// Endpoint of an existing peer, or empty for a first node.
    pub bootstrap_endpoint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartVaultResponse {
    pub result: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultIdentityRequest {
    pub process_index: u32,
}

/// Identity hand-off to a freshly spawned vault. Both fields are empty
/// when the process index is unknown or the keys fail to serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultIdentityResponse {
    pub account_name: String,
    pub keys: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopVaultRequest {
    pub identity: Vec<u8>,
    pub data: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopVaultResponse {
    pub result: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateIntervalRequest {
    /// `None` reads the current interval; `Some` asks to change it.
    pub new_update_interval: Option<u64>,
}

/// `update_interval` of 0 means a requested change was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateIntervalResponse {
    pub update_interval: u64,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_unwrap_round_trip() {
        let wrapped = wrap_message(MessageKind::Ping, b"payload");
        let (kind, body) = unwrap_message(&wrapped).unwrap();
        assert_eq!(kind, MessageKind::Ping);
        assert_eq!(body, b"payload");
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(unwrap_message(&[0x7f, 1, 2]), Err(ErrorCode::ParseFailure));
        assert_eq!(unwrap_message(&[]), Err(ErrorCode::ParseFailure));
    }

    #[test]
    fn typed_round_trip() {
        let request = StartVaultRequest {
            account_name: "alice".into(),
            keys: vec![1, 2, 3],
            bootstrap_endpoint: "10.0.0.1:5483".into(),
        };
        let wrapped = encode_message(MessageKind::StartVaultRequest, &request).unwrap();
        let (kind, body) = unwrap_message(&wrapped).unwrap();
        assert_eq!(kind, MessageKind::StartVaultRequest);
        let back: StartVaultRequest = decode_body(body).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn update_interval_none_reads() {
        let request = UpdateIntervalRequest {
            new_update_interval: None,
        };
        let wrapped = encode_message(MessageKind::UpdateIntervalRequest, &request).unwrap();
        let (_, body) = unwrap_message(&wrapped).unwrap();
        let back: UpdateIntervalRequest = decode_body(body).unwrap();
        assert_eq!(back.new_update_interval, None);
    }
}
