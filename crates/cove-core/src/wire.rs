//! Wire framing for the control transport.
//!
//! Every message on the wire is `[u32 big-endian length][payload]`. The
//! constants here ARE the protocol: changing a limit or a timeout changes
//! interoperability with every deployed peer.

use std::time::Duration;

use crate::codes::ErrorCode;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Size of the length prefix in bytes.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest payload the transport will send or accept. Frames above this
/// are refused by closing the connection without reply.
pub const MAX_TRANSPORT_MESSAGE_SIZE: usize = 1024 * 1024;

/// Largest single read the receive loop issues while accumulating a frame.
pub const MAX_TRANSPORT_CHUNK_SIZE: usize = 64 * 1024;

/// Response timeout applied to a connection before the first message
/// names its own.
pub const DEFAULT_INITIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a read may sit with no partial progress before the connection
/// is presumed dead. Reset on every partial read.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(3);

/// Floor for per-message send timeouts.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Sentinel response timeout: no reply expected, close after the write
/// completes.
pub const IMMEDIATE_TIMEOUT: Duration = Duration::ZERO;

/// Milliseconds of send budget granted per payload byte.
pub const TIMEOUT_FACTOR_MS_PER_BYTE: u64 = 1;

/// Listening port range the vault manager scans, first free wins.
pub const MIN_PORT: u16 = 5483;
pub const MAX_PORT: u16 = 5582;

// ── Framing ───────────────────────────────────────────────────────────────────

/// Encode one frame: length prefix followed by the payload, as a single
/// buffer so the two reach the socket in one write.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, ErrorCode> {
    if payload.len() > MAX_TRANSPORT_MESSAGE_SIZE {
        return Err(ErrorCode::MessageSizeTooLarge);
    }
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decode a length prefix. The caller then reads exactly that many bytes.
pub fn decode_frame_len(header: &[u8; FRAME_HEADER_LEN]) -> Result<usize, ErrorCode> {
    let len = u32::from_be_bytes(*header) as usize;
    if len > MAX_TRANSPORT_MESSAGE_SIZE {
        return Err(ErrorCode::MessageSizeTooLarge);
    }
    Ok(len)
}

/// Send budget for a frame of `byte_count` bytes:
/// `max(byte_count * factor, MIN_TIMEOUT)`.
pub fn send_timeout(byte_count: usize) -> Duration {
    let budget = Duration::from_millis(byte_count as u64 * TIMEOUT_FACTOR_MS_PER_BYTE);
    budget.max(MIN_TIMEOUT)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
