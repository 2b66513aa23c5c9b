//! The closed error set shared by the chunk authority and the transport.
//!
//! Every fallible operation in the substrate reports one of these codes.
//! Success is `Ok(_)` — there is no success variant. Handlers must never
//! panic across this boundary; a condition that has no better mapping is
//! `GeneralError`.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorCode {
    // ── Input validation ──────────────────────────────────────────────────
    #[error("public key failed validation")]
    InvalidPublicKey,

    #[error("data does not parse as signed data")]
    InvalidSignedData,

    #[error("payload failed to parse")]
    ParseFailure,

    #[error("modify request carries the wrong combination of control fields")]
    InvalidModify,

    #[error("chunk name carries an unknown type tag")]
    InvalidChunkType,

    // ── Policy ────────────────────────────────────────────────────────────
    #[error("caller is not the chunk owner")]
    NotOwner,

    #[error("owner has disallowed appends")]
    AppendDisallowed,

    #[error("signature verification failed")]
    SignatureVerificationFailure,

    #[error("a chunk with this name already exists")]
    KeyNotUnique,

    #[error("chunk not found")]
    FailedToFindChunk,

    // ── Transport ─────────────────────────────────────────────────────────
    #[error("send failed")]
    SendFailure,

    #[error("send timed out")]
    SendTimeout,

    #[error("receive failed")]
    ReceiveFailure,

    #[error("receive timed out")]
    ReceiveTimeout,

    #[error("message exceeds the transport size limit")]
    MessageSizeTooLarge,

    #[error("transport is already listening")]
    AlreadyStarted,

    #[error("invalid port")]
    InvalidPort,

    #[error("invalid address")]
    InvalidAddress,

    #[error("failed to set a socket option")]
    SetOptionFailure,

    #[error("failed to bind")]
    BindError,

    #[error("failed to listen")]
    ListenError,

    // ── Fallback ──────────────────────────────────────────────────────────
    #[error("general error")]
    GeneralError,
}
