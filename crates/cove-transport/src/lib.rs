//! cove-transport — the framed TCP control transport.
//!
//! One message on the wire is a 4-byte big-endian length followed by that
//! many payload bytes. Each connection runs as its own task, so handlers
//! for one connection never race each other while separate connections
//! progress in parallel.

pub mod connection;
pub mod transport;

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;

use cove_core::codes::ErrorCode;

/// A reply produced by a message handler.
#[derive(Debug, Clone)]
pub struct Response {
    pub payload: Vec<u8>,
    /// How long to wait for the peer's next message after this reply.
    /// `IMMEDIATE_TIMEOUT` means no further message is expected; the
    /// connection closes once the reply is written.
    pub response_timeout: Duration,
}

impl Response {
    /// Reply and close.
    pub fn terminal(payload: Vec<u8>) -> Self {
        Self {
            payload,
            response_timeout: cove_core::wire::IMMEDIATE_TIMEOUT,
        }
    }
}

/// The transport's two observable outputs.
///
/// `on_message_received` runs on the connection's task: it may suspend,
/// and no deadline ticks while it does. Returning `None` drops the
/// message without reply and closes the connection — the defensive
/// posture for malformed or unwanted traffic.
#[async_trait::async_trait]
pub trait TransportHandler: Send + Sync {
    async fn on_message_received(&self, payload: Bytes, peer: SocketAddr) -> Option<Response>;

    fn on_error(&self, code: ErrorCode, peer: Option<SocketAddr>);
}

pub use transport::TcpTransport;
