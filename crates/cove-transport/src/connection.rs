//! One connection's send/receive state machine.
//!
//! Receives compose two deadlines: the response deadline, fixed when the
//! read cycle begins, and a stall deadline reset on every partial read.
//! The earlier of the two bounds each await. While a message is being
//! dispatched to the handler no deadline runs at all — user code must not
//! trip transport timers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};

use cove_core::codes::ErrorCode;
use cove_core::wire::{
    self, DEFAULT_INITIAL_TIMEOUT, FRAME_HEADER_LEN, IMMEDIATE_TIMEOUT, MAX_TRANSPORT_CHUNK_SIZE,
    MAX_TRANSPORT_MESSAGE_SIZE, STALL_TIMEOUT,
};

use crate::{Response, TransportHandler};

/// Fill `buf` from the stream, bounded by the response deadline and a
/// stall deadline that resets whenever bytes arrive.
async fn read_full<S>(
    stream: &mut S,
    buf: &mut [u8],
    response_deadline: Instant,
) -> Result<(), ErrorCode>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let stall_deadline = Instant::now() + STALL_TIMEOUT;
        let limit = (filled + MAX_TRANSPORT_CHUNK_SIZE).min(buf.len());
        let deadline = response_deadline.min(stall_deadline);
        match timeout_at(deadline, stream.read(&mut buf[filled..limit])).await {
            Ok(Ok(0)) => return Err(ErrorCode::ReceiveFailure),
            Ok(Ok(n)) => filled += n,
            Ok(Err(_)) => return Err(ErrorCode::ReceiveFailure),
            Err(_) => return Err(ErrorCode::ReceiveTimeout),
        }
    }
    Ok(())
}

/// Read one frame: size prefix, then payload accumulated in chunk-sized
/// reads. An oversized prefix refuses the frame by erroring out, which
/// closes the connection without reply.
pub(crate) async fn read_frame<S>(
    stream: &mut S,
    response_timeout: Duration,
) -> Result<Vec<u8>, ErrorCode>
where
    S: AsyncRead + Unpin,
{
    let response_deadline = Instant::now() + response_timeout;

    let mut header = [0u8; FRAME_HEADER_LEN];
    read_full(stream, &mut header, response_deadline).await?;
    let len = wire::decode_frame_len(&header)?;

    let mut payload = vec![0u8; len];
    read_full(stream, &mut payload, response_deadline).await?;
    Ok(payload)
}

/// Write one frame as a single buffer so the prefix and payload reach the
/// wire together. The send budget scales with the frame size.
pub(crate) async fn write_frame<S>(stream: &mut S, payload: &[u8]) -> Result<(), ErrorCode>
where
    S: AsyncWrite + Unpin,
{
    let frame = wire::encode_frame(payload)?;
    match timeout(wire::send_timeout(frame.len()), stream.write_all(&frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(ErrorCode::SendFailure),
        Err(_) => Err(ErrorCode::SendTimeout),
    }
}

/// The read-dispatch-write loop shared by inbound connections and
/// outbound connections awaiting a reply. Returns `Ok` when the
/// conversation ends normally (handler declined to reply, terminal
/// response written, or the reply was invalid and the connection closes).
pub(crate) async fn conversation<S>(
    stream: &mut S,
    peer: SocketAddr,
    handler: &Arc<dyn TransportHandler>,
    mut response_timeout: Duration,
) -> Result<(), ErrorCode>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let payload = read_frame(stream, response_timeout).await?;

        // No deadline while the handler runs.
        let response = handler
            .on_message_received(Bytes::from(payload), peer)
            .await;

        let Some(Response {
            payload: reply,
            response_timeout: next_timeout,
        }) = response
        else {
            return Ok(());
        };

        if reply.is_empty() || reply.len() > MAX_TRANSPORT_MESSAGE_SIZE {
            tracing::info!(peer = %peer, size = reply.len(), "invalid response size, closing");
            return Ok(());
        }

        write_frame(stream, &reply).await?;

        if next_timeout == IMMEDIATE_TIMEOUT {
            return Ok(());
        }
        response_timeout = next_timeout;
    }
}

/// Drive an accepted connection until it closes.
pub(crate) async fn serve_inbound(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn TransportHandler>,
) {
    if let Err(code) = conversation(&mut stream, peer, &handler, DEFAULT_INITIAL_TIMEOUT).await {
        handler.on_error(code, Some(peer));
    }
}

/// Connect out, send one frame, then (unless the caller expects no reply)
/// run the conversation loop for the response.
pub(crate) async fn run_outbound(
    peer: SocketAddr,
    data: Vec<u8>,
    response_timeout: Duration,
    handler: Arc<dyn TransportHandler>,
) {
    if let Err(code) = drive_outbound(peer, data, response_timeout, &handler).await {
        handler.on_error(code, Some(peer));
    }
}

async fn drive_outbound(
    peer: SocketAddr,
    data: Vec<u8>,
    response_timeout: Duration,
    handler: &Arc<dyn TransportHandler>,
) -> Result<(), ErrorCode> {
    let mut stream = match timeout(DEFAULT_INITIAL_TIMEOUT, TcpStream::connect(peer)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(_)) => return Err(ErrorCode::SendFailure),
        Err(_) => return Err(ErrorCode::SendTimeout),
    };

    write_frame(&mut stream, &data).await?;

    if response_timeout == IMMEDIATE_TIMEOUT {
        return Ok(());
    }
    conversation(&mut stream, peer, handler, response_timeout).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_round_trip_over_a_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"ping").await.unwrap();
        let payload = read_frame(&mut b, Duration::from_secs(1)).await.unwrap();
        assert_eq!(payload, b"ping");
    }

    #[tokio::test]
    async fn chunked_payload_is_reassembled() {
        let big = vec![0xabu8; MAX_TRANSPORT_CHUNK_SIZE * 2 + 17];
        let (mut a, mut b) = tokio::io::duplex(256 * 1024);
        write_frame(&mut a, &big).await.unwrap();
        let payload = read_frame(&mut b, Duration::from_secs(5)).await.unwrap();
        assert_eq!(payload, big);
    }

    #[tokio::test]
    async fn oversized_prefix_is_refused() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let bad_len = (MAX_TRANSPORT_MESSAGE_SIZE as u32 + 1).to_be_bytes();
        a.write_all(&bad_len).await.unwrap();
        let err = read_frame(&mut b, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, ErrorCode::MessageSizeTooLarge);
    }

    #[tokio::test]
    async fn closed_peer_is_a_receive_failure() {
        let (a, mut b) = tokio::io::duplex(1024);
        drop(a);
        let err = read_frame(&mut b, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, ErrorCode::ReceiveFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out_on_the_response_deadline() {
        let (_a, mut b) = tokio::io::duplex(1024);
        let err = read_frame(&mut b, Duration::from_millis(200)).await.unwrap_err();
        assert_eq!(err, ErrorCode::ReceiveTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_body_times_out_on_the_stall_deadline() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        // Announce a body, then go quiet.
        a.write_all(&8u32.to_be_bytes()).await.unwrap();
        a.write_all(b"par").await.unwrap();
        let started = Instant::now();
        let err = read_frame(&mut b, Duration::from_secs(3600)).await.unwrap_err();
        assert_eq!(err, ErrorCode::ReceiveTimeout);
        // The stall deadline fired, not the (hour-long) response deadline.
        assert!(started.elapsed() < Duration::from_secs(60));
    }
}
