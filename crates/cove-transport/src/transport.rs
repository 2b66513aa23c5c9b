//! The TCP transport: accepting socket plus the set of live connections.
//!
//! Connections are owned by handle: the transport keeps a map from
//! connection id to task, each task deregisters itself when it ends, and
//! dropping the transport aborts everything. No connection holds a
//! reference back to the transport.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use cove_core::codes::ErrorCode;
use cove_core::wire::MAX_TRANSPORT_MESSAGE_SIZE;

use crate::connection;
use crate::TransportHandler;

pub struct TcpTransport {
    shared: Arc<Shared>,
    accept_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    handler: Arc<dyn TransportHandler>,
    connections: DashMap<u64, JoinHandle<()>>,
    next_id: AtomicU64,
    listening_port: AtomicU16,
}

impl TcpTransport {
    pub fn new(handler: Arc<dyn TransportHandler>) -> Self {
        Self {
            shared: Arc::new(Shared {
                handler,
                connections: DashMap::new(),
                next_id: AtomicU64::new(1),
                listening_port: AtomicU16::new(0),
            }),
            accept_task: std::sync::Mutex::new(None),
        }
    }

    /// Bind and listen on `addr`, returning the bound port. Port 0 is
    /// refused — callers scanning for a free port name each candidate.
    pub fn start_listening(&self, addr: SocketAddr) -> Result<u16, ErrorCode> {
        if self.shared.listening_port.load(Ordering::SeqCst) != 0 {
            return Err(ErrorCode::AlreadyStarted);
        }
        if addr.port() == 0 {
            return Err(ErrorCode::InvalidPort);
        }

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|_| ErrorCode::InvalidAddress)?;

        // TIME_WAIT reuse; interpreted differently on Windows, so posix only.
        #[cfg(not(windows))]
        socket
            .set_reuseaddr(true)
            .map_err(|_| ErrorCode::SetOptionFailure)?;

        socket.bind(addr).map_err(|_| ErrorCode::BindError)?;
        let listener = socket.listen(1024).map_err(|_| ErrorCode::ListenError)?;

        let port = listener
            .local_addr()
            .map_err(|_| ErrorCode::ListenError)?
            .port();
        self.shared.listening_port.store(port, Ordering::SeqCst);

        let shared = self.shared.clone();
        let task = tokio::spawn(accept_loop(listener, shared));
        *self.accept_task.lock().unwrap() = Some(task);

        tracing::info!(port, "transport listening");
        Ok(port)
    }

    pub fn stop_listening(&self) {
        if let Some(task) = self.accept_task.lock().unwrap().take() {
            task.abort();
        }
        self.shared.listening_port.store(0, Ordering::SeqCst);
    }

    /// The bound port, or 0 when not listening.
    pub fn listening_port(&self) -> u16 {
        self.shared.listening_port.load(Ordering::SeqCst)
    }

    /// Open an outbound connection, send one frame, and await the reply
    /// unless `response_timeout` is the immediate sentinel. Size
    /// violations are reported through `on_error`, matching every other
    /// transport failure.
    pub fn send(&self, data: Vec<u8>, peer: SocketAddr, response_timeout: Duration) {
        if data.len() > MAX_TRANSPORT_MESSAGE_SIZE {
            tracing::warn!(size = data.len(), "refusing to send oversized message");
            self.shared
                .handler
                .on_error(ErrorCode::MessageSizeTooLarge, Some(peer));
            return;
        }

        let handler = self.shared.handler.clone();
        register_connection(&self.shared, async move {
            connection::run_outbound(peer, data, response_timeout, handler).await;
        });
    }

    /// Live connections, inbound and outbound.
    pub fn connection_count(&self) -> usize {
        self.shared.connections.len()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.stop_listening();
        for entry in self.shared.connections.iter() {
            entry.value().abort();
        }
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!(peer = %peer, "accepted connection");
                let handler = shared.handler.clone();
                register_connection(&shared, async move {
                    connection::serve_inbound(stream, peer, handler).await;
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }
}

/// Spawn a connection task and track it in the set. The task waits for
/// registration to land before running, and removes itself when done, so
/// the set never holds a finished task nor misses a live one.
fn register_connection<Fut>(shared: &Arc<Shared>, future: Fut)
where
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
    let (ready_tx, ready_rx) = oneshot::channel::<()>();
    let shared_for_task = shared.clone();
    let handle = tokio::spawn(async move {
        let _ = ready_rx.await;
        future.await;
        shared_for_task.connections.remove(&id);
    });
    shared.connections.insert(id, handle);
    let _ = ready_tx.send(());
}

// ── Tests ─────────────────────────────────────────────────────────────────────
