//! WebSocket text transport.
//!
//! Every accepted WebSocket is both a control-message source for the session
//! and an output [`Connection`] registered with its broadcaster. Each text
//! message received is one control message; each scene goes out as one text
//! message.
//!
//! The session itself is synchronous, so control messages are handed to it on
//! the blocking pool. Scenes reach a socket through a bounded per-connection
//! queue fed with `try_send`: a slow peer fills its own queue and starts
//! failing sends instead of stalling the scheduler.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::broadcast::Connection;
use crate::error::{SessionResult, TransportError};
use crate::id::ConnectionId;
use crate::session::SimulationSession;

/// Longest control message accepted; longer messages close the connection.
const MAX_CONTROL_BYTES: usize = 64 * 1024;

/// How long a freshly accepted socket has to complete the upgrade.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

fn io_error(e: &std::io::Error) -> TransportError {
    TransportError::Io { message: e.to_string() }
}

/// Output side of one WebSocket, fed without blocking.
#[derive(Debug)]
pub struct WsConnection {
    id: ConnectionId,
    capacity: usize,
    tx: mpsc::Sender<String>,
}

impl WsConnection {
    /// Creates the connection and the receiver its writer task drains.
    #[must_use]
    pub fn new(id: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (Self { id, capacity, tx }, rx)
    }
}

impl Connection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send_text(&self, payload: &str) -> Result<(), TransportError> {
        self.tx.try_send(payload.to_string()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Backpressure {
                id: self.id,
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => TransportError::ConnectionClosed { id: self.id },
        })
    }
}

/// A bound listener serving one session.
#[derive(Debug)]
pub struct WsTransport {
    listener: TcpListener,
    session: Arc<SimulationSession>,
}

impl WsTransport {
    /// Binds the listener.
    ///
    /// # Errors
    /// Returns [`TransportError::Io`] if the address cannot be bound.
    pub async fn bind(addr: impl ToSocketAddrs, session: Arc<SimulationSession>) -> SessionResult<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| io_error(&e))?;
        Ok(Self { listener, session })
    }

    /// # Errors
    /// Returns [`TransportError::Io`] if the socket address is unavailable.
    pub fn local_addr(&self) -> SessionResult<SocketAddr> {
        Ok(self.listener.local_addr().map_err(|e| io_error(&e))?)
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// A failed accept or upgrade only costs that one connection. Connections
    /// already open keep running until their peers hang up or the runtime
    /// goes away.
    pub async fn serve_with_shutdown(self, shutdown: impl Future<Output = ()>) {
        tracing::info!(addr = ?self.listener.local_addr().ok(), "transport listening");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve_connection(stream, peer, Arc::clone(&self.session)));
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
            }
        }
        tracing::info!("transport stopped");
    }

    /// Runs [`Self::serve_with_shutdown`] as a task on the current runtime.
    ///
    /// # Errors
    /// Returns [`TransportError::Io`] if the socket address is unavailable.
    pub fn spawn(self) -> SessionResult<TransportHandle> {
        let addr = self.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(self.serve_with_shutdown(async move {
            // A dropped sender also means stop.
            let _ = shutdown_rx.await;
        }));
        Ok(TransportHandle {
            addr,
            shutdown: Some(shutdown_tx),
            join: Some(join),
        })
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, session: Arc<SimulationSession>) {
    let socket = match tokio::time::timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::accept_async(stream)).await {
        Ok(Ok(socket)) => socket,
        Ok(Err(e)) => {
            tracing::warn!(peer = %peer, error = %e, "websocket handshake failed");
            return;
        }
        Err(_) => {
            tracing::warn!(peer = %peer, "websocket handshake timed out");
            return;
        }
    };
    let (mut sink, mut source) = socket.split();

    let broadcaster = session.broadcaster();
    let id = broadcaster.next_connection_id();
    let (connection, mut frames) = WsConnection::new(id, session.config().writer_queue_capacity);

    // Ends once the broadcaster drops the connection and its sender with it.
    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if let Err(e) = sink.send(Message::text(frame)).await {
                tracing::debug!(connection = %id, error = %e, "write failed; writer exiting");
                return;
            }
        }
        let _ = sink.close().await;
    });

    broadcaster.register(Arc::new(connection));
    tracing::info!(connection = %id, peer = %peer, "connection opened");

    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if text.len() > MAX_CONTROL_BYTES {
                    tracing::warn!(connection = %id, len = text.len(), "control message too long; closing");
                    break;
                }
                handle_control(id, &session, text.as_str().to_owned()).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection = %id, error = %e, "read failed");
                break;
            }
        }
    }

    session.broadcaster().unregister(id);
    if writer.await.is_err() {
        tracing::error!(connection = %id, "writer task panicked");
    }
    tracing::info!(connection = %id, "connection closed");
}

async fn handle_control(id: ConnectionId, session: &Arc<SimulationSession>, text: String) {
    let session = Arc::clone(session);
    match tokio::task::spawn_blocking(move || session.handle_message(&text)).await {
        Ok(Ok(outcome)) => tracing::debug!(connection = %id, ?outcome, "control message handled"),
        Ok(Err(e)) => tracing::warn!(connection = %id, error = %e, "control message failed"),
        Err(e) => tracing::error!(connection = %id, error = %e, "control task failed"),
    }
}

/// Owner of a spawned accept loop.
#[derive(Debug)]
pub struct TransportHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl TransportHandle {
    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting new connections and waits for the accept loop.
    pub async fn stop(mut self) {
        self.signal();
        if let Some(join) = self.join.take() {
            if join.await.is_err() {
                tracing::error!("accept task panicked");
            }
        }
    }

    fn signal(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.signal();
    }
}
