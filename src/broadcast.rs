//! Live output connections and best-effort fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::error::TransportError;
use crate::id::ConnectionId;

/// An output sink owned by the [`Broadcaster`] while live.
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Hands one text payload to the connection. Must not block on a slow
    /// peer.
    fn send_text(&self, payload: &str) -> Result<(), TransportError>;
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Registry of live connections.
///
/// The registry lock is only held to copy out the current connection set;
/// sends happen after it is released, so a connection opening or closing
/// mid-broadcast never waits on a send.
#[derive(Default)]
pub struct Broadcaster {
    connections: RwLock<HashMap<ConnectionId, Arc<dyn Connection>>>,
    next_id: AtomicU64,
    send_failures: AtomicU64,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("connections", &self.connection_count())
            .field("send_failures", &self.send_failures())
            .finish()
    }
}

impl Broadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh connection id.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Registers a connection, replacing any previous one with the same id.
    pub fn register(&self, connection: Arc<dyn Connection>) {
        let id = connection.id();
        let total = {
            let mut connections = self.connections.write().unwrap_or_else(PoisonError::into_inner);
            connections.insert(id, connection);
            connections.len()
        };
        tracing::info!(connection = %id, total, "connection registered");
    }

    /// Removes a connection. Returns whether it was registered.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            tracing::info!(connection = %id, "connection unregistered");
        }
        removed
    }

    /// Sends `payload` to every registered connection.
    ///
    /// A failing connection is logged and skipped; it stays registered.
    pub fn broadcast(&self, payload: &str) -> BroadcastReport {
        let targets: Vec<Arc<dyn Connection>> = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut report = BroadcastReport::default();
        for connection in targets {
            match connection.send_text(payload) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    self.send_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(connection = %connection.id(), error = %e, "send failed");
                }
            }
        }
        report
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Failed sends since creation.
    #[must_use]
    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }
}

/// A connection backed by a bounded channel.
///
/// The receiving half is drained by whatever writes to the real peer (an
/// embedder's writer thread, or a test). A full queue is reported as backpressure
/// rather than waited on.
#[derive(Debug)]
pub struct ChannelConnection {
    id: ConnectionId,
    capacity: usize,
    tx: Sender<String>,
}

impl ChannelConnection {
    #[must_use]
    pub fn new(id: ConnectionId, capacity: usize) -> (Self, Receiver<String>) {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        (Self { id, capacity, tx }, rx)
    }
}

impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send_text(&self, payload: &str) -> Result<(), TransportError> {
        self.tx.try_send(payload.to_string()).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::Backpressure {
                id: self.id,
                capacity: self.capacity,
            },
            TrySendError::Disconnected(_) => TransportError::ConnectionClosed { id: self.id },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_connection_does_not_block_others() {
        let broadcaster = Broadcaster::new();
        let (a, rx_a) = ChannelConnection::new(broadcaster.next_connection_id(), 4);
        let (b, rx_b) = ChannelConnection::new(broadcaster.next_connection_id(), 4);
        let (c, rx_c) = ChannelConnection::new(broadcaster.next_connection_id(), 4);
        let failing = c.id();
        drop(rx_c);

        broadcaster.register(Arc::new(a));
        broadcaster.register(Arc::new(b));
        broadcaster.register(Arc::new(c));

        let report = broadcaster.broadcast("scene");
        assert_eq!(report, BroadcastReport { delivered: 2, failed: 1 });
        assert_eq!(rx_a.try_recv().unwrap(), "scene");
        assert_eq!(rx_b.try_recv().unwrap(), "scene");
        assert!(broadcaster.contains(failing));
        assert_eq!(broadcaster.connection_count(), 3);
        assert_eq!(broadcaster.send_failures(), 1);
    }

    #[test]
    fn full_queue_is_backpressure() {
        let (conn, _rx) = ChannelConnection::new(ConnectionId::new(7), 1);
        conn.send_text("one").unwrap();
        let err = conn.send_text("two").unwrap_err();
        assert!(matches!(err, TransportError::Backpressure { capacity: 1, .. }));
    }

    #[test]
    fn unregister_removes_connection() {
        let broadcaster = Broadcaster::new();
        let (conn, rx) = ChannelConnection::new(broadcaster.next_connection_id(), 4);
        let id = conn.id();
        broadcaster.register(Arc::new(conn));
        assert!(broadcaster.unregister(id));
        assert!(!broadcaster.unregister(id));
        assert_eq!(broadcaster.broadcast("x"), BroadcastReport::default());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn concurrent_churn_during_broadcast() {
        const BROADCASTS: usize = 500;
        const CHURNERS: usize = 4;
        const CHURN_ROUNDS: usize = 200;
        const KEPT_PER_CHURNER: usize = 5;

        let broadcaster = Broadcaster::new();
        let (stable_a, rx_a) = ChannelConnection::new(broadcaster.next_connection_id(), BROADCASTS);
        let (stable_b, rx_b) = ChannelConnection::new(broadcaster.next_connection_id(), BROADCASTS);
        broadcaster.register(Arc::new(stable_a));
        broadcaster.register(Arc::new(stable_b));

        let barrier = std::sync::Barrier::new(CHURNERS + 1);
        let (broadcaster, barrier) = (&broadcaster, &barrier);
        let kept = std::thread::scope(|scope| {
            let churners: Vec<_> = (0..CHURNERS)
                .map(|_| {
                    scope.spawn(move || {
                        barrier.wait();
                        for _ in 0..CHURN_ROUNDS {
                            let (conn, _rx) = ChannelConnection::new(broadcaster.next_connection_id(), 1);
                            let id = conn.id();
                            broadcaster.register(Arc::new(conn));
                            assert!(broadcaster.unregister(id));
                        }
                        (0..KEPT_PER_CHURNER)
                            .map(|_| {
                                let (conn, rx) = ChannelConnection::new(broadcaster.next_connection_id(), BROADCASTS);
                                broadcaster.register(Arc::new(conn));
                                rx
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            scope.spawn(move || {
                barrier.wait();
                for i in 0..BROADCASTS {
                    let report = broadcaster.broadcast(&format!("scene-{i}"));
                    assert!(report.delivered >= 2);
                }
            });

            churners
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });

        assert_eq!(broadcaster.connection_count(), 2 + CHURNERS * KEPT_PER_CHURNER);
        assert_eq!(kept.len(), CHURNERS * KEPT_PER_CHURNER);
        for rx in [&rx_a, &rx_b] {
            let received: Vec<String> = rx.try_iter().collect();
            let expected: Vec<String> = (0..BROADCASTS).map(|i| format!("scene-{i}")).collect();
            assert_eq!(received, expected);
        }
    }

    #[test]
    fn connection_ids_are_unique() {
        let broadcaster = Broadcaster::new();
        let a = broadcaster.next_connection_id();
        let b = broadcaster.next_connection_id();
        assert_ne!(a, b);
    }
}
