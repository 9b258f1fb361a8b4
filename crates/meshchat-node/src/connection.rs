//! Connection table: every live peer socket this node holds.
//!
//! The table owns the write halves. Each read half lives in its
//! connection's reader task, which stops when the connection's token is
//! cancelled. One entry may be marked primary: the link this node joined
//! the mesh through, and the only one repair ever replaces.
//!
//! Writes are bounded by the table's write timeout and abandoned as soon as
//! the connection is closed, so a peer that stops reading can stall neither
//! the flood nor shutdown.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio_util::sync::CancellationToken;

pub type ConnId = u64;

/// Which side opened the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// A registered peer connection.
pub struct Connection {
    pub id: ConnId,
    pub direction: Direction,
    /// Remote end of the socket.
    pub peer_addr: SocketAddr,
    /// Our end of the socket.
    pub local_addr: SocketAddr,
    /// `host:port` the peer accepts joins on.
    pub listen_addr: String,
    pub established_at: Instant,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    write_timeout: Duration,
    cancel: CancellationToken,
}

impl Connection {
    /// Write one complete frame.
    ///
    /// Fails with `TimedOut` if the frame (waiting for the writer included)
    /// takes longer than the write timeout, and with `NotConnected` once the
    /// connection is closed. Either way the stream may hold a partial frame
    /// and the caller must drop the connection.
    pub async fn send(&self, frame: &[u8]) -> io::Result<()> {
        let write = async {
            let mut writer = self.writer.lock().await;
            writer.write_all(frame).await?;
            writer.flush().await
        };
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => {
                Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"))
            }
            result = tokio::time::timeout(self.write_timeout, write) => match result {
                Ok(written) => written,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("write stalled for {:?}", self.write_timeout),
                )),
            },
        }
    }

    /// Resolves once the connection has been closed locally.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the reader and shut down our write direction.
    ///
    /// Never waits for a write in flight: that write is abandoned by the
    /// cancellation and the socket closes when the last handle drops.
    pub async fn close(&self) {
        self.cancel.cancel();
        match self.writer.try_lock() {
            Ok(mut writer) => {
                let _ = writer.shutdown().await;
            }
            Err(_) => tracing::trace!(conn = self.id, "write in flight, leaving the socket to drop"),
        }
    }

    /// Stop the reader. The write half closes when the last handle drops.
    pub fn abort(&self) {
        self.cancel.cancel();
    }
}

/// Shared table of live connections.
#[derive(Clone)]
pub struct ConnectionTable {
    conns: Arc<DashMap<ConnId, Arc<Connection>>>,
    primary: Arc<Mutex<Option<ConnId>>>,
    next_id: Arc<AtomicU64>,
    write_timeout: Duration,
}

impl ConnectionTable {
    /// Empty table whose connections give up on a write after `write_timeout`.
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            conns: Arc::default(),
            primary: Arc::default(),
            next_id: Arc::default(),
            write_timeout,
        }
    }

    pub fn insert(
        &self,
        direction: Direction,
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
        listen_addr: String,
        writer: OwnedWriteHalf,
        cancel: CancellationToken,
    ) -> Arc<Connection> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(Connection {
            id,
            direction,
            peer_addr,
            local_addr,
            listen_addr,
            established_at: Instant::now(),
            writer: tokio::sync::Mutex::new(writer),
            write_timeout: self.write_timeout,
            cancel,
        });
        self.conns.insert(id, conn.clone());
        conn
    }

    pub fn remove(&self, id: ConnId) -> Option<Arc<Connection>> {
        self.conns.remove(&id).map(|(_, conn)| conn)
    }

    pub fn get(&self, id: ConnId) -> Option<Arc<Connection>> {
        self.conns.get(&id).map(|c| c.value().clone())
    }

    /// Handles to every connection, detached from the map locks.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.conns.iter().map(|c| c.value().clone()).collect()
    }

    /// Connection to the peer listening on `listen_addr`, if any.
    pub fn find_by_listen_addr(&self, listen_addr: &str) -> Option<Arc<Connection>> {
        self.conns
            .iter()
            .find(|c| c.value().listen_addr == listen_addr)
            .map(|c| c.value().clone())
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Remove and return every connection.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        let ids: Vec<ConnId> = self.conns.iter().map(|c| *c.key()).collect();
        *self.lock_primary() = None;
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    // ── Primary ──────────────────────────────────────────────────────────────

    pub fn set_primary(&self, id: ConnId) {
        *self.lock_primary() = Some(id);
    }

    pub fn primary(&self) -> Option<ConnId> {
        *self.lock_primary()
    }

    /// Clear the primary mark if it points at `id`. Returns true if it did.
    pub fn clear_primary_if(&self, id: ConnId) -> bool {
        let mut primary = self.lock_primary();
        if *primary == Some(id) {
            *primary = None;
            true
        } else {
            false
        }
    }

    fn lock_primary(&self) -> std::sync::MutexGuard<'_, Option<ConnId>> {
        self.primary.lock().unwrap_or_else(|p| p.into_inner())
    }
}
