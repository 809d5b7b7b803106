use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::net::tcp::OwnedWriteHalf;

use crate::peer::{Message, PeerId, PeerSession};

/// The set of live peer sessions for one torrent.
///
/// Sessions are held in a table keyed by a monotonically assigned id; the
/// scheduler refers to peers by that id and never keeps a session alive.
/// The address set covers both connected peers and dials in flight, so the
/// same remote is never dialled twice.
pub(super) struct Swarm {
    sessions: DashMap<u64, Arc<PeerSession>>,
    addrs: Mutex<HashSet<SocketAddr>>,
    next_id: AtomicU64,
}

impl Swarm {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            addrs: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Claims an address for a dial attempt. Returns false if the address
    /// is already connected or being dialled.
    pub fn begin_dial(&self, addr: SocketAddr) -> bool {
        self.addrs.lock().insert(addr)
    }

    /// Releases an address after a failed dial.
    pub fn abort_dial(&self, addr: SocketAddr) {
        self.addrs.lock().remove(&addr);
    }

    /// True if the address is connected or currently being dialled.
    pub fn knows(&self, addr: SocketAddr) -> bool {
        self.addrs.lock().contains(&addr)
    }

    /// Registers a connected peer and returns its session.
    pub fn register(
        &self,
        addr: SocketAddr,
        remote_id: PeerId,
        writer: OwnedWriteHalf,
        piece_count: usize,
    ) -> Arc<PeerSession> {
        self.addrs.lock().insert(addr);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(PeerSession::new(id, addr, remote_id, writer, piece_count));
        self.sessions.insert(id, session.clone());
        session
    }

    /// Drops a session from the table. Idempotent; the caller has already
    /// won the session's disconnect latch.
    pub fn remove(&self, id: u64, addr: SocketAddr) {
        self.sessions.remove(&id);
        self.addrs.lock().remove(&addr);
    }

    /// A snapshot of the live sessions.
    pub fn sessions(&self) -> Vec<Arc<PeerSession>> {
        self.sessions.iter().map(|r| r.value().clone()).collect()
    }

    /// Announces a freshly verified piece to every peer. Send failures are
    /// left for each session's own receive task to notice.
    pub async fn broadcast_have(&self, piece: u32) {
        for session in self.sessions() {
            let _ = session.send(&Message::Have { piece }).await;
        }
    }

    /// Shuts down every session's write half. Called when a torrent
    /// halts, so the drain is an explicit step rather than each task
    /// eventually noticing cancellation; the tasks still run their own
    /// teardown through the disconnect latch.
    pub async fn close_all(&self) {
        for session in self.sessions() {
            session.close().await;
        }
    }
}
