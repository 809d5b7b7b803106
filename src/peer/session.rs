use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex as TokioMutex;
use tokio::time::timeout;

use crate::constants::{CLIENT_PREFIX, DIAL_TIMEOUT, INBOUND_HANDSHAKE_TIMEOUT};

use super::bitfield::Bitfield;
use super::error::PeerError;
use super::message::{Handshake, Message};
use super::transport::FrameReader;

/// A 20-byte peer identifier, Azureus-style: `-UD0001-` plus twelve random
/// alphanumeric characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; 20]);

impl PeerId {
    /// Generates a fresh peer id. Done once per engine; the same id is
    /// sent in every handshake and every tracker announce.
    pub fn generate() -> Self {
        use rand::distr::Alphanumeric;
        use rand::Rng as _;

        let mut id = [0u8; 20];
        id[..8].copy_from_slice(CLIENT_PREFIX);
        let mut rng = rand::rng();
        for b in &mut id[8..] {
            *b = rng.sample(Alphanumeric);
        }
        Self(id)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 20 {
            return None;
        }
        let mut id = [0u8; 20];
        id.copy_from_slice(bytes);
        Some(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns the client tag between the dashes, if the id follows the
    /// Azureus convention.
    pub fn client_id(&self) -> Option<&str> {
        if self.0[0] == b'-' && self.0[7] == b'-' {
            std::str::from_utf8(&self.0[1..7]).ok()
        } else {
            None
        }
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(client) = self.client_id() {
            write!(f, "PeerId({})", client)
        } else {
            write!(f, "PeerId({:02x?})", &self.0[..8])
        }
    }
}

/// Choke and interest flags for one session.
///
/// Both sides start choked and not interested.
#[derive(Debug, Clone, Copy)]
pub struct SessionFlags {
    pub peer_choking: bool,
    pub am_choking: bool,
    pub peer_interested: bool,
    pub am_interested: bool,
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self {
            peer_choking: true,
            am_choking: true,
            peer_interested: false,
            am_interested: false,
        }
    }
}

/// One live peer connection.
///
/// The session is shared between its receive task, the download loop and
/// the swarm; the write half sits behind an async mutex so concurrent
/// senders can never interleave the bytes of two messages, and disconnect
/// is a set-once latch so teardown runs exactly once no matter which path
/// reaches it first.
pub struct PeerSession {
    id: u64,
    addr: SocketAddr,
    remote_id: PeerId,
    writer: TokioMutex<OwnedWriteHalf>,
    flags: Mutex<SessionFlags>,
    bitfield: Mutex<Bitfield>,
    disconnected: AtomicBool,
    last_inbound: Mutex<Instant>,
    last_outbound: Mutex<Instant>,
}

impl PeerSession {
    pub fn new(
        id: u64,
        addr: SocketAddr,
        remote_id: PeerId,
        writer: OwnedWriteHalf,
        piece_count: usize,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            addr,
            remote_id,
            writer: TokioMutex::new(writer),
            flags: Mutex::new(SessionFlags::default()),
            bitfield: Mutex::new(Bitfield::new(piece_count)),
            disconnected: AtomicBool::new(false),
            last_inbound: Mutex::new(now),
            last_outbound: Mutex::new(now),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn remote_id(&self) -> PeerId {
        self.remote_id
    }

    /// Sends one message. The internal mutex serialises concurrent
    /// callers, so message bytes never interleave.
    pub async fn send(&self, message: &Message) -> Result<(), PeerError> {
        let data = message.encode();
        let mut writer = self.writer.lock().await;
        writer.write_all(&data).await?;
        writer.flush().await?;
        *self.last_outbound.lock() = Instant::now();
        Ok(())
    }

    /// Returns a snapshot of the choke/interest flags.
    pub fn flags(&self) -> SessionFlags {
        *self.flags.lock()
    }

    pub fn set_peer_choking(&self, v: bool) {
        self.flags.lock().peer_choking = v;
    }

    pub fn set_am_choking(&self, v: bool) {
        self.flags.lock().am_choking = v;
    }

    pub fn set_peer_interested(&self, v: bool) {
        self.flags.lock().peer_interested = v;
    }

    pub fn set_am_interested(&self, v: bool) {
        self.flags.lock().am_interested = v;
    }

    /// Records a Have message in the peer's bitfield.
    pub fn set_have(&self, piece: u32) {
        self.bitfield.lock().set(piece as usize);
    }

    /// Replaces the peer's bitfield from wire bytes. Trailing bits past
    /// the piece count are masked off, not rejected.
    pub fn replace_bitfield(&self, bytes: &[u8]) {
        let mut bf = self.bitfield.lock();
        *bf = Bitfield::from_bytes(bytes, bf.piece_count());
    }

    pub fn has_piece(&self, piece: u32) -> bool {
        self.bitfield.lock().has(piece as usize)
    }

    /// Returns a copy of the peer's announced bitfield.
    pub fn bitfield(&self) -> Bitfield {
        self.bitfield.lock().clone()
    }

    /// Stamps the last-inbound clock; called on every received frame.
    pub fn mark_inbound(&self) {
        *self.last_inbound.lock() = Instant::now();
    }

    pub fn inbound_idle(&self) -> Duration {
        self.last_inbound.lock().elapsed()
    }

    pub fn outbound_idle(&self) -> Duration {
        self.last_outbound.lock().elapsed()
    }

    /// Shuts down the write half of the connection.
    ///
    /// The receive task still owns teardown through the disconnect latch;
    /// this only stops bytes flowing so a draining session cannot linger
    /// on a blocked send. Safe to call more than once.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    /// Latches the disconnect flag. Returns true for exactly one caller;
    /// only that caller runs teardown and fires the disconnect event.
    pub fn latch_disconnect(&self) -> bool {
        self.disconnected
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }
}

/// Dials a peer and performs the handshake exchange under one budget.
///
/// The remote's protocol tag and echoed info hash are verified
/// byte-for-byte; any mismatch or I/O failure closes the socket and the
/// candidate is discarded.
pub async fn connect_peer(
    addr: SocketAddr,
    info_hash: [u8; 20],
    our_id: PeerId,
) -> Result<(FrameReader, OwnedWriteHalf, Handshake), PeerError> {
    timeout(DIAL_TIMEOUT, async {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, mut write_half) = stream.into_split();

        let ours = Handshake::new(info_hash, our_id.0);
        write_half.write_all(&ours.encode()).await?;
        write_half.flush().await?;

        let mut reader = FrameReader::new(read_half);
        let theirs = reader.read_handshake().await?;

        if theirs.info_hash != info_hash {
            return Err(PeerError::InfoHashMismatch);
        }

        Ok((reader, write_half, theirs))
    })
    .await
    .map_err(|_| PeerError::Timeout)?
}

/// Reads the handshake from an inbound connection.
///
/// Exactly 68 bytes are read under a 10-second budget. The caller looks
/// the info hash up in its registry and replies (or closes) accordingly.
pub async fn accept_peer(
    stream: TcpStream,
) -> Result<(FrameReader, OwnedWriteHalf, Handshake, SocketAddr), PeerError> {
    let addr = stream.peer_addr()?;
    let (read_half, write_half) = stream.into_split();

    let mut reader = FrameReader::new(read_half);
    let theirs = timeout(INBOUND_HANDSHAKE_TIMEOUT, reader.read_handshake())
        .await
        .map_err(|_| PeerError::Timeout)??;

    Ok((reader, write_half, theirs, addr))
}

/// Sends our handshake on an inbound connection's write half.
pub async fn reply_handshake(
    writer: &mut OwnedWriteHalf,
    info_hash: [u8; 20],
    our_id: PeerId,
) -> Result<(), PeerError> {
    let ours = Handshake::new(info_hash, our_id.0);
    writer.write_all(&ours.encode()).await?;
    writer.flush().await?;
    Ok(())
}
