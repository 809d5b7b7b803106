use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::constants::{BLOCK_REQUEST_TIMEOUT, BLOCK_SIZE, FAILURE_FATAL_THRESHOLD};
use crate::metainfo::Descriptor;
use crate::peer::Bitfield;

/// A block request ready to go on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    /// The piece index.
    pub piece: u32,
    /// Byte offset within the piece.
    pub begin: u32,
    /// Length of the block in bytes.
    pub length: u32,
}

/// What became of one received block.
#[derive(Debug)]
pub enum BlockIngest {
    /// The payload did not match any expected block and was dropped.
    Ignored,
    /// The block was stored; the piece is still incomplete.
    Stored,
    /// The block completed its piece; the concatenated piece buffer is
    /// ready for hashing.
    Assembled(Bytes),
}

/// Escalation level after a piece failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Keep going.
    Continue,
    /// Too many consecutive failures; an emergency re-announce is due.
    Reannounce,
    /// The hard ceiling was crossed; the torrent should error out.
    Fatal,
}

/// Download progress snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    /// Bytes in verified pieces.
    pub bytes_verified: u64,
    /// Verified fraction of the total length, in `[0, 1]`.
    pub fraction: f64,
    /// True once every piece has verified.
    pub complete: bool,
}

#[derive(Debug)]
enum BlockState {
    Idle,
    Requested { at: Instant, peer: u64 },
    Received(Bytes),
}

#[derive(Debug)]
struct Block {
    begin: u32,
    length: u32,
    state: BlockState,
}

#[derive(Debug)]
struct Piece {
    length: u32,
    blocks: Vec<Block>,
    verified: bool,
}

impl Piece {
    fn new(length: u32) -> Self {
        let mut blocks = Vec::with_capacity(length.div_ceil(BLOCK_SIZE) as usize);
        let mut begin = 0u32;
        while begin < length {
            let block_len = BLOCK_SIZE.min(length - begin);
            blocks.push(Block {
                begin,
                length: block_len,
                state: BlockState::Idle,
            });
            begin += block_len;
        }
        Self {
            length,
            blocks,
            verified: false,
        }
    }

    fn is_claimed(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| !matches!(b.state, BlockState::Idle))
    }

    fn has_idle(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b.state, BlockState::Idle))
    }

    fn all_received(&self) -> bool {
        self.blocks
            .iter()
            .all(|b| matches!(b.state, BlockState::Received(_)))
    }

    fn assemble(&self) -> Bytes {
        let mut data = Vec::with_capacity(self.length as usize);
        for block in &self.blocks {
            if let BlockState::Received(ref payload) = block.state {
                data.extend_from_slice(payload);
            }
        }
        Bytes::from(data)
    }

    fn reset_blocks(&mut self) {
        for block in &mut self.blocks {
            block.state = BlockState::Idle;
        }
    }
}

struct Inner {
    pieces: Vec<Piece>,
    ours: Bitfield,
    bytes_verified: u64,
    consecutive_failures: u32,
    peer_failures: HashMap<u64, u32>,
}

/// The piece/block inventory for one torrent.
///
/// All mutation happens under one short-lived mutex; nothing yields while
/// it is held, and no event is ever emitted from inside it.
pub struct PieceScheduler {
    piece_hashes: Vec<[u8; 20]>,
    total_length: u64,
    reannounce_threshold: u32,
    request_timeout: std::time::Duration,
    inner: Mutex<Inner>,
}

impl PieceScheduler {
    /// Builds the inventory for a descriptor. Every piece starts Missing
    /// with all blocks idle.
    pub fn new(descriptor: &Descriptor, reannounce_threshold: u32) -> Self {
        let piece_count = descriptor.piece_count();
        let pieces = (0..piece_count)
            .map(|i| Piece::new(descriptor.piece_size(i as u32) as u32))
            .collect();

        Self {
            piece_hashes: descriptor.piece_hashes.clone(),
            total_length: descriptor.total_length,
            reannounce_threshold,
            request_timeout: BLOCK_REQUEST_TIMEOUT,
            inner: Mutex::new(Inner {
                pieces,
                ours: Bitfield::new(piece_count),
                bytes_verified: 0,
                consecutive_failures: 0,
                peer_failures: HashMap::new(),
            }),
        }
    }

    /// Picks the next piece to work on for a peer.
    ///
    /// Never returns a piece the peer lacks or one already verified.
    /// Pieces with work in flight are preferred over fresh ones so they
    /// finish first; ties go to the lowest index.
    pub fn pick_piece(&self, peer_bitfield: &Bitfield) -> Option<u32> {
        let inner = self.inner.lock();

        // Finish-first: an in-progress piece with something left to request.
        for (i, piece) in inner.pieces.iter().enumerate() {
            if !piece.verified
                && peer_bitfield.has(i)
                && piece.is_claimed()
                && piece.has_idle()
            {
                return Some(i as u32);
            }
        }

        for (i, piece) in inner.pieces.iter().enumerate() {
            if !piece.verified && peer_bitfield.has(i) && !piece.is_claimed() {
                return Some(i as u32);
            }
        }

        None
    }

    /// Claims up to `max` idle blocks of `piece` for `peer`, in ascending
    /// offset order, marking each Requested with a fresh timestamp.
    pub fn next_requests(&self, piece: u32, peer: u64, max: usize) -> Vec<BlockRequest> {
        let mut inner = self.inner.lock();
        let Some(p) = inner.pieces.get_mut(piece as usize) else {
            return Vec::new();
        };
        if p.verified {
            return Vec::new();
        }

        let now = Instant::now();
        let mut requests = Vec::new();

        for block in &mut p.blocks {
            if requests.len() >= max {
                break;
            }
            if matches!(block.state, BlockState::Idle) {
                block.state = BlockState::Requested { at: now, peer };
                requests.push(BlockRequest {
                    piece,
                    begin: block.begin,
                    length: block.length,
                });
            }
        }

        requests
    }

    /// Ingests a `Piece` payload.
    ///
    /// The block is located by `(begin, length)`; anything that does not
    /// line up with the inventory is dropped. When the last block of a
    /// piece lands, the concatenated buffer is returned for hashing and
    /// the piece stops being pickable until the verdict comes back.
    pub fn record_block(&self, piece: u32, begin: u32, data: Bytes) -> BlockIngest {
        let mut inner = self.inner.lock();
        let Some(p) = inner.pieces.get_mut(piece as usize) else {
            return BlockIngest::Ignored;
        };
        if p.verified {
            return BlockIngest::Ignored;
        }

        let Some(block) = p
            .blocks
            .iter_mut()
            .find(|b| b.begin == begin && b.length as usize == data.len())
        else {
            return BlockIngest::Ignored;
        };

        if matches!(block.state, BlockState::Received(_)) {
            return BlockIngest::Ignored;
        }

        block.state = BlockState::Received(data);

        if p.all_received() {
            BlockIngest::Assembled(p.assemble())
        } else {
            BlockIngest::Stored
        }
    }

    /// Returns the expected SHA-1 digest for a piece.
    pub fn expected_hash(&self, piece: u32) -> Option<[u8; 20]> {
        self.piece_hashes.get(piece as usize).copied()
    }

    /// Marks a piece Verified after its hash matched. Block payloads are
    /// dropped, the local bitfield gains the piece, and the consecutive
    /// failure counter (plus the serving peer's) resets.
    pub fn commit_verified(&self, piece: u32, peer: u64) {
        let mut inner = self.inner.lock();
        let Some(p) = inner.pieces.get_mut(piece as usize) else {
            return;
        };
        if p.verified {
            return;
        }

        p.verified = true;
        let length = p.length as u64;
        p.reset_blocks();

        inner.ours.set(piece as usize);
        inner.bytes_verified += length;
        inner.consecutive_failures = 0;
        inner.peer_failures.remove(&peer);
    }

    /// Records a hash mismatch. Every block reverts to idle for immediate
    /// re-download; the torrent-level and per-peer failure counters bump.
    pub fn reject_piece(&self, piece: u32, peer: u64) -> FailureAction {
        let mut inner = self.inner.lock();
        if let Some(p) = inner.pieces.get_mut(piece as usize) {
            if !p.verified {
                p.reset_blocks();
            }
        }

        *inner.peer_failures.entry(peer).or_insert(0) += 1;
        inner.consecutive_failures += 1;
        self.escalation(inner.consecutive_failures)
    }

    /// Blocks currently requested from `peer`.
    pub fn in_flight(&self, peer: u64) -> usize {
        self.inner
            .lock()
            .pieces
            .iter()
            .flat_map(|p| p.blocks.iter())
            .filter(|b| matches!(b.state, BlockState::Requested { peer: p, .. } if p == peer))
            .count()
    }

    /// Consecutive hash failures attributed to a peer.
    pub fn peer_failure_count(&self, peer: u64) -> u32 {
        self.inner
            .lock()
            .peer_failures
            .get(&peer)
            .copied()
            .unwrap_or(0)
    }

    /// Reverts every block `peer` had in flight to idle. Used when the
    /// peer chokes us; carries no failure escalation.
    pub fn release_peer(&self, peer: u64) -> usize {
        self.inner.lock().release(peer)
    }

    /// Like [`release_peer`](Self::release_peer), for a peer that
    /// disconnected. Losing a peer mid-piece escalates the failure
    /// counter.
    pub fn on_peer_dropped(&self, peer: u64) -> FailureAction {
        let mut inner = self.inner.lock();
        let released = inner.release(peer);
        inner.peer_failures.remove(&peer);

        if released == 0 {
            return FailureAction::Continue;
        }

        inner.consecutive_failures += 1;
        self.escalation(inner.consecutive_failures)
    }

    /// Reverts requested blocks whose response window expired. Returns
    /// how many were reclaimed.
    pub fn reclaim_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut reclaimed = 0;

        for piece in &mut inner.pieces {
            for block in &mut piece.blocks {
                if let BlockState::Requested { at, .. } = block.state {
                    if at.elapsed() > self.request_timeout {
                        block.state = BlockState::Idle;
                        reclaimed += 1;
                    }
                }
            }
        }

        reclaimed
    }

    /// Returns a snapshot of download progress.
    pub fn progress(&self) -> Progress {
        let inner = self.inner.lock();
        let complete = inner.ours.is_complete();
        let fraction = if self.total_length == 0 {
            0.0
        } else {
            inner.bytes_verified as f64 / self.total_length as f64
        };
        Progress {
            bytes_verified: inner.bytes_verified,
            fraction,
            complete,
        }
    }

    /// Returns a copy of the local piece bitfield.
    pub fn bitfield(&self) -> Bitfield {
        self.inner.lock().ours.clone()
    }

    /// True once every piece has verified.
    pub fn is_complete(&self) -> bool {
        self.inner.lock().ours.is_complete()
    }

    /// Whether a specific piece has verified.
    pub fn is_verified(&self, piece: u32) -> bool {
        self.inner
            .lock()
            .pieces
            .get(piece as usize)
            .map(|p| p.verified)
            .unwrap_or(false)
    }

    /// The number of pieces in the inventory.
    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    #[cfg(test)]
    pub(crate) fn set_request_timeout(&mut self, timeout: std::time::Duration) {
        self.request_timeout = timeout;
    }

    fn escalation(&self, failures: u32) -> FailureAction {
        if failures >= FAILURE_FATAL_THRESHOLD {
            FailureAction::Fatal
        } else if failures >= self.reannounce_threshold {
            FailureAction::Reannounce
        } else {
            FailureAction::Continue
        }
    }
}

impl Inner {
    fn release(&mut self, peer: u64) -> usize {
        let mut released = 0;
        for piece in &mut self.pieces {
            for block in &mut piece.blocks {
                if matches!(block.state, BlockState::Requested { peer: p, .. } if p == peer) {
                    block.state = BlockState::Idle;
                    released += 1;
                }
            }
        }
        released
    }
}
