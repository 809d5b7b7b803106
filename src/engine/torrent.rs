use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::constants::{
    DIAL_BATCH, IDLE_DISCONNECT, INBOUND_WAIT, INBOUND_WAIT_CYCLES, KEEPALIVE_INTERVAL,
    PEER_HASH_FAILURE_LIMIT, REANNOUNCE_PERIOD,
};
use crate::metainfo::{Descriptor, InfoHash};
use crate::peer::{connect_peer, FrameReader, Message, PeerError, PeerId, PeerSession};
use crate::scheduler::{BlockIngest, FailureAction, PieceScheduler};
use crate::storage::DiskLayout;
use crate::tracker::{TrackerEvent, TrackerMux};

use super::events::{EngineEvent, TorrentChange, TorrentState};
use super::swarm::Swarm;

/// Everything one running torrent owns: scheduler, disk layout, tracker
/// multiplexer, swarm and cancellation token. Created by `Engine::start`,
/// torn down when the token fires.
pub(super) struct TorrentContext {
    pub descriptor: Descriptor,
    pub info_hash: InfoHash,
    pub our_id: PeerId,
    pub config: Arc<EngineConfig>,
    pub scheduler: PieceScheduler,
    pub layout: DiskLayout,
    pub swarm: Swarm,
    pub mux: TrackerMux,
    pub cancel: CancellationToken,
    pub events: broadcast::Sender<EngineEvent>,
    pub state: Mutex<TorrentState>,
    pub error: Mutex<Option<String>>,
    pub uploaded: AtomicU64,
    /// Woken to pull the next re-announce forward (failure escalation).
    pub reannounce: Notify,
    /// Woken when a peer joins; cuts the no-peer wait cycles short.
    pub peer_joined: Notify,
}

impl TorrentContext {
    pub fn state(&self) -> TorrentState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TorrentState) {
        *self.state.lock() = state;
        let _ = self.events.send(EngineEvent::TorrentUpdated {
            info_hash: self.info_hash,
            change: TorrentChange::State(state),
        });
    }

    /// Transitions the torrent to Error and tears everything down. The
    /// engine itself stays alive.
    pub fn fail(&self, reason: String) {
        tracing::error!(info_hash = %self.info_hash, reason = %reason, "torrent failed");
        *self.error.lock() = Some(reason.clone());
        self.set_state(TorrentState::Error);
        let _ = self.events.send(EngineEvent::TorrentUpdated {
            info_hash: self.info_hash,
            change: TorrentChange::Failure(reason),
        });
        self.cancel.cancel();
    }

    fn emit_progress(&self) {
        let progress = self.scheduler.progress();
        let _ = self.events.send(EngineEvent::TorrentUpdated {
            info_hash: self.info_hash,
            change: TorrentChange::Progress {
                bytes_verified: progress.bytes_verified,
                fraction: progress.fraction,
            },
        });
    }

    fn bytes_left(&self) -> u64 {
        self.descriptor
            .total_length
            .saturating_sub(self.scheduler.progress().bytes_verified)
    }

    fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }
}

/// The per-torrent top-level task.
pub(super) async fn run_download(ctx: Arc<TorrentContext>) {
    ctx.set_state(TorrentState::Downloading);

    let outcome = ctx
        .mux
        .announce(TrackerEvent::Started, 0, 0, ctx.descriptor.total_length)
        .await;
    tracing::info!(
        info_hash = %ctx.info_hash,
        peers = outcome.peers.len(),
        responded = outcome.responded,
        attempted = outcome.attempted,
        "initial announce"
    );

    let connected = dial_candidates(&ctx, outcome.peers).await;

    if connected == 0 && ctx.swarm.len() == 0 && !wait_for_first_peer(&ctx).await {
        if !ctx.cancel.is_cancelled() {
            ctx.fail("no peers reachable".to_string());
        }
        return;
    }

    let reannounce = tokio::spawn(run_reannounce_loop(ctx.clone()));

    // Peer tasks drive the piece inner loop; this task watches for the
    // terminal condition.
    loop {
        if ctx.scheduler.is_complete() {
            break;
        }
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                reannounce.abort();
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(250)) => {}
        }
    }

    let _ = ctx
        .mux
        .announce(TrackerEvent::Completed, ctx.uploaded(), ctx.descriptor.total_length, 0)
        .await;
    ctx.set_state(TorrentState::Seeding);
    tracing::info!(info_hash = %ctx.info_hash, "download complete, seeding");

    // Keep serving uploads until the torrent is stopped.
    ctx.cancel.cancelled().await;
    reannounce.abort();
}

/// Waits up to three cycles for an inbound peer, re-announcing and
/// re-dialling between cycles. True once any peer exists.
async fn wait_for_first_peer(ctx: &Arc<TorrentContext>) -> bool {
    for cycle in 0..INBOUND_WAIT_CYCLES {
        if ctx.swarm.len() > 0 {
            return true;
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => return false,
            _ = ctx.peer_joined.notified() => return true,
            _ = tokio::time::sleep(INBOUND_WAIT) => {}
        }

        if ctx.swarm.len() > 0 {
            return true;
        }

        tracing::debug!(info_hash = %ctx.info_hash, cycle, "no peers yet, re-announcing");
        let outcome = ctx
            .mux
            .announce(TrackerEvent::None, ctx.uploaded(), 0, ctx.descriptor.total_length)
            .await;
        if dial_candidates(ctx, outcome.peers).await > 0 {
            return true;
        }
    }

    ctx.swarm.len() > 0
}

/// The background re-announce loop: periodic, or pulled forward when the
/// scheduler escalates. Dials only addresses the swarm does not know.
async fn run_reannounce_loop(ctx: Arc<TorrentContext>) {
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            _ = tokio::time::sleep(REANNOUNCE_PERIOD) => {}
            _ = ctx.reannounce.notified() => {
                tracing::debug!(info_hash = %ctx.info_hash, "emergency re-announce");
            }
        }

        let progress = ctx.scheduler.progress();
        let outcome = ctx
            .mux
            .announce(
                TrackerEvent::None,
                ctx.uploaded(),
                progress.bytes_verified,
                ctx.bytes_left(),
            )
            .await;

        if !ctx.scheduler.is_complete() {
            dial_candidates(&ctx, outcome.peers).await;
        }
    }
}

/// Dials candidates in bounded batches until the list is exhausted or the
/// connected target is reached. Returns how many dials succeeded.
pub(super) async fn dial_candidates(ctx: &Arc<TorrentContext>, peers: Vec<SocketAddr>) -> usize {
    let mut connected = 0usize;

    for batch in peers.chunks(DIAL_BATCH) {
        if ctx.cancel.is_cancelled() || ctx.swarm.len() >= ctx.config.connected_target {
            break;
        }

        let mut dials = JoinSet::new();
        for &addr in batch {
            if !ctx.swarm.begin_dial(addr) {
                continue;
            }

            let ctx = ctx.clone();
            dials.spawn(async move {
                match connect_peer(addr, ctx.info_hash.0, ctx.our_id).await {
                    Ok((reader, writer, handshake)) => {
                        spawn_peer(&ctx, reader, writer, handshake.peer_id, addr);
                        true
                    }
                    Err(e) => {
                        // Observed here even when the connect was abandoned
                        // by its timeout; the candidate is forgotten.
                        tracing::debug!(peer = %addr, error = %e, "dial failed");
                        ctx.swarm.abort_dial(addr);
                        false
                    }
                }
            });
        }

        while let Some(result) = dials.join_next().await {
            if matches!(result, Ok(true)) {
                connected += 1;
            }
        }
    }

    connected
}

/// Registers a handshaken connection with the swarm and starts its
/// receive task. Shared by the outbound dial path and the inbound
/// listener.
pub(super) fn spawn_peer(
    ctx: &Arc<TorrentContext>,
    reader: FrameReader,
    writer: OwnedWriteHalf,
    remote_peer_id: [u8; 20],
    addr: SocketAddr,
) {
    let Some(remote_id) = PeerId::from_bytes(&remote_peer_id) else {
        return;
    };

    let session = ctx
        .swarm
        .register(addr, remote_id, writer, ctx.descriptor.piece_count());
    ctx.peer_joined.notify_one();

    let ctx = ctx.clone();
    tokio::spawn(async move {
        run_peer(ctx, session, reader).await;
    });
}

/// The per-session receive task. Every exit path funnels through the
/// disconnect latch; faults are logged and absorbed, never propagated.
async fn run_peer(ctx: Arc<TorrentContext>, session: Arc<PeerSession>, mut reader: FrameReader) {
    tracing::debug!(peer = %session.addr(), id = session.id(), "peer session started");

    let result = peer_loop(&ctx, &session, &mut reader).await;

    match result {
        Ok(()) => tracing::debug!(peer = %session.addr(), "peer session closed"),
        Err(ref e) => tracing::warn!(peer = %session.addr(), error = %e, "peer session failed"),
    }

    if session.latch_disconnect() {
        ctx.swarm.remove(session.id(), session.addr());
        // Ordering: this runs after the final frame was dispatched, so
        // every delivered block reached the scheduler first.
        match ctx.scheduler.on_peer_dropped(session.id()) {
            FailureAction::Reannounce => ctx.reannounce.notify_one(),
            FailureAction::Fatal => {
                ctx.fail("too many consecutive piece failures".to_string());
            }
            FailureAction::Continue => {}
        }
    }
}

async fn peer_loop(
    ctx: &Arc<TorrentContext>,
    session: &Arc<PeerSession>,
    reader: &mut FrameReader,
) -> Result<(), PeerError> {
    // Our bitfield goes out first if it says anything.
    let ours = ctx.scheduler.bitfield();
    if !ours.is_empty() {
        session.send(&Message::Bitfield(ours.to_bytes())).await?;
    }

    let mut tick = tokio::time::interval(Duration::from_secs(5));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => return Ok(()),
            _ = tick.tick() => {
                if session.inbound_idle() > IDLE_DISCONNECT {
                    return Err(PeerError::Timeout);
                }
                if session.outbound_idle() > KEEPALIVE_INTERVAL {
                    session.send(&Message::KeepAlive).await?;
                }
                ctx.scheduler.reclaim_expired();
                maintain_interest(ctx, session).await?;
                pump_requests(ctx, session).await?;
            }
            message = reader.read_message() => {
                let message = message?;
                session.mark_inbound();
                handle_message(ctx, session, message).await?;
            }
        }
    }
}

/// Declares interest as soon as the peer has a piece we need.
async fn maintain_interest(
    ctx: &Arc<TorrentContext>,
    session: &Arc<PeerSession>,
) -> Result<(), PeerError> {
    let interested = ctx.scheduler.pick_piece(&session.bitfield()).is_some();
    let flags = session.flags();

    if interested && !flags.am_interested {
        session.set_am_interested(true);
        session.send(&Message::Interested).await?;
    } else if !interested && flags.am_interested && ctx.scheduler.is_complete() {
        session.set_am_interested(false);
        session.send(&Message::NotInterested).await?;
    }

    Ok(())
}

/// Tops the request pipeline up to the configured depth.
async fn pump_requests(
    ctx: &Arc<TorrentContext>,
    session: &Arc<PeerSession>,
) -> Result<(), PeerError> {
    let flags = session.flags();
    if flags.peer_choking || !flags.am_interested {
        return Ok(());
    }

    let in_flight = ctx.scheduler.in_flight(session.id());
    let mut budget = ctx.config.request_pipeline.saturating_sub(in_flight);

    while budget > 0 {
        let Some(piece) = ctx.scheduler.pick_piece(&session.bitfield()) else {
            break;
        };

        let requests = ctx.scheduler.next_requests(piece, session.id(), budget);
        if requests.is_empty() {
            // Raced with another peer claiming the last idle block.
            break;
        }

        for request in requests {
            session
                .send(&Message::Request {
                    index: request.piece,
                    begin: request.begin,
                    length: request.length,
                })
                .await?;
            budget -= 1;
        }
    }

    Ok(())
}

async fn handle_message(
    ctx: &Arc<TorrentContext>,
    session: &Arc<PeerSession>,
    message: Message,
) -> Result<(), PeerError> {
    match message {
        Message::KeepAlive => {}
        Message::Choke => {
            session.set_peer_choking(true);
            // Outstanding requests to this peer are abandoned so another
            // peer can serve them.
            ctx.scheduler.release_peer(session.id());
        }
        Message::Unchoke => {
            session.set_peer_choking(false);
            pump_requests(ctx, session).await?;
        }
        Message::Interested => {
            session.set_peer_interested(true);
            // Single-slot courtesy policy: an interested peer gets
            // unchoked right away.
            if session.flags().am_choking {
                session.set_am_choking(false);
                session.send(&Message::Unchoke).await?;
            }
        }
        Message::NotInterested => {
            session.set_peer_interested(false);
        }
        Message::Have { piece } => {
            session.set_have(piece);
            maintain_interest(ctx, session).await?;
            pump_requests(ctx, session).await?;
        }
        Message::Bitfield(bytes) => {
            session.replace_bitfield(&bytes);
            maintain_interest(ctx, session).await?;
        }
        Message::Request {
            index,
            begin,
            length,
        } => {
            serve_request(ctx, session, index, begin, length).await?;
        }
        Message::Piece { index, begin, data } => {
            ingest_block(ctx, session, index, begin, data).await?;
        }
        Message::Cancel { .. } => {
            // Responses are served inline, so there is never a queued
            // response to withdraw.
        }
        Message::Unknown { id } => {
            tracing::trace!(peer = %session.addr(), id, "ignoring unknown message");
        }
    }

    Ok(())
}

/// The seeding path: answer a block request from disk.
async fn serve_request(
    ctx: &Arc<TorrentContext>,
    session: &Arc<PeerSession>,
    index: u32,
    begin: u32,
    length: u32,
) -> Result<(), PeerError> {
    if session.flags().am_choking {
        return Ok(());
    }

    // 128 KiB is the conventional ceiling; anything bigger is hostile.
    if length == 0 || length > 131072 {
        return Err(PeerError::InvalidMessage(format!(
            "request length {} out of range",
            length
        )));
    }

    if !ctx.scheduler.is_verified(index) {
        return Ok(());
    }

    match ctx.layout.read_block(index, begin, length).await {
        Ok(data) => {
            ctx.uploaded.fetch_add(data.len() as u64, Ordering::Relaxed);
            session.send(&Message::Piece { index, begin, data }).await?;
        }
        Err(e) => {
            tracing::warn!(piece = index, error = %e, "failed to read block for upload");
        }
    }

    Ok(())
}

/// Feeds a received block to the scheduler and, when it completes a
/// piece, verifies and persists it.
async fn ingest_block(
    ctx: &Arc<TorrentContext>,
    session: &Arc<PeerSession>,
    index: u32,
    begin: u32,
    data: bytes::Bytes,
) -> Result<(), PeerError> {
    match ctx.scheduler.record_block(index, begin, data) {
        BlockIngest::Ignored => {}
        BlockIngest::Stored => {
            pump_requests(ctx, session).await?;
        }
        BlockIngest::Assembled(buffer) => {
            let Some(expected) = ctx.scheduler.expected_hash(index) else {
                return Ok(());
            };

            // Hash on this task, outside every scheduler lock.
            let mut hasher = Sha1::new();
            hasher.update(&buffer);
            let actual: [u8; 20] = hasher.finalize().into();

            if actual == expected {
                ctx.scheduler.commit_verified(index, session.id());

                if let Err(e) = ctx.layout.write_piece(index, &buffer).await {
                    ctx.fail(format!("disk write failed for piece {}: {}", index, e));
                    return Ok(());
                }

                tracing::debug!(piece = index, "piece verified and written");
                ctx.swarm.broadcast_have(index).await;
                ctx.emit_progress();
            } else {
                tracing::warn!(peer = %session.addr(), piece = index, "piece failed hash check");

                match ctx.scheduler.reject_piece(index, session.id()) {
                    FailureAction::Reannounce => ctx.reannounce.notify_one(),
                    FailureAction::Fatal => {
                        ctx.fail("too many consecutive piece failures".to_string());
                        return Ok(());
                    }
                    FailureAction::Continue => {}
                }

                if ctx.scheduler.peer_failure_count(session.id()) >= PEER_HASH_FAILURE_LIMIT {
                    return Err(PeerError::InvalidMessage(
                        "repeated hash failures from this peer".to_string(),
                    ));
                }
            }

            pump_requests(ctx, session).await?;
        }
    }

    Ok(())
}
