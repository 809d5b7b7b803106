use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::metainfo::{Descriptor, InfoHash};
use crate::peer::PeerId;
use crate::scheduler::PieceScheduler;
use crate::storage::DiskLayout;
use crate::tracker::{CookieProvider, TrackerEvent, TrackerMux};

use super::error::EngineError;
use super::events::{EngineEvent, TorrentChange, TorrentState, TorrentView};
use super::listener::run_accept_loop;
use super::torrent::{run_download, TorrentContext};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// One registry entry: the descriptor, its idle state, and the running
/// context while a download is live.
pub(super) struct TorrentSlot {
    pub descriptor: Descriptor,
    pub state: Mutex<TorrentState>,
    pub runtime: Mutex<Option<Arc<TorrentContext>>>,
    pub save_root: Mutex<Option<PathBuf>>,
}

/// The download engine.
///
/// Owns the torrent registry, the engine-wide peer id, the inbound
/// listener and the event stream. All methods are callable from any task;
/// per-torrent work runs on background tasks owned by their cancellation
/// tokens.
pub struct Engine {
    config: Arc<EngineConfig>,
    peer_id: PeerId,
    registry: DashMap<InfoHash, Arc<TorrentSlot>>,
    events: broadcast::Sender<EngineEvent>,
    shutdown: CancellationToken,
    listen_port: AtomicU64,
    /// `None` until the first bind attempt; the async lock serialises
    /// concurrent `start` calls racing to bind.
    listener_cell: tokio::sync::Mutex<Option<u16>>,
    cookies: Mutex<Option<Arc<dyn CookieProvider>>>,
}

impl Engine {
    /// Creates an engine with the given configuration. The peer id is
    /// fixed here and reused for every handshake and announce.
    pub fn new(config: EngineConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let peer_id = PeerId::generate();
        tracing::debug!(peer_id = ?peer_id, "engine created");

        Arc::new(Self {
            config: Arc::new(config),
            peer_id,
            registry: DashMap::new(),
            events,
            shutdown: CancellationToken::new(),
            listen_port: AtomicU64::new(u64::MAX),
            listener_cell: tokio::sync::Mutex::new(None),
            cookies: Mutex::new(None),
        })
    }

    /// Injects the session-cookie source used for private-tracker
    /// announces.
    pub fn set_cookie_provider(&self, provider: Arc<dyn CookieProvider>) {
        *self.cookies.lock() = Some(provider);
    }

    /// Subscribes to the engine event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// The engine's peer id.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// The inbound port. `None` until the first `start` attempts to bind;
    /// then `Some(port)` for a live listener, or `Some(0)` when every
    /// configured port was busy and inbound is disabled.
    pub fn listen_port(&self) -> Option<u16> {
        match self.listen_port.load(Ordering::Acquire) {
            u64::MAX => None,
            port => Some(port as u16),
        }
    }

    /// Registers a torrent from a parsed descriptor.
    ///
    /// Sparse tracker sets are augmented with the built-in fallback list.
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyAdded`] if the info hash is registered.
    pub fn add_from_descriptor(&self, mut descriptor: Descriptor) -> Result<InfoHash, EngineError> {
        let info_hash = descriptor.info_hash;

        if self.registry.contains_key(&info_hash) {
            return Err(EngineError::AlreadyAdded(info_hash));
        }

        if descriptor.trackers.len() < self.config.fallback_tracker_min {
            for url in &self.config.fallback_trackers {
                if !descriptor.trackers.iter().any(|t| t == url) {
                    descriptor.trackers.push(url.clone());
                }
            }
        }

        let slot = Arc::new(TorrentSlot {
            descriptor,
            state: Mutex::new(TorrentState::Stopped),
            runtime: Mutex::new(None),
            save_root: Mutex::new(None),
        });
        self.registry.insert(info_hash, slot);

        let _ = self.events.send(EngineEvent::TorrentAdded { info_hash });
        Ok(info_hash)
    }

    /// Registers a torrent from raw `.torrent` file bytes.
    pub fn add_from_file_bytes(&self, data: &[u8]) -> Result<InfoHash, EngineError> {
        let descriptor = Descriptor::from_bytes(data)?;
        self.add_from_descriptor(descriptor)
    }

    /// Registers a torrent from a magnet URI. The torrent cannot be
    /// started until full metadata replaces the stub descriptor.
    pub fn add_from_magnet(&self, uri: &str) -> Result<InfoHash, EngineError> {
        let descriptor = Descriptor::from_magnet(uri)?;
        self.add_from_descriptor(descriptor)
    }

    /// Starts downloading a registered torrent into `save_root`.
    ///
    /// Starting an already-running torrent is a no-op.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownTorrent`] for unregistered hashes,
    /// [`EngineError::NotStartable`] for metadata-less magnet stubs, and
    /// [`EngineError::Storage`] when the disk layout cannot be built.
    pub async fn start(
        self: &Arc<Self>,
        info_hash: InfoHash,
        save_root: &Path,
    ) -> Result<(), EngineError> {
        let slot = self.slot(&info_hash)?;

        if slot.runtime.lock().is_some() {
            return Ok(());
        }

        if !slot.descriptor.is_startable() {
            return Err(EngineError::NotStartable);
        }

        let port = self.ensure_listener().await;

        let descriptor = slot.descriptor.clone();
        let scheduler = PieceScheduler::new(&descriptor, self.config.failure_reannounce_threshold);
        let layout = DiskLayout::new(save_root, &descriptor)?;

        let mut mux = TrackerMux::new(&descriptor.trackers, info_hash, self.peer_id, port);
        if let Some(provider) = self.cookies.lock().clone() {
            mux = mux.with_cookies(self.config.private_tracker_hosts.clone(), provider);
        }

        let ctx = Arc::new(TorrentContext {
            descriptor,
            info_hash,
            our_id: self.peer_id,
            config: self.config.clone(),
            scheduler,
            layout,
            swarm: super::swarm::Swarm::new(),
            mux,
            cancel: self.shutdown.child_token(),
            events: self.events.clone(),
            state: Mutex::new(TorrentState::Queued),
            error: Mutex::new(None),
            uploaded: AtomicU64::new(0),
            reannounce: tokio::sync::Notify::new(),
            peer_joined: tokio::sync::Notify::new(),
        });

        *slot.save_root.lock() = Some(save_root.to_path_buf());
        *slot.runtime.lock() = Some(ctx.clone());
        *slot.state.lock() = TorrentState::Queued;
        let _ = self.events.send(EngineEvent::TorrentUpdated {
            info_hash,
            change: TorrentChange::State(TorrentState::Queued),
        });

        tokio::spawn(run_download(ctx));
        Ok(())
    }

    /// Pauses a running torrent: sessions drain, disk flushes, state
    /// becomes Paused. A later `start` begins over (no resume).
    pub async fn pause(&self, info_hash: InfoHash) -> Result<(), EngineError> {
        self.halt(info_hash, TorrentState::Paused).await
    }

    /// Stops a running torrent: sessions drain, disk flushes, state
    /// becomes Stopped (or Completed when every piece had verified).
    pub async fn stop(&self, info_hash: InfoHash) -> Result<(), EngineError> {
        self.halt(info_hash, TorrentState::Stopped).await
    }

    /// Removes a torrent from the registry, optionally deleting its data
    /// from disk. Deletion failures are logged, never escalated.
    pub async fn remove(&self, info_hash: InfoHash, delete_data: bool) -> Result<(), EngineError> {
        let _ = self.halt(info_hash, TorrentState::Stopped).await;

        let Some((_, slot)) = self.registry.remove(&info_hash) else {
            return Err(EngineError::UnknownTorrent(info_hash));
        };

        if delete_data {
            let save_root = slot.save_root.lock().clone();
            if let Some(save_root) = save_root {
                match DiskLayout::new(&save_root, &slot.descriptor) {
                    Ok(layout) => layout.remove_data().await,
                    Err(e) => {
                        tracing::warn!(info_hash = %info_hash, error = %e, "cannot delete data")
                    }
                }
            }
        }

        let _ = self.events.send(EngineEvent::TorrentRemoved { info_hash });
        Ok(())
    }

    /// Summarises every registered torrent.
    pub fn list(&self) -> Vec<TorrentView> {
        self.registry
            .iter()
            .map(|entry| {
                let slot = entry.value();
                let runtime = slot.runtime.lock().clone();

                let (state, bytes_verified, fraction, peer_count) = match runtime {
                    Some(ctx) => {
                        let progress = ctx.scheduler.progress();
                        (
                            ctx.state(),
                            progress.bytes_verified,
                            progress.fraction,
                            ctx.swarm.len(),
                        )
                    }
                    None => (*slot.state.lock(), 0, 0.0, 0),
                };

                TorrentView {
                    info_hash: *entry.key(),
                    name: slot.descriptor.name.clone(),
                    state,
                    total_length: slot.descriptor.total_length,
                    bytes_verified,
                    fraction,
                    peer_count,
                }
            })
            .collect()
    }

    /// Stops every torrent and shuts the engine down.
    pub async fn shutdown(&self) {
        let hashes: Vec<InfoHash> = self.registry.iter().map(|e| *e.key()).collect();
        for info_hash in hashes {
            let _ = self.stop(info_hash).await;
        }
        self.shutdown.cancel();
    }

    /// Finds the running context for an inbound handshake's info hash.
    pub(super) fn running_context(&self, info_hash: &InfoHash) -> Option<Arc<TorrentContext>> {
        self.registry.get(info_hash)?.runtime.lock().clone()
    }

    pub(super) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    #[cfg(test)]
    pub(super) fn descriptor_of(&self, info_hash: &InfoHash) -> Option<Descriptor> {
        self.registry.get(info_hash).map(|e| e.descriptor.clone())
    }

    fn slot(&self, info_hash: &InfoHash) -> Result<Arc<TorrentSlot>, EngineError> {
        self.registry
            .get(info_hash)
            .map(|e| e.value().clone())
            .ok_or(EngineError::UnknownTorrent(*info_hash))
    }

    async fn halt(&self, info_hash: InfoHash, target: TorrentState) -> Result<(), EngineError> {
        let slot = self.slot(&info_hash)?;

        let Some(ctx) = slot.runtime.lock().take() else {
            return Ok(());
        };

        ctx.cancel.cancel();
        ctx.swarm.close_all().await;
        ctx.layout.flush().await;

        let final_state = if ctx.state() == TorrentState::Error {
            TorrentState::Error
        } else if target == TorrentState::Stopped && ctx.scheduler.is_complete() {
            TorrentState::Completed
        } else {
            target
        };

        *slot.state.lock() = final_state;
        let _ = self.events.send(EngineEvent::TorrentUpdated {
            info_hash,
            change: TorrentChange::State(final_state),
        });

        // Courtesy stopped-announce; detached, failures ignored.
        let progress = ctx.scheduler.progress();
        let uploaded = ctx.uploaded.load(Ordering::Relaxed);
        let left = ctx
            .descriptor
            .total_length
            .saturating_sub(progress.bytes_verified);
        tokio::spawn(async move {
            ctx.mux
                .announce(TrackerEvent::Stopped, uploaded, progress.bytes_verified, left)
                .await;
        });

        Ok(())
    }

    /// Binds the inbound listener on the first free configured port.
    /// Runs once; every port busy means inbound stays disabled (port 0)
    /// and downloading proceeds outbound-only.
    async fn ensure_listener(self: &Arc<Self>) -> u16 {
        let mut cell = self.listener_cell.lock().await;
        if let Some(port) = *cell {
            return port;
        }

        for port in self.config.listen_ports.clone() {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    *cell = Some(port);
                    self.listen_port.store(port as u64, Ordering::Release);
                    tracing::info!(port, "inbound listener bound");
                    tokio::spawn(run_accept_loop(self.clone(), listener));
                    return port;
                }
                Err(e) => {
                    tracing::debug!(port, error = %e, "listen port busy");
                }
            }
        }

        tracing::warn!("no free listen port; inbound connections disabled");
        *cell = Some(0);
        self.listen_port.store(0, Ordering::Release);
        0
    }
}
