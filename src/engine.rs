//! Torrent lifecycle and the download loop.
//!
//! The [`Engine`] owns the torrent registry, the inbound listener and the
//! engine-wide peer id. Each started torrent gets its own task wiring
//! together a [`PieceScheduler`](crate::scheduler::PieceScheduler), a
//! [`DiskLayout`](crate::storage::DiskLayout), a [`TrackerMux`](crate::tracker::TrackerMux)
//! and a swarm of peer sessions, all under one cancellation token.

mod core;
mod error;
mod events;
mod listener;
mod swarm;
mod torrent;

pub use self::core::Engine;
pub use self::error::EngineError;
pub use self::events::{EngineEvent, TorrentChange, TorrentState, TorrentView};
