//! undertow - a headless BitTorrent download engine
//!
//! This library implements the core of a BitTorrent client: given a parsed
//! metadata descriptor (or a magnet-derived one), it announces to trackers,
//! manages a swarm of peer-wire sessions, schedules and verifies pieces, and
//! assembles the content byte-exactly on local storage.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 bencode encoding/decoding and byte-exact value skipping
//! - [`metainfo`] - Torrent descriptors, info hashes, magnet links
//! - [`peer`] - BEP-3 peer wire protocol: handshake, messages, sessions
//! - [`tracker`] - HTTP and UDP (BEP-15) tracker announces and the announce multiplexer
//! - [`scheduler`] - Piece/block inventory, request planning, integrity accounting
//! - [`storage`] - Piece-to-file layout and disk I/O
//! - [`engine`] - Torrent lifecycle, swarm management, the download loop

pub mod bencode;
pub mod config;
pub mod constants;
pub mod engine;
pub mod metainfo;
pub mod peer;
pub mod scheduler;
pub mod storage;
pub mod tracker;

pub use bencode::{decode, encode, skip_value, BencodeError, Value};
pub use config::EngineConfig;
pub use engine::{Engine, EngineError, EngineEvent, TorrentChange, TorrentState, TorrentView};
pub use metainfo::{Descriptor, FileSpec, InfoHash, MagnetLink, MetainfoError};
pub use peer::{Bitfield, FrameReader, Handshake, Message, PeerError, PeerId, PeerSession};
pub use scheduler::{BlockIngest, BlockRequest, FailureAction, PieceScheduler, Progress};
pub use storage::{DiskLayout, StorageError};
pub use tracker::{AnnounceOutcome, CookieProvider, TrackerEvent, TrackerError, TrackerMux};
