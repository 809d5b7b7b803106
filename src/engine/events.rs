use crate::metainfo::InfoHash;

/// Lifecycle state of one torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentState {
    /// Registered but not running.
    Stopped,
    /// Start requested; the download task is coming up.
    Queued,
    /// Actively downloading pieces.
    Downloading,
    /// Stopped by the user with intent to resume.
    Paused,
    /// All pieces verified; serving uploads.
    Seeding,
    /// All pieces verified, not running.
    Completed,
    /// A fatal per-torrent failure; see the event stream for the reason.
    Error,
}

/// What changed about a torrent.
#[derive(Debug, Clone)]
pub enum TorrentChange {
    /// The lifecycle state moved.
    State(TorrentState),
    /// Verified bytes advanced.
    Progress { bytes_verified: u64, fraction: f64 },
    /// A human-readable failure reason accompanying an Error transition.
    Failure(String),
}

/// Engine event stream payload.
///
/// Subscribers (a UI, or nothing at all for headless use) receive these
/// over a broadcast channel; a slow subscriber only loses its own backlog.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    TorrentAdded {
        info_hash: InfoHash,
    },
    TorrentRemoved {
        info_hash: InfoHash,
    },
    TorrentUpdated {
        info_hash: InfoHash,
        change: TorrentChange,
    },
}

/// A point-in-time summary of one registered torrent.
#[derive(Debug, Clone)]
pub struct TorrentView {
    pub info_hash: InfoHash,
    pub name: String,
    pub state: TorrentState,
    pub total_length: u64,
    pub bytes_verified: u64,
    pub fraction: f64,
    pub peer_count: usize,
}
