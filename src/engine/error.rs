use thiserror::Error;

use crate::metainfo::InfoHash;

/// Errors surfaced by engine operations.
///
/// Per-peer and per-tracker failures never appear here; they are absorbed
/// where they happen. What remains is metadata problems, disk problems and
/// lifecycle misuse.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A torrent with this info hash is already registered.
    #[error("torrent already added: {0}")]
    AlreadyAdded(InfoHash),

    /// No torrent with this info hash is registered.
    #[error("unknown torrent: {0}")]
    UnknownTorrent(InfoHash),

    /// The descriptor carries no piece data (magnet without metadata).
    #[error("descriptor has no piece data and cannot be started")]
    NotStartable,

    /// The descriptor could not be parsed.
    #[error("metadata error: {0}")]
    Metadata(#[from] crate::metainfo::MetainfoError),

    /// Disk layout construction or I/O failed.
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// Listener or other engine-level I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
