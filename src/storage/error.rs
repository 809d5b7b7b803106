use thiserror::Error;

/// Errors raised by disk operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Piece index outside the torrent.
    #[error("invalid piece index: {0}")]
    InvalidPieceIndex(u32),

    /// Piece data does not match the expected piece length.
    #[error("piece {piece} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        piece: u32,
        expected: u64,
        got: u64,
    },

    /// A file path escapes the save root or is otherwise unusable.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A read hit a file that does not exist yet.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// A block range does not fit inside its piece.
    #[error("invalid block range in piece {piece}: offset {offset}, length {length}")]
    InvalidBlockRange { piece: u32, offset: u32, length: u32 },
}
