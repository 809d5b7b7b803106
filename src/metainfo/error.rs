use thiserror::Error;

/// Errors raised while parsing torrent metadata.
#[derive(Debug, Error)]
pub enum MetainfoError {
    /// The metadata is not valid bencode.
    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    /// A required field is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field is present but malformed.
    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    /// An info hash string has the wrong length or invalid characters.
    #[error("invalid info hash")]
    InvalidInfoHash,

    /// A magnet URI could not be parsed.
    #[error("invalid magnet link: {0}")]
    InvalidMagnetLink(String),
}
