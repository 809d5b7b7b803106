use thiserror::Error;

/// Errors raised by a single tracker exchange.
///
/// All of these are per-tracker: the announce multiplexer logs them and
/// carries on with the remaining trackers.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The URL has an unsupported scheme or cannot be parsed.
    #[error("invalid tracker url: {0}")]
    InvalidUrl(String),

    /// The response was syntactically invalid.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Error decoding a bencoded HTTP response.
    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    /// The tracker reported a failure reason.
    #[error("tracker failure: {0}")]
    Failure(String),

    /// The exchange timed out.
    #[error("timeout")]
    Timeout,
}
