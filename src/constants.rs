//! Protocol constants and tuning parameters.
//!
//! Timeouts, limits and protocol values used throughout the engine. The
//! values follow common client defaults (qBittorrent, Transmission,
//! libtorrent) where the protocol does not pin them.

use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// Client ID prefix for peer ID generation (Azureus-style).
pub const CLIENT_PREFIX: &[u8] = b"-UD0001-";

/// User agent string for HTTP requests.
pub const USER_AGENT: &str = "undertow/0.1.0";

// ============================================================================
// Ports
// ============================================================================

/// First port probed for the inbound listener.
pub const LISTEN_PORT_FIRST: u16 = 6881;

/// Last port probed for the inbound listener.
pub const LISTEN_PORT_LAST: u16 = 6999;

// ============================================================================
// Block and piece sizes
// ============================================================================

/// Standard block size (16KB), the unit of request on the wire.
pub const BLOCK_SIZE: u32 = 16384;

/// Maximum framed message accepted from a peer. Legitimate piece messages
/// are at most BLOCK_SIZE + 9 bytes; anything near this cap is hostile.
pub const MAX_FRAME_SIZE: usize = 2 * 1024 * 1024;

/// Outstanding block requests kept in flight per peer.
pub const REQUEST_PIPELINE: usize = 8;

// ============================================================================
// Peer timeouts
// ============================================================================

/// Budget for an outbound TCP connect plus handshake exchange.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(8);

/// Budget for reading the 68-byte handshake on an inbound connection.
pub const INBOUND_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A requested block not answered within this window reverts to idle.
pub const BLOCK_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Send a keep-alive after this much write silence.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(120);

/// Disconnect a peer after this much read silence.
pub const IDLE_DISCONNECT: Duration = Duration::from_secs(150);

/// Outbound dials attempted concurrently per batch.
pub const DIAL_BATCH: usize = 10;

// ============================================================================
// Tracker timeouts and limits
// ============================================================================

/// Per-request timeout for HTTP(S) announces.
pub const HTTP_ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(8);

/// Per-step timeout for UDP announces (connect step, announce step).
pub const UDP_STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for one whole announce cycle across all trackers.
pub const ANNOUNCE_CYCLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Concurrent tracker requests per announce cycle.
pub const TRACKER_CONCURRENCY: usize = 30;

/// Once this many distinct peers have accumulated, pending trackers are
/// cancelled.
pub const PEER_SHORT_CIRCUIT: usize = 200;

/// Peers requested from each tracker.
pub const NUMWANT: u32 = 200;

/// Announce interval assumed when no tracker supplied one.
pub const DEFAULT_ANNOUNCE_INTERVAL: u32 = 120;

/// Period of the background re-announce loop.
pub const REANNOUNCE_PERIOD: Duration = Duration::from_secs(120);

/// Wait per cycle for inbound peers when no outbound dial succeeded.
pub const INBOUND_WAIT: Duration = Duration::from_secs(30);

/// Cycles of waiting/re-announcing before a peerless torrent errors out.
pub const INBOUND_WAIT_CYCLES: usize = 3;

// ============================================================================
// Failure accounting
// ============================================================================

/// Consecutive piece failures that trigger an emergency re-announce.
pub const FAILURE_REANNOUNCE_THRESHOLD: u32 = 10;

/// Consecutive piece failures that transition the torrent to Error.
pub const FAILURE_FATAL_THRESHOLD: u32 = 30;

/// Consecutive hash failures attributable to one peer before disconnect.
pub const PEER_HASH_FAILURE_LIMIT: u32 = 3;

// ============================================================================
// Tracker fallback
// ============================================================================

/// Descriptors carrying fewer trackers than this are augmented with the
/// built-in fallback set.
pub const FALLBACK_TRACKER_MIN: usize = 5;

/// Well-known open trackers appended to sparse descriptors.
pub const FALLBACK_TRACKERS: &[&str] = &[
    "udp://tracker.opentrackr.org:1337/announce",
    "udp://open.tracker.cl:1337/announce",
    "udp://tracker.torrent.eu.org:451/announce",
    "udp://exodus.desync.com:6969/announce",
    "http://tracker.openbittorrent.com:80/announce",
];
