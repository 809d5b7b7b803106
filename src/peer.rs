//! Peer wire protocol (BEP-3).
//!
//! The 68-byte handshake, the framed message taxonomy, a buffered frame
//! reader with a hostile-size cap, and the shared per-peer session state
//! used by the swarm.

mod bitfield;
mod error;
mod message;
mod session;
mod transport;

pub use bitfield::Bitfield;
pub use error::PeerError;
pub use message::{Handshake, Message, HANDSHAKE_LEN};
pub use session::{accept_peer, connect_peer, reply_handshake, PeerId, PeerSession, SessionFlags};
pub use transport::FrameReader;

#[cfg(test)]
mod tests;
