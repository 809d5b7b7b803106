//! Tracker protocols (BEP-3 HTTP announces, BEP-15 UDP announces).
//!
//! Trackers are servers that help peers find each other. A client
//! "announces" to register itself in the swarm, report transfer statistics
//! and receive a list of peer addresses.
//!
//! [`TrackerMux`] announces one torrent to every known tracker in
//! parallel - bounded, deadlined and short-circuited - and merges the peer
//! lists. Individual tracker failures are logged and absorbed; a cycle
//! never fails outright.

mod announcer;
mod error;
mod http;
mod response;
mod udp;

pub use announcer::{AnnounceOutcome, CookieProvider, TrackerMux};
pub use error::TrackerError;
pub use http::HttpTracker;
pub use response::{AnnounceParams, AnnounceResponse, TrackerEvent};
pub use udp::UdpTracker;

#[cfg(test)]
mod tests;
