//! Engine configuration.
//!
//! Tunables that callers may want to adjust without recompiling live here;
//! protocol constants that never vary stay in [`crate::constants`].

use std::ops::RangeInclusive;

use crate::constants;

/// Configuration for an [`Engine`](crate::engine::Engine).
///
/// The defaults carry the standard values; construct with
/// `EngineConfig::default()` and override fields as needed.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ports probed for the inbound listener, in order. If every port is
    /// busy the engine runs with inbound connections disabled.
    pub listen_ports: RangeInclusive<u16>,
    /// Descriptors with fewer trackers than this are augmented with the
    /// built-in fallback set.
    pub fallback_tracker_min: usize,
    /// Tracker URLs appended to sparse descriptors.
    pub fallback_trackers: Vec<String>,
    /// Hosts treated as private trackers; announces to them carry session
    /// cookies from the injected [`CookieProvider`](crate::tracker::CookieProvider).
    pub private_tracker_hosts: Vec<String>,
    /// Stop dialling once this many peers are connected.
    pub connected_target: usize,
    /// Outstanding block requests kept in flight per peer.
    pub request_pipeline: usize,
    /// Consecutive piece failures that trigger an emergency re-announce.
    pub failure_reannounce_threshold: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            listen_ports: constants::LISTEN_PORT_FIRST..=constants::LISTEN_PORT_LAST,
            fallback_tracker_min: constants::FALLBACK_TRACKER_MIN,
            fallback_trackers: constants::FALLBACK_TRACKERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            private_tracker_hosts: Vec::new(),
            connected_target: 30,
            request_pipeline: constants::REQUEST_PIPELINE,
            failure_reannounce_threshold: constants::FAILURE_REANNOUNCE_THRESHOLD,
        }
    }
}
