use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::constants::{
    ANNOUNCE_CYCLE_TIMEOUT, DEFAULT_ANNOUNCE_INTERVAL, PEER_SHORT_CIRCUIT, TRACKER_CONCURRENCY,
};
use crate::metainfo::InfoHash;
use crate::peer::PeerId;

use super::error::TrackerError;
use super::http::HttpTracker;
use super::response::{AnnounceParams, AnnounceResponse, TrackerEvent};
use super::udp::UdpTracker;

/// Supplies session cookies for private trackers.
///
/// Authentication itself lives outside the engine; this trait is the seam
/// through which an authenticated-fetch collaborator hands over whatever
/// cookie an announce to `host` should carry.
pub trait CookieProvider: Send + Sync {
    fn cookie_for(&self, host: &str) -> Option<String>;
}

/// The merged result of one announce cycle.
#[derive(Debug, Clone)]
pub struct AnnounceOutcome {
    /// Smallest interval any responding tracker asked for, in seconds.
    pub interval_secs: u32,
    /// Distinct peer addresses, keyed by `(ip, port)`.
    pub peers: Vec<SocketAddr>,
    /// Trackers that answered successfully.
    pub responded: usize,
    /// Trackers the cycle attempted.
    pub attempted: usize,
}

/// Announces one torrent to every known tracker in parallel.
///
/// Fan-out is bounded by a semaphore, the whole cycle by a deadline, and
/// collection short-circuits once enough distinct peers have accumulated.
/// A failing tracker never aborts the cycle.
pub struct TrackerMux {
    urls: Vec<String>,
    info_hash: InfoHash,
    peer_id: PeerId,
    port: u16,
    private_hosts: Vec<String>,
    cookies: Option<Arc<dyn CookieProvider>>,
}

impl TrackerMux {
    /// Creates a multiplexer over the given announce URLs. URLs with
    /// unsupported schemes are dropped here, once.
    pub fn new(urls: &[String], info_hash: InfoHash, peer_id: PeerId, port: u16) -> Self {
        let urls = urls
            .iter()
            .filter(|u| {
                let supported = u.starts_with("http://")
                    || u.starts_with("https://")
                    || u.starts_with("udp://");
                if !supported {
                    tracing::debug!(url = %u, "skipping tracker with unsupported scheme");
                }
                supported
            })
            .cloned()
            .collect();

        Self {
            urls,
            info_hash,
            peer_id,
            port,
            private_hosts: Vec::new(),
            cookies: None,
        }
    }

    /// Configures the private-tracker host set and the cookie source for
    /// announces to them.
    pub fn with_cookies(
        mut self,
        private_hosts: Vec<String>,
        provider: Arc<dyn CookieProvider>,
    ) -> Self {
        self.private_hosts = private_hosts;
        self.cookies = Some(provider);
        self
    }

    /// Runs one announce cycle and merges the peer lists.
    ///
    /// Never fails: with no reachable tracker the outcome simply carries
    /// zero peers and `responded == 0`.
    pub async fn announce(
        &self,
        event: TrackerEvent,
        uploaded: u64,
        downloaded: u64,
        left: u64,
    ) -> AnnounceOutcome {
        let params = AnnounceParams {
            info_hash: self.info_hash.0,
            peer_id: self.peer_id.0,
            port: self.port,
            uploaded,
            downloaded,
            left,
            event,
        };

        let semaphore = Arc::new(Semaphore::new(TRACKER_CONCURRENCY));
        let deadline = Instant::now() + ANNOUNCE_CYCLE_TIMEOUT;
        let mut set = JoinSet::new();

        for url in &self.urls {
            let url = url.clone();
            let cookie = self.cookie_for_url(&url);
            let semaphore = semaphore.clone();

            set.spawn(async move {
                let _permit = semaphore.acquire().await;
                let result = announce_one(&url, &params, cookie).await;
                (url, result)
            });
        }

        let attempted = set.len();
        let mut responded = 0usize;
        let mut interval = None::<u32>;
        let mut peers: HashSet<SocketAddr> = HashSet::new();

        loop {
            let joined = tokio::select! {
                joined = set.join_next() => joined,
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::debug!("announce cycle deadline reached");
                    break;
                }
            };

            let Some(joined) = joined else { break };

            match joined {
                Ok((url, Ok(response))) => {
                    responded += 1;
                    interval = Some(interval.map_or(response.interval, |i: u32| {
                        i.min(response.interval)
                    }));
                    peers.extend(response.peers);
                    tracing::debug!(url = %url, total = peers.len(), "tracker responded");
                }
                Ok((url, Err(e))) => {
                    tracing::warn!(url = %url, error = %e, "tracker announce failed");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "tracker task failed");
                }
            }

            if peers.len() >= PEER_SHORT_CIRCUIT {
                tracing::debug!(peers = peers.len(), "peer target reached, cancelling rest");
                break;
            }
        }

        set.abort_all();

        AnnounceOutcome {
            interval_secs: interval.unwrap_or(DEFAULT_ANNOUNCE_INTERVAL),
            peers: peers.into_iter().collect(),
            responded,
            attempted,
        }
    }

    fn cookie_for_url(&self, url: &str) -> Option<String> {
        let provider = self.cookies.as_ref()?;
        let host = host_of(url)?;
        if self.private_hosts.iter().any(|h| h == host) {
            provider.cookie_for(host)
        } else {
            None
        }
    }
}

async fn announce_one(
    url: &str,
    params: &AnnounceParams,
    cookie: Option<String>,
) -> Result<AnnounceResponse, TrackerError> {
    if url.starts_with("udp://") {
        let tracker = UdpTracker::connect(url).await?;
        tracker.announce(params).await
    } else {
        let mut tracker = HttpTracker::new(url)?;
        if let Some(cookie) = cookie {
            tracker = tracker.with_cookie(cookie);
        }
        tracker.announce(params).await
    }
}

/// Extracts the host part of a tracker URL, without port or path.
pub(super) fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://")?.1;
    let host_port = rest.split('/').next()?;
    let host = match host_port.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => host_port,
    };
    Some(host)
}
