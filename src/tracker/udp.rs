use std::net::SocketAddr;

use rand::Rng as _;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;

use crate::constants::UDP_STEP_TIMEOUT;

use super::error::TrackerError;
use super::response::{parse_compact_peers, AnnounceParams, AnnounceResponse};

const PROTOCOL_ID: u64 = 0x41727101980;
const ACTION_CONNECT: u32 = 0;
const ACTION_ANNOUNCE: u32 = 1;
const ACTION_ERROR: u32 = 3;

/// A UDP tracker client (BEP-15).
///
/// The protocol is two datagram exchanges: CONNECT obtains a connection
/// id, ANNOUNCE reports state and returns compact peers. Each step runs
/// under its own timeout; transaction ids are random and must be echoed.
pub struct UdpTracker {
    socket: UdpSocket,
    addr: SocketAddr,
    connection_id: u64,
}

impl UdpTracker {
    /// Resolves a `udp://host:port/...` URL and performs the CONNECT step.
    ///
    /// The local socket is bound to the address family of the resolved
    /// host, so IPv6 trackers work where the host has IPv6 connectivity.
    pub async fn connect(url: &str) -> Result<Self, TrackerError> {
        let addr = resolve_udp_url(url).await?;

        let socket = if addr.is_ipv4() {
            UdpSocket::bind("0.0.0.0:0").await?
        } else {
            UdpSocket::bind("[::]:0").await?
        };
        socket.connect(addr).await?;

        let transaction_id: u32 = rand::rng().random();
        let request = build_connect_request(transaction_id);

        let response = exchange(&socket, &request, 16).await?;
        let connection_id = parse_connect_response(&response, transaction_id)?;

        Ok(Self {
            socket,
            addr,
            connection_id,
        })
    }

    /// Performs the ANNOUNCE step.
    pub async fn announce(&self, params: &AnnounceParams) -> Result<AnnounceResponse, TrackerError> {
        let transaction_id: u32 = rand::rng().random();
        let key: u32 = rand::rng().random();

        let request = build_announce_request(self.connection_id, transaction_id, key, params);
        let response = exchange(&self.socket, &request, 8).await?;

        parse_announce_response(&response, transaction_id)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

async fn exchange(
    socket: &UdpSocket,
    request: &[u8],
    min_response: usize,
) -> Result<Vec<u8>, TrackerError> {
    socket.send(request).await?;

    let mut buf = vec![0u8; 2048];
    let n = timeout(UDP_STEP_TIMEOUT, socket.recv(&mut buf))
        .await
        .map_err(|_| TrackerError::Timeout)??;

    if n < min_response {
        return Err(TrackerError::InvalidResponse("response too short".into()));
    }

    buf.truncate(n);
    Ok(buf)
}

/// Builds the 16-byte CONNECT request.
pub fn build_connect_request(transaction_id: u32) -> Vec<u8> {
    let mut request = Vec::with_capacity(16);
    request.extend_from_slice(&PROTOCOL_ID.to_be_bytes());
    request.extend_from_slice(&ACTION_CONNECT.to_be_bytes());
    request.extend_from_slice(&transaction_id.to_be_bytes());
    request
}

/// Parses a CONNECT response, checking action and transaction id, and
/// returns the connection id.
pub fn parse_connect_response(response: &[u8], transaction_id: u32) -> Result<u64, TrackerError> {
    if response.len() < 16 {
        return Err(TrackerError::InvalidResponse("connect too short".into()));
    }

    let action = u32::from_be_bytes([response[0], response[1], response[2], response[3]]);
    let tid = u32::from_be_bytes([response[4], response[5], response[6], response[7]]);

    if action != ACTION_CONNECT || tid != transaction_id {
        return Err(TrackerError::InvalidResponse(
            "connect response mismatch".into(),
        ));
    }

    let mut id = [0u8; 8];
    id.copy_from_slice(&response[8..16]);
    Ok(u64::from_be_bytes(id))
}

/// Builds the 98-byte ANNOUNCE request.
pub fn build_announce_request(
    connection_id: u64,
    transaction_id: u32,
    key: u32,
    params: &AnnounceParams,
) -> Vec<u8> {
    let mut request = Vec::with_capacity(98);
    request.extend_from_slice(&connection_id.to_be_bytes());
    request.extend_from_slice(&ACTION_ANNOUNCE.to_be_bytes());
    request.extend_from_slice(&transaction_id.to_be_bytes());
    request.extend_from_slice(&params.info_hash);
    request.extend_from_slice(&params.peer_id);
    request.extend_from_slice(&(params.downloaded as i64).to_be_bytes());
    request.extend_from_slice(&(params.left as i64).to_be_bytes());
    request.extend_from_slice(&(params.uploaded as i64).to_be_bytes());
    request.extend_from_slice(&params.event.as_udp_id().to_be_bytes());
    request.extend_from_slice(&0u32.to_be_bytes()); // IP address (0 = sender's)
    request.extend_from_slice(&key.to_be_bytes());
    request.extend_from_slice(&(-1i32).to_be_bytes()); // num_want (-1 = default)
    request.extend_from_slice(&params.port.to_be_bytes());
    request
}

/// Parses an ANNOUNCE response. An error action (3) carries a UTF-8
/// message from the tracker.
pub fn parse_announce_response(
    response: &[u8],
    transaction_id: u32,
) -> Result<AnnounceResponse, TrackerError> {
    if response.len() < 8 {
        return Err(TrackerError::InvalidResponse("announce too short".into()));
    }

    let action = u32::from_be_bytes([response[0], response[1], response[2], response[3]]);
    let tid = u32::from_be_bytes([response[4], response[5], response[6], response[7]]);

    if action == ACTION_ERROR {
        let message = String::from_utf8_lossy(&response[8..]).to_string();
        return Err(TrackerError::Failure(message));
    }

    if action != ACTION_ANNOUNCE || tid != transaction_id {
        return Err(TrackerError::InvalidResponse(
            "announce response mismatch".into(),
        ));
    }

    if response.len() < 20 {
        return Err(TrackerError::InvalidResponse("announce too short".into()));
    }

    let interval = u32::from_be_bytes([response[8], response[9], response[10], response[11]]);
    let leechers = u32::from_be_bytes([response[12], response[13], response[14], response[15]]);
    let seeders = u32::from_be_bytes([response[16], response[17], response[18], response[19]]);

    let mut result = AnnounceResponse::new(interval);
    result.complete = Some(seeders);
    result.incomplete = Some(leechers);
    result.peers = parse_compact_peers(&response[20..]);

    Ok(result)
}

async fn resolve_udp_url(url: &str) -> Result<SocketAddr, TrackerError> {
    let rest = url
        .strip_prefix("udp://")
        .ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))?;

    let host_port = rest.split('/').next().unwrap_or(rest);

    lookup_host(host_port)
        .await
        .map_err(|_| TrackerError::InvalidUrl(url.to_string()))?
        .next()
        .ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))
}
