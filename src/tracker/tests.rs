use std::net::SocketAddr;

use super::announcer::host_of;
use super::http::percent_encode;
use super::response::{parse_compact_peers, parse_http_response};
use super::udp::{
    build_announce_request, build_connect_request, parse_announce_response,
    parse_connect_response,
};
use super::*;

#[test]
fn test_tracker_event_encodings() {
    assert_eq!(TrackerEvent::Started.as_str(), "started");
    assert_eq!(TrackerEvent::Stopped.as_str(), "stopped");
    assert_eq!(TrackerEvent::Completed.as_str(), "completed");
    assert_eq!(TrackerEvent::None.as_str(), "");

    assert_eq!(TrackerEvent::None.as_udp_id(), 0);
    assert_eq!(TrackerEvent::Completed.as_udp_id(), 1);
    assert_eq!(TrackerEvent::Started.as_udp_id(), 2);
    assert_eq!(TrackerEvent::Stopped.as_udp_id(), 3);
}

#[test]
fn test_percent_encode() {
    assert_eq!(percent_encode(b"abc-_.~"), "abc-_.~");
    assert_eq!(percent_encode(&[0x00, 0xFF, b' ']), "%00%FF%20");
}

#[test]
fn test_parse_compact_peers() {
    let data = [
        192, 168, 1, 10, 0x1A, 0xE1, // 192.168.1.10:6881
        10, 0, 0, 1, 0x1A, 0xE2, // 10.0.0.1:6882
    ];

    let peers = parse_compact_peers(&data);
    assert_eq!(peers.len(), 2);
    assert_eq!(peers[0], "192.168.1.10:6881".parse::<SocketAddr>().unwrap());
    assert_eq!(peers[1], "10.0.0.1:6882".parse::<SocketAddr>().unwrap());
}

#[test]
fn test_compact_and_dict_forms_agree() {
    // Compact: a single 6-byte record.
    let compact = b"d8:intervali1800e5:peers6:\xc0\xa8\x01\x0a\x1a\xe1e";
    let a = parse_http_response(compact).unwrap();

    // Dictionary: the same peer spelled out.
    let dict =
        b"d8:intervali1800e5:peersld2:ip12:192.168.1.107:peer id20:aaaaaaaaaaaaaaaaaaaa4:porti6881eeee";
    let b = parse_http_response(dict).unwrap();

    assert_eq!(a.peers, b.peers);
    assert_eq!(a.peers[0], "192.168.1.10:6881".parse::<SocketAddr>().unwrap());
}

#[test]
fn test_failure_reason() {
    let body = b"d14:failure reason12:unregisterede";
    let result = parse_http_response(body);
    assert!(matches!(result, Err(TrackerError::Failure(ref m)) if m == "unregistered"));
}

#[test]
fn test_missing_interval_rejected() {
    assert!(parse_http_response(b"d5:peers0:e").is_err());
}

#[test]
fn test_connect_request_layout() {
    let request = build_connect_request(0xDEADBEEF);
    assert_eq!(request.len(), 16);
    assert_eq!(&request[..8], &0x41727101980u64.to_be_bytes());
    assert_eq!(&request[8..12], &[0, 0, 0, 0]); // action = connect
    assert_eq!(&request[12..16], &0xDEADBEEFu32.to_be_bytes());
}

#[test]
fn test_connect_response_roundtrip() {
    let mut response = Vec::new();
    response.extend_from_slice(&0u32.to_be_bytes());
    response.extend_from_slice(&0xDEADBEEFu32.to_be_bytes());
    response.extend_from_slice(&0x1122334455667788u64.to_be_bytes());

    let id = parse_connect_response(&response, 0xDEADBEEF).unwrap();
    assert_eq!(id, 0x1122334455667788);

    // Wrong transaction id is rejected.
    assert!(parse_connect_response(&response, 0xDEADBEF0).is_err());
}

#[test]
fn test_announce_request_layout() {
    let params = AnnounceParams {
        info_hash: [0xAA; 20],
        peer_id: [0xBB; 20],
        port: 6881,
        uploaded: 10,
        downloaded: 20,
        left: 30,
        event: TrackerEvent::Started,
    };

    let request = build_announce_request(0x11, 0x22, 0x33, &params);
    assert_eq!(request.len(), 98);
    assert_eq!(&request[..8], &0x11u64.to_be_bytes());
    assert_eq!(&request[8..12], &1u32.to_be_bytes()); // action = announce
    assert_eq!(&request[12..16], &0x22u32.to_be_bytes());
    assert_eq!(&request[16..36], &[0xAA; 20]);
    assert_eq!(&request[36..56], &[0xBB; 20]);
    assert_eq!(&request[56..64], &20i64.to_be_bytes()); // downloaded
    assert_eq!(&request[64..72], &30i64.to_be_bytes()); // left
    assert_eq!(&request[72..80], &10i64.to_be_bytes()); // uploaded
    assert_eq!(&request[80..84], &2u32.to_be_bytes()); // event = started
    assert_eq!(&request[84..88], &[0, 0, 0, 0]); // ip
    assert_eq!(&request[88..92], &0x33u32.to_be_bytes()); // key
    assert_eq!(&request[92..96], &(-1i32).to_be_bytes()); // num_want
    assert_eq!(&request[96..98], &6881u16.to_be_bytes());
}

#[test]
fn test_announce_response_with_peers() {
    let mut response = Vec::new();
    response.extend_from_slice(&1u32.to_be_bytes());
    response.extend_from_slice(&0x22u32.to_be_bytes());
    response.extend_from_slice(&1800u32.to_be_bytes()); // interval
    response.extend_from_slice(&3u32.to_be_bytes()); // leechers
    response.extend_from_slice(&7u32.to_be_bytes()); // seeders
    response.extend_from_slice(&[192, 168, 1, 10, 0x1A, 0xE1]);

    let parsed = parse_announce_response(&response, 0x22).unwrap();
    assert_eq!(parsed.interval, 1800);
    assert_eq!(parsed.complete, Some(7));
    assert_eq!(parsed.incomplete, Some(3));
    assert_eq!(parsed.peers.len(), 1);
}

#[test]
fn test_announce_error_action() {
    let mut response = Vec::new();
    response.extend_from_slice(&3u32.to_be_bytes());
    response.extend_from_slice(&0x22u32.to_be_bytes());
    response.extend_from_slice(b"torrent not registered");

    let result = parse_announce_response(&response, 0x22);
    assert!(matches!(result, Err(TrackerError::Failure(ref m)) if m == "torrent not registered"));
}

#[test]
fn test_http_tracker_invalid_url() {
    assert!(HttpTracker::new("ftp://tracker.example.com").is_err());
}

#[test]
fn test_host_extraction() {
    assert_eq!(host_of("http://tracker.example.com:8080/announce"), Some("tracker.example.com"));
    assert_eq!(host_of("udp://tracker.example.com:1337/announce"), Some("tracker.example.com"));
    assert_eq!(host_of("https://tracker.example.com/announce"), Some("tracker.example.com"));
}

#[tokio::test]
async fn test_mux_filters_unknown_schemes() {
    use crate::metainfo::InfoHash;
    use crate::peer::PeerId;

    let urls = vec![
        "wss://tracker.example.com/announce".to_string(),
        "ftp://tracker.example.com/announce".to_string(),
    ];
    let mux = TrackerMux::new(&urls, InfoHash([0u8; 20]), PeerId::generate(), 6881);

    // Only unsupported schemes were supplied, so the cycle attempts none.
    let outcome = mux.announce(TrackerEvent::Started, 0, 0, 0).await;
    assert_eq!(outcome.attempted, 0);
    assert_eq!(outcome.responded, 0);
    assert!(outcome.peers.is_empty());
}
