use bytes::Bytes;

use super::*;

#[test]
fn test_peer_id_shape() {
    let id = PeerId::generate();
    assert_eq!(&id.0[..8], b"-UD0001-");
    assert!(id.0[8..].iter().all(|b| b.is_ascii_alphanumeric()));
    assert_eq!(id.client_id(), Some("UD0001"));

    let other = PeerId::generate();
    assert_ne!(id.0, other.0);
}

#[test]
fn test_bitfield() {
    let mut bf = Bitfield::new(100);
    assert!(!bf.has(0));

    bf.set(0);
    assert!(bf.has(0));

    bf.set(99);
    assert!(bf.has(99));

    bf.clear(0);
    assert!(!bf.has(0));

    assert_eq!(bf.count(), 1);
}

#[test]
fn test_bitfield_msb_first() {
    let bf = Bitfield::from_bytes(&[0x80, 0x01], 16);
    assert!(bf.has(0));
    assert!(!bf.has(1));
    assert!(bf.has(15));
}

#[test]
fn test_bitfield_trailing_bits_ignored() {
    // 10 pieces in 2 bytes leaves 6 spare bits; a peer setting them must
    // not inflate the count.
    let bf = Bitfield::from_bytes(&[0xFF, 0xFF], 10);
    assert_eq!(bf.count(), 10);
    assert!(bf.is_complete());
    assert!(!bf.has(10));
    assert!(!bf.has(15));
}

#[test]
fn test_bitfield_short_buffer_extended() {
    let bf = Bitfield::from_bytes(&[0x80], 16);
    assert!(bf.has(0));
    assert!(!bf.has(8));
    assert_eq!(bf.count(), 1);
}

#[test]
fn test_bitfield_full() {
    let bf = Bitfield::full(9);
    assert!(bf.is_complete());
    assert_eq!(bf.count(), 9);
}

#[test]
fn test_handshake_roundtrip() {
    let info_hash = [1u8; 20];
    let peer_id = [2u8; 20];

    let handshake = Handshake::new(info_hash, peer_id);
    let encoded = handshake.encode();
    assert_eq!(encoded.len(), HANDSHAKE_LEN);

    let decoded = Handshake::decode(&encoded).unwrap();
    assert_eq!(decoded.info_hash, info_hash);
    assert_eq!(decoded.peer_id, peer_id);
}

#[test]
fn test_handshake_bad_tag() {
    let mut data = Handshake::new([0u8; 20], [0u8; 20]).encode().to_vec();
    data[3] = b'X';
    assert!(Handshake::decode(&data).is_err());
}

#[test]
fn test_message_roundtrip() {
    let messages = vec![
        Message::KeepAlive,
        Message::Choke,
        Message::Unchoke,
        Message::Interested,
        Message::NotInterested,
        Message::Have { piece: 42 },
        Message::Bitfield(Bytes::from_static(&[0xA0, 0x01])),
        Message::Request {
            index: 1,
            begin: 16384,
            length: 16384,
        },
        Message::Piece {
            index: 3,
            begin: 0,
            data: Bytes::from_static(b"hello world"),
        },
        Message::Cancel {
            index: 1,
            begin: 0,
            length: 16384,
        },
    ];

    for msg in messages {
        let encoded = msg.encode();
        let decoded = Message::decode(encoded).unwrap();
        assert_eq!(msg, decoded);
    }
}

#[test]
fn test_keepalive_is_zero_length() {
    assert_eq!(Message::KeepAlive.encode().as_ref(), &[0, 0, 0, 0]);
}

#[test]
fn test_unknown_message_id_skipped() {
    // Id 20 (extension protocol) is not part of this client's taxonomy;
    // the frame must decode to Unknown, not an error.
    let frame = Bytes::from_static(&[0, 0, 0, 3, 20, 0xAB, 0xCD]);
    let decoded = Message::decode(frame).unwrap();
    assert_eq!(decoded, Message::Unknown { id: 20 });
}

#[test]
fn test_truncated_message_rejected() {
    assert!(Message::decode(Bytes::from_static(&[0, 0])).is_err());
    assert!(Message::decode(Bytes::from_static(&[0, 0, 0, 5, 4, 0])).is_err());
}

#[test]
fn test_session_flags_default() {
    let flags = SessionFlags::default();
    assert!(flags.peer_choking);
    assert!(flags.am_choking);
    assert!(!flags.peer_interested);
    assert!(!flags.am_interested);
}

#[tokio::test]
async fn test_session_state_and_latch() {
    // Build a session over a real socket pair; only the shared state is
    // exercised here.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = tokio::net::TcpStream::connect(addr).await.unwrap();
    let (_server, _) = listener.accept().await.unwrap();

    let (_read, write) = client.into_split();
    let session = PeerSession::new(7, addr, PeerId::generate(), write, 16);

    assert_eq!(session.id(), 7);
    assert!(session.flags().peer_choking);

    session.set_peer_choking(false);
    session.set_am_interested(true);
    assert!(!session.flags().peer_choking);
    assert!(session.flags().am_interested);

    session.set_have(3);
    assert!(session.has_piece(3));
    session.replace_bitfield(&[0xFF, 0xFF]);
    assert!(session.bitfield().is_complete());

    // The latch fires for exactly one caller.
    assert!(!session.is_disconnected());
    assert!(session.latch_disconnect());
    assert!(!session.latch_disconnect());
    assert!(session.is_disconnected());
}

#[tokio::test]
async fn test_session_close_stops_sends() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = tokio::net::TcpStream::connect(addr).await.unwrap();
    let (_server, _) = listener.accept().await.unwrap();

    let (_read, write) = client.into_split();
    let session = PeerSession::new(1, addr, PeerId::generate(), write, 4);

    session.send(&Message::KeepAlive).await.unwrap();

    session.close().await;
    // Closing again is harmless.
    session.close().await;

    assert!(session.send(&Message::KeepAlive).await.is_err());
}

#[tokio::test]
async fn test_connect_peer_verifies_info_hash() {
    let info_hash = [9u8; 20];
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Remote replies with a different info hash; the dial must fail.
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer, theirs, _) = accept_peer(stream).await.unwrap();
        assert_eq!(theirs.info_hash, info_hash);
        reply_handshake(&mut writer, [8u8; 20], PeerId::generate())
            .await
            .unwrap();
        drop(reader);
    });

    let result = connect_peer(addr, info_hash, PeerId::generate()).await;
    assert!(matches!(result, Err(PeerError::InfoHashMismatch)));
}

#[tokio::test]
async fn test_connect_peer_handshake_roundtrip() {
    let info_hash = [5u8; 20];
    let their_id = PeerId::generate();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (_reader, mut writer, _theirs, _) = accept_peer(stream).await.unwrap();
        reply_handshake(&mut writer, info_hash, their_id).await.unwrap();
        // Hold the socket open until the dialler has read the reply.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    });

    let (_reader, _writer, theirs) = connect_peer(addr, info_hash, PeerId::generate())
        .await
        .unwrap();
    assert_eq!(theirs.peer_id, their_id.0);
}
