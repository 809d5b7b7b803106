use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use sha1::{Digest, Sha1};

use crate::metainfo::{Descriptor, FileSpec, InfoHash};
use crate::peer::Bitfield;

use super::*;

const PEER_A: u64 = 1;
const PEER_B: u64 = 2;

fn sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn descriptor(piece_length: u64, total_length: u64, hashes: Vec<[u8; 20]>) -> Descriptor {
    Descriptor {
        name: "fixture".to_string(),
        info_hash: InfoHash([0u8; 20]),
        piece_length,
        piece_hashes: hashes,
        files: vec![FileSpec {
            path: PathBuf::from("fixture"),
            length: total_length,
            offset: 0,
        }],
        total_length,
        trackers: Vec::new(),
        private: false,
    }
}

fn scheduler(piece_length: u64, total_length: u64) -> PieceScheduler {
    let count = total_length.div_ceil(piece_length) as usize;
    PieceScheduler::new(
        &descriptor(piece_length, total_length, vec![[0u8; 20]; count]),
        crate::constants::FAILURE_REANNOUNCE_THRESHOLD,
    )
}

#[test]
fn test_block_planning() {
    // 40000 bytes: blocks of 16384, 16384, 7232.
    let s = scheduler(40000, 40000);
    let requests = s.next_requests(0, PEER_A, 16);

    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0], BlockRequest { piece: 0, begin: 0, length: 16384 });
    assert_eq!(requests[1], BlockRequest { piece: 0, begin: 16384, length: 16384 });
    assert_eq!(requests[2], BlockRequest { piece: 0, begin: 32768, length: 7232 });
    assert_eq!(requests.iter().map(|r| r.length as u64).sum::<u64>(), 40000);
}

#[test]
fn test_no_double_request() {
    let s = scheduler(32768, 32768);

    let first = s.next_requests(0, PEER_A, 1);
    assert_eq!(first.len(), 1);

    // The claimed block must not be handed to another peer.
    let second = s.next_requests(0, PEER_B, 16);
    assert!(second.iter().all(|r| r.begin != first[0].begin));
}

#[test]
fn test_pipeline_cap() {
    let s = scheduler(16384 * 10, 16384 * 10);
    assert_eq!(s.next_requests(0, PEER_A, 4).len(), 4);
    assert_eq!(s.next_requests(0, PEER_A, 100).len(), 6);
}

#[test]
fn test_pick_respects_peer_bitfield() {
    let s = scheduler(16384, 16384 * 4);

    let mut bf = Bitfield::new(4);
    assert_eq!(s.pick_piece(&bf), None);

    bf.set(2);
    assert_eq!(s.pick_piece(&bf), Some(2));
}

#[test]
fn test_pick_prefers_in_progress() {
    let s = scheduler(32768, 32768 * 3);
    let all = Bitfield::full(3);

    // Claim one block of piece 1; it now outranks fresh piece 0.
    s.next_requests(1, PEER_A, 1);
    assert_eq!(s.pick_piece(&all), Some(1));
}

#[test]
fn test_pick_skips_verified() {
    let data = vec![7u8; 16384];
    let desc = descriptor(16384, 16384 * 2, vec![sha1(&data), [0u8; 20]]);
    let s = PieceScheduler::new(&desc, 10);
    let all = Bitfield::full(2);

    s.next_requests(0, PEER_A, 16);
    match s.record_block(0, 0, Bytes::from(data)) {
        BlockIngest::Assembled(buf) => {
            assert_eq!(sha1(&buf), s.expected_hash(0).unwrap());
            s.commit_verified(0, PEER_A);
        }
        other => panic!("expected assembly, got {:?}", other),
    }

    assert!(s.is_verified(0));
    assert_eq!(s.pick_piece(&all), Some(1));
}

#[test]
fn test_assembly_is_byte_exact() {
    let piece: Vec<u8> = (0..40000u32).map(|i| (i % 251) as u8).collect();
    let desc = descriptor(40000, 40000, vec![sha1(&piece)]);
    let s = PieceScheduler::new(&desc, 10);

    let requests = s.next_requests(0, PEER_A, 16);

    // Deliver blocks out of order; assembly must still be offset-ascending.
    let mut out = None;
    for r in requests.iter().rev() {
        let chunk = Bytes::copy_from_slice(
            &piece[r.begin as usize..(r.begin + r.length) as usize],
        );
        match s.record_block(r.piece, r.begin, chunk) {
            BlockIngest::Assembled(buf) => out = Some(buf),
            BlockIngest::Stored => {}
            BlockIngest::Ignored => panic!("block unexpectedly ignored"),
        }
    }

    let buf = out.expect("last block completes the piece");
    assert_eq!(buf.as_ref(), piece.as_slice());
    assert_eq!(sha1(&buf), s.expected_hash(0).unwrap());
}

#[test]
fn test_mismatched_block_ignored() {
    let s = scheduler(32768, 32768);
    s.next_requests(0, PEER_A, 16);

    // Wrong offset and wrong length are both dropped.
    assert!(matches!(
        s.record_block(0, 5, Bytes::from(vec![0u8; 16384])),
        BlockIngest::Ignored
    ));
    assert!(matches!(
        s.record_block(0, 0, Bytes::from(vec![0u8; 100])),
        BlockIngest::Ignored
    ));
    assert!(matches!(
        s.record_block(9, 0, Bytes::from(vec![0u8; 16384])),
        BlockIngest::Ignored
    ));
}

#[test]
fn test_choke_release_makes_blocks_requestable() {
    let s = scheduler(32768, 32768);
    let claimed = s.next_requests(0, PEER_A, 16);
    assert_eq!(claimed.len(), 2);

    // Nothing left for another peer while peer A holds the claims.
    assert!(s.next_requests(0, PEER_B, 16).is_empty());

    let released = s.release_peer(PEER_A);
    assert_eq!(released, 2);

    let reclaimed = s.next_requests(0, PEER_B, 16);
    assert_eq!(reclaimed.len(), 2);
}

#[test]
fn test_reject_resets_and_escalates() {
    let s = PieceScheduler::new(
        &descriptor(16384, 16384, vec![[0u8; 20]]),
        2, // re-announce after two consecutive failures
    );

    s.next_requests(0, PEER_A, 16);
    s.record_block(0, 0, Bytes::from(vec![0u8; 16384]));

    assert_eq!(s.reject_piece(0, PEER_A), FailureAction::Continue);
    assert_eq!(s.peer_failure_count(PEER_A), 1);

    // Blocks were reset, so the piece is immediately re-downloadable.
    assert_eq!(s.next_requests(0, PEER_A, 16).len(), 1);

    assert_eq!(s.reject_piece(0, PEER_A), FailureAction::Reannounce);
    assert_eq!(s.peer_failure_count(PEER_A), 2);
}

#[test]
fn test_fatal_ceiling() {
    let s = PieceScheduler::new(&descriptor(16384, 16384, vec![[0u8; 20]]), 10);

    let mut last = FailureAction::Continue;
    for _ in 0..crate::constants::FAILURE_FATAL_THRESHOLD {
        last = s.reject_piece(0, PEER_A);
    }
    assert_eq!(last, FailureAction::Fatal);
}

#[test]
fn test_verified_resets_failure_streak() {
    let data = vec![3u8; 16384];
    let desc = descriptor(16384, 16384 * 2, vec![sha1(&data), [0u8; 20]]);
    let s = PieceScheduler::new(&desc, 2);

    assert_eq!(s.reject_piece(1, PEER_A), FailureAction::Continue);

    s.next_requests(0, PEER_B, 16);
    s.record_block(0, 0, Bytes::from(data));
    s.commit_verified(0, PEER_B);

    // The streak restarted, so the next failure is back to Continue.
    assert_eq!(s.reject_piece(1, PEER_A), FailureAction::Continue);
}

#[test]
fn test_peer_drop_escalates_mid_piece() {
    let s = PieceScheduler::new(&descriptor(16384, 16384, vec![[0u8; 20]]), 1);

    // No blocks in flight: dropping is free.
    assert_eq!(s.on_peer_dropped(PEER_A), FailureAction::Continue);

    s.next_requests(0, PEER_A, 16);
    assert_eq!(s.on_peer_dropped(PEER_A), FailureAction::Reannounce);

    // The claims were released.
    assert_eq!(s.next_requests(0, PEER_B, 16).len(), 1);
}

#[test]
fn test_reclaim_expired() {
    let mut s = scheduler(32768, 32768);

    s.next_requests(0, PEER_A, 16);
    assert_eq!(s.reclaim_expired(), 0);

    s.set_request_timeout(Duration::ZERO);
    std::thread::sleep(Duration::from_millis(5));
    assert_eq!(s.reclaim_expired(), 2);

    // Reclaimed blocks are requestable again.
    assert_eq!(s.next_requests(0, PEER_B, 16).len(), 2);
}

#[test]
fn test_progress_accounting() {
    let p0 = vec![1u8; 16384];
    let p1 = vec![2u8; 8192]; // truncated last piece
    let desc = descriptor(16384, 16384 + 8192, vec![sha1(&p0), sha1(&p1)]);
    let s = PieceScheduler::new(&desc, 10);

    let before = s.progress();
    assert_eq!(before.bytes_verified, 0);
    assert!(!before.complete);

    s.next_requests(0, PEER_A, 16);
    s.record_block(0, 0, Bytes::from(p0));
    s.commit_verified(0, PEER_A);

    let mid = s.progress();
    assert_eq!(mid.bytes_verified, 16384);
    assert!((mid.fraction - 16384.0 / 24576.0).abs() < 1e-9);
    assert!(!mid.complete);

    // The short last piece plans a single short block.
    let requests = s.next_requests(1, PEER_A, 16);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].length, 8192);

    s.record_block(1, 0, Bytes::from(p1));
    s.commit_verified(1, PEER_A);

    let done = s.progress();
    assert_eq!(done.bytes_verified, 24576);
    assert!(done.complete);
    assert!(s.is_complete());
    assert!(s.bitfield().is_complete());
}
