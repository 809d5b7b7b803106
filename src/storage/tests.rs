use std::path::PathBuf;

use tempfile::TempDir;

use crate::metainfo::{Descriptor, FileSpec, InfoHash};

use super::*;

fn single_file_descriptor(piece_length: u64, total_length: u64) -> Descriptor {
    let count = total_length.div_ceil(piece_length) as usize;
    Descriptor {
        name: "test.dat".to_string(),
        info_hash: InfoHash([0u8; 20]),
        piece_length,
        piece_hashes: vec![[0u8; 20]; count],
        files: vec![FileSpec {
            path: PathBuf::from("test.dat"),
            length: total_length,
            offset: 0,
        }],
        total_length,
        trackers: Vec::new(),
        private: false,
    }
}

fn multi_file_descriptor(piece_length: u64, lengths: &[(&str, u64)]) -> Descriptor {
    let mut files = Vec::new();
    let mut offset = 0u64;
    for (path, length) in lengths {
        files.push(FileSpec {
            path: PathBuf::from(path),
            length: *length,
            offset,
        });
        offset += length;
    }
    let count = offset.div_ceil(piece_length) as usize;
    Descriptor {
        name: "bundle".to_string(),
        info_hash: InfoHash([0u8; 20]),
        piece_length,
        piece_hashes: vec![[0u8; 20]; count],
        files,
        total_length: offset,
        trackers: Vec::new(),
        private: false,
    }
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_add(seed)).collect()
}

#[tokio::test]
async fn test_write_and_read_piece() {
    let temp = TempDir::new().unwrap();
    let layout = DiskLayout::new(temp.path(), &single_file_descriptor(16384, 32768)).unwrap();

    let data = pattern(16384, 0);
    layout.write_piece(0, &data).await.unwrap();

    let read = layout.read_piece(0).await.unwrap();
    assert_eq!(read.as_ref(), data.as_slice());

    // Single-file torrents land directly at save_root/<name>.
    assert!(temp.path().join("test.dat").is_file());
}

#[tokio::test]
async fn test_truncated_last_piece() {
    let temp = TempDir::new().unwrap();
    // 24576 bytes: piece 0 is 16384, piece 1 is 8192.
    let layout = DiskLayout::new(temp.path(), &single_file_descriptor(16384, 24576)).unwrap();

    assert_eq!(layout.piece_size(0), 16384);
    assert_eq!(layout.piece_size(1), 8192);

    layout.write_piece(0, &pattern(16384, 1)).await.unwrap();
    layout.write_piece(1, &pattern(8192, 2)).await.unwrap();

    let read = layout.read_piece(1).await.unwrap();
    assert_eq!(read.as_ref(), pattern(8192, 2).as_slice());

    let meta = tokio::fs::metadata(temp.path().join("test.dat")).await.unwrap();
    assert_eq!(meta.len(), 24576);
}

#[tokio::test]
async fn test_wrong_piece_length_rejected() {
    let temp = TempDir::new().unwrap();
    let layout = DiskLayout::new(temp.path(), &single_file_descriptor(16384, 24576)).unwrap();

    assert!(layout.write_piece(1, &pattern(16384, 0)).await.is_err());
    assert!(layout.write_piece(9, &pattern(16384, 0)).await.is_err());
}

#[tokio::test]
async fn test_piece_straddling_three_files() {
    let temp = TempDir::new().unwrap();
    // One 16384-byte piece covering three files: 4000 + 6000 + 6384.
    let desc = multi_file_descriptor(16384, &[("a.bin", 4000), ("b.bin", 6000), ("c.bin", 6384)]);
    let layout = DiskLayout::new(temp.path(), &desc).unwrap();

    let data = pattern(16384, 7);
    layout.write_piece(0, &data).await.unwrap();

    // Every byte of the piece appears in exactly one file.
    let a = tokio::fs::read(temp.path().join("bundle/a.bin")).await.unwrap();
    let b = tokio::fs::read(temp.path().join("bundle/b.bin")).await.unwrap();
    let c = tokio::fs::read(temp.path().join("bundle/c.bin")).await.unwrap();

    assert_eq!(a.as_slice(), &data[..4000]);
    assert_eq!(b.as_slice(), &data[4000..10000]);
    assert_eq!(c.as_slice(), &data[10000..]);

    let read = layout.read_piece(0).await.unwrap();
    assert_eq!(read.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_two_file_straddle() {
    let temp = TempDir::new().unwrap();
    // Piece 0 spans a.bin[0..10000] and b.bin[0..6384].
    let desc = multi_file_descriptor(16384, &[("a.bin", 10000), ("b.bin", 22768)]);
    let layout = DiskLayout::new(temp.path(), &desc).unwrap();

    let p0 = pattern(16384, 3);
    let p1 = pattern(16384, 4);
    layout.write_piece(0, &p0).await.unwrap();
    layout.write_piece(1, &p1).await.unwrap();

    let a = tokio::fs::read(temp.path().join("bundle/a.bin")).await.unwrap();
    assert_eq!(a.len(), 10000);
    assert_eq!(a.as_slice(), &p0[..10000]);

    let b = tokio::fs::read(temp.path().join("bundle/b.bin")).await.unwrap();
    assert_eq!(b.len(), 22768);
    assert_eq!(&b[..6384], &p0[10000..]);
    assert_eq!(&b[6384..], p1.as_slice());

    assert!(layout.verify_sizes().await);
}

#[tokio::test]
async fn test_nested_directories_created_on_demand() {
    let temp = TempDir::new().unwrap();
    let desc = multi_file_descriptor(16384, &[("sub/dir/deep.bin", 16384)]);
    let layout = DiskLayout::new(temp.path(), &desc).unwrap();

    // Nothing exists before the first write.
    assert!(!temp.path().join("bundle").exists());

    layout.write_piece(0, &pattern(16384, 9)).await.unwrap();
    assert!(temp.path().join("bundle/sub/dir/deep.bin").is_file());
}

#[tokio::test]
async fn test_read_block() {
    let temp = TempDir::new().unwrap();
    let layout = DiskLayout::new(temp.path(), &single_file_descriptor(32768, 32768)).unwrap();

    let data = pattern(32768, 5);
    layout.write_piece(0, &data).await.unwrap();

    let block = layout.read_block(0, 16384, 1000).await.unwrap();
    assert_eq!(block.as_ref(), &data[16384..17384]);

    // Out-of-piece ranges are rejected.
    assert!(layout.read_block(0, 32000, 1000).await.is_err());
}

#[tokio::test]
async fn test_verify_sizes_is_diagnostic() {
    let temp = TempDir::new().unwrap();
    let layout = DiskLayout::new(temp.path(), &single_file_descriptor(16384, 32768)).unwrap();

    // Missing file: false, and still nothing created.
    assert!(!layout.verify_sizes().await);
    assert!(!temp.path().join("test.dat").exists());

    layout.write_piece(0, &pattern(16384, 0)).await.unwrap();
    // Short file: still false.
    assert!(!layout.verify_sizes().await);

    layout.write_piece(1, &pattern(16384, 1)).await.unwrap();
    assert!(layout.verify_sizes().await);
}

#[tokio::test]
async fn test_remove_data() {
    let temp = TempDir::new().unwrap();
    let desc = multi_file_descriptor(16384, &[("a.bin", 16384)]);
    let layout = DiskLayout::new(temp.path(), &desc).unwrap();

    layout.write_piece(0, &pattern(16384, 0)).await.unwrap();
    assert!(temp.path().join("bundle").exists());

    layout.remove_data().await;
    assert!(!temp.path().join("bundle").exists());

    // Deleting again is harmless.
    layout.remove_data().await;
}

#[test]
fn test_sanitize_component() {
    assert_eq!(sanitize_component("plain-name_1.bin"), "plain-name_1.bin");
    assert_eq!(sanitize_component("a:b*c?d"), "a_b_c_d");
    assert_eq!(sanitize_component("x<y>|z\""), "x_y__z_");
}

#[test]
fn test_parent_components_rejected() {
    let desc = multi_file_descriptor(16384, &[("../escape.bin", 16384)]);
    let temp = TempDir::new().unwrap();
    assert!(DiskLayout::new(temp.path(), &desc).is_err());
}
