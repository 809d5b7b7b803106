use std::path::PathBuf;

use crate::bencode::{decode, skip_value, Value};

use super::error::MetainfoError;
use super::info_hash::InfoHash;
use super::magnet::MagnetLink;

/// A file within a torrent.
///
/// Paths are relative to the torrent's root directory; for single-file
/// torrents there is one entry whose path is the torrent name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    /// Relative path of the file.
    pub path: PathBuf,
    /// Size of the file in bytes.
    pub length: u64,
    /// Byte offset within the torrent's flat piece stream, the cumulative
    /// sum of prior file lengths.
    pub offset: u64,
}

/// A parsed torrent descriptor.
///
/// Derived from a `.torrent` file or a magnet URI; the latter carries no
/// piece data, so [`Descriptor::is_startable`] distinguishes descriptors
/// that can actually be downloaded.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Suggested name for the file or directory.
    pub name: String,
    /// The torrent's wire identity.
    pub info_hash: InfoHash,
    /// Number of bytes per piece.
    pub piece_length: u64,
    /// SHA-1 digest of each piece, in order.
    pub piece_hashes: Vec<[u8; 20]>,
    /// Files covered by the piece stream, with cumulative offsets.
    pub files: Vec<FileSpec>,
    /// Total size of all files combined.
    pub total_length: u64,
    /// Announce URLs, deduplicated, primary tracker first.
    pub trackers: Vec<String>,
    /// If true, clients should only use the listed trackers (advisory).
    pub private: bool,
}

impl Descriptor {
    /// Parses a `.torrent` file from raw bytes.
    ///
    /// The info hash is the SHA-1 of the exact raw byte range holding the
    /// `info` value, located with [`skip_value`] - never of a re-encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid bencode, required fields
    /// are missing, the `pieces` length is not a multiple of 20, or the
    /// piece-hash count is inconsistent with the total length.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetainfoError> {
        let value = decode(data)?;
        let dict = value.as_dict().ok_or(MetainfoError::InvalidField("root"))?;

        let info_value = dict
            .get(b"info".as_slice())
            .ok_or(MetainfoError::MissingField("info"))?;

        let info_hash = InfoHash::from_info_bytes(raw_info_range(data)?);

        let (name, piece_length, piece_hashes, files, total_length, private) =
            parse_info(info_value)?;

        let expected_pieces = total_length.div_ceil(piece_length);
        if piece_hashes.len() as u64 != expected_pieces {
            return Err(MetainfoError::InvalidField("pieces"));
        }

        let mut trackers = Vec::new();
        if let Some(announce) = dict.get(b"announce".as_slice()).and_then(|v| v.as_str()) {
            trackers.push(announce.to_string());
        }
        if let Some(tiers) = dict.get(b"announce-list".as_slice()).and_then(|v| v.as_list()) {
            for tier in tiers {
                for url in tier.as_list().unwrap_or(&[]) {
                    if let Some(url) = url.as_str() {
                        if !trackers.iter().any(|t| t == url) {
                            trackers.push(url.to_string());
                        }
                    }
                }
            }
        }

        Ok(Self {
            name,
            info_hash,
            piece_length,
            piece_hashes,
            files,
            total_length,
            trackers,
            private,
        })
    }

    /// Builds a descriptor from a magnet URI.
    ///
    /// The result carries the info hash, display name and trackers only;
    /// piece data is absent until full metadata is supplied, so the
    /// descriptor is not startable.
    pub fn from_magnet(uri: &str) -> Result<Self, MetainfoError> {
        let magnet = MagnetLink::parse(uri)?;

        let name = magnet
            .display_name
            .clone()
            .unwrap_or_else(|| magnet.info_hash.to_hex());

        Ok(Self {
            name,
            info_hash: magnet.info_hash,
            piece_length: 0,
            piece_hashes: Vec::new(),
            files: Vec::new(),
            total_length: magnet.exact_length.unwrap_or(0),
            trackers: magnet.trackers,
            private: false,
        })
    }

    /// Returns the number of pieces.
    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Returns the length of the piece at `index`; the last piece is
    /// truncated to the remainder of the total length.
    pub fn piece_size(&self, index: u32) -> u64 {
        if (index as usize) + 1 < self.piece_hashes.len() {
            return self.piece_length;
        }
        let remainder = self.total_length % self.piece_length;
        if remainder == 0 {
            self.piece_length
        } else {
            remainder
        }
    }

    /// Returns true if the descriptor carries piece data and can be
    /// downloaded. Magnet-derived descriptors without metadata are not
    /// startable.
    pub fn is_startable(&self) -> bool {
        !self.piece_hashes.is_empty() && self.piece_length > 0 && !self.files.is_empty()
    }
}

// Locates the raw byte range of the top-level `info` value. Walks the outer
// dictionary key by key with skip_value so binary string payloads cannot be
// mistaken for delimiters.
fn raw_info_range(data: &[u8]) -> Result<&[u8], MetainfoError> {
    if data.first() != Some(&b'd') {
        return Err(MetainfoError::InvalidField("root"));
    }

    let mut pos = 1;
    while data.get(pos) != Some(&b'e') {
        let key_end = skip_value(data, pos)?;
        let value_end = skip_value(data, key_end)?;

        if &data[pos..key_end] == b"4:info" {
            return Ok(&data[key_end..value_end]);
        }

        pos = value_end;
    }

    Err(MetainfoError::MissingField("info"))
}

type ParsedInfo = (String, u64, Vec<[u8; 20]>, Vec<FileSpec>, u64, bool);

fn parse_info(value: &Value) -> Result<ParsedInfo, MetainfoError> {
    let dict = value.as_dict().ok_or(MetainfoError::InvalidField("info"))?;

    let name = dict
        .get(b"name".as_slice())
        .and_then(|v| v.as_str())
        .ok_or(MetainfoError::MissingField("name"))?
        .to_string();

    let piece_length = dict
        .get(b"piece length".as_slice())
        .and_then(|v| v.as_integer())
        .ok_or(MetainfoError::MissingField("piece length"))?;
    if piece_length <= 0 {
        return Err(MetainfoError::InvalidField("piece length"));
    }
    let piece_length = piece_length as u64;

    let pieces_bytes = dict
        .get(b"pieces".as_slice())
        .and_then(|v| v.as_bytes())
        .ok_or(MetainfoError::MissingField("pieces"))?;

    if pieces_bytes.len() % 20 != 0 {
        return Err(MetainfoError::InvalidField("pieces"));
    }

    let piece_hashes: Vec<[u8; 20]> = pieces_bytes
        .chunks_exact(20)
        .map(|chunk| {
            let mut arr = [0u8; 20];
            arr.copy_from_slice(chunk);
            arr
        })
        .collect();

    let private = dict
        .get(b"private".as_slice())
        .and_then(|v| v.as_integer())
        .map(|v| v == 1)
        .unwrap_or(false);

    let (files, total_length) = if let Some(length) =
        dict.get(b"length".as_slice()).and_then(|v| v.as_integer())
    {
        let length = length as u64;
        let file = FileSpec {
            path: PathBuf::from(&name),
            length,
            offset: 0,
        };
        (vec![file], length)
    } else if let Some(files_list) = dict.get(b"files".as_slice()).and_then(|v| v.as_list()) {
        let mut files = Vec::new();
        let mut offset = 0u64;

        for file_value in files_list {
            let file_dict = file_value
                .as_dict()
                .ok_or(MetainfoError::InvalidField("files"))?;

            let length = file_dict
                .get(b"length".as_slice())
                .and_then(|v| v.as_integer())
                .ok_or(MetainfoError::MissingField("file length"))? as u64;

            let path_list = file_dict
                .get(b"path".as_slice())
                .and_then(|v| v.as_list())
                .ok_or(MetainfoError::MissingField("file path"))?;

            let path: PathBuf = path_list
                .iter()
                .filter_map(|p| p.as_str().map(String::from))
                .collect();

            if path.as_os_str().is_empty() {
                return Err(MetainfoError::InvalidField("file path"));
            }

            files.push(FileSpec {
                path,
                length,
                offset,
            });

            offset += length;
        }

        if files.is_empty() {
            return Err(MetainfoError::InvalidField("files"));
        }

        (files, offset)
    } else {
        return Err(MetainfoError::MissingField("length or files"));
    };

    Ok((name, piece_length, piece_hashes, files, total_length, private))
}
