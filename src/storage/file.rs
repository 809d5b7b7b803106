use std::path::{Component, Path, PathBuf};

use super::error::StorageError;

/// One target file on disk, with its window into the flat piece stream.
#[derive(Debug, Clone)]
pub(super) struct TargetFile {
    /// Absolute path under the save root.
    pub path: PathBuf,
    pub length: u64,
    /// Byte offset of this file within the piece stream.
    pub offset: u64,
}

impl TargetFile {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// The intersection of a piece (or block) range with one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SpanSlice {
    pub file_index: usize,
    pub file_offset: u64,
    pub length: u64,
}

/// Replaces path-component characters that are invalid on common
/// filesystems with `_`. Applied to every component taken from torrent
/// metadata before it touches the disk.
pub fn sanitize_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Builds a sanitised relative path from metadata components, rejecting
/// anything that could escape the save root.
pub(super) fn sanitize_relative(path: &Path) -> Result<PathBuf, StorageError> {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(os) => {
                let s = os
                    .to_str()
                    .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;
                out.push(sanitize_component(s));
            }
            Component::CurDir => {}
            _ => return Err(StorageError::InvalidPath(path.display().to_string())),
        }
    }

    if out.as_os_str().is_empty() {
        return Err(StorageError::InvalidPath(path.display().to_string()));
    }

    Ok(out)
}

/// Computes the slices of `[range_start, range_start + range_len)` in the
/// flat stream that each file covers, in file order.
pub(super) fn span_slices(files: &[TargetFile], range_start: u64, range_len: u64) -> Vec<SpanSlice> {
    let mut slices = Vec::new();
    let mut remaining = range_len;
    let mut cursor = range_start;

    for (index, file) in files.iter().enumerate() {
        if remaining == 0 {
            break;
        }

        if cursor >= file.offset && cursor < file.end() {
            let file_offset = cursor - file.offset;
            let available = file.end() - cursor;
            let take = remaining.min(available);

            slices.push(SpanSlice {
                file_index: index,
                file_offset,
                length: take,
            });

            cursor += take;
            remaining -= take;
        }
    }

    slices
}
