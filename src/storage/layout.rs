use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex as TokioMutex;

use crate::metainfo::Descriptor;

use super::error::StorageError;
use super::file::{sanitize_component, sanitize_relative, span_slices, TargetFile};

/// Maps one torrent's flat piece stream onto files under a save root.
///
/// Single-file torrents land at `save_root/<name>`; multi-file torrents at
/// `save_root/<name>/<path...>`. Nothing is created until the first write;
/// parent directories appear on demand. Writes are serialised per torrent
/// by an internal gate and synced before success is reported.
pub struct DiskLayout {
    files: Vec<TargetFile>,
    piece_length: u64,
    total_length: u64,
    piece_count: usize,
    /// `save_root/<name>`: a file for single-file torrents, a directory
    /// otherwise. This is what `remove_data` deletes.
    content_root: PathBuf,
    handles: DashMap<usize, Arc<FileHandle>>,
    write_gate: TokioMutex<()>,
}

struct FileHandle {
    file: TokioMutex<File>,
    writable: bool,
}

impl DiskLayout {
    /// Builds the layout for a descriptor. Paths are sanitised here;
    /// metadata that tries to escape the save root is rejected.
    pub fn new(save_root: &Path, descriptor: &Descriptor) -> Result<Self, StorageError> {
        let name = sanitize_component(&descriptor.name);
        if name.is_empty() {
            return Err(StorageError::InvalidPath(descriptor.name.clone()));
        }
        let content_root = save_root.join(&name);

        let single_file = descriptor.files.len() == 1
            && descriptor.files[0].path == PathBuf::from(&descriptor.name);

        let mut files = Vec::with_capacity(descriptor.files.len());
        for spec in &descriptor.files {
            let path = if single_file {
                content_root.clone()
            } else {
                content_root.join(sanitize_relative(&spec.path)?)
            };

            files.push(TargetFile {
                path,
                length: spec.length,
                offset: spec.offset,
            });
        }

        Ok(Self {
            files,
            piece_length: descriptor.piece_length,
            total_length: descriptor.total_length,
            piece_count: descriptor.piece_count(),
            content_root,
            handles: DashMap::new(),
            write_gate: TokioMutex::new(()),
        })
    }

    /// The file or directory everything for this torrent lives under.
    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// Returns the length of the piece at `index`.
    pub fn piece_size(&self, index: u32) -> u64 {
        if (index as usize) + 1 < self.piece_count {
            return self.piece_length;
        }
        let remainder = self.total_length % self.piece_length;
        if remainder == 0 {
            self.piece_length
        } else {
            remainder
        }
    }

    /// Writes one verified piece to every file it overlaps.
    ///
    /// Each covered file receives exactly the intersecting byte range,
    /// seek-written at the in-file offset and synced before return. Writes
    /// are serialised per torrent.
    pub async fn write_piece(&self, index: u32, data: &[u8]) -> Result<(), StorageError> {
        if index as usize >= self.piece_count {
            return Err(StorageError::InvalidPieceIndex(index));
        }

        let expected = self.piece_size(index);
        if data.len() as u64 != expected {
            return Err(StorageError::LengthMismatch {
                piece: index,
                expected,
                got: data.len() as u64,
            });
        }

        let _gate = self.write_gate.lock().await;

        let start = index as u64 * self.piece_length;
        let mut data_offset = 0usize;

        for slice in span_slices(&self.files, start, expected) {
            let handle = self.open_write(slice.file_index).await?;
            let mut file = handle.file.lock().await;

            file.seek(SeekFrom::Start(slice.file_offset)).await?;
            let chunk = &data[data_offset..data_offset + slice.length as usize];
            file.write_all(chunk).await?;
            file.sync_data().await?;

            data_offset += slice.length as usize;
        }

        Ok(())
    }

    /// Reads one whole piece back from disk.
    pub async fn read_piece(&self, index: u32) -> Result<Bytes, StorageError> {
        if index as usize >= self.piece_count {
            return Err(StorageError::InvalidPieceIndex(index));
        }

        let length = self.piece_size(index);
        let start = index as u64 * self.piece_length;
        self.read_range(start, length).await
    }

    /// Reads a block out of a piece; the seeding path for peer `Request`s.
    pub async fn read_block(
        &self,
        index: u32,
        offset: u32,
        length: u32,
    ) -> Result<Bytes, StorageError> {
        if index as usize >= self.piece_count {
            return Err(StorageError::InvalidPieceIndex(index));
        }

        if offset as u64 + length as u64 > self.piece_size(index) {
            return Err(StorageError::InvalidBlockRange {
                piece: index,
                offset,
                length,
            });
        }

        let start = index as u64 * self.piece_length + offset as u64;
        self.read_range(start, length as u64).await
    }

    /// Checks that every file exists with exactly its expected length.
    ///
    /// Purely diagnostic: nothing on disk is modified, and a short or
    /// missing file simply yields `false`.
    pub async fn verify_sizes(&self) -> bool {
        for file in &self.files {
            match tokio::fs::metadata(&file.path).await {
                Ok(meta) if meta.len() == file.length => {}
                _ => return false,
            }
        }
        true
    }

    /// Syncs and drops every cached file handle.
    pub async fn flush(&self) {
        let keys: Vec<usize> = self.handles.iter().map(|r| *r.key()).collect();
        for key in keys {
            if let Some((_, handle)) = self.handles.remove(&key) {
                if handle.writable {
                    let file = handle.file.lock().await;
                    let _ = file.sync_data().await;
                }
            }
        }
    }

    /// Recursively deletes the torrent's content under the save root.
    /// I/O failures are logged, not escalated; partial bytes may remain.
    pub async fn remove_data(&self) {
        self.flush().await;

        let result = match tokio::fs::metadata(&self.content_root).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&self.content_root).await,
            Ok(_) => tokio::fs::remove_file(&self.content_root).await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::warn!(
                path = %self.content_root.display(),
                error = %e,
                "failed to delete torrent data"
            );
        }
    }

    async fn read_range(&self, start: u64, length: u64) -> Result<Bytes, StorageError> {
        let mut data = Vec::with_capacity(length as usize);

        for slice in span_slices(&self.files, start, length) {
            let handle = self.open_read(slice.file_index).await?;
            let mut file = handle.file.lock().await;

            file.seek(SeekFrom::Start(slice.file_offset)).await?;
            let mut buf = vec![0u8; slice.length as usize];
            file.read_exact(&mut buf).await?;
            data.extend_from_slice(&buf);
        }

        Ok(Bytes::from(data))
    }

    async fn open_write(&self, file_index: usize) -> Result<Arc<FileHandle>, StorageError> {
        if let Some(handle) = self.handles.get(&file_index) {
            if handle.writable {
                return Ok(handle.clone());
            }
            drop(handle);
            self.handles.remove(&file_index);
        }

        let path = &self.files[file_index].path;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .await?;

        let handle = Arc::new(FileHandle {
            file: TokioMutex::new(file),
            writable: true,
        });
        self.handles.insert(file_index, handle.clone());
        Ok(handle)
    }

    async fn open_read(&self, file_index: usize) -> Result<Arc<FileHandle>, StorageError> {
        if let Some(handle) = self.handles.get(&file_index) {
            return Ok(handle.clone());
        }

        let path = &self.files[file_index].path;
        let file = File::open(path)
            .await
            .map_err(|_| StorageError::FileNotFound(path.display().to_string()))?;

        let handle = Arc::new(FileHandle {
            file: TokioMutex::new(file),
            writable: false,
        });
        self.handles.insert(file_index, handle.clone());
        Ok(handle)
    }
}
