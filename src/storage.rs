//! Disk I/O: laying the flat piece stream out across files.
//!
//! A [`DiskLayout`] maps one torrent's byte stream `[0, total_length)` to
//! its files on disk, creating directories lazily on first write. A piece
//! may straddle any number of files; writes cover exactly the overlapping
//! region of each.

mod error;
mod file;
mod layout;

pub use error::StorageError;
pub use file::sanitize_component;
pub use layout::DiskLayout;

#[cfg(test)]
mod tests;
