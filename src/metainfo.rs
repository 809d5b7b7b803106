//! Torrent metadata: descriptors, info hashes, magnet links.
//!
//! A [`Descriptor`] is the engine's view of one torrent, derived either from
//! a `.torrent` file (BEP-3) or from a magnet URI. The info hash is computed
//! over the exact raw byte range of the `info` dictionary, located with
//! [`crate::bencode::skip_value`].

mod descriptor;
mod error;
mod info_hash;
mod magnet;

pub use descriptor::{Descriptor, FileSpec};
pub use error::MetainfoError;
pub use info_hash::InfoHash;
pub use magnet::MagnetLink;
