//! Metainfo (.torrent) parsing and error reporting.
//!
//! Only single-file torrents are handled; the download engine addresses the
//! payload as one contiguous byte range split into fixed-size pieces.
use thiserror::Error;
pub mod file;
pub mod info_hash;

pub use file::TorrentFile;

#[derive(Debug, Error)]
pub enum TorrentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode decoding error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("invalid torrent file: {0}")]
    InvalidFormat(String),

    #[error("missing or invalid field: {0}")]
    MissingField(String),

    #[error("pieces string length is not a multiple of 20")]
    InvalidPiecesLength,

    #[error("piece hashes do not cover the file length")]
    PieceCountMismatch,
}

/// Result type for torrent operations.
pub type TorrentResult<T> = std::result::Result<T, TorrentError>;
