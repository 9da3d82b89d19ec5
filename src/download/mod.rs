//! The concurrent download engine: piece descriptors, the task queues the
//! worker pool runs on, the per-piece block pipeline, and the assembler
//! that writes verified pieces to disk.
use crate::peer::SessionError;
use crate::torrent::TorrentFile;
use thiserror::Error;

pub mod queue;
pub mod state;
pub mod worker;
pub mod writer;

pub use queue::TaskQueue;
pub use state::DownloadState;
pub use worker::Worker;

/// One unit of work: a piece to fetch and verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceTask {
    pub index: u32,
    pub hash: [u8; 20],
    pub length: u64,
}

/// A piece that passed hash verification, ready for assembly.
#[derive(Debug, Clone)]
pub struct FinishedPiece {
    pub index: u32,
    pub data: Vec<u8>,
}

/// Builds the initial work list, one task per piece in index order.
pub fn piece_tasks(torrent: &TorrentFile) -> Vec<PieceTask> {
    (0..torrent.num_pieces())
        .map(|i| PieceTask {
            index: i as u32,
            hash: torrent.pieces_hash[i],
            length: torrent.piece_size(i),
        })
        .collect()
}

/// Why one piece attempt failed. `HashMismatch` and `Choked` leave the
/// session usable; everything else closes it. In every case the piece
/// descriptor goes back on the work queue.
#[derive(Debug, Error)]
pub enum PieceError {
    #[error("peer served a block of piece {got}, expected {expected}")]
    WrongIndex { expected: u32, got: u32 },

    #[error("block at offset {begin} does not fit the piece buffer")]
    BadBlock { begin: u32 },

    #[error("peer choked us mid-piece")]
    Choked,

    #[error("timed out waiting for a block")]
    Timeout,

    #[error("piece {index} failed hash verification")]
    HashMismatch { index: u32 },

    #[error(transparent)]
    Session(#[from] SessionError),
}
