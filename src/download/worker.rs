//! The worker loop: one logical downloader multiplexing peers from the
//! shared queues.
use super::queue::TaskQueue;
use super::state::DownloadState;
use super::{FinishedPiece, PieceError, PieceTask};
use crate::peer::{Message, PeerSession, SessionError};
use crate::torrent::TorrentFile;
use crate::tracker::Peer;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Per-message wait while blocks are in flight. Keep-alives do not reset
/// it; the codec consumes them without surfacing a message.
const BLOCK_TIMEOUT: Duration = Duration::from_secs(45);

/// Ceiling on one piece attempt. A peer that trickles messages slower
/// than this forfeits the piece.
const PIECE_DEADLINE: Duration = Duration::from_secs(130);

/// How long to sit on a choked session waiting for its next message
/// (typically BITFIELD, HAVE, or the UNCHOKE we are after).
const CHOKED_WAIT: Duration = Duration::from_secs(130);

/// One of W pool members. Each worker owns at most one session at a time
/// and drives one piece on it; all sharing goes through the three queues.
pub struct Worker {
    id: usize,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    num_pieces: usize,
    peers: Arc<TaskQueue<Peer>>,
    pieces: Arc<TaskQueue<PieceTask>>,
    finished: Arc<TaskQueue<FinishedPiece>>,
}

impl Worker {
    pub fn new(
        id: usize,
        torrent: &TorrentFile,
        peer_id: [u8; 20],
        peers: Arc<TaskQueue<Peer>>,
        pieces: Arc<TaskQueue<PieceTask>>,
        finished: Arc<TaskQueue<FinishedPiece>>,
    ) -> Worker {
        Worker {
            id,
            info_hash: torrent.info_hash,
            peer_id,
            num_pieces: torrent.num_pieces(),
            peers,
            pieces,
            finished,
        }
    }

    /// Pulls peers until the piece queue drains. A peer that fails to
    /// connect or handshake is dropped, never retried; a session error
    /// moves on to the next peer with the current piece requeued.
    pub async fn run(self) {
        while !self.pieces.is_drained() {
            let peer = self.peers.get().await;
            let addr = peer.addr();

            let mut session =
                match PeerSession::connect(addr, self.info_hash, self.peer_id, self.num_pieces)
                    .await
                {
                    Ok(session) => session,
                    Err(e) => {
                        debug!(worker = self.id, peer = %addr, error = %e, "peer unusable");
                        self.peers.task_done();
                        continue;
                    }
                };
            debug!(worker = self.id, peer = %addr, "session established");

            if let Err(e) = self.drive(&mut session).await {
                debug!(worker = self.id, peer = %addr, error = %e, "session closed");
            }
            self.peers.task_done();
        }
        trace!(worker = self.id, "no work left");
    }

    /// The Live-state loop for one session.
    async fn drive(&self, session: &mut PeerSession) -> Result<(), PieceError> {
        loop {
            if self.pieces.is_drained() {
                return Ok(());
            }

            if session.peer_choking {
                let message = session.read_message(CHOKED_WAIT).await?;
                session.apply(&message)?;
                session.express_interest().await?;
                continue;
            }

            let task = self.pieces.get().await;
            if !session.has_piece(task.index as usize) {
                trace!(worker = self.id, piece = task.index, "peer lacks piece");
                self.pieces.requeue(task);
                // let a worker whose peer has the piece pick it up
                tokio::task::yield_now().await;
                continue;
            }

            let index = task.index;
            match download_piece(session, &task).await {
                Ok(data) => {
                    self.finished.put(FinishedPiece { index, data });
                    self.pieces.task_done();
                    println!(
                        "piece {:>5} verified ({} outstanding)",
                        index,
                        self.pieces.outstanding()
                    );
                }
                Err(e @ PieceError::HashMismatch { .. }) => {
                    warn!(worker = self.id, piece = index, error = %e, "requeueing piece");
                    self.pieces.requeue(task);
                }
                Err(PieceError::Choked) => {
                    debug!(worker = self.id, piece = index, "choked mid-piece, requeueing");
                    self.pieces.requeue(task);
                }
                Err(e) => {
                    self.pieces.requeue(task);
                    return Err(e);
                }
            }
        }
    }
}

/// Downloads and verifies a single piece over an unchoked session.
///
/// Keeps up to [`NUM_REQUESTS`](super::state::NUM_REQUESTS) REQUESTs in
/// flight, reading and dispatching exactly one message per iteration so
/// choke and have bookkeeping stays coherent while blocks stream in.
pub async fn download_piece(
    session: &mut PeerSession,
    task: &PieceTask,
) -> Result<Vec<u8>, PieceError> {
    let mut state = DownloadState::new(task);
    let deadline = Instant::now() + PIECE_DEADLINE;

    while !state.is_complete() {
        while state.pipeline_open() {
            let request = state.next_request();
            session.send(request).await?;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(PieceError::Timeout);
        }
        let message = match session.read_message(BLOCK_TIMEOUT.min(remaining)).await {
            Ok(message) => message,
            Err(SessionError::Timeout) => return Err(PieceError::Timeout),
            Err(e) => return Err(e.into()),
        };

        session.apply(&message)?;
        match message {
            Message::Piece { index, begin, block } => {
                state.accept_block(index, begin, &block)?;
            }
            Message::Choke => return Err(PieceError::Choked),
            _ => {}
        }
    }

    state.into_verified()
}
