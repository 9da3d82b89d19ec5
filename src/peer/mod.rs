//! Peer-wire protocol: handshake, message codec, bitfield, and the
//! per-connection session state machine.
use thiserror::Error;

pub mod bitfield;
pub mod handshake;
pub mod message;
pub mod session;

pub use bitfield::Bitfield;
pub use handshake::Handshake;
pub use message::{Message, MessageCodec, MessageError};
pub use session::PeerSession;

/// Failure to open the TCP connection. The peer is discarded; it is never
/// retried by the same worker.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connection attempt timed out")]
    Timeout,

    #[error("peer refused the connection")]
    Refused,

    #[error("connection failed: {0}")]
    Other(#[from] std::io::Error),
}

/// Failure during the 68-byte handshake exchange.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handshake does not carry the BitTorrent protocol prefix")]
    InvalidProtocol,

    #[error("handshake carries a different info hash")]
    InfoHashMismatch,

    #[error("handshake timed out")]
    Timeout,

    #[error("handshake I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Any error that ends a live session. Per-session errors never terminate
/// the process; the worker logs them and moves on to the next peer.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Wire(#[from] MessageError),

    #[error(transparent)]
    Bitfield(#[from] bitfield::BitfieldError),

    #[error("peer sent a bitfield after other messages")]
    UnexpectedBitfield,

    #[error("peer closed the connection")]
    Closed,

    #[error("timed out waiting for a message")]
    Timeout,
}
