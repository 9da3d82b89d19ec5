//! Per-connection session state machine.
//!
//! A session moves through Dialing → Handshaking → Live → Closed. The
//! first two states live inside [`PeerSession::connect`]; a constructed
//! session is always Live, and dropping it closes the connection.
use super::bitfield::Bitfield;
use super::handshake::{Handshake, HANDSHAKE_LEN};
use super::message::{Message, MessageCodec};
use super::{ConnectError, HandshakeError, SessionError};

use futures_util::{SinkExt, StreamExt};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// How long a TCP connect may take before the peer is discarded.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Ceiling for the whole handshake exchange, send and receive.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// A live connection to one peer.
///
/// Choke and interest flags start at their protocol-mandated values: both
/// sides choking, neither interested. The bitfield starts all-zero over
/// the full piece count, so HAVE messages arriving before any BITFIELD
/// have a well-defined target.
#[derive(Debug)]
pub struct PeerSession {
    addr: SocketAddr,
    frames: tokio_util::codec::Framed<TcpStream, MessageCodec>,
    pub peer_choking: bool,
    pub peer_interested: bool,
    pub client_choking: bool,
    pub client_interested: bool,
    bitfield: Bitfield,
    num_pieces: usize,
    bitfield_allowed: bool,
}

impl PeerSession {
    /// Dials `addr`, exchanges and validates handshakes, and returns the
    /// Live session.
    ///
    /// The dial is bounded by a 3-second timeout and the handshake
    /// exchange by a 30-second one; any failure discards the peer.
    #[tracing::instrument(skip(info_hash, peer_id), level = "debug")]
    pub async fn connect(
        addr: SocketAddr,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        num_pieces: usize,
    ) -> Result<PeerSession, SessionError> {
        let mut stream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Err(_) => return Err(ConnectError::Timeout.into()),
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                return Err(ConnectError::Refused.into());
            }
            Ok(Err(e)) => return Err(ConnectError::Other(e).into()),
            Ok(Ok(stream)) => stream,
        };

        let ours = Handshake::new(info_hash, peer_id);
        let exchange = async {
            stream.write_all(&ours.serialize()).await?;
            let mut buf = [0u8; HANDSHAKE_LEN];
            stream.read_exact(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        };
        let buf = timeout(HANDSHAKE_TIMEOUT, exchange)
            .await
            .map_err(|_| HandshakeError::Timeout)?
            .map_err(HandshakeError::Io)?;

        let theirs = Handshake::parse(&buf)?;
        theirs.validate(info_hash)?;
        trace!(peer = %addr, peer_id = %hex::encode(theirs.peer_id), "handshake accepted");

        Ok(Self::from_stream(stream, addr, num_pieces))
    }

    fn from_stream(stream: TcpStream, addr: SocketAddr, num_pieces: usize) -> PeerSession {
        PeerSession {
            addr,
            frames: tokio_util::codec::Framed::new(stream, MessageCodec),
            peer_choking: true,
            peer_interested: false,
            client_choking: true,
            client_interested: false,
            bitfield: Bitfield::empty(num_pieces),
            num_pieces,
            bitfield_allowed: true,
        }
    }

    /// Whether the peer has advertised piece `index`.
    pub fn has_piece(&self, index: usize) -> bool {
        self.bitfield.has(index)
    }

    /// Reads the next message, waiting at most `limit`. Keep-alives are
    /// swallowed by the codec and do not count as messages (the limit is
    /// total across them).
    pub async fn read_message(&mut self, limit: Duration) -> Result<Message, SessionError> {
        match timeout(limit, self.frames.next()).await {
            Err(_) => Err(SessionError::Timeout),
            Ok(None) => Err(SessionError::Closed),
            Ok(Some(Err(e))) => Err(SessionError::Wire(e)),
            Ok(Some(Ok(message))) => {
                trace!(peer = %self.addr, id = message.id(), "message received");
                Ok(message)
            }
        }
    }

    /// Sends one message and flushes it.
    pub async fn send(&mut self, message: Message) -> Result<(), SessionError> {
        self.frames.send(message).await.map_err(SessionError::Wire)
    }

    /// Applies a received message to the session state.
    ///
    /// A BITFIELD is only legal while nothing but HAVEs have been applied,
    /// and at most once; REQUEST and CANCEL are accepted and ignored since
    /// we never serve blocks; PIECE payloads are left to the piece
    /// download loop.
    pub fn apply(&mut self, message: &Message) -> Result<(), SessionError> {
        match message {
            Message::Choke => self.peer_choking = true,
            Message::Unchoke => self.peer_choking = false,
            Message::Interested => self.peer_interested = true,
            Message::NotInterested => self.peer_interested = false,
            Message::Have(index) => self.bitfield.set(*index as usize),
            Message::Bitfield(bytes) => {
                if !self.bitfield_allowed {
                    return Err(SessionError::UnexpectedBitfield);
                }
                self.bitfield = Bitfield::from_bytes(bytes.clone(), self.num_pieces)?;
            }
            Message::Request { .. } | Message::Cancel { .. } => {}
            Message::Piece { .. } => {}
        }
        if !matches!(message, Message::Have(_)) {
            self.bitfield_allowed = false;
        }
        Ok(())
    }

    /// Once the peer stops choking us, declare ourselves: UNCHOKE then
    /// INTERESTED, flipping the local flags. Idempotent; does nothing
    /// while the peer still chokes or after interest was expressed.
    pub async fn express_interest(&mut self) -> Result<(), SessionError> {
        if !self.peer_choking && self.client_choking {
            self.send(Message::Unchoke).await?;
            self.send(Message::Interested).await?;
            self.client_choking = false;
            self.client_interested = true;
            trace!(peer = %self.addr, "expressed interest");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_util::codec::Framed;

    /// A session over a local socket pair, plus the remote end framed with
    /// the same codec so tests can script peer behavior.
    async fn session_pair(num_pieces: usize) -> (PeerSession, Framed<TcpStream, MessageCodec>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, (server, _)) =
            tokio::join!(TcpStream::connect(addr), async { listener.accept().await.unwrap() });
        let session = PeerSession::from_stream(client.unwrap(), addr, num_pieces);
        (session, Framed::new(server, MessageCodec))
    }

    #[tokio::test]
    async fn flags_start_at_protocol_defaults() {
        let (session, _remote) = session_pair(4).await;
        assert!(session.peer_choking);
        assert!(!session.peer_interested);
        assert!(session.client_choking);
        assert!(!session.client_interested);
        assert!((0..4).all(|i| !session.has_piece(i)));
    }

    #[tokio::test]
    async fn applies_choke_and_interest_messages() {
        let (mut session, _remote) = session_pair(4).await;

        session.apply(&Message::Unchoke).unwrap();
        assert!(!session.peer_choking);
        session.apply(&Message::Choke).unwrap();
        assert!(session.peer_choking);

        session.apply(&Message::Interested).unwrap();
        assert!(session.peer_interested);
        session.apply(&Message::NotInterested).unwrap();
        assert!(!session.peer_interested);
    }

    #[tokio::test]
    async fn have_before_bitfield_lands_in_zeroed_field() {
        let (mut session, _remote) = session_pair(16).await;

        session.apply(&Message::Have(11)).unwrap();
        assert!(session.has_piece(11));
        assert!(!session.has_piece(0));

        // a bitfield is still legal after HAVEs only
        session.apply(&Message::Bitfield(vec![0xFF, 0xFF])).unwrap();
        assert!(session.has_piece(0));
    }

    #[tokio::test]
    async fn second_bitfield_is_a_protocol_error() {
        let (mut session, _remote) = session_pair(8).await;

        session.apply(&Message::Bitfield(vec![0xA0])).unwrap();
        assert!(session.has_piece(0));
        assert!(matches!(
            session.apply(&Message::Bitfield(vec![0xFF])),
            Err(SessionError::UnexpectedBitfield)
        ));
    }

    #[tokio::test]
    async fn bitfield_after_unchoke_is_a_protocol_error() {
        let (mut session, _remote) = session_pair(8).await;

        session.apply(&Message::Unchoke).unwrap();
        assert!(matches!(
            session.apply(&Message::Bitfield(vec![0xFF])),
            Err(SessionError::UnexpectedBitfield)
        ));
    }

    #[tokio::test]
    async fn short_bitfield_is_rejected() {
        let (mut session, _remote) = session_pair(9).await;
        assert!(matches!(
            session.apply(&Message::Bitfield(vec![0xFF])),
            Err(SessionError::Bitfield(_))
        ));
    }

    #[tokio::test]
    async fn express_interest_sends_unchoke_then_interested_once() {
        let (mut session, mut remote) = session_pair(4).await;

        // still choked: nothing goes out, flags stay put
        session.express_interest().await.unwrap();
        assert!(session.client_choking);

        session.apply(&Message::Unchoke).unwrap();
        session.express_interest().await.unwrap();
        assert!(!session.client_choking);
        assert!(session.client_interested);

        assert_eq!(remote.next().await.unwrap().unwrap(), Message::Unchoke);
        assert_eq!(remote.next().await.unwrap().unwrap(), Message::Interested);

        // repeated calls stay quiet
        session.express_interest().await.unwrap();
        session.send(Message::Have(0)).await.unwrap();
        assert_eq!(remote.next().await.unwrap().unwrap(), Message::Have(0));
    }

    #[tokio::test]
    async fn read_message_times_out_without_traffic() {
        let (mut session, _remote) = session_pair(4).await;
        let result = session.read_message(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(SessionError::Timeout)));
    }

    #[tokio::test]
    async fn read_message_reports_closed_stream() {
        let (mut session, remote) = session_pair(4).await;
        drop(remote);
        let result = session.read_message(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn read_message_delivers_scripted_traffic() {
        let (mut session, mut remote) = session_pair(4).await;
        remote.send(Message::Have(3)).await.unwrap();

        let message = session.read_message(Duration::from_secs(1)).await.unwrap();
        assert_eq!(message, Message::Have(3));
        session.apply(&message).unwrap();
        assert!(session.has_piece(3));
    }
}
