//! The fixed 68-byte greeting exchanged at session start.
//!
//! The handshake ties the connection to one torrent: both sides must
//! present the same info hash, and the fixed protocol prefix rules out
//! anything that is not a BitTorrent v1 peer.
use super::HandshakeError;

/// The protocol identifier every v1 handshake starts with (after the
/// length byte 19).
pub const PROTOCOL: &[u8; 19] = b"BitTorrent protocol";

/// Total handshake size on the wire.
pub const HANDSHAKE_LEN: usize = 68;

/** A peer handshake.

Wire layout:
- 1 byte: protocol string length, always 19
- 19 bytes: "BitTorrent protocol"
- 8 bytes: reserved, all zero (no extensions are negotiated)
- 20 bytes: info hash
- 20 bytes: peer id */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Handshake {
        Handshake { info_hash, peer_id }
    }

    /// Serializes into the fixed 68-byte wire form.
    pub fn serialize(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0u8; HANDSHAKE_LEN];
        buf[0] = PROTOCOL.len() as u8;
        buf[1..20].copy_from_slice(PROTOCOL);
        // bytes 20..28 stay zero: reserved
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    /// Parses a received handshake, checking the protocol prefix.
    pub fn parse(buf: &[u8; HANDSHAKE_LEN]) -> Result<Handshake, HandshakeError> {
        if buf[0] != PROTOCOL.len() as u8 || &buf[1..20] != PROTOCOL {
            return Err(HandshakeError::InvalidProtocol);
        }

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&buf[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&buf[48..68]);

        Ok(Handshake { info_hash, peer_id })
    }

    /// Verifies the peer is talking about the torrent we asked for.
    pub fn validate(&self, expected_info_hash: [u8; 20]) -> Result<(), HandshakeError> {
        if self.info_hash != expected_info_hash {
            return Err(HandshakeError::InfoHashMismatch);
        }
        Ok(())
    }
}
