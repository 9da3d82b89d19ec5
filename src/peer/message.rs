//! Length-prefixed peer-wire messages and their framing codec.
//!
//! Every message is `<length: u32 BE><id: u8><payload>`; a length of zero
//! is a keep-alive, which carries no id and no state. The codec consumes
//! keep-alives internally, so the session layer only ever sees messages
//! that change something.
use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Upper bound on a frame: a 16 KiB block plus the PIECE header, rounded
/// up generously so large bitfields still fit.
const MAX_FRAME: usize = 1 << 16;

/// A parsed peer-wire message. Unknown ids never reach this type; the
/// decoder rejects them as a recoverable parse error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(u32),
    Bitfield(Vec<u8>),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
}

impl Message {
    /// The wire id of this message.
    pub fn id(&self) -> u8 {
        match self {
            Message::Choke => 0,
            Message::Unchoke => 1,
            Message::Interested => 2,
            Message::NotInterested => 3,
            Message::Have(_) => 4,
            Message::Bitfield(_) => 5,
            Message::Request { .. } => 6,
            Message::Piece { .. } => 7,
            Message::Cancel { .. } => 8,
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => 0,
            Message::Have(_) => 4,
            Message::Bitfield(bytes) => bytes.len(),
            Message::Request { .. } | Message::Cancel { .. } => 12,
            Message::Piece { block, .. } => 8 + block.len(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("unknown message id {0}")]
    UnknownId(u8),

    #[error("message id {id} arrived with a {len}-byte payload")]
    Truncated { id: u8, len: usize },

    #[error("frame of {0} bytes exceeds the maximum")]
    Oversized(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn expect_len(id: u8, payload: &[u8], want: usize) -> Result<(), MessageError> {
    if payload.len() != want {
        return Err(MessageError::Truncated {
            id,
            len: payload.len(),
        });
    }
    Ok(())
}

fn parse_payload(id: u8, payload: &[u8]) -> Result<Message, MessageError> {
    let message = match id {
        0 => {
            expect_len(id, payload, 0)?;
            Message::Choke
        }
        1 => {
            expect_len(id, payload, 0)?;
            Message::Unchoke
        }
        2 => {
            expect_len(id, payload, 0)?;
            Message::Interested
        }
        3 => {
            expect_len(id, payload, 0)?;
            Message::NotInterested
        }
        4 => {
            expect_len(id, payload, 4)?;
            Message::Have(BigEndian::read_u32(payload))
        }
        5 => Message::Bitfield(payload.to_vec()),
        6 | 8 => {
            expect_len(id, payload, 12)?;
            let index = BigEndian::read_u32(&payload[0..4]);
            let begin = BigEndian::read_u32(&payload[4..8]);
            let length = BigEndian::read_u32(&payload[8..12]);
            if id == 6 {
                Message::Request { index, begin, length }
            } else {
                Message::Cancel { index, begin, length }
            }
        }
        7 => {
            if payload.len() < 8 {
                return Err(MessageError::Truncated {
                    id,
                    len: payload.len(),
                });
            }
            Message::Piece {
                index: BigEndian::read_u32(&payload[0..4]),
                begin: BigEndian::read_u32(&payload[4..8]),
                block: payload[8..].to_vec(),
            }
        }
        other => return Err(MessageError::UnknownId(other)),
    };
    Ok(message)
}

/// Frames [`Message`]s over a byte stream for use with
/// `tokio_util::codec::Framed`.
#[derive(Debug)]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = MessageError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, MessageError> {
        loop {
            if src.len() < 4 {
                return Ok(None);
            }

            let length = BigEndian::read_u32(&src[..4]) as usize;

            if length == 0 {
                // keep-alive: consume and keep scanning the buffer
                src.advance(4);
                continue;
            }

            if length > MAX_FRAME {
                return Err(MessageError::Oversized(length));
            }

            if src.len() < 4 + length {
                src.reserve(4 + length - src.len());
                return Ok(None);
            }

            let id = src[4];
            let message = parse_payload(id, &src[5..4 + length])?;
            src.advance(4 + length);
            return Ok(Some(message));
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = MessageError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), MessageError> {
        let payload_len = item.payload_len();
        if 1 + payload_len > MAX_FRAME {
            return Err(MessageError::Oversized(1 + payload_len));
        }

        dst.reserve(5 + payload_len);
        dst.put_u32(1 + payload_len as u32);
        dst.put_u8(item.id());

        match item {
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => {}
            Message::Have(index) => dst.put_u32(index),
            Message::Bitfield(bytes) => dst.extend_from_slice(&bytes),
            Message::Request { index, begin, length }
            | Message::Cancel { index, begin, length } => {
                dst.put_u32(index);
                dst.put_u32(begin);
                dst.put_u32(length);
            }
            Message::Piece { index, begin, block } => {
                dst.put_u32(index);
                dst.put_u32(begin);
                dst.extend_from_slice(&block);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(message: Message) -> BytesMut {
        let mut buf = BytesMut::new();
        MessageCodec.encode(message, &mut buf).unwrap();
        buf
    }

    fn decode_one(buf: &mut BytesMut) -> Result<Option<Message>, MessageError> {
        MessageCodec.decode(buf)
    }

    #[test]
    fn request_has_the_exact_wire_layout() {
        let buf = encode(Message::Request {
            index: 7,
            begin: 32768,
            length: 16384,
        });
        assert_eq!(
            &buf[..],
            b"\x00\x00\x00\x0d\x06\x00\x00\x00\x07\x00\x00\x80\x00\x00\x00\x40\x00"
        );
    }

    #[test]
    fn every_variant_round_trips() {
        let messages = vec![
            Message::Choke,
            Message::Unchoke,
            Message::Interested,
            Message::NotInterested,
            Message::Have(42),
            Message::Bitfield(vec![0xA0, 0x01]),
            Message::Request { index: 7, begin: 32768, length: 16384 },
            Message::Piece { index: 1, begin: 16384, block: vec![1, 2, 3, 4, 5] },
            Message::Cancel { index: 2, begin: 0, length: 16384 },
        ];

        for message in messages {
            let mut buf = encode(message.clone());
            let decoded = decode_one(&mut buf).unwrap().unwrap();
            assert_eq!(decoded, message);
            assert!(buf.is_empty(), "frame for {:?} left trailing bytes", message);
        }
    }

    #[test]
    fn keep_alives_are_consumed_silently() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.extend_from_slice(&encode(Message::Unchoke));

        assert_eq!(decode_one(&mut buf).unwrap(), Some(Message::Unchoke));
        assert!(buf.is_empty());
    }

    #[test]
    fn keep_alive_alone_yields_no_message() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(decode_one(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_the_full_frame() {
        let full = encode(Message::Have(9));
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&full[..3]);
        assert_eq!(decode_one(&mut buf).unwrap(), None);

        buf.extend_from_slice(&full[3..6]);
        assert_eq!(decode_one(&mut buf).unwrap(), None);

        buf.extend_from_slice(&full[6..]);
        assert_eq!(decode_one(&mut buf).unwrap(), Some(Message::Have(9)));
    }

    #[test]
    fn rejects_unknown_id() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0, 0, 0, 1, 9]);
        assert!(matches!(
            decode_one(&mut buf),
            Err(MessageError::UnknownId(9))
        ));
    }

    #[test]
    fn rejects_wrong_payload_size() {
        // HAVE with a 2-byte payload
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0, 0, 0, 3, 4, 0, 1]);
        assert!(matches!(
            decode_one(&mut buf),
            Err(MessageError::Truncated { id: 4, len: 2 })
        ));
    }

    #[test]
    fn rejects_oversized_frame() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x00, 0x10, 0x00, 0x00]);
        assert!(matches!(
            decode_one(&mut buf),
            Err(MessageError::Oversized(_))
        ));
    }
}
