use std::collections::HashMap;
use thiserror::Error;
pub mod decoder;
pub mod encoder;

pub use decoder::decode;
pub use encoder::encode;

/**
 * A single bencode value, the data model shared by metainfo files and
 * tracker responses.
 *
 * Four variants cover the whole grammar:
 *
 * 1. String(Vec<u8>):
 *    - A length-prefixed byte string, e.g. "4:spam" becomes String(b"spam")
 *    - Kept as raw bytes; piece hashes and compact peer lists are not UTF-8
 *
 * 2. Integer(i64):
 *    - "i42e" becomes Integer(42); the full signed 64-bit range is accepted
 *
 * 3. List(Vec<BencodeValue>):
 *    - "l4:spami42ee" becomes List([String(b"spam"), Integer(42)])
 *
 * 4. Dict(HashMap<Vec<u8>, BencodeValue>):
 *    - "d3:foo3:bare" becomes Dict({b"foo" => String(b"bar")})
 *    - Keys are always byte strings; the encoder re-emits them in ascending
 *      byte order so that encode(decode(x)) == x for well-formed x
 */
#[derive(Debug, PartialEq, Clone)]
pub enum BencodeValue {
    String(Vec<u8>),
    Integer(i64),
    List(Vec<BencodeValue>),
    Dict(HashMap<Vec<u8>, BencodeValue>),
}

/// Error type shared by the decoder and encoder.
#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid bencode: {0}")]
    InvalidFormat(String),

    #[error("invalid integer literal")]
    InvalidInteger,

    #[error("invalid string length prefix")]
    InvalidStringLength,

    #[error("unexpected end of input")]
    UnexpectedEoi,

    #[error("trailing bytes after the top-level value")]
    TrailingData,
}

pub type BencodeResult<T> = std::result::Result<T, BencodeError>;
