use super::BencodeError;
use super::BencodeResult;
use super::BencodeValue;

use std::collections::HashMap;
use std::io::{self, Read};
use tracing::instrument;

/// Decodes a complete bencode document from a byte slice.
///
/// Exactly one top-level value must be present; anything left over after it
/// is rejected with [`BencodeError::TrailingData`]. This is the entry point
/// used for metainfo files, where a truncated or padded file should never
/// parse silently.
#[instrument(skip(bytes), level = "debug")]
pub fn decode(bytes: &[u8]) -> BencodeResult<BencodeValue> {
    decode_from(bytes)
}

/// Decodes a single top-level value from any [`Read`] source and verifies
/// the source is exhausted afterwards.
pub fn decode_from<R: Read>(reader: R) -> BencodeResult<BencodeValue> {
    let mut bytes = reader.bytes().peekable();
    let value = decode_next(&mut bytes)?;

    match bytes.peek() {
        None => Ok(value),
        Some(Ok(_)) => Err(BencodeError::TrailingData),
        Some(Err(e)) => Err(BencodeError::Io(e.kind().into())),
    }
}

/// Decodes a bencode string in the form `<length>:<data>`.
///
/// The length prefix is a run of ASCII digits; the data that follows is
/// returned as raw bytes. For input "5:hello" this yields b"hello".
#[instrument(skip(reader), level = "trace")]
pub fn decode_string<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<Vec<u8>> {
    let length_str = read_until(reader, b':')?;
    let length = length_str
        .parse::<usize>()
        .map_err(|_| BencodeError::InvalidStringLength)?;

    let mut string_bytes = vec![0; length];
    for byte in string_bytes.iter_mut() {
        *byte = reader
            .next()
            .ok_or(BencodeError::UnexpectedEoi)?
            .map_err(|e| BencodeError::Io(e.kind().into()))?;
    }
    Ok(string_bytes)
}

/// Reads bytes up to (and consuming) `delimiter` and returns them as a
/// UTF-8 string. Only ever used for length prefixes and integer literals,
/// so non-UTF-8 content is a format error.
fn read_until<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
    delimiter: u8,
) -> BencodeResult<String> {
    let mut buffer = Vec::new();

    loop {
        let byte = reader
            .next()
            .ok_or(BencodeError::UnexpectedEoi)?
            .map_err(|e| BencodeError::Io(e.kind().into()))?;

        if byte == delimiter {
            break;
        }
        buffer.push(byte);
    }

    String::from_utf8(buffer).map_err(|e| {
        BencodeError::InvalidFormat(format!("non-UTF-8 bytes in length/integer: {}", e))
    })
}

/// Decodes a bencode integer in the form `i<number>e`.
///
/// Rejects leading zeros (other than a lone "0"), "-0", the empty literal,
/// and anything outside the signed 64-bit range.
#[instrument(skip(reader), level = "trace")]
pub fn decode_integer<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<i64> {
    let first_byte = reader
        .next()
        .ok_or(BencodeError::UnexpectedEoi)?
        .map_err(|e| BencodeError::Io(e.kind().into()))?;

    if first_byte != b'i' {
        return Err(BencodeError::InvalidFormat(
            "integer must start with 'i'".to_string(),
        ));
    }

    let num_str = read_until(reader, b'e')?;

    if num_str.is_empty() {
        return Err(BencodeError::InvalidInteger);
    }

    if num_str.len() > 1 && (num_str.starts_with('0') || num_str.starts_with("-0")) {
        return Err(BencodeError::InvalidInteger);
    }

    num_str
        .parse::<i64>()
        .map_err(|_| BencodeError::InvalidInteger)
}

/// Decodes a bencode list in the form `l<values>e`, recursing through
/// `decode_next` for each element.
#[instrument(skip(reader), level = "trace")]
fn decode_list<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<Vec<BencodeValue>> {
    let first_byte = reader
        .next()
        .ok_or(BencodeError::UnexpectedEoi)?
        .map_err(|e| BencodeError::Io(e.kind().into()))?;
    if first_byte != b'l' {
        return Err(BencodeError::InvalidFormat(
            "list must start with 'l'".to_string(),
        ));
    }

    let mut list = Vec::new();

    loop {
        let &current_byte = reader
            .peek()
            .ok_or(BencodeError::UnexpectedEoi)?
            .as_ref()
            .map_err(|e| BencodeError::Io(e.kind().into()))?;

        if current_byte == b'e' {
            reader.next();
            break;
        }

        list.push(decode_next(reader)?);
    }

    Ok(list)
}

/// Decodes a bencode dictionary in the form `d<key><value>...e`.
///
/// Keys must be byte strings; any key order is accepted on input (the
/// encoder is responsible for sorted output).
#[instrument(skip(reader), level = "trace")]
fn decode_dict<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<HashMap<Vec<u8>, BencodeValue>> {
    let first_byte = reader
        .next()
        .ok_or(BencodeError::UnexpectedEoi)?
        .map_err(|e| BencodeError::Io(e.kind().into()))?;

    if first_byte != b'd' {
        return Err(BencodeError::InvalidFormat(
            "dictionary must start with 'd'".to_string(),
        ));
    }

    let mut dict = HashMap::new();

    loop {
        let &current_byte = reader
            .peek()
            .ok_or(BencodeError::UnexpectedEoi)?
            .as_ref()
            .map_err(|e| BencodeError::Io(e.kind().into()))?;

        if current_byte == b'e' {
            reader.next();
            break;
        }

        if !current_byte.is_ascii_digit() {
            return Err(BencodeError::InvalidFormat(
                "dictionary key must be a string".to_string(),
            ));
        }

        let key = decode_string(reader)?;
        let value = decode_next(reader)?;
        dict.insert(key, value);
    }

    Ok(dict)
}

fn decode_next<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<BencodeValue> {
    let &first_byte = reader
        .peek()
        .ok_or(BencodeError::UnexpectedEoi)?
        .as_ref()
        .map_err(|e| BencodeError::Io(e.kind().into()))?;

    match first_byte {
        b'0'..=b'9' => decode_string(reader).map(BencodeValue::String),
        b'i' => decode_integer(reader).map(BencodeValue::Integer),
        b'l' => decode_list(reader).map(BencodeValue::List),
        b'd' => decode_dict(reader).map(BencodeValue::Dict),
        _ => Err(BencodeError::InvalidFormat(format!(
            "unexpected leading byte: 0x{:02x}",
            first_byte
        ))),
    }
}
