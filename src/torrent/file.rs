//! Typed view over a decoded single-file metainfo document.
use crate::bencode::{self, BencodeValue};
use crate::torrent::info_hash;

use super::TorrentError;
use super::TorrentResult;
use std::path::Path;

/**
A parsed single-file .torrent document.

Carries exactly the fields the download engine consumes:
- `announce`: the tracker URL
- `name`: the suggested output file name
- `length`: total payload size in bytes
- `piece_length`: nominal size of every piece but the last
- `pieces_hash`: one 20-byte SHA-1 digest per piece, in piece order
- `info_hash`: SHA-1 of the bencoded info dictionary, identifying the
  torrent on the tracker and in peer handshakes
*/
#[derive(Debug, PartialEq, Clone)]
pub struct TorrentFile {
    pub announce: String,
    pub name: String,
    pub length: u64,
    pub piece_length: u64,
    pub pieces_hash: Vec<[u8; 20]>,
    pub info_hash: [u8; 20],
}

/// Splits the concatenated `pieces` string into individual 20-byte SHA-1
/// digests. Their order corresponds directly to the piece index.
#[tracing::instrument(skip(pieces_bytes), level = "trace")]
fn parse_pieces(pieces_bytes: &[u8]) -> TorrentResult<Vec<[u8; 20]>> {
    if pieces_bytes.len() % 20 != 0 {
        return Err(TorrentError::InvalidPiecesLength);
    }
    let mut hashes = Vec::with_capacity(pieces_bytes.len() / 20);
    for chunk in pieces_bytes.chunks_exact(20) {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(chunk);
        hashes.push(hash);
    }
    Ok(hashes)
}

fn required_integer(
    dict: &std::collections::HashMap<Vec<u8>, BencodeValue>,
    key: &str,
) -> TorrentResult<u64> {
    match dict.get(key.as_bytes()) {
        Some(BencodeValue::Integer(i)) if *i >= 0 => Ok(*i as u64),
        Some(BencodeValue::Integer(_)) => Err(TorrentError::InvalidFormat(format!(
            "{} must be non-negative",
            key
        ))),
        _ => Err(TorrentError::MissingField(key.to_string())),
    }
}

impl TorrentFile {
    /// Reads and parses a metainfo file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> TorrentResult<TorrentFile> {
        let raw = std::fs::read(path)?;
        Self::parse(bencode::decode(&raw)?)
    }

    /**
    Parses a decoded metainfo document.

    # How it works
    1. Extracts `announce` from the top-level dictionary.
    2. Extracts `name`, `piece length`, `pieces`, and `length` from the
       `info` dictionary; all are mandatory for a single-file torrent.
    3. Derives `info_hash` by re-encoding the info dictionary and hashing
       it, and splits `pieces` into per-piece digests.
    4. Rejects documents whose digest count does not cover `length`.
    */
    #[tracing::instrument(skip(data), level = "debug")]
    pub fn parse(data: BencodeValue) -> TorrentResult<TorrentFile> {
        let mut dict = match data {
            BencodeValue::Dict(d) => d,
            _ => {
                return Err(TorrentError::InvalidFormat(
                    "root is not a dictionary".to_string(),
                ));
            }
        };

        let announce = match dict.remove(b"announce".as_slice()) {
            Some(BencodeValue::String(s)) => String::from_utf8(s).map_err(|e| {
                TorrentError::InvalidFormat(format!("announce URL is not UTF-8: {}", e))
            })?,
            _ => return Err(TorrentError::MissingField("announce".to_string())),
        };

        let info = match dict.remove(b"info".as_slice()) {
            Some(BencodeValue::Dict(d)) => d,
            Some(_) => {
                return Err(TorrentError::InvalidFormat(
                    "info is not a dictionary".to_string(),
                ));
            }
            None => return Err(TorrentError::MissingField("info".to_string())),
        };

        let name = match info.get(b"name".as_slice()) {
            Some(BencodeValue::String(s)) => String::from_utf8(s.clone()).map_err(|e| {
                TorrentError::InvalidFormat(format!("name is not UTF-8: {}", e))
            })?,
            _ => return Err(TorrentError::MissingField("name".to_string())),
        };

        let piece_length = required_integer(&info, "piece length")?;
        if piece_length == 0 {
            return Err(TorrentError::InvalidFormat(
                "piece length must be positive".to_string(),
            ));
        }
        let length = required_integer(&info, "length")?;

        let pieces_hash = match info.get(b"pieces".as_slice()) {
            Some(BencodeValue::String(s)) => parse_pieces(s)?,
            _ => return Err(TorrentError::MissingField("pieces".to_string())),
        };

        let expected_pieces = length.div_ceil(piece_length) as usize;
        if pieces_hash.len() != expected_pieces {
            return Err(TorrentError::PieceCountMismatch);
        }

        let info_hash = info_hash::calculate_info_hash(&info)?;

        Ok(TorrentFile {
            announce,
            name,
            length,
            piece_length,
            pieces_hash,
            info_hash,
        })
    }

    /// Total payload size in bytes.
    pub fn total_length(&self) -> u64 {
        self.length
    }

    /// Number of pieces, derived from the digest list.
    pub fn num_pieces(&self) -> usize {
        self.pieces_hash.len()
    }

    /// Size of piece `index`: `piece_length` for every piece but the last,
    /// the remainder for the last one.
    pub fn piece_size(&self, index: usize) -> u64 {
        if index >= self.num_pieces() {
            return 0;
        }
        if index < self.num_pieces() - 1 {
            self.piece_length
        } else {
            self.length - (self.num_pieces() as u64 - 1) * self.piece_length
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::decode;

    fn metainfo_bytes(length: u64, piece_length: u64, npieces: usize) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"d8:announce17:http://tr.example4:infod");
        out.extend_from_slice(format!("6:lengthi{}e", length).as_bytes());
        out.extend_from_slice(b"4:name6:hi.txt");
        out.extend_from_slice(format!("12:piece lengthi{}e", piece_length).as_bytes());
        out.extend_from_slice(format!("6:pieces{}:", npieces * 20).as_bytes());
        out.resize(out.len() + npieces * 20, 0);
        out.extend_from_slice(b"ee");
        out
    }

    #[test]
    fn parses_single_file_metainfo() {
        let raw = metainfo_bytes(40, 16, 3);
        let t = TorrentFile::parse(decode(&raw).unwrap()).unwrap();

        assert_eq!(t.announce, "http://tr.example");
        assert_eq!(t.name, "hi.txt");
        assert_eq!(t.length, 40);
        assert_eq!(t.piece_length, 16);
        assert_eq!(t.num_pieces(), 3);
    }

    #[test]
    fn piece_sizes_sum_to_total_length() {
        let raw = metainfo_bytes(40, 16, 3);
        let t = TorrentFile::parse(decode(&raw).unwrap()).unwrap();

        let total: u64 = (0..t.num_pieces()).map(|i| t.piece_size(i)).sum();
        assert_eq!(total, t.total_length());
        assert_eq!(t.piece_size(0), 16);
        assert_eq!(t.piece_size(1), 16);
        assert_eq!(t.piece_size(2), 8);
        assert_eq!(t.piece_size(3), 0);
    }

    #[test]
    fn exact_multiple_keeps_full_last_piece() {
        let raw = metainfo_bytes(48, 16, 3);
        let t = TorrentFile::parse(decode(&raw).unwrap()).unwrap();
        assert_eq!(t.piece_size(2), 16);
    }

    #[test]
    fn rejects_missing_fields() {
        let raw = b"d8:announce17:http://tr.example4:infod4:name6:hi.txtee".to_vec();
        let err = TorrentFile::parse(decode(&raw).unwrap()).unwrap_err();
        assert!(matches!(err, TorrentError::MissingField(_)));
    }

    #[test]
    fn rejects_ragged_pieces_string() {
        let mut raw = Vec::new();
        raw.extend_from_slice(b"d8:announce17:http://tr.example4:infod");
        raw.extend_from_slice(b"6:lengthi12e4:name6:hi.txt12:piece lengthi16384e");
        raw.extend_from_slice(b"6:pieces19:");
        raw.resize(raw.len() + 19, 0);
        raw.extend_from_slice(b"ee");

        let err = TorrentFile::parse(decode(&raw).unwrap()).unwrap_err();
        assert!(matches!(err, TorrentError::InvalidPiecesLength));
    }

    #[test]
    fn rejects_digest_count_not_covering_length() {
        // 40 bytes at piece length 16 needs 3 digests, not 2
        let raw = metainfo_bytes(40, 16, 2);
        let err = TorrentFile::parse(decode(&raw).unwrap()).unwrap_err();
        assert!(matches!(err, TorrentError::PieceCountMismatch));
    }
}
