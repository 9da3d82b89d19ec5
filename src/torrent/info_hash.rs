use crate::bencode::{encoder, BencodeValue};
use crate::torrent::TorrentResult;
use sha1::{Digest, Sha1};
use std::collections::HashMap;

/// Computes the SHA-1 digest of the bencode encoding of an info dictionary.
///
/// The encoder emits keys sorted, so the digest is deterministic for a
/// given dictionary and matches what every other client derives for the
/// same torrent.
pub fn calculate_info_hash(info_dict: &HashMap<Vec<u8>, BencodeValue>) -> TorrentResult<[u8; 20]> {
    let mut buffer = Vec::new();
    encoder::encode(&mut buffer, &BencodeValue::Dict(info_dict.clone()))?;

    let mut hasher = Sha1::new();
    hasher.update(&buffer);

    let mut info_hash = [0u8; 20];
    info_hash.copy_from_slice(&hasher.finalize());
    Ok(info_hash)
}
