//! Tracker announce client.
//!
//! Builds the announce GET request, performs it over HTTP with a bounded
//! timeout, and parses the bencoded response into a list of peer
//! endpoints. Compact form only: each peer is a 6-byte tuple of 4
//! big-endian address bytes and 2 big-endian port bytes.
use crate::torrent::TorrentFile;
use rand::Rng;
use serde::Deserialize;
use serde_bytes::ByteBuf;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use thiserror::Error;

/// How long a single announce round-trip may take.
const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("announce URL is invalid: {0}")]
    Url(#[from] url::ParseError),

    #[error("tracker request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed tracker response: {0}")]
    MalformedResponse(#[from] serde_bencode::Error),

    #[error("tracker refused the announce: {0}")]
    Refused(String),

    #[error("peers blob length {0} is not a multiple of 6")]
    InvalidPeersBlob(usize),
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// A peer endpoint received from the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Peer {
    /// Parses one compact 6-byte entry.
    pub fn from_compact(chunk: &[u8; 6]) -> Peer {
        Peer {
            ip: Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]),
            port: u16::from_be_bytes([chunk[4], chunk[5]]),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

/// The parsed announce response.
#[derive(Debug)]
pub struct AnnounceResponse {
    pub interval: i64,
    pub peers: Vec<Peer>,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    interval: i64,
    #[serde(default, rename = "failure reason")]
    failure_reason: Option<String>,
    #[serde(default)]
    peers: ByteBuf,
}

/// A client announcing itself to a BitTorrent tracker.
#[derive(Debug)]
pub struct Client {
    peer_id: [u8; 20],
    port: u16,
    http: reqwest::Client,
}

impl Client {
    pub fn new(port: u16) -> TrackerResult<Self> {
        Ok(Self {
            peer_id: generate_peer_id(),
            port,
            http: reqwest::Client::builder()
                .timeout(ANNOUNCE_TIMEOUT)
                .build()?,
        })
    }

    /// The 20-byte identity advertised to the tracker and in handshakes.
    pub fn peer_id(&self) -> [u8; 20] {
        self.peer_id
    }

    /// Sends an announce request and returns the peer list.
    ///
    /// `info_hash` and `peer_id` are raw bytes and must be percent-encoded
    /// by hand; `Url::query_pairs_mut` would re-encode the percent signs,
    /// so the query string is assembled manually.
    #[tracing::instrument(skip(self, torrent), level = "debug")]
    pub async fn announce(&self, torrent: &TorrentFile) -> TrackerResult<AnnounceResponse> {
        let mut url = url::Url::parse(&torrent.announce)?;
        let params = format!(
            "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1",
            url_encode(&torrent.info_hash),
            url_encode(&self.peer_id),
            self.port,
            torrent.total_length(),
        );
        let query = match url.query() {
            Some(existing) => format!("{}&{}", existing, params),
            None => params,
        };
        url.set_query(Some(&query));

        tracing::debug!(%url, "announcing to tracker");
        let response = self.http.get(url).send().await?;
        let body = response.bytes().await?;
        parse_announce_response(&body)
    }
}

/// Parses a bencoded announce response.
///
/// A `failure reason` entry takes precedence over everything else. The
/// `peers` entry is a compact blob whose length must be a multiple of 6.
fn parse_announce_response(bytes: &[u8]) -> TrackerResult<AnnounceResponse> {
    let raw: RawResponse = serde_bencode::from_bytes(bytes)?;

    if let Some(reason) = raw.failure_reason {
        return Err(TrackerError::Refused(reason));
    }

    if raw.peers.len() % 6 != 0 {
        return Err(TrackerError::InvalidPeersBlob(raw.peers.len()));
    }

    let peers = raw
        .peers
        .chunks_exact(6)
        .map(|chunk| Peer::from_compact(chunk.try_into().expect("chunks_exact yields 6 bytes")))
        .collect();

    Ok(AnnounceResponse {
        interval: raw.interval,
        peers,
    })
}

/// Generates the 20-byte peer id: the fixed `-BU0000-` client prefix
/// followed by 12 random bytes.
fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    let prefix = b"-BU0000-";
    peer_id[..prefix.len()].copy_from_slice(prefix);
    let mut rng = rand::rng();
    rng.fill(&mut peer_id[prefix.len()..]);
    peer_id
}

/// Percent-encodes raw bytes per RFC 3986: unreserved characters pass
/// through, everything else becomes %XX.
fn url_encode(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 3);
    for &byte in bytes {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    encoded
}
