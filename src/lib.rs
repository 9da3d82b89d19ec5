//! Library root for bitpour, a leeching BitTorrent v1 client.
//!
//! Re-exports the core modules: bencode, torrent, tracker, peer, and download
//! for use in the binary and in integration tests.
pub mod bencode;
pub mod download;
pub mod peer;
pub mod torrent;
pub mod tracker;
