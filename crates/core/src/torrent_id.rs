//! Fixed-size torrent identifiers.
//!
//! A torrent is keyed by its info hash: 20 bytes for the SHA-1 scheme,
//! 32 bytes for the SHA-256 scheme. The canonical string form is lowercase
//! hex, which is also what gets persisted in the `torrent_id` column.

use std::fmt;

use crate::types::StoreError;

/// A torrent identifier (info hash).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TorrentId {
    /// 20-byte SHA-1 info hash.
    Sha1([u8; 20]),
    /// 32-byte SHA-256 info hash.
    Sha256([u8; 32]),
}

impl TorrentId {
    /// Parse an identifier from its canonical hex form (40 or 64 chars).
    pub fn from_hex(value: &str) -> Result<Self, StoreError> {
        let bytes =
            hex::decode(value).map_err(|_| StoreError::InvalidId(value.to_string()))?;
        match bytes.len() {
            20 => {
                let mut id = [0u8; 20];
                id.copy_from_slice(&bytes);
                Ok(TorrentId::Sha1(id))
            }
            32 => {
                let mut id = [0u8; 32];
                id.copy_from_slice(&bytes);
                Ok(TorrentId::Sha256(id))
            }
            _ => Err(StoreError::InvalidId(value.to_string())),
        }
    }

    /// Raw hash bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TorrentId::Sha1(bytes) => bytes,
            TorrentId::Sha256(bytes) => bytes,
        }
    }
}

impl fmt::Display for TorrentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_bytes()))
    }
}

impl fmt::Debug for TorrentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TorrentId({self})")
    }
}
