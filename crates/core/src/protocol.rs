//! The protocol engine's resume structure and its bencoded wire form.
//!
//! The store treats this structure as opaque except for three things it must
//! touch: the embedded save path (rewritten between portable and absolute
//! form), the session flag bitmask (see [`flags`]), and the metadata fields
//! that are split into their own column for storage efficiency.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// Session flag bits carried in [`ResumeData::flags`].
pub mod flags {
    /// The torrent is paused.
    pub const PAUSED: i64 = 1 << 0;
    /// The torrent is queued and started by engine policy.
    pub const AUTO_MANAGED: i64 = 1 << 1;
    /// Transient: stop as soon as the initial file check completes.
    /// Never persisted; folded into the stop condition instead.
    pub const STOP_WHEN_READY: i64 = 1 << 2;
}

/// The resume structure as serialized by the protocol engine.
///
/// Unknown keys from newer engine versions are dropped on decode; the fields
/// here are the ones the engine round-trips through this store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeData {
    /// Free-form comment from the torrent metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Creating client, from the torrent metadata.
    #[serde(rename = "created by", default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    /// Creation timestamp, from the torrent metadata.
    #[serde(rename = "creation date", default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<i64>,

    /// Session flag bitmask, see [`flags`].
    #[serde(default)]
    pub flags: i64,

    /// Bitfield of verified pieces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub have: Option<ByteBuf>,

    /// Bencoded info dictionary; present only with full metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<ByteBuf>,

    /// The engine's own copy of the save path.
    #[serde(default)]
    pub save_path: String,

    #[serde(default)]
    pub total_downloaded: i64,

    #[serde(default)]
    pub total_uploaded: i64,

    /// Announce URLs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trackers: Vec<String>,
}

impl ResumeData {
    /// Decode from the bencoded wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_bencode::Error> {
        serde_bencode::from_bytes(bytes)
    }

    /// Encode to the bencoded wire form.
    pub fn encode(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        serde_bencode::to_bytes(self)
    }

    /// Whether the structure carries full torrent metadata.
    pub fn has_metadata(&self) -> bool {
        self.info.is_some()
    }

    /// Extract the metadata fields into their own structure, leaving this
    /// one without them. Returns `None` (and changes nothing) when the
    /// structure has no metadata.
    pub fn split_metadata(&mut self) -> Option<TorrentMetadata> {
        let info = self.info.take()?;
        Some(TorrentMetadata {
            comment: self.comment.take(),
            created_by: self.created_by.take(),
            creation_date: self.creation_date.take(),
            info,
        })
    }

    /// Merge previously split metadata back in.
    pub fn attach_metadata(&mut self, metadata: TorrentMetadata) {
        self.comment = metadata.comment;
        self.created_by = metadata.created_by;
        self.creation_date = metadata.creation_date;
        self.info = Some(metadata.info);
    }
}

/// The metadata fields stored in the separate `metadata` column: exactly the
/// info dictionary, creation date, creating client and comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(rename = "created by", default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(rename = "creation date", default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<i64>,

    pub info: ByteBuf,
}

impl TorrentMetadata {
    /// Decode from the bencoded wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_bencode::Error> {
        serde_bencode::from_bytes(bytes)
    }

    /// Encode to the bencoded wire form.
    pub fn encode(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        serde_bencode::to_bytes(self)
    }
}
