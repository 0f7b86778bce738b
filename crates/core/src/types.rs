//! Core types for the resume data store.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::ResumeData;
use crate::torrent_id::TorrentId;

/// Errors that can occur in the resume data store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQL-level failure on the underlying connection.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No resume data is stored for the requested torrent.
    #[error("Resume data not found for torrent {0}")]
    NotFound(TorrentId),

    /// A stored row exists but its resume blob cannot be decoded.
    #[error("Corrupted resume data: {0}")]
    CorruptRecord(String),

    /// The database schema or version marker is unusable.
    #[error("Database is corrupted: {0}")]
    CorruptDatabase(String),

    /// The resume structure could not be serialized for storage.
    #[error("Failed to encode resume data: {0}")]
    Encoding(String),

    /// A stored torrent id is not valid canonical hex.
    #[error("Invalid torrent id: {0}")]
    InvalidId(String),

    /// Write-ahead logging could not be enabled.
    #[error("Write-ahead logging unavailable: {0}")]
    WalUnavailable(String),
}

/// How downloaded content is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContentLayout {
    /// Keep the layout the torrent was created with.
    #[default]
    Original,
    /// Always create a root subfolder.
    Subfolder,
    /// Never create a root subfolder.
    NoSubfolder,
}

impl ContentLayout {
    /// Canonical string form, as persisted in the `content_layout` column.
    pub fn as_str(self) -> &'static str {
        match self {
            ContentLayout::Original => "Original",
            ContentLayout::Subfolder => "Subfolder",
            ContentLayout::NoSubfolder => "NoSubfolder",
        }
    }

    /// Parse a canonical string; unrecognized input falls back to `Original`.
    pub fn parse(value: &str) -> Self {
        match value {
            "Subfolder" => ContentLayout::Subfolder,
            "NoSubfolder" => ContentLayout::NoSubfolder,
            _ => ContentLayout::Original,
        }
    }
}

/// Whether the engine manages the torrent's activity automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OperatingMode {
    /// The engine starts and queues the torrent by policy.
    #[default]
    AutoManaged,
    /// The torrent runs regardless of queueing policy.
    Forced,
}

impl OperatingMode {
    /// Canonical string form, as persisted in the `operating_mode` column.
    pub fn as_str(self) -> &'static str {
        match self {
            OperatingMode::AutoManaged => "AutoManaged",
            OperatingMode::Forced => "Forced",
        }
    }

    /// Parse a canonical string; unrecognized input falls back to `AutoManaged`.
    pub fn parse(value: &str) -> Self {
        match value {
            "Forced" => OperatingMode::Forced,
            _ => OperatingMode::AutoManaged,
        }
    }
}

/// When a freshly added torrent should stop on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StopCondition {
    /// Never stop automatically.
    #[default]
    None,
    /// Stop once metadata has been received.
    MetadataReceived,
    /// Stop once the initial file check completes.
    FilesChecked,
}

impl StopCondition {
    /// Canonical string form, as persisted in the `stop_condition` column.
    pub fn as_str(self) -> &'static str {
        match self {
            StopCondition::None => "None",
            StopCondition::MetadataReceived => "MetadataReceived",
            StopCondition::FilesChecked => "FilesChecked",
        }
    }

    /// Parse a canonical string; unrecognized input falls back to `None`.
    pub fn parse(value: &str) -> Self {
        match value {
            "MetadataReceived" => StopCondition::MetadataReceived,
            "FilesChecked" => StopCondition::FilesChecked,
            _ => StopCondition::None,
        }
    }
}

/// Everything the engine needs to resume one torrent after a restart.
///
/// The queue position is deliberately absent: it is owned by the store and
/// mutated only through [`crate::ResumeStore::reorder_queue`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeRecord {
    /// Display name, empty if unset.
    pub name: String,
    /// Category, empty if unset.
    pub category: String,
    /// Tag set; stored comma-joined, empty set stored as NULL.
    pub tags: BTreeSet<String>,
    /// Target save path in absolute form. Empty means the paths are managed
    /// automatically and no explicit paths are persisted.
    pub save_path: PathBuf,
    /// Incomplete-download path in absolute form; unused when paths are
    /// managed automatically.
    pub download_path: PathBuf,
    /// On-disk content layout.
    pub content_layout: ContentLayout,
    /// Queueing policy.
    pub operating_mode: OperatingMode,
    /// Automatic stop condition.
    pub stop_condition: StopCondition,
    /// Share ratio limit; persisted with three decimal digits of precision.
    pub ratio_limit: f64,
    /// Seeding time limit, signed.
    pub seeding_time_limit: i64,
    /// Prioritize first and last pieces of each file.
    pub first_last_piece_priority: bool,
    /// The torrent has finished downloading at least once.
    pub has_finished_status: bool,
    /// The torrent is stopped.
    pub stopped: bool,
    /// The protocol engine's resume structure.
    pub resume_data: ResumeData,
}

impl ResumeRecord {
    /// True when save and download paths are derived by policy rather than
    /// stored explicitly. Derived, never persisted as a column.
    pub fn auto_managed_paths(&self) -> bool {
        self.save_path.as_os_str().is_empty()
    }
}

impl Default for ResumeRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            category: String::new(),
            tags: BTreeSet::new(),
            save_path: PathBuf::new(),
            download_path: PathBuf::new(),
            content_layout: ContentLayout::default(),
            operating_mode: OperatingMode::default(),
            stop_condition: StopCondition::default(),
            ratio_limit: 0.0,
            seeding_time_limit: 0,
            first_last_piece_priority: false,
            has_finished_status: false,
            stopped: false,
            resume_data: ResumeData::default(),
        }
    }
}
