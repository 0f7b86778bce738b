//! Conversion between [`ResumeRecord`] and its database representation.
//!
//! Encoding rewrites the embedded save path to portable form, applies the
//! session flag policy, and splits the metadata fields into their own blob.
//! Decoding reverses all of that and folds the transient stop-when-ready
//! flag into the stop condition.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rusqlite::Row;

use crate::paths::PathPorter;
use crate::protocol::{flags, ResumeData, TorrentMetadata};
use crate::sql;
use crate::types::{ContentLayout, OperatingMode, ResumeRecord, StopCondition, StoreError};

/// An owned copy of one `torrents` row, so decoding can run after the read
/// lock has been released.
#[derive(Debug, Clone)]
pub(crate) struct RawRow {
    pub(crate) name: Option<String>,
    pub(crate) category: Option<String>,
    pub(crate) tags: Option<String>,
    pub(crate) target_save_path: Option<String>,
    pub(crate) download_path: Option<String>,
    pub(crate) content_layout: String,
    pub(crate) ratio_limit: i64,
    pub(crate) seeding_time_limit: i64,
    pub(crate) has_outer_pieces_priority: bool,
    pub(crate) has_seed_status: bool,
    pub(crate) operating_mode: String,
    pub(crate) stopped: bool,
    pub(crate) stop_condition: String,
    pub(crate) resume_data: Vec<u8>,
    pub(crate) metadata: Option<Vec<u8>>,
}

impl RawRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(sql::COL_NAME)?,
            category: row.get(sql::COL_CATEGORY)?,
            tags: row.get(sql::COL_TAGS)?,
            target_save_path: row.get(sql::COL_TARGET_SAVE_PATH)?,
            download_path: row.get(sql::COL_DOWNLOAD_PATH)?,
            content_layout: row.get(sql::COL_CONTENT_LAYOUT)?,
            ratio_limit: row.get(sql::COL_RATIO_LIMIT)?,
            seeding_time_limit: row.get(sql::COL_SEEDING_TIME_LIMIT)?,
            has_outer_pieces_priority: row.get(sql::COL_HAS_OUTER_PIECES_PRIORITY)?,
            has_seed_status: row.get(sql::COL_HAS_SEED_STATUS)?,
            operating_mode: row.get(sql::COL_OPERATING_MODE)?,
            stopped: row.get(sql::COL_STOPPED)?,
            stop_condition: row.get(sql::COL_STOP_CONDITION)?,
            resume_data: row.get(sql::COL_RESUME_DATA)?,
            metadata: row.get(sql::COL_METADATA)?,
        })
    }
}

/// Column values ready to be bound by the store job.
#[derive(Debug)]
pub(crate) struct EncodedRecord {
    pub(crate) name: String,
    pub(crate) category: String,
    pub(crate) tags: Option<String>,
    pub(crate) target_save_path: Option<String>,
    pub(crate) download_path: Option<String>,
    pub(crate) content_layout: &'static str,
    pub(crate) ratio_limit: i64,
    pub(crate) seeding_time_limit: i64,
    pub(crate) has_outer_pieces_priority: bool,
    pub(crate) has_seed_status: bool,
    pub(crate) operating_mode: &'static str,
    pub(crate) stopped: bool,
    pub(crate) stop_condition: &'static str,
    pub(crate) resume_data: Vec<u8>,
    pub(crate) metadata: Option<Vec<u8>>,
}

pub(crate) fn decode(row: RawRow, porter: &dyn PathPorter) -> Result<ResumeRecord, StoreError> {
    let mut resume_data = ResumeData::decode(&row.resume_data)
        .map_err(|e| StoreError::CorruptRecord(format!("resume blob: {e}")))?;

    if let Some(blob) = row.metadata.filter(|blob| !blob.is_empty()) {
        let metadata = TorrentMetadata::decode(&blob)
            .map_err(|e| StoreError::CorruptRecord(format!("metadata blob: {e}")))?;
        resume_data.attach_metadata(metadata);
    }

    resume_data.save_path = porter
        .from_portable(&resume_data.save_path)
        .to_string_lossy()
        .into_owned();

    let mut stop_condition = StopCondition::parse(&row.stop_condition);
    if resume_data.flags & flags::STOP_WHEN_READY != 0 {
        resume_data.flags &= !flags::STOP_WHEN_READY;
        stop_condition = StopCondition::FilesChecked;
    }

    let mut tags = BTreeSet::new();
    if let Some(joined) = row.tags.filter(|joined| !joined.is_empty()) {
        tags.extend(joined.split(',').map(str::to_string));
    }

    let save_path = porter.from_portable(row.target_save_path.as_deref().unwrap_or(""));
    let download_path = if save_path.as_os_str().is_empty() {
        PathBuf::new()
    } else {
        porter.from_portable(row.download_path.as_deref().unwrap_or(""))
    };

    Ok(ResumeRecord {
        name: row.name.unwrap_or_default(),
        category: row.category.unwrap_or_default(),
        tags,
        save_path,
        download_path,
        content_layout: ContentLayout::parse(&row.content_layout),
        operating_mode: OperatingMode::parse(&row.operating_mode),
        stop_condition,
        ratio_limit: row.ratio_limit as f64 / 1000.0,
        seeding_time_limit: row.seeding_time_limit,
        first_last_piece_priority: row.has_outer_pieces_priority,
        has_finished_status: row.has_seed_status,
        stopped: row.stopped,
        resume_data,
    })
}

pub(crate) fn encode(
    record: &ResumeRecord,
    porter: &dyn PathPorter,
) -> Result<EncodedRecord, StoreError> {
    let mut resume_data = record.resume_data.clone();
    resume_data.save_path = porter.to_portable(Path::new(&resume_data.save_path));

    // The stop-when-ready bit is transient and folded into the stop
    // condition; it must never reach disk.
    resume_data.flags &= !flags::STOP_WHEN_READY;
    if record.stopped {
        resume_data.flags |= flags::PAUSED;
        resume_data.flags &= !flags::AUTO_MANAGED;
    } else if record.operating_mode == OperatingMode::AutoManaged {
        // The torrent may be momentarily paused for service work behind the
        // scenes; restore it as running.
        resume_data.flags |= flags::AUTO_MANAGED;
    } else {
        resume_data.flags &= !flags::PAUSED;
        resume_data.flags &= !flags::AUTO_MANAGED;
    }

    let metadata = resume_data
        .split_metadata()
        .map(|metadata| metadata.encode())
        .transpose()
        .map_err(|e| StoreError::Encoding(format!("metadata blob: {e}")))?;

    let resume_blob = resume_data
        .encode()
        .map_err(|e| StoreError::Encoding(format!("resume blob: {e}")))?;

    let auto_managed = record.auto_managed_paths();
    let target_save_path = (!auto_managed).then(|| porter.to_portable(&record.save_path));
    let download_path = (!auto_managed).then(|| porter.to_portable(&record.download_path));

    let tags = if record.tags.is_empty() {
        None
    } else {
        Some(record.tags.iter().cloned().collect::<Vec<_>>().join(","))
    };

    Ok(EncodedRecord {
        name: record.name.clone(),
        category: record.category.clone(),
        tags,
        target_save_path,
        download_path,
        content_layout: record.content_layout.as_str(),
        ratio_limit: (record.ratio_limit * 1000.0).round() as i64,
        seeding_time_limit: record.seeding_time_limit,
        has_outer_pieces_priority: record.first_last_piece_priority,
        has_seed_status: record.has_finished_status,
        operating_mode: record.operating_mode.as_str(),
        stopped: record.stopped,
        stop_condition: record.stop_condition.as_str(),
        resume_data: resume_blob,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::ProfilePaths;
    use serde_bytes::ByteBuf;

    fn porter() -> ProfilePaths {
        ProfilePaths::new("/profile")
    }

    fn sample_record() -> ResumeRecord {
        ResumeRecord {
            name: "debian-13.1.0-amd64".to_string(),
            category: "linux".to_string(),
            tags: ["iso", "stable"].iter().map(|s| s.to_string()).collect(),
            save_path: PathBuf::from("/profile/downloads"),
            download_path: PathBuf::from("/profile/incomplete"),
            content_layout: ContentLayout::Subfolder,
            operating_mode: OperatingMode::Forced,
            stop_condition: StopCondition::None,
            ratio_limit: 1.5,
            seeding_time_limit: 1440,
            first_last_piece_priority: true,
            has_finished_status: false,
            stopped: false,
            resume_data: ResumeData {
                save_path: "/profile/downloads".to_string(),
                total_downloaded: 123,
                ..ResumeData::default()
            },
        }
    }

    fn raw_row(encoded: EncodedRecord) -> RawRow {
        RawRow {
            name: Some(encoded.name),
            category: Some(encoded.category),
            tags: encoded.tags,
            target_save_path: encoded.target_save_path,
            download_path: encoded.download_path,
            content_layout: encoded.content_layout.to_string(),
            ratio_limit: encoded.ratio_limit,
            seeding_time_limit: encoded.seeding_time_limit,
            has_outer_pieces_priority: encoded.has_outer_pieces_priority,
            has_seed_status: encoded.has_seed_status,
            operating_mode: encoded.operating_mode.to_string(),
            stopped: encoded.stopped,
            stop_condition: encoded.stop_condition.to_string(),
            resume_data: encoded.resume_data,
            metadata: encoded.metadata,
        }
    }

    #[test]
    fn test_round_trip() {
        let record = sample_record();
        let encoded = encode(&record, &porter()).unwrap();
        let mut decoded = decode(raw_row(encoded), &porter()).unwrap();

        // Flags are normalized by the encode-time policy; compare the rest.
        decoded.resume_data.flags = record.resume_data.flags;
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_ratio_limit_scaled_by_1000() {
        let record = sample_record();
        let encoded = encode(&record, &porter()).unwrap();
        assert_eq!(encoded.ratio_limit, 1500);

        let decoded = decode(raw_row(encoded), &porter()).unwrap();
        assert_eq!(decoded.ratio_limit, 1.5);
    }

    #[test]
    fn test_paths_stored_in_portable_form() {
        let encoded = encode(&sample_record(), &porter()).unwrap();
        assert_eq!(encoded.target_save_path.as_deref(), Some("downloads"));
        assert_eq!(encoded.download_path.as_deref(), Some("incomplete"));
    }

    #[test]
    fn test_auto_managed_paths_not_persisted() {
        let mut record = sample_record();
        record.save_path = PathBuf::new();
        record.download_path = PathBuf::from("/profile/incomplete");

        let encoded = encode(&record, &porter()).unwrap();
        assert!(encoded.target_save_path.is_none());
        assert!(encoded.download_path.is_none());

        let decoded = decode(raw_row(encoded), &porter()).unwrap();
        assert!(decoded.auto_managed_paths());
        assert_eq!(decoded.download_path, PathBuf::new());
    }

    #[test]
    fn test_empty_tags_stored_as_null() {
        let mut record = sample_record();
        record.tags.clear();
        let encoded = encode(&record, &porter()).unwrap();
        assert!(encoded.tags.is_none());
    }

    #[test]
    fn test_tags_joined_and_split() {
        let encoded = encode(&sample_record(), &porter()).unwrap();
        assert_eq!(encoded.tags.as_deref(), Some("iso,stable"));

        let decoded = decode(raw_row(encoded), &porter()).unwrap();
        assert_eq!(decoded.tags, sample_record().tags);
    }

    #[test]
    fn test_stopped_sets_paused_and_clears_auto_managed() {
        let mut record = sample_record();
        record.stopped = true;
        record.resume_data.flags = flags::AUTO_MANAGED;

        let encoded = encode(&record, &porter()).unwrap();
        let blob = ResumeData::decode(&encoded.resume_data).unwrap();
        assert_ne!(blob.flags & flags::PAUSED, 0);
        assert_eq!(blob.flags & flags::AUTO_MANAGED, 0);
    }

    #[test]
    fn test_running_auto_managed_sets_auto_managed_flag() {
        let mut record = sample_record();
        record.stopped = false;
        record.operating_mode = OperatingMode::AutoManaged;
        record.resume_data.flags = flags::PAUSED;

        let encoded = encode(&record, &porter()).unwrap();
        let blob = ResumeData::decode(&encoded.resume_data).unwrap();
        assert_ne!(blob.flags & flags::AUTO_MANAGED, 0);
    }

    #[test]
    fn test_running_forced_clears_both_flags() {
        let mut record = sample_record();
        record.stopped = false;
        record.operating_mode = OperatingMode::Forced;
        record.resume_data.flags = flags::PAUSED | flags::AUTO_MANAGED;

        let encoded = encode(&record, &porter()).unwrap();
        let blob = ResumeData::decode(&encoded.resume_data).unwrap();
        assert_eq!(blob.flags & flags::PAUSED, 0);
        assert_eq!(blob.flags & flags::AUTO_MANAGED, 0);
    }

    #[test]
    fn test_stop_when_ready_never_persisted() {
        let mut record = sample_record();
        record.resume_data.flags = flags::STOP_WHEN_READY;

        let encoded = encode(&record, &porter()).unwrap();
        let blob = ResumeData::decode(&encoded.resume_data).unwrap();
        assert_eq!(blob.flags & flags::STOP_WHEN_READY, 0);
    }

    #[test]
    fn test_stop_when_ready_folds_into_stop_condition_on_decode() {
        let record = sample_record();
        let mut encoded = encode(&record, &porter()).unwrap();

        // Simulate a blob written by an engine that left the bit set.
        let mut blob = ResumeData::decode(&encoded.resume_data).unwrap();
        blob.flags |= flags::STOP_WHEN_READY;
        encoded.resume_data = blob.encode().unwrap();

        let decoded = decode(raw_row(encoded), &porter()).unwrap();
        assert_eq!(decoded.stop_condition, StopCondition::FilesChecked);
        assert_eq!(decoded.resume_data.flags & flags::STOP_WHEN_READY, 0);
    }

    #[test]
    fn test_metadata_split_into_separate_blob() {
        let mut record = sample_record();
        record.resume_data.info = Some(ByteBuf::from(b"d4:name4:teste".to_vec()));
        record.resume_data.comment = Some("hello".to_string());
        record.resume_data.created_by = Some("client".to_string());
        record.resume_data.creation_date = Some(1_700_000_000);

        let encoded = encode(&record, &porter()).unwrap();
        let metadata_blob = encoded.metadata.clone().expect("metadata split out");
        assert!(!metadata_blob.is_empty());

        // The main blob must not carry any of the split fields.
        let main = ResumeData::decode(&encoded.resume_data).unwrap();
        assert!(main.info.is_none());
        assert!(main.comment.is_none());
        assert!(main.created_by.is_none());
        assert!(main.creation_date.is_none());

        // Merging back at load time reconstructs the full structure.
        let decoded = decode(raw_row(encoded), &porter()).unwrap();
        assert!(decoded.resume_data.has_metadata());
        assert_eq!(decoded.resume_data.comment.as_deref(), Some("hello"));
        assert_eq!(
            decoded.resume_data.info.as_ref().map(|b| b.as_ref()),
            Some(&b"d4:name4:teste"[..])
        );
    }

    #[test]
    fn test_no_metadata_no_blob() {
        let encoded = encode(&sample_record(), &porter()).unwrap();
        assert!(encoded.metadata.is_none());
    }

    #[test]
    fn test_blob_save_path_rewritten_between_forms() {
        let record = sample_record();
        let encoded = encode(&record, &porter()).unwrap();

        let blob = ResumeData::decode(&encoded.resume_data).unwrap();
        assert_eq!(blob.save_path, "downloads");

        let decoded = decode(raw_row(encoded), &porter()).unwrap();
        assert_eq!(decoded.resume_data.save_path, "/profile/downloads");
    }

    #[test]
    fn test_corrupt_blob_fails_decode() {
        let encoded = encode(&sample_record(), &porter()).unwrap();
        let mut row = raw_row(encoded);
        row.resume_data = b"not bencode".to_vec();

        let result = decode(row, &porter());
        assert!(matches!(result, Err(StoreError::CorruptRecord(_))));
    }
}
