//! Table and column names plus small SQL statement builders.
//!
//! Column names are part of the on-disk compatibility surface; the builders
//! keep the insert/upsert/update statements and their named parameters in
//! sync with the column lists.

pub(crate) const TABLE_META: &str = "meta";
pub(crate) const TABLE_TORRENTS: &str = "torrents";

/// Name of the schema version row in `meta`.
pub(crate) const META_VERSION: &str = "version";

pub(crate) const QUEUE_POSITION_INDEX: &str = "torrents_queue_position_INDEX";

pub(crate) const COL_TORRENT_ID: &str = "torrent_id";
pub(crate) const COL_QUEUE_POSITION: &str = "queue_position";
pub(crate) const COL_NAME: &str = "name";
pub(crate) const COL_CATEGORY: &str = "category";
pub(crate) const COL_TAGS: &str = "tags";
pub(crate) const COL_TARGET_SAVE_PATH: &str = "target_save_path";
pub(crate) const COL_DOWNLOAD_PATH: &str = "download_path";
pub(crate) const COL_CONTENT_LAYOUT: &str = "content_layout";
pub(crate) const COL_RATIO_LIMIT: &str = "ratio_limit";
pub(crate) const COL_SEEDING_TIME_LIMIT: &str = "seeding_time_limit";
pub(crate) const COL_HAS_OUTER_PIECES_PRIORITY: &str = "has_outer_pieces_priority";
pub(crate) const COL_HAS_SEED_STATUS: &str = "has_seed_status";
pub(crate) const COL_OPERATING_MODE: &str = "operating_mode";
pub(crate) const COL_STOPPED: &str = "stopped";
pub(crate) const COL_STOP_CONDITION: &str = "stop_condition";
pub(crate) const COL_RESUME_DATA: &str = "libtorrent_resume_data";
pub(crate) const COL_METADATA: &str = "metadata";
pub(crate) const COL_VALUE: &str = "value";

pub(crate) fn quoted(name: &str) -> String {
    format!("`{name}`")
}

fn join_columns(columns: &[&str]) -> (String, String) {
    let names = columns
        .iter()
        .map(|c| quoted(c))
        .collect::<Vec<_>>()
        .join(",");
    let values = columns
        .iter()
        .map(|c| format!(":{c}"))
        .collect::<Vec<_>>()
        .join(",");
    (names, values)
}

pub(crate) fn insert_statement(table: &str, columns: &[&str]) -> String {
    let (names, values) = join_columns(columns);
    format!("INSERT INTO {} ({}) VALUES ({})", quoted(table), names, values)
}

pub(crate) fn on_conflict_update(constraint: &str, columns: &[&str]) -> String {
    let (names, values) = join_columns(columns);
    format!(
        " ON CONFLICT ({}) DO UPDATE SET ({}) = ({})",
        quoted(constraint),
        names,
        values
    )
}

pub(crate) fn update_statement(table: &str, columns: &[&str]) -> String {
    let (names, values) = join_columns(columns);
    format!("UPDATE {} SET ({}) = ({})", quoted(table), names, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_statement() {
        assert_eq!(
            insert_statement(TABLE_META, &[COL_NAME, COL_VALUE]),
            "INSERT INTO `meta` (`name`,`value`) VALUES (:name,:value)"
        );
    }

    #[test]
    fn test_on_conflict_update() {
        assert_eq!(
            on_conflict_update(COL_TORRENT_ID, &[COL_NAME]),
            " ON CONFLICT (`torrent_id`) DO UPDATE SET (`name`) = (:name)"
        );
    }

    #[test]
    fn test_update_statement() {
        assert_eq!(
            update_statement(TABLE_META, &[COL_NAME, COL_VALUE]),
            "UPDATE `meta` SET (`name`,`value`) = (:name,:value)"
        );
    }
}
