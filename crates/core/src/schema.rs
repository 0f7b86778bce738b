//! Schema creation, version detection and migration.
//!
//! The schema version lives in the `meta` table under the name `version`.
//! Migration steps are additive and each one is guarded by an existence
//! check, so a rerun after a crash mid-migration is a no-op.

use rusqlite::{named_params, Connection};

use crate::sql;
use crate::types::StoreError;

/// Current on-disk schema version.
pub const DB_VERSION: i64 = 4;

/// Attempt to switch the database to write-ahead journaling and verify the
/// resulting mode. The caller treats failure as a degraded-durability
/// warning, not a fatal error.
pub(crate) fn enable_wal(conn: &Connection) -> Result<(), StoreError> {
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        return Err(StoreError::WalUnavailable(format!(
            "journal mode is {mode}, probably a filesystem limitation"
        )));
    }
    Ok(())
}

pub(crate) fn column_exists(
    conn: &Connection,
    table: &str,
    column: &str,
) -> Result<bool, StoreError> {
    let statement = format!("PRAGMA table_info({})", sql::quoted(table));
    let mut stmt = conn.prepare(&statement)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get("name")?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Create the full current-version schema in one transaction.
pub(crate) fn create_fresh(conn: &mut Connection) -> Result<(), StoreError> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        r#"
        CREATE TABLE `meta` (
            `id` INTEGER PRIMARY KEY,
            `name` TEXT NOT NULL UNIQUE,
            `value` BLOB
        );

        CREATE TABLE `torrents` (
            `id` INTEGER PRIMARY KEY,
            `torrent_id` BLOB NOT NULL UNIQUE,
            `queue_position` INTEGER NOT NULL DEFAULT -1,
            `name` TEXT,
            `category` TEXT,
            `tags` TEXT,
            `target_save_path` TEXT,
            `download_path` TEXT,
            `content_layout` TEXT NOT NULL,
            `ratio_limit` INTEGER NOT NULL,
            `seeding_time_limit` INTEGER NOT NULL,
            `has_outer_pieces_priority` INTEGER NOT NULL,
            `has_seed_status` INTEGER NOT NULL,
            `operating_mode` TEXT NOT NULL,
            `stopped` INTEGER NOT NULL,
            `stop_condition` TEXT NOT NULL DEFAULT 'None',
            `libtorrent_resume_data` BLOB NOT NULL,
            `metadata` BLOB
        );

        CREATE INDEX `torrents_queue_position_INDEX` ON `torrents` (`queue_position`);
        "#,
    )?;

    tx.execute(
        &sql::insert_statement(sql::TABLE_META, &[sql::COL_NAME, sql::COL_VALUE]),
        named_params! {
            ":name": sql::META_VERSION,
            ":value": DB_VERSION,
        },
    )?;

    tx.commit()?;
    Ok(())
}

/// Read the stored schema version.
///
/// A layout without the `download_path` column predates the version marker
/// being reliable and is treated as version 1 regardless of the stored
/// value.
pub(crate) fn current_version(conn: &Connection) -> Result<i64, StoreError> {
    if !column_exists(conn, sql::TABLE_TORRENTS, sql::COL_DOWNLOAD_PATH)? {
        return Ok(1);
    }

    let statement = format!(
        "SELECT {} FROM {} WHERE {} = :name",
        sql::quoted(sql::COL_VALUE),
        sql::quoted(sql::TABLE_META),
        sql::quoted(sql::COL_NAME),
    );
    match conn.query_row(&statement, named_params! {":name": sql::META_VERSION}, |row| {
        row.get::<_, i64>(0)
    }) {
        Ok(version) => Ok(version),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::CorruptDatabase(
            "schema version row is missing".to_string(),
        )),
        Err(rusqlite::Error::InvalidColumnType(..)) => Err(StoreError::CorruptDatabase(
            "schema version is not numeric".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Migrate an older schema to [`DB_VERSION`] in one transaction. Any failure
/// rolls the whole migration back and the store refuses to open.
pub(crate) fn migrate(conn: &mut Connection, from_version: i64) -> Result<(), StoreError> {
    debug_assert!((1..DB_VERSION).contains(&from_version));

    let tx = conn.transaction()?;

    // v1 -> v2: track the incomplete-download path per torrent.
    if from_version == 1 && !column_exists(&tx, sql::TABLE_TORRENTS, sql::COL_DOWNLOAD_PATH)? {
        tx.execute("ALTER TABLE `torrents` ADD `download_path` TEXT", [])?;
    }

    // v2 -> v3: automatic stop condition.
    if from_version <= 2 && !column_exists(&tx, sql::TABLE_TORRENTS, sql::COL_STOP_CONDITION)? {
        tx.execute(
            "ALTER TABLE `torrents` ADD `stop_condition` TEXT NOT NULL DEFAULT 'None'",
            [],
        )?;
    }

    // v3 -> v4: index for queue-ordered iteration.
    if from_version <= 3 {
        let statement = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            sql::quoted(sql::QUEUE_POSITION_INDEX),
            sql::quoted(sql::TABLE_TORRENTS),
            sql::quoted(sql::COL_QUEUE_POSITION),
        );
        tx.execute(&statement, [])?;
    }

    tx.execute(
        &sql::update_statement(sql::TABLE_META, &[sql::COL_NAME, sql::COL_VALUE]),
        named_params! {
            ":name": sql::META_VERSION,
            ":value": DB_VERSION,
        },
    )?;

    tx.commit()?;
    Ok(())
}
