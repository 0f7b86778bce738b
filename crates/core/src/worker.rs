//! The asynchronous write path: the job queue and the single writer thread.
//!
//! All mutations are enqueued as [`Job`]s and applied strictly in enqueue
//! order by one background thread owning its own connection. Consecutive
//! jobs share a transaction: the batch grows while jobs keep arriving and is
//! committed the instant the queue drains, so idle periods bound latency and
//! bursts are absorbed with few commits. The exclusive half of the shared
//! read/write lock is held from `BEGIN` to `COMMIT`.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, RwLock, RwLockWriteGuard};
use std::thread::JoinHandle;

use rusqlite::{named_params, Connection, ToSql};
use tracing::{debug, error, warn};

use crate::codec;
use crate::paths::PathPorter;
use crate::sql;
use crate::torrent_id::TorrentId;
use crate::types::ResumeRecord;

/// A single pending mutation.
pub(crate) enum Job {
    Store {
        id: TorrentId,
        record: Box<ResumeRecord>,
    },
    Remove {
        id: TorrentId,
    },
    ReorderQueue {
        ids: Vec<TorrentId>,
    },
}

impl Job {
    /// Apply the job against the writer's open transaction. Failures are
    /// logged and the job is dropped; the batch and subsequent jobs proceed.
    fn perform(&self, conn: &Connection, porter: &dyn PathPorter) {
        match self {
            Job::Store { id, record } => perform_store(conn, porter, id, record),
            Job::Remove { id } => perform_remove(conn, id),
            Job::ReorderQueue { ids } => perform_reorder(conn, ids),
        }
    }
}

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    shutdown: bool,
}

/// Unbounded job queue shared between callers and the writer thread.
/// Enqueueing never blocks.
pub(crate) struct JobQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
        }
    }

    pub(crate) fn push(&self, job: Job) {
        let mut state = self.state.lock().unwrap();
        if state.shutdown {
            warn!("Resume data write issued after shutdown request; dropping it");
            return;
        }
        state.jobs.push_back(job);
        self.available.notify_one();
    }

    pub(crate) fn request_shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        state.shutdown = true;
        self.available.notify_all();
    }
}

pub(crate) fn spawn(
    conn: Connection,
    queue: Arc<JobQueue>,
    db_lock: Arc<RwLock<()>>,
    porter: Arc<dyn PathPorter>,
) -> JoinHandle<()> {
    std::thread::spawn(move || run(conn, queue, db_lock, porter))
}

fn run(
    conn: Connection,
    queue: Arc<JobQueue>,
    db_lock: Arc<RwLock<()>>,
    porter: Arc<dyn PathPorter>,
) {
    let mut write_guard: Option<RwLockWriteGuard<'_, ()>> = None;
    let mut transacted: u64 = 0;

    let mut state = queue.state.lock().unwrap();
    loop {
        if state.jobs.is_empty() {
            if transacted > 0 {
                if let Err(e) = conn.execute_batch("COMMIT") {
                    error!(error = %e, "Couldn't commit resume data batch");
                }
                write_guard = None;
                debug!(jobs = transacted, "Resume data batch committed");
                transacted = 0;
            }

            if state.shutdown {
                break;
            }

            state = queue.available.wait(state).unwrap();
            if state.shutdown && state.jobs.is_empty() {
                break;
            }
            continue;
        }

        let Some(job) = state.jobs.pop_front() else {
            continue;
        };
        drop(state);

        if write_guard.is_none() {
            let guard = db_lock.write().unwrap();
            if let Err(e) = conn.execute_batch("BEGIN IMMEDIATE") {
                // Without a transaction no further write would be durable;
                // stop the worker entirely.
                error!(error = %e, "Couldn't begin resume data transaction; writer stopping");
                drop(guard);
                return;
            }
            write_guard = Some(guard);
        }

        job.perform(&conn, porter.as_ref());
        transacted += 1;

        state = queue.state.lock().unwrap();
    }

    drop(write_guard);
}

fn perform_store(conn: &Connection, porter: &dyn PathPorter, id: &TorrentId, record: &ResumeRecord) {
    let encoded = match codec::encode(record, porter) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!(torrent = %id, error = %e, "Couldn't encode resume data; dropping store job");
            return;
        }
    };

    let mut columns = vec![
        sql::COL_TORRENT_ID,
        sql::COL_NAME,
        sql::COL_CATEGORY,
        sql::COL_TAGS,
        sql::COL_TARGET_SAVE_PATH,
        sql::COL_DOWNLOAD_PATH,
        sql::COL_CONTENT_LAYOUT,
        sql::COL_RATIO_LIMIT,
        sql::COL_SEEDING_TIME_LIMIT,
        sql::COL_HAS_OUTER_PIECES_PRIORITY,
        sql::COL_HAS_SEED_STATUS,
        sql::COL_OPERATING_MODE,
        sql::COL_STOPPED,
        sql::COL_STOP_CONDITION,
        sql::COL_RESUME_DATA,
    ];
    if encoded.metadata.is_some() {
        columns.push(sql::COL_METADATA);
    }

    let statement = format!(
        "{}{}",
        sql::insert_statement(sql::TABLE_TORRENTS, &columns),
        sql::on_conflict_update(sql::COL_TORRENT_ID, &columns),
    );

    let id_hex = id.to_string();
    let mut params: Vec<(&str, &dyn ToSql)> = vec![
        (":torrent_id", &id_hex),
        (":name", &encoded.name),
        (":category", &encoded.category),
        (":tags", &encoded.tags),
        (":target_save_path", &encoded.target_save_path),
        (":download_path", &encoded.download_path),
        (":content_layout", &encoded.content_layout),
        (":ratio_limit", &encoded.ratio_limit),
        (":seeding_time_limit", &encoded.seeding_time_limit),
        (":has_outer_pieces_priority", &encoded.has_outer_pieces_priority),
        (":has_seed_status", &encoded.has_seed_status),
        (":operating_mode", &encoded.operating_mode),
        (":stopped", &encoded.stopped),
        (":stop_condition", &encoded.stop_condition),
        (":libtorrent_resume_data", &encoded.resume_data),
    ];
    if let Some(metadata) = &encoded.metadata {
        params.push((":metadata", metadata));
    }

    let result = conn
        .prepare(&statement)
        .and_then(|mut stmt| stmt.execute(params.as_slice()));
    if let Err(e) = result {
        error!(torrent = %id, error = %e, "Couldn't store resume data; dropping job");
    }
}

fn perform_remove(conn: &Connection, id: &TorrentId) {
    let statement = format!(
        "DELETE FROM {} WHERE {} = :torrent_id",
        sql::quoted(sql::TABLE_TORRENTS),
        sql::quoted(sql::COL_TORRENT_ID),
    );

    // Removing an id that was never stored deletes zero rows; not an error.
    if let Err(e) = conn.execute(&statement, named_params! {":torrent_id": id.to_string()}) {
        error!(torrent = %id, error = %e, "Couldn't delete resume data; dropping job");
    }
}

fn perform_reorder(conn: &Connection, ids: &[TorrentId]) {
    let statement = format!(
        "UPDATE {} SET {} = :queue_position WHERE {} = :torrent_id",
        sql::quoted(sql::TABLE_TORRENTS),
        sql::quoted(sql::COL_QUEUE_POSITION),
        sql::quoted(sql::COL_TORRENT_ID),
    );

    let mut stmt = match conn.prepare(&statement) {
        Ok(stmt) => stmt,
        Err(e) => {
            error!(error = %e, "Couldn't prepare queue position update; dropping job");
            return;
        }
    };

    // Each row update is independent; a failure mid-sequence is logged and
    // the remaining updates are still attempted.
    for (position, id) in ids.iter().enumerate() {
        if let Err(e) = stmt.execute(named_params! {
            ":queue_position": position as i64,
            ":torrent_id": id.to_string(),
        }) {
            error!(torrent = %id, error = %e, "Couldn't store queue position");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::ProfilePaths;
    use crate::schema;

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        schema::create_fresh(&mut conn).unwrap();
        conn
    }

    fn porter() -> ProfilePaths {
        ProfilePaths::new("/profile")
    }

    fn id(byte: u8) -> TorrentId {
        TorrentId::Sha1([byte; 20])
    }

    fn row_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM `torrents`", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_store_job_inserts_row() {
        let conn = test_conn();
        perform_store(&conn, &porter(), &id(1), &ResumeRecord::default());
        assert_eq!(row_count(&conn), 1);
    }

    #[test]
    fn test_store_job_upserts_on_conflict() {
        let conn = test_conn();
        let mut record = ResumeRecord::default();
        record.name = "first".to_string();
        perform_store(&conn, &porter(), &id(1), &record);
        record.name = "second".to_string();
        perform_store(&conn, &porter(), &id(1), &record);

        assert_eq!(row_count(&conn), 1);
        let name: String = conn
            .query_row("SELECT `name` FROM `torrents`", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "second");
    }

    #[test]
    fn test_store_job_preserves_queue_position_on_update() {
        let conn = test_conn();
        perform_store(&conn, &porter(), &id(1), &ResumeRecord::default());
        perform_reorder(&conn, &[id(1)]);
        perform_store(&conn, &porter(), &id(1), &ResumeRecord::default());

        let position: i64 = conn
            .query_row("SELECT `queue_position` FROM `torrents`", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(position, 0);
    }

    #[test]
    fn test_remove_job_deletes_row() {
        let conn = test_conn();
        perform_store(&conn, &porter(), &id(1), &ResumeRecord::default());
        perform_remove(&conn, &id(1));
        assert_eq!(row_count(&conn), 0);
    }

    #[test]
    fn test_remove_job_unknown_id_is_noop() {
        let conn = test_conn();
        perform_store(&conn, &porter(), &id(1), &ResumeRecord::default());
        perform_remove(&conn, &id(9));
        assert_eq!(row_count(&conn), 1);
    }

    #[test]
    fn test_reorder_job_assigns_zero_based_positions() {
        let conn = test_conn();
        for byte in 1..=3 {
            perform_store(&conn, &porter(), &id(byte), &ResumeRecord::default());
        }
        perform_reorder(&conn, &[id(2), id(3), id(1)]);

        let mut stmt = conn
            .prepare("SELECT `torrent_id` FROM `torrents` ORDER BY `queue_position`")
            .unwrap();
        let ordered: Vec<TorrentId> = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .map(|hex| TorrentId::from_hex(&hex.unwrap()).unwrap())
            .collect();
        assert_eq!(ordered, vec![id(2), id(3), id(1)]);
    }

    #[test]
    fn test_queue_preserves_order() {
        let queue = JobQueue::new();
        queue.push(Job::Remove { id: id(1) });
        queue.push(Job::Remove { id: id(2) });

        let mut state = queue.state.lock().unwrap();
        match state.jobs.pop_front().unwrap() {
            Job::Remove { id: first } => assert_eq!(first, id(1)),
            _ => panic!("unexpected job variant"),
        }
        match state.jobs.pop_front().unwrap() {
            Job::Remove { id: second } => assert_eq!(second, id(2)),
            _ => panic!("unexpected job variant"),
        }
    }

    #[test]
    fn test_push_after_shutdown_is_dropped() {
        let queue = JobQueue::new();
        queue.request_shutdown();
        queue.push(Job::Remove { id: id(1) });
        assert!(queue.state.lock().unwrap().jobs.is_empty());
    }
}
