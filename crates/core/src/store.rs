//! The resume data store: synchronous reads, asynchronous ordered writes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use rusqlite::{named_params, Connection};
use tracing::{error, info, warn};

use crate::codec::{self, RawRow};
use crate::paths::PathPorter;
use crate::schema;
use crate::sql;
use crate::torrent_id::TorrentId;
use crate::types::{ResumeRecord, StoreError};
use crate::worker::{self, Job, JobQueue};

/// Receives the results of a startup bulk load, in queue order.
pub trait LoadObserver {
    /// All registered torrent ids, sorted by queue position.
    fn load_started(&mut self, ids: &[TorrentId]);
    /// One decoded record; emitted in the same order as the id list.
    fn resume_data_loaded(&mut self, id: &TorrentId, record: ResumeRecord);
    /// The scan completed.
    fn load_finished(&mut self);
}

/// A durable store of per-torrent resume data backed by a single SQLite
/// file.
///
/// Reads run synchronously against the store's own connection under a
/// shared read lock. Writes are fire-and-forget: they are queued in order
/// and applied by one background writer thread that batches consecutive
/// jobs into shared transactions. There is no read-your-writes guarantee
/// across the queue boundary; a read issued while a batch is in flight may
/// observe the previous state.
pub struct ResumeStore {
    path: PathBuf,
    conn: Mutex<Connection>,
    db_lock: Arc<RwLock<()>>,
    porter: Arc<dyn PathPorter>,
    queue: Arc<JobQueue>,
    worker: Option<JoinHandle<()>>,
}

impl ResumeStore {
    /// Open or create the database at `path`, migrating an older schema if
    /// needed, and start the writer thread.
    ///
    /// Connection, schema-creation and migration failures are fatal. A
    /// write-ahead journaling mode that cannot be enabled is only logged;
    /// the store still opens with degraded durability.
    pub fn open(path: impl AsRef<Path>, porter: Arc<dyn PathPorter>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let fresh = !path.exists();

        let mut conn = Connection::open(&path)?;
        if let Err(e) = schema::enable_wal(&conn) {
            warn!(error = %e, "Couldn't enable write-ahead journaling; durability is degraded");
        }

        if fresh {
            schema::create_fresh(&mut conn)?;
        } else {
            let version = schema::current_version(&conn)?;
            if version < schema::DB_VERSION {
                info!(
                    from = version,
                    to = schema::DB_VERSION,
                    "Migrating resume data schema"
                );
                schema::migrate(&mut conn, version)?;
            }
        }

        let db_lock = Arc::new(RwLock::new(()));
        let queue = Arc::new(JobQueue::new());

        // The writer gets its own connection so batch transactions never
        // share state with readers on the main one.
        let writer_conn = Connection::open(&path)?;
        let worker = worker::spawn(
            writer_conn,
            Arc::clone(&queue),
            Arc::clone(&db_lock),
            Arc::clone(&porter),
        );

        Ok(Self {
            path,
            conn: Mutex::new(conn),
            db_lock,
            porter,
            queue,
            worker: Some(worker),
        })
    }

    /// Request writer shutdown, wait for the queue to drain and the final
    /// batch to commit, then release the database handle.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.queue.request_shutdown();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("Resume data writer thread panicked");
            }
        }
    }

    /// All stored torrent ids, ordered by ascending queue position.
    pub fn registered_torrents(&self) -> Result<Vec<TorrentId>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let statement = format!(
            "SELECT {} FROM {} ORDER BY {}",
            sql::quoted(sql::COL_TORRENT_ID),
            sql::quoted(sql::TABLE_TORRENTS),
            sql::quoted(sql::COL_QUEUE_POSITION),
        );
        let mut stmt = conn.prepare(&statement)?;

        let _read = self.db_lock.read().unwrap();
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(TorrentId::from_hex(&row?)?);
        }
        Ok(ids)
    }

    /// Load one torrent's resume data.
    ///
    /// The read lock is held only across query execution; decoding happens
    /// after it is released.
    pub fn load(&self, id: TorrentId) -> Result<ResumeRecord, StoreError> {
        let statement = format!(
            "SELECT * FROM {} WHERE {} = :torrent_id",
            sql::quoted(sql::TABLE_TORRENTS),
            sql::quoted(sql::COL_TORRENT_ID),
        );

        let raw = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(&statement)?;

            let _read = self.db_lock.read().unwrap();
            stmt.query_row(
                named_params! {":torrent_id": id.to_string()},
                RawRow::from_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(id),
                other => StoreError::Database(other),
            })?
        };

        codec::decode(raw, self.porter.as_ref())
    }

    /// Queue an insert-or-update of `record` keyed by `id`. Fire-and-forget:
    /// a failure is logged by the writer and only that job is dropped.
    pub fn store(&self, id: TorrentId, record: ResumeRecord) {
        self.queue.push(Job::Store {
            id,
            record: Box::new(record),
        });
    }

    /// Queue a removal. Removing an id that was never stored is a no-op.
    pub fn remove(&self, id: TorrentId) {
        self.queue.push(Job::Remove { id });
    }

    /// Queue an update of all queue positions: each id gets its 0-based
    /// index in `ids` as its new position.
    pub fn reorder_queue(&self, ids: Vec<TorrentId>) {
        self.queue.push(Job::ReorderQueue { ids });
    }

    /// Scan the whole table once and emit every record through `observer`.
    ///
    /// Runs on a dedicated connection so the long scan doesn't contend with
    /// the writer's connection state, under a read lock held for the whole
    /// scan. A row that fails to decode is logged and skipped; query
    /// failures abort the load.
    pub fn load_all(&self, observer: &mut dyn LoadObserver) -> Result<(), StoreError> {
        let conn = Connection::open(&self.path)?;
        let _read = self.db_lock.read().unwrap();

        let id_statement = format!(
            "SELECT {} FROM {} ORDER BY {}",
            sql::quoted(sql::COL_TORRENT_ID),
            sql::quoted(sql::TABLE_TORRENTS),
            sql::quoted(sql::COL_QUEUE_POSITION),
        );
        let mut stmt = conn.prepare(&id_statement)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(TorrentId::from_hex(&row?)?);
        }
        observer.load_started(&ids);

        let row_statement = format!(
            "SELECT * FROM {} ORDER BY {}",
            sql::quoted(sql::TABLE_TORRENTS),
            sql::quoted(sql::COL_QUEUE_POSITION),
        );
        let mut stmt = conn.prepare(&row_statement)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(sql::COL_TORRENT_ID)?,
                RawRow::from_row(row)?,
            ))
        })?;
        for row in rows {
            let (id_hex, raw) = row?;
            let id = TorrentId::from_hex(&id_hex)?;
            match codec::decode(raw, self.porter.as_ref()) {
                Ok(record) => observer.resume_data_loaded(&id, record),
                Err(e) => {
                    error!(torrent = %id, error = %e, "Skipping undecodable resume data row");
                }
            }
        }

        observer.load_finished();
        Ok(())
    }
}

impl Drop for ResumeStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}
