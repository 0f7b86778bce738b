//! Durable persistence for torrent session resume data.
//!
//! State lands in a single SQLite file. Reads are synchronous; writes go
//! through an ordered background queue whose worker batches consecutive
//! jobs into shared transactions, committing whenever the queue drains.

mod codec;
mod schema;
mod sql;
mod worker;

pub mod paths;
pub mod protocol;
pub mod store;
pub mod torrent_id;
pub mod types;

pub use paths::{PathPorter, ProfilePaths};
pub use protocol::{ResumeData, TorrentMetadata};
pub use schema::DB_VERSION;
pub use store::{LoadObserver, ResumeStore};
pub use torrent_id::TorrentId;
pub use types::{ContentLayout, OperatingMode, ResumeRecord, StopCondition, StoreError};
