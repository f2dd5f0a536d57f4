//! Store Module.

pub mod bucket;
pub mod error;
pub mod shared;
pub mod storage;

use std::time::Duration;

/// Database file name inside the data directory.
pub const DB_FILE_NAME: &str = "config.db";

/// How long open waits for another holder of the file lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(1500);

pub const DEFAULT_LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Copy, Clone)]
pub struct StoreOptions {
    pub(crate) file_name: &'static str,

    // a stale lock on sandboxed filesystems never goes away, so don't
    // wait long before moving the database aside.
    pub(crate) lock_timeout: Duration,

    pub(crate) lock_retry_interval: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            file_name: DB_FILE_NAME,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_retry_interval: DEFAULT_LOCK_RETRY_INTERVAL,
        }
    }
}

pub use shared::{close_shared, shared, OpenOptions};
pub use storage::{Storage, Store};
