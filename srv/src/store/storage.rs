//! Store Module.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::thread;
use std::time::Instant;

use chrono::Utc;
use glob::glob;
use log::{debug, error, info, trace, warn};
use redb::{Database, DatabaseError, ReadableTable, TableDefinition, TableHandle};

use super::bucket::BucketPath;
use super::error::{Result, StoreError};
use super::StoreOptions;
use crate::utils::path::{backup_path, lock_path, parse_backup_secs, BACKUP_INFIX};

/// Path-addressed bucket store methods.
///
/// All methods are fail-soft: engine errors are logged together with the
/// path and operation, then surface as absence for reads and are dropped
/// for writes.
pub trait Storage: Send + Sync {
    /// Get a copy of the value stored under `name` in bucket `xpath`.
    fn get(&self, xpath: &str, name: &str) -> Option<Vec<u8>>;

    /// Put `value` under `name`, creating missing buckets along `xpath`.
    fn set(&self, xpath: &str, name: &str, value: &[u8]);

    /// List keys (sub-buckets excluded) of bucket `xpath` in key order.
    fn list(&self, xpath: &str) -> Vec<String>;

    /// Delete `name` from bucket `xpath`.
    fn remove(&self, xpath: &str, name: &str);

    /// Delete every key of bucket `xpath`. Sub-buckets are left alone.
    fn clear(&self, xpath: &str);

    /// Release the database file. Calling it twice is harmless.
    fn close(&self);
}

fn bucket(table: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(table)
}

/// Check every bucket from the root down to the terminal one exists.
fn resolve<H: TableHandle>(tables: impl Iterator<Item = H>, path: &BucketPath) -> bool {
    let existing: HashSet<String> = tables.map(|t| t.name().to_string()).collect();
    path.tables().all(|t| existing.contains(&t))
}

/// redb backed store.
pub struct Store {
    /// database file.
    path: PathBuf,

    /// `None` once closed.
    db: RwLock<Option<Database>>,
}

impl Store {
    /// Open `config.db` in `data_dir`, creating both if needed.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(data_dir, StoreOptions::default())
    }

    /// Open the database with custom options.
    ///
    /// A database that stays locked past `lock_timeout` or fails to open
    /// is moved aside to `<db>.bak.<unix-seconds>` and a fresh one is
    /// created in its place. Only a failure of that second open is returned.
    pub fn open_with_options(data_dir: impl AsRef<Path>, opts: StoreOptions) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;

        let path = data_dir.join(opts.file_name);
        info!("open store path: {}", path.display());

        let db = match open_database(&path, &opts) {
            Ok(db) => db,
            Err(e) => {
                warn!("open {} failed: {}", path.display(), e);
                move_aside(&path);

                let db = open_database(&path, &opts).map_err(|e| {
                    error!("failed to recreate {}: {}", path.display(), e);
                    e
                })?;
                info!("recreated empty {}", path.display());
                db
            }
        };

        Ok(Self {
            path,
            db: RwLock::new(Some(db)),
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.db
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Recovery sidecars left next to the database, oldest first.
    pub fn backups(&self) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}{}*",
            glob::Pattern::escape(&self.path.to_string_lossy()),
            BACKUP_INFIX
        );
        trace!("read backups with pattern: {}", &pattern);

        let mut found = Vec::new();
        for path in glob(&pattern)? {
            let path = path?;
            if let Some(secs) = parse_backup_secs(&path) {
                found.push((secs, path));
            }
        }
        found.sort();

        Ok(found.into_iter().map(|(_, p)| p).collect())
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let guard = self.db.read().unwrap_or_else(PoisonError::into_inner);
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        f(db)
    }

    fn try_get(&self, xpath: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = BucketPath::parse(xpath)? else {
            return Ok(None);
        };

        self.with_db(|db| {
            let tx = db.begin_read()?;
            if !resolve(tx.list_tables()?, &path) {
                return Ok(None);
            }

            let table_name = path.table();
            let table = tx.open_table(bucket(&table_name))?;

            // values point into engine pages, copy before the tx ends.
            let value = table.get(name)?.map(|v| v.value().to_vec());
            Ok(value)
        })
    }

    fn try_set(&self, xpath: &str, name: &str, value: &[u8]) -> Result<()> {
        let Some(path) = BucketPath::parse(xpath)? else {
            return Ok(());
        };

        self.with_db(|db| {
            let tx = db.begin_write()?;
            {
                for table_name in path.tables().take(path.depth() - 1) {
                    tx.open_table(bucket(&table_name))?;
                }

                let table_name = path.table();
                let mut table = tx.open_table(bucket(&table_name))?;
                table.insert(name, value)?;
            }
            tx.commit()?;

            Ok(())
        })
    }

    fn try_list(&self, xpath: &str) -> Result<Vec<String>> {
        let Some(path) = BucketPath::parse(xpath)? else {
            return Ok(Vec::new());
        };

        self.with_db(|db| {
            let tx = db.begin_read()?;
            if !resolve(tx.list_tables()?, &path) {
                return Ok(Vec::new());
            }

            let table_name = path.table();
            let table = tx.open_table(bucket(&table_name))?;

            let mut keys = Vec::new();
            for entry in table.iter()? {
                let (key, _) = entry?;
                let key = key.value();
                if !key.is_empty() {
                    keys.push(key.to_string());
                }
            }

            Ok(keys)
        })
    }

    fn try_remove(&self, xpath: &str, name: &str) -> Result<()> {
        let Some(path) = BucketPath::parse(xpath)? else {
            return Ok(());
        };

        self.with_db(|db| {
            let tx = db.begin_write()?;
            if !resolve(tx.list_tables()?, &path) {
                tx.abort()?;
                return Ok(());
            }

            {
                let table_name = path.table();
                let mut table = tx.open_table(bucket(&table_name))?;
                table.remove(name)?;
            }
            tx.commit()?;

            Ok(())
        })
    }

    fn try_clear(&self, xpath: &str) -> Result<()> {
        let Some(path) = BucketPath::parse(xpath)? else {
            return Ok(());
        };

        self.with_db(|db| {
            let tx = db.begin_write()?;
            if !resolve(tx.list_tables()?, &path) {
                tx.abort()?;
                return Ok(());
            }

            {
                let table_name = path.table();
                let mut table = tx.open_table(bucket(&table_name))?;

                let mut keys = Vec::new();
                for entry in table.iter()? {
                    let (key, _) = entry?;
                    keys.push(key.value().to_string());
                }

                for key in &keys {
                    table.remove(key.as_str())?;
                }
                debug!("cleared {} keys from bucket `{}`", keys.len(), path);
            }
            tx.commit()?;

            Ok(())
        })
    }
}

impl Storage for Store {
    fn get(&self, xpath: &str, name: &str) -> Option<Vec<u8>> {
        self.try_get(xpath, name).unwrap_or_else(|e| {
            error!("error get {}/{}: {}", xpath, name, e);
            None
        })
    }

    fn set(&self, xpath: &str, name: &str, value: &[u8]) {
        if let Err(e) = self.try_set(xpath, name, value) {
            error!("error put {}/{}: {}", xpath, name, e);
            debug!("value: {}", String::from_utf8_lossy(value));
        }
    }

    fn list(&self, xpath: &str) -> Vec<String> {
        self.try_list(xpath).unwrap_or_else(|e| {
            error!("error list {}: {}", xpath, e);
            Vec::new()
        })
    }

    fn remove(&self, xpath: &str, name: &str) {
        if let Err(e) = self.try_remove(xpath, name) {
            error!("error remove {}/{}: {}", xpath, name, e);
        }
    }

    fn clear(&self, xpath: &str) {
        if let Err(e) = self.try_clear(xpath) {
            error!("error clear {}: {}", xpath, e);
        }
    }

    fn close(&self) {
        let mut guard = self.db.write().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            info!("store {} closed", self.path.display());
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Open the database, waiting up to `lock_timeout` for another holder to
/// release its lock.
fn open_database(path: &Path, opts: &StoreOptions) -> Result<Database> {
    let deadline = Instant::now() + opts.lock_timeout;

    loop {
        match Database::create(path) {
            Ok(db) => return Ok(db),
            Err(DatabaseError::DatabaseAlreadyOpen) => {
                if Instant::now() >= deadline {
                    return Err(StoreError::AlreadyLocked(path.to_path_buf()));
                }
                trace!("{} is locked, retry in {:?}", path.display(), opts.lock_retry_interval);
                thread::sleep(opts.lock_retry_interval);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Drop a stale lock sidecar and rename the database out of the way.
fn move_aside(path: &Path) {
    let _ = fs::remove_file(lock_path(path));

    let recovered = backup_path(path, Utc::now().timestamp());
    match fs::rename(path, &recovered) {
        Ok(()) => warn!("renamed broken db to {}", recovered.display()),
        Err(e) => debug!("rename {} failed: {}", path.display(), e),
    }
}
