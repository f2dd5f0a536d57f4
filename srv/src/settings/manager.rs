//! Settings manager.
//!
//! Owns the published [`BtSets`] record. Readers take a snapshot through
//! [`SettingsManager::settings`]; writers submit a whole replacement which is
//! normalized, published and then saved to `Settings/BitTorr`.
//!
//! Callers serialize `replace`, `reset_defaults` and `load` among
//! themselves. The cache marker scan rewrites the published save path from
//! a background thread, and only while the published record still points at
//! the path it walked.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use super::btsets::{BtSets, READER_READ_AHEAD_MIN};
use super::scan::find_marker_dir;
use crate::store::Storage;

pub const SETTINGS_BUCKET: &str = "Settings";
pub const SETTINGS_KEY: &str = "BitTorr";

pub struct SettingsManager {
    /// `None` when the config db could not be opened.
    store: Option<Arc<dyn Storage>>,

    /// skip all writes to the store.
    read_only: AtomicBool,

    current: Arc<RwLock<Arc<BtSets>>>,

    /// last spawned cache marker scan.
    scan: Mutex<Option<JoinHandle<()>>>,
}

impl SettingsManager {
    /// Factory defaults are published until the first [`load`](Self::load).
    pub fn new(store: Option<Arc<dyn Storage>>, read_only: bool) -> Self {
        Self {
            store,
            read_only: AtomicBool::new(read_only),
            current: Arc::new(RwLock::new(Arc::new(BtSets::factory_defaults()))),
            scan: Mutex::new(None),
        }
    }

    /// Snapshot of the published settings.
    pub fn settings(&self) -> Arc<BtSets> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*current)
    }

    pub fn read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    pub fn set_read_only(&self, value: bool) {
        self.read_only.store(value, Ordering::Release);
    }

    /// Load settings from the store.
    ///
    /// A missing or unreadable record installs factory defaults. A record
    /// older than the current cache defaults is migrated and saved back.
    /// Any other record is normalized and published without a write.
    pub fn load(&self) {
        let buf = self
            .store
            .as_ref()
            .and_then(|store| store.get(SETTINGS_BUCKET, SETTINGS_KEY))
            .unwrap_or_default();

        if buf.is_empty() {
            debug!("no stored settings, install defaults");
            self.reset_defaults();
            return;
        }

        let mut sets = match BtSets::from_json(&buf) {
            Ok(sets) => sets,
            Err(e) => {
                error!("error unmarshal settings: {}", e);
                self.reset_defaults();
                return;
            }
        };

        if sets.reader_read_ahead < READER_READ_AHEAD_MIN {
            sets.reader_read_ahead = READER_READ_AHEAD_MIN;
        }

        if sets.apply_cache_defaults_migration() {
            self.replace(sets);
        } else {
            // normalized for readers only, the stored record is left as is.
            sets.apply_invariants(self.settings().cache_defaults_version);
            self.publish(sets);
        }
    }

    /// Normalize `sets`, publish it and save it unless read-only.
    ///
    /// With disk cache enabled, a background scan looks for a marker
    /// directory under the save path and, if found, points the published
    /// save path at it. The stored record keeps the configured path.
    pub fn replace(&self, mut sets: BtSets) {
        let prior_version = self.settings().cache_defaults_version;
        sets.apply_invariants(prior_version);

        self.publish(sets.clone());
        if sets.use_disk {
            self.spawn_scan(sets.torrents_save_path.clone());
        }

        if self.read_only() {
            debug!("read-only, settings are not saved");
            return;
        }
        self.persist(&sets);
    }

    /// Publish factory defaults and save them unless read-only.
    pub fn reset_defaults(&self) {
        let sets = BtSets::factory_defaults();
        self.publish(sets.clone());

        if self.read_only() {
            debug!("read-only, default settings are not saved");
            return;
        }
        self.persist(&sets);
    }

    /// Block until the last spawned marker scan has finished.
    pub fn wait_scan(&self) {
        let handle = self
            .scan
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("cache marker scan panicked");
            }
        }
    }

    fn publish(&self, sets: BtSets) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(sets);
    }

    fn persist(&self, sets: &BtSets) {
        let buf = match sets.to_json() {
            Ok(buf) => buf,
            Err(e) => {
                error!("error marshal settings: {}", e);
                return;
            }
        };

        match &self.store {
            Some(store) => store.set(SETTINGS_BUCKET, SETTINGS_KEY, &buf),
            None => warn!("config db is not open, settings are not saved"),
        }
    }

    fn spawn_scan(&self, root: String) {
        let current = Arc::clone(&self.current);

        let spawned = thread::Builder::new()
            .name("cache-scan".to_string())
            .spawn(move || {
                if let Some(found) = find_marker_dir(Path::new(&root)) {
                    let found = found.to_string_lossy().into_owned();
                    info!("found directory \"{}\", use as cache dir", found);

                    let mut current = current.write().unwrap_or_else(PoisonError::into_inner);
                    // a later replace already moved the save path elsewhere.
                    if !current.use_disk || current.torrents_save_path != root {
                        debug!("save path changed, dropping \"{}\"", found);
                        return;
                    }
                    Arc::make_mut(&mut *current).torrents_save_path = found;
                }
            });

        match spawned {
            Ok(handle) => {
                *self.scan.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
            Err(e) => error!("failed to spawn cache marker scan: {}", e),
        }
    }
}

impl Drop for SettingsManager {
    fn drop(&mut self) {
        self.wait_scan();
    }
}
