//! Shared Store.
//!
//! A process opens the config database at most once; collaborators get the
//! same [`Store`] handle through [`shared`].

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::error;

use super::error::Result;
use super::storage::{Storage, Store};
use super::StoreOptions;

static SHARED: Mutex<Option<Arc<Store>>> = Mutex::new(None);

/// Build custom open options.
#[derive(Debug, Default)]
pub struct OpenOptions(StoreOptions);

impl OpenOptions {
    pub fn new() -> Self {
        Self(StoreOptions::default())
    }

    pub fn file_name(mut self, value: &'static str) -> Self {
        self.0.file_name = value;
        self
    }

    pub fn lock_timeout(mut self, value: Duration) -> Self {
        self.0.lock_timeout = value;
        self
    }

    pub fn lock_retry_interval(mut self, value: Duration) -> Self {
        self.0.lock_retry_interval = value;
        self
    }

    /// Open a private store handle.
    pub fn open(&self, data_dir: impl AsRef<Path>) -> Result<Store> {
        Store::open_with_options(data_dir, self.0)
    }

    /// Open the process-wide store, or return it if already open.
    ///
    /// `data_dir` is only used by the call that actually opens the store.
    /// Failure is logged and reported as `None`, the next call tries again.
    pub fn open_shared(&self, data_dir: impl AsRef<Path>) -> Option<Arc<Store>> {
        let mut shared = SHARED.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = shared.as_ref() {
            return Some(Arc::clone(store));
        }

        match self.open(data_dir) {
            Ok(store) => {
                let store = Arc::new(store);
                *shared = Some(Arc::clone(&store));
                Some(store)
            }
            Err(e) => {
                error!("failed to open config db: {}", e);
                None
            }
        }
    }
}

/// Process-wide store with default options.
pub fn shared(data_dir: impl AsRef<Path>) -> Option<Arc<Store>> {
    OpenOptions::new().open_shared(data_dir)
}

/// Close the process-wide store. A later [`shared`] call opens it again.
pub fn close_shared() {
    let store = SHARED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();

    if let Some(store) = store {
        store.close();
    }
}
