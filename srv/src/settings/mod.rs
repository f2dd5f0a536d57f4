//! Settings Module.

pub mod btsets;
pub mod manager;
pub mod scan;

pub use btsets::{BtSets, TorznabConfig};
pub use manager::{SettingsManager, SETTINGS_BUCKET, SETTINGS_KEY};
