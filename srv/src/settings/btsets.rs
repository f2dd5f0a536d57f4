//! BitTorrent settings record.
//!
//! The record is stored as JSON under `Settings/BitTorr`. Field names follow
//! the layout already found in existing databases, missing fields read as
//! zero values and fields this version doesn't know are kept in
//! [`BtSets::extra`] so they survive a load and save.

use std::fmt::{self, Display};

use log::info;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Bump when cache defaults change and stored records must pick them up.
pub const CACHE_DEFAULTS_VERSION: i64 = 1;

pub const CACHE_SIZE_DEFAULT: i64 = 332 * 1024 * 1024;
pub const PRELOAD_CACHE_DEFAULT: i64 = 10;
pub const CACHE_DEFAULT_PATH: &str = "/Library/Caches/TorrServerCache";

pub const CONNECTIONS_LIMIT_DEFAULT: i64 = 25;
pub const TORRENT_DISCONNECT_TIMEOUT_DEFAULT: i64 = 30;
pub const RETRACKERS_MODE_DEFAULT: i64 = 1;
pub const READER_READ_AHEAD_DEFAULT: i64 = 95;

pub const READER_READ_AHEAD_MIN: i64 = 5;
pub const READER_READ_AHEAD_MAX: i64 = 100;
pub const PRELOAD_CACHE_MAX: i64 = 100;

/// Torznab search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TorznabConfig {
    pub host: String,
    pub key: String,
    pub name: String,
}

/// Server tunables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct BtSets {
    // Cache
    /// in bytes, 332 MiB by default.
    pub cache_size: i64,
    /// percent of the cache kept ahead of the reader, 5-100.
    #[serde(rename = "ReaderReadAHead")]
    pub reader_read_ahead: i64,
    /// percent of the cache filled before playback starts.
    pub preload_cache: i64,
    pub cache_defaults_version: i64,

    // Disk
    pub use_disk: bool,
    pub torrents_save_path: String,
    pub remove_cache_on_drop: bool,

    // Torrent
    pub force_encrypt: bool,
    /// 0 - don't add, 1 - add retrackers, 2 - remove retrackers, 3 - replace retrackers.
    pub retrackers_mode: i64,
    /// in seconds.
    pub torrent_disconnect_timeout: i64,
    pub enable_debug: bool,

    // DLNA
    #[serde(rename = "EnableDLNA")]
    pub enable_dlna: bool,
    pub friendly_name: String,

    // Search
    pub enable_rutor_search: bool,
    pub enable_torznab_search: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub torznab_urls: Vec<TorznabConfig>,

    // BT client
    #[serde(rename = "EnableIPv6")]
    pub enable_ipv6: bool,
    #[serde(rename = "DisableTCP")]
    pub disable_tcp: bool,
    #[serde(rename = "DisableUTP")]
    pub disable_utp: bool,
    #[serde(rename = "DisableUPNP")]
    pub disable_upnp: bool,
    #[serde(rename = "DisableDHT")]
    pub disable_dht: bool,
    #[serde(rename = "DisablePEX")]
    pub disable_pex: bool,
    pub disable_upload: bool,
    /// in kb, 0 - unlimited.
    pub download_rate_limit: i64,
    /// in kb, 0 - unlimited.
    pub upload_rate_limit: i64,
    pub connections_limit: i64,
    pub peers_listen_port: i64,

    // HTTPS
    pub ssl_port: i64,
    pub ssl_cert: String,
    pub ssl_key: String,

    /// don't wait for piece completion before serving reads.
    pub responsive_mode: bool,

    #[serde(rename = "ShowFSActiveTorr")]
    pub show_fs_active_torr: bool,

    pub store_settings_in_json: bool,
    pub store_viewed_in_json: bool,

    /// Fields written by other versions.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

impl BtSets {
    /// Settings of a fresh install.
    pub fn factory_defaults() -> Self {
        Self {
            cache_size: CACHE_SIZE_DEFAULT,
            preload_cache: PRELOAD_CACHE_DEFAULT,
            use_disk: true,
            torrents_save_path: CACHE_DEFAULT_PATH.to_string(),
            remove_cache_on_drop: true,
            cache_defaults_version: CACHE_DEFAULTS_VERSION,
            connections_limit: CONNECTIONS_LIMIT_DEFAULT,
            retrackers_mode: RETRACKERS_MODE_DEFAULT,
            torrent_disconnect_timeout: TORRENT_DISCONNECT_TIMEOUT_DEFAULT,
            reader_read_ahead: READER_READ_AHEAD_DEFAULT,
            responsive_mode: true,
            show_fs_active_torr: true,
            store_settings_in_json: true,
            ..Self::default()
        }
    }

    pub fn from_json(buf: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(buf)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Substitute defaults for unset fields and clamp ranges.
    ///
    /// An unset defaults version takes `prior_version` when that one is set.
    pub fn apply_invariants(&mut self, prior_version: i64) {
        if self.cache_defaults_version == 0 {
            self.cache_defaults_version = if prior_version > 0 {
                prior_version
            } else {
                CACHE_DEFAULTS_VERSION
            };
        }

        if self.cache_size == 0 {
            self.cache_size = CACHE_SIZE_DEFAULT;
        }
        if self.connections_limit == 0 {
            self.connections_limit = CONNECTIONS_LIMIT_DEFAULT;
        }
        if self.torrent_disconnect_timeout == 0 {
            self.torrent_disconnect_timeout = TORRENT_DISCONNECT_TIMEOUT_DEFAULT;
        }

        self.reader_read_ahead = self
            .reader_read_ahead
            .clamp(READER_READ_AHEAD_MIN, READER_READ_AHEAD_MAX);
        self.preload_cache = self.preload_cache.clamp(0, PRELOAD_CACHE_MAX);

        if !(0..=3).contains(&self.retrackers_mode) {
            self.retrackers_mode = RETRACKERS_MODE_DEFAULT;
        }

        if self.torrents_save_path.is_empty() {
            self.use_disk = false;
        }
    }

    /// Reset cache fields to current defaults when the record predates them.
    ///
    /// Returns `true` if the record changed.
    pub fn apply_cache_defaults_migration(&mut self) -> bool {
        if self.cache_defaults_version >= CACHE_DEFAULTS_VERSION {
            return false;
        }

        self.cache_size = CACHE_SIZE_DEFAULT;
        self.preload_cache = PRELOAD_CACHE_DEFAULT;
        self.use_disk = true;
        self.torrents_save_path = CACHE_DEFAULT_PATH.to_string();
        self.remove_cache_on_drop = true;
        self.cache_defaults_version = CACHE_DEFAULTS_VERSION;

        info!("applied cache defaults migration");
        true
    }
}

impl Display for BtSets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn factory_defaults() {
        let s = BtSets::factory_defaults();

        assert_eq!(s.cache_size, 332 * 1024 * 1024);
        assert_eq!(s.preload_cache, 10);
        assert!(s.use_disk);
        assert_eq!(s.torrents_save_path, "/Library/Caches/TorrServerCache");
        assert!(s.remove_cache_on_drop);
        assert_eq!(s.cache_defaults_version, 1);
        assert_eq!(s.connections_limit, 25);
        assert_eq!(s.retrackers_mode, 1);
        assert_eq!(s.torrent_disconnect_timeout, 30);
        assert_eq!(s.reader_read_ahead, 95);
        assert!(s.responsive_mode);
        assert!(s.show_fs_active_torr);
        assert!(s.store_settings_in_json);

        assert!(!s.force_encrypt);
        assert!(!s.enable_dlna);
        assert!(!s.store_viewed_in_json);
        assert_eq!(s.ssl_port, 0);
        assert!(s.friendly_name.is_empty());
        assert!(s.torznab_urls.is_empty());
        assert!(s.extra.is_empty());
    }

    #[test]
    fn json_uses_stored_field_names() {
        let mut s = BtSets::factory_defaults();
        s.torznab_urls.push(TorznabConfig {
            host: "http://jackett:9117".to_string(),
            key: "secret".to_string(),
            name: "jackett".to_string(),
        });

        let v: Value = serde_json::from_slice(&s.to_json().unwrap()).unwrap();

        assert_eq!(v["CacheSize"], json!(348127232));
        assert_eq!(v["ReaderReadAHead"], json!(95));
        assert_eq!(v["CacheDefaultsVersion"], json!(1));
        assert_eq!(v["TorrentsSavePath"], json!("/Library/Caches/TorrServerCache"));
        assert_eq!(v["EnableIPv6"], json!(false));
        assert_eq!(v["DisableUPNP"], json!(false));
        assert_eq!(v["ShowFSActiveTorr"], json!(true));
        assert_eq!(v["EnableDLNA"], json!(false));
        assert_eq!(v["TorznabUrls"][0]["Host"], json!("http://jackett:9117"));
        assert_eq!(v["TorznabUrls"][0]["Name"], json!("jackett"));
    }

    #[test]
    fn missing_fields_read_as_zero() {
        let s = BtSets::from_json(br#"{"CacheSize": 1, "TorznabUrls": null}"#).unwrap();

        assert_eq!(s.cache_size, 1);
        assert_eq!(s.cache_defaults_version, 0);
        assert_eq!(s.reader_read_ahead, 0);
        assert!(!s.use_disk);
        assert!(s.torznab_urls.is_empty());
    }

    #[test]
    fn wide_integers_decode() {
        let buf = br#"{"DownloadRateLimit": 5000000000, "UploadRateLimit": 4294967296, "PeersListenPort": 65535, "CacheDefaultsVersion": 1}"#;
        let s = BtSets::from_json(buf).unwrap();

        assert_eq!(s.download_rate_limit, 5_000_000_000);
        assert_eq!(s.upload_rate_limit, 4_294_967_296);
        assert_eq!(s.peers_listen_port, 65535);
        assert_eq!(s.cache_defaults_version, 1);
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let buf = br#"{"CacheSize": 1, "EnableProxy": true, "ProxyHosts": ["a", "b"]}"#;
        let s = BtSets::from_json(buf).unwrap();

        assert_eq!(s.extra.get("EnableProxy"), Some(&json!(true)));

        let again = BtSets::from_json(&s.to_json().unwrap()).unwrap();
        assert_eq!(again, s);
        assert_eq!(again.extra.get("ProxyHosts"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(BtSets::from_json(b"{not json").is_err());
        assert!(BtSets::from_json(br#"{"CacheSize": "big"}"#).is_err());
    }

    #[test]
    fn invariants_default_and_clamp() {
        let mut s = BtSets {
            reader_read_ahead: 3,
            preload_cache: 200,
            retrackers_mode: 7,
            use_disk: true,
            ..BtSets::default()
        };
        s.apply_invariants(0);

        assert_eq!(s.reader_read_ahead, 5);
        assert_eq!(s.preload_cache, 100);
        assert_eq!(s.cache_size, CACHE_SIZE_DEFAULT);
        assert_eq!(s.connections_limit, 25);
        assert_eq!(s.torrent_disconnect_timeout, 30);
        assert_eq!(s.retrackers_mode, 1);
        assert_eq!(s.cache_defaults_version, CACHE_DEFAULTS_VERSION);
        assert!(!s.use_disk);

        let mut s = BtSets {
            reader_read_ahead: 150,
            preload_cache: -4,
            retrackers_mode: 3,
            cache_size: 64,
            torrents_save_path: "/tmp".to_string(),
            use_disk: true,
            ..BtSets::default()
        };
        s.apply_invariants(4);

        assert_eq!(s.reader_read_ahead, 100);
        assert_eq!(s.preload_cache, 0);
        assert_eq!(s.retrackers_mode, 3);
        assert_eq!(s.cache_size, 64);
        assert_eq!(s.cache_defaults_version, 4);
        assert!(s.use_disk);
    }

    #[test]
    fn cache_defaults_migration_is_idempotent() {
        let mut s = BtSets {
            cache_size: 1,
            preload_cache: 50,
            torrents_save_path: "/elsewhere".to_string(),
            connections_limit: 40,
            ..BtSets::default()
        };

        assert!(s.apply_cache_defaults_migration());
        assert_eq!(s.cache_size, CACHE_SIZE_DEFAULT);
        assert_eq!(s.preload_cache, PRELOAD_CACHE_DEFAULT);
        assert!(s.use_disk);
        assert_eq!(s.torrents_save_path, CACHE_DEFAULT_PATH);
        assert!(s.remove_cache_on_drop);
        assert_eq!(s.cache_defaults_version, CACHE_DEFAULTS_VERSION);
        // unrelated fields untouched.
        assert_eq!(s.connections_limit, 40);

        let migrated = s.clone();
        assert!(!s.apply_cache_defaults_migration());
        assert_eq!(s, migrated);
    }

    #[test]
    fn display_is_json() {
        let s = BtSets::factory_defaults();
        let parsed = BtSets::from_json(s.to_string().as_bytes()).unwrap();
        assert_eq!(parsed, s);
    }
}
