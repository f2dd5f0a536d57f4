//! Persistent settings for the torrent streaming server.
//!
//! [`store`] is a path-addressed bucket store over an embedded redb file,
//! [`settings`] loads, validates and migrates the server settings kept in it.

pub mod settings;
pub mod store;
pub mod utils;
