//! Bucket path module.
//!
//! A bucket path is a slash-delimited sequence of bucket names such as
//! `Settings` or `Torrents/Meta`. redb tables are flat, so every bucket is a
//! table named by the path from the root down to it: `a/b/c` is backed by
//! the tables `a`, `a/b` and `a/b/c`.

use std::fmt::Display;

use super::error::{Result, StoreError};

pub const SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPath {
    segments: Vec<String>,
}

impl BucketPath {
    /// Parse `xpath`, returning `None` for the empty path.
    pub fn parse(xpath: &str) -> Result<Option<Self>> {
        if xpath.is_empty() {
            return Ok(None);
        }

        let segments: Vec<String> = xpath.split(SEPARATOR).map(String::from).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(StoreError::InvalidPath(xpath.to_string()));
        }

        Ok(Some(Self { segments }))
    }

    /// Table names of each bucket, from the root bucket to the terminal one.
    pub fn tables(&self) -> impl Iterator<Item = String> + '_ {
        (1..=self.segments.len()).map(|n| self.segments[..n].join("/"))
    }

    /// Table name of the terminal bucket.
    pub fn table(&self) -> String {
        self.segments.join("/")
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl Display for BucketPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_is_none() {
        assert_eq!(BucketPath::parse("").unwrap(), None);
    }

    #[test]
    fn tables_walk_from_root() {
        let p = BucketPath::parse("Torrents/Meta/v2").unwrap().unwrap();
        let tables: Vec<String> = p.tables().collect();

        assert_eq!(tables, vec!["Torrents", "Torrents/Meta", "Torrents/Meta/v2"]);
        assert_eq!(p.table(), "Torrents/Meta/v2");
        assert_eq!(p.depth(), 3);
    }

    #[test]
    fn empty_segments_are_rejected() {
        for xpath in ["/Settings", "Settings/", "a//b", "/"] {
            let res = BucketPath::parse(xpath);
            assert!(
                matches!(res, Err(StoreError::InvalidPath(ref p)) if p == xpath),
                "expected InvalidPath for {xpath:?}, got {res:?}"
            );
        }
    }
}
