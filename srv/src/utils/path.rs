//! path utils

use std::path::{Path, PathBuf};

pub const BACKUP_INFIX: &str = ".bak.";

/// Path a broken database is moved to: `<db>.bak.<unix-seconds>`.
pub fn backup_path(db_path: &Path, unix_secs: i64) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(format!("{BACKUP_INFIX}{unix_secs}"));
    PathBuf::from(name)
}

/// Sidecar lock file some engines leave next to the database: `<db>.lock`.
pub fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// Parse the unix timestamp out of a backup file name.
pub fn parse_backup_secs(path: &Path) -> Option<i64> {
    path.file_name()?
        .to_str()?
        .rsplit_once(BACKUP_INFIX)?
        .1
        .parse::<i64>()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_name_round_trips_timestamp() {
        let p = backup_path(Path::new("/data/config.db"), 1_700_000_000);
        assert_eq!(p, PathBuf::from("/data/config.db.bak.1700000000"));
        assert_eq!(parse_backup_secs(&p), Some(1_700_000_000));
    }

    #[test]
    fn non_backup_names_are_ignored() {
        assert_eq!(parse_backup_secs(Path::new("/data/config.db")), None);
        assert_eq!(parse_backup_secs(Path::new("/data/config.db.bak.x")), None);
        assert_eq!(
            lock_path(Path::new("/data/config.db")),
            PathBuf::from("/data/config.db.lock")
        );
    }
}
