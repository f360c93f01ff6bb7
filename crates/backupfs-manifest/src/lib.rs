//! # backupfs-manifest
//!
//! Read-only access to a device backup's `Manifest.db`, the SQLite
//! database listing every backed-up file: its content-derived identifier,
//! owning domain, and original relative path.
//!
//! The manifest is queried exactly once per mount session, to snapshot the
//! records the tree is built from. Only active records (`flags = 1`) are
//! surfaced; deleted and placeholder rows are skipped at the query level.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;
use tracing::debug;

/// One active file record from the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    /// Content-derived identifier; names the blob in the content store.
    pub file_id: String,
    /// Owning domain tag, e.g. `CameraRollDomain`.
    pub domain: String,
    /// Slash-separated path of the file on the original device.
    pub relative_path: String,
}

/// Manifest access errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The directory holds no `Manifest.db`; not a backup.
    #[error("no manifest database at {}", .0.display())]
    NotABackup(PathBuf),

    /// Underlying SQLite failure.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Result alias for manifest queries.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Handle on an open manifest database.
#[derive(Debug)]
pub struct ManifestDb {
    conn: Connection,
}

impl ManifestDb {
    /// Open `<backup_dir>/Manifest.db` read-only.
    pub fn open(backup_dir: &Path) -> ManifestResult<Self> {
        let path = backup_dir.join("Manifest.db");
        if !path.is_file() {
            return Err(ManifestError::NotABackup(path));
        }
        let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        debug!(path = %path.display(), "manifest opened");
        Ok(Self { conn })
    }

    /// Distinct domains among active records, sorted.
    pub fn domains(&self) -> ManifestResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT domain FROM Files WHERE flags = 1 ORDER BY domain")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// All active file records, in manifest order.
    pub fn files(&self) -> ManifestResult<Vec<ManifestRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT fileID, domain, relativePath FROM Files WHERE flags = 1")?;
        let rows = stmt.query_map([], |row| {
            Ok(ManifestRecord {
                file_id: row.get(0)?,
                domain: row.get(1)?,
                relative_path: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
CREATE TABLE Files (
    fileID TEXT PRIMARY KEY,
    domain TEXT,
    relativePath TEXT,
    flags INTEGER,
    file BLOB
);
"#;

    /// Write a small manifest into a temp backup directory.
    fn fixture(rows: &[(&str, &str, &str, i64)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("Manifest.db")).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        for (id, domain, path, flags) in rows {
            conn.execute(
                "INSERT INTO Files (fileID, domain, relativePath, flags) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, domain, path, flags],
            )
            .unwrap();
        }
        dir
    }

    #[test]
    fn test_files_filters_inactive_records() {
        let dir = fixture(&[
            ("ab01", "CameraRollDomain", "Media/a.jpg", 1),
            ("ab02", "CameraRollDomain", "Media/b.jpg", 1),
            ("ab03", "CameraRollDomain", "Media", 2),
            ("ab04", "HomeDomain", "Library/gone.plist", 0),
        ]);
        let db = ManifestDb::open(dir.path()).unwrap();

        let files = db.files().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|r| r.file_id.starts_with("ab0")));
        assert!(files.iter().any(|r| r.relative_path == "Media/a.jpg"));
    }

    #[test]
    fn test_domains_distinct_and_sorted() {
        let dir = fixture(&[
            ("ab01", "HomeDomain", "a", 1),
            ("ab02", "CameraRollDomain", "b", 1),
            ("ab03", "CameraRollDomain", "c", 1),
            ("ab04", "MediaDomain", "d", 0),
        ]);
        let db = ManifestDb::open(dir.path()).unwrap();

        assert_eq!(db.domains().unwrap(), ["CameraRollDomain", "HomeDomain"]);
    }

    #[test]
    fn test_open_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = ManifestDb::open(dir.path()).unwrap_err();
        assert!(matches!(err, ManifestError::NotABackup(_)));
    }
}
