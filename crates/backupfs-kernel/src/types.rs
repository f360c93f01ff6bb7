//! Shared attribute and directory-entry types.

use std::time::SystemTime;

/// Node kind. Only two variants ever exist on this filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Regular file backed by a content-addressed blob.
    File,
    /// Directory reconstructed from manifest paths.
    Directory,
}

impl FileKind {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileKind::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileKind::Directory)
    }
}

/// File attributes as projected to the host.
///
/// Directory attributes are synthesized (size is the direct child count);
/// file attributes mirror the backing blob and are re-derived on every
/// query.
#[derive(Debug, Clone)]
pub struct FileAttr {
    /// Inode number.
    pub ino: u64,
    /// Size in bytes; for directories, the direct child count.
    pub size: u64,
    /// Node kind.
    pub kind: FileKind,
    /// Unix permission bits.
    pub perm: u32,
    /// Number of hard links.
    pub nlink: u32,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last access time.
    pub atime: SystemTime,
    /// Change/creation time.
    pub ctime: SystemTime,
    /// Owning user, when the backing file provides one.
    pub uid: Option<u32>,
    /// Owning group, when the backing file provides one.
    pub gid: Option<u32>,
}

impl FileAttr {
    /// Synthesized attributes for a directory with `children` direct
    /// entries. Timestamps are "now"; the tree stores none.
    pub fn directory(ino: u64, children: usize) -> Self {
        let now = SystemTime::now();
        Self {
            ino,
            size: children as u64,
            kind: FileKind::Directory,
            perm: 0o755,
            nlink: 2,
            mtime: now,
            atime: now,
            ctime: now,
            uid: None,
            gid: None,
        }
    }
}

/// Directory entry as returned by `readdir`. Order is unspecified.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Entry name (not a full path).
    pub name: String,
    /// Inode of the entry.
    pub ino: u64,
    /// Entry kind.
    pub kind: FileKind,
}

/// Decoded open intent. The host shim translates native flag words into
/// this; the session only cares whether any write intent is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
    /// Append mode.
    pub append: bool,
    /// Truncate on open.
    pub truncate: bool,
}

impl OpenFlags {
    /// Read-only access.
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Default::default()
        }
    }

    /// Write access.
    pub fn write() -> Self {
        Self {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// Any intent that would mutate the file.
    pub fn write_intent(&self) -> bool {
        self.write || self.append || self.truncate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind() {
        assert!(FileKind::File.is_file());
        assert!(!FileKind::File.is_dir());
        assert!(FileKind::Directory.is_dir());
    }

    #[test]
    fn test_directory_attr_size_is_child_count() {
        let attr = FileAttr::directory(7, 3);
        assert_eq!(attr.ino, 7);
        assert_eq!(attr.size, 3);
        assert_eq!(attr.perm, 0o755);
        assert!(attr.kind.is_dir());
    }

    #[test]
    fn test_open_flags_write_intent() {
        assert!(!OpenFlags::read_only().write_intent());
        assert!(OpenFlags::write().write_intent());

        let append = OpenFlags {
            read: true,
            append: true,
            ..Default::default()
        };
        assert!(append.write_intent());
    }
}
