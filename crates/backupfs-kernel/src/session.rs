//! The mount session: frozen tree + content store + open-handle table.
//!
//! [`FsSession`] is the host-agnostic adapter. A thin per-host shim
//! translates native callback signatures (FUSE inode calls, errno codes)
//! into this operation set. The session owns the only mutable state that
//! exists after mount: the open-handle table.
//!
//! Locking: one coarse `parking_lot::Mutex` guards the table and is held
//! only for table mutation, never across blocking I/O. Each open handle
//! carries its own lock serializing seek+read, so concurrent reads on
//! unrelated handles never contend.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{FsError, FsResult};
use crate::tree::{FileTree, Node};
use crate::types::{DirEntry, FileAttr, FileKind, OpenFlags};

/// Extended attribute: on-disk path of the backing blob (files only).
pub const XATTR_PATH: &str = "user.backupfs.path";
/// Extended attribute: content identifier (files only).
pub const XATTR_ID: &str = "user.backupfs.id";
/// Extended attribute: manifest domain (files and directories).
pub const XATTR_DOMAIN: &str = "user.backupfs.domain";

/// One entry per open node. The descriptor is shared across concurrent
/// opens; the refcount tracks how many releases are still owed.
#[derive(Debug)]
struct HandleEntry {
    file: Arc<Mutex<File>>,
    refcount: u32,
}

/// A mounted backup session.
///
/// Created once per mount from a manifest snapshot; the tree never
/// changes afterwards and is discarded at unmount. Handles move through
/// `Closed → Open(refcount=1) → Open(refcount=n) → Closed`; the handle id
/// of a node is its inode, so opens of the same node converge on the same
/// table slot.
#[derive(Debug)]
pub struct FsSession {
    tree: FileTree,
    store_root: PathBuf,
    handles: Mutex<HashMap<u64, HandleEntry>>,
}

impl FsSession {
    /// Wrap a frozen tree over the given content store root.
    pub fn new(tree: FileTree, store_root: impl Into<PathBuf>) -> Self {
        Self {
            tree,
            store_root: store_root.into(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// The frozen tree.
    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    /// Root directory node.
    pub fn root(&self) -> &Node {
        self.tree.root()
    }

    /// Child of a directory by name.
    pub fn lookup(&self, parent: u64, name: &str) -> FsResult<&Node> {
        self.tree.lookup(parent, name)
    }

    /// Attributes for a node.
    ///
    /// Directories synthesize attributes (size = direct child count).
    /// Files stat the backing blob on every call; a missing or unreadable
    /// blob is an error local to this call.
    pub fn getattr(&self, ino: u64) -> FsResult<FileAttr> {
        let node = self.node(ino)?;
        match node {
            Node::Directory(dir) => Ok(FileAttr::directory(ino, dir.child_count())),
            Node::File(file) => {
                let path = file.blob_path(&self.store_root);
                let meta = std::fs::metadata(&path).map_err(|e| {
                    warn!(path = %path.display(), error = %e, "stat on backing blob failed");
                    FsError::Io(e)
                })?;
                Ok(FileAttr {
                    ino,
                    size: meta.len(),
                    kind: FileKind::File,
                    perm: meta.permissions().mode() & 0o7777,
                    nlink: meta.nlink() as u32,
                    mtime: meta.modified().unwrap_or(UNIX_EPOCH),
                    atime: meta.accessed().unwrap_or(UNIX_EPOCH),
                    ctime: UNIX_EPOCH + Duration::new(meta.ctime() as u64, meta.ctime_nsec() as u32),
                    uid: Some(meta.uid()),
                    gid: Some(meta.gid()),
                })
            }
        }
    }

    /// Directory entries in unspecified order.
    pub fn readdir(&self, ino: u64) -> FsResult<Vec<DirEntry>> {
        self.tree.entries(ino)
    }

    /// Open a file node and return its handle.
    ///
    /// Any write intent is refused: the mount is read-only. Concurrent
    /// opens of one node share a single descriptor and bump its refcount.
    /// The blocking `File::open` runs with no lock held; losing that race
    /// just closes the extra descriptor.
    pub fn open(&self, ino: u64, flags: OpenFlags) -> FsResult<u64> {
        if flags.write_intent() {
            return Err(FsError::permission_denied("read-only filesystem"));
        }
        let node = self.node(ino)?;
        let file = match node {
            Node::Directory(d) => return Err(FsError::is_directory(d.name.clone())),
            Node::File(f) => f,
        };

        {
            let mut handles = self.handles.lock();
            if let Some(entry) = handles.get_mut(&ino) {
                entry.refcount += 1;
                debug!(ino, refcount = entry.refcount, "open shared existing descriptor");
                return Ok(ino);
            }
        }

        let path = file.blob_path(&self.store_root);
        let opened = File::open(&path).map_err(|e| {
            warn!(path = %path.display(), error = %e, "open on backing blob failed");
            FsError::Io(e)
        })?;

        let mut handles = self.handles.lock();
        match handles.entry(ino) {
            Entry::Occupied(mut entry) => {
                // Someone opened the same node while we were in File::open;
                // keep their descriptor and drop ours.
                entry.get_mut().refcount += 1;
            }
            Entry::Vacant(slot) => {
                slot.insert(HandleEntry {
                    file: Arc::new(Mutex::new(opened)),
                    refcount: 1,
                });
            }
        }
        debug!(ino, "opened");
        Ok(ino)
    }

    /// Read up to `size` bytes at `offset`.
    ///
    /// Seek+read is atomic under the per-handle lock. A read at or past
    /// end-of-file returns fewer (possibly zero) bytes, never an error.
    pub fn read(&self, fh: u64, offset: u64, size: u32) -> FsResult<Vec<u8>> {
        let file = {
            let handles = self.handles.lock();
            let entry = handles.get(&fh).ok_or(FsError::BadHandle(fh))?;
            Arc::clone(&entry.file)
        };

        let mut file = file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Drop one reference to an open handle.
    ///
    /// The descriptor closes and the table entry disappears when the
    /// refcount returns to zero. Releasing an unknown handle is an error.
    pub fn release(&self, fh: u64) -> FsResult<()> {
        let mut handles = self.handles.lock();
        let entry = handles.get_mut(&fh).ok_or(FsError::BadHandle(fh))?;
        entry.refcount -= 1;
        if entry.refcount == 0 {
            handles.remove(&fh);
            debug!(fh, "handle closed");
        }
        Ok(())
    }

    /// Names of the extended attributes a node exposes.
    pub fn list_xattrs(&self, ino: u64) -> FsResult<Vec<&'static str>> {
        Ok(match self.node(ino)? {
            Node::Directory(_) => vec![XATTR_DOMAIN],
            Node::File(_) => vec![XATTR_PATH, XATTR_ID, XATTR_DOMAIN],
        })
    }

    /// Value of one extended attribute.
    pub fn get_xattr(&self, ino: u64, name: &str) -> FsResult<Vec<u8>> {
        let node = self.node(ino)?;
        match (node, name) {
            (Node::File(f), XATTR_PATH) => {
                Ok(f.blob_path(&self.store_root).display().to_string().into_bytes())
            }
            (Node::File(f), XATTR_ID) => Ok(f.content_id.clone().into_bytes()),
            (_, XATTR_DOMAIN) => Ok(node.domain().unwrap_or_default().as_bytes().to_vec()),
            _ => Err(FsError::NotSupported("extended attribute")),
        }
    }

    /// Number of nodes with a live open handle.
    pub fn open_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Refcount of a handle, if it is open.
    pub fn handle_refcount(&self, fh: u64) -> Option<u32> {
        self.handles.lock().get(&fh).map(|e| e.refcount)
    }

    fn node(&self, ino: u64) -> FsResult<&Node> {
        self.tree
            .node(ino)
            .ok_or_else(|| FsError::not_found(format!("inode {ino}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ROOT_INODE, TreeBuilder};
    use std::io::Write;
    use std::path::Path;
    use std::sync::Barrier;

    const DOMAIN: &str = "CameraRollDomain";

    /// Build a session over a temp content store with the given
    /// `(id, path, contents)` entries.
    fn session(entries: &[(&str, &str, &[u8])]) -> (FsSession, tempfile::TempDir) {
        let store = tempfile::tempdir().unwrap();
        let mut builder = TreeBuilder::new(false);
        for (id, path, contents) in entries {
            let bucket = store.path().join(&id[..2]);
            std::fs::create_dir_all(&bucket).unwrap();
            let mut f = File::create(bucket.join(id)).unwrap();
            f.write_all(contents).unwrap();
            builder.insert(id, DOMAIN, path).unwrap();
        }
        (
            FsSession::new(builder.finish(), store.path()),
            store,
        )
    }

    fn file_ino(fs: &FsSession, parent: u64, name: &str) -> u64 {
        fs.lookup(parent, name).unwrap().inode()
    }

    #[test]
    fn test_open_read_release() {
        let (fs, _store) = session(&[("ab01", "Media/hello.txt", b"hello world")]);
        let media = file_ino(&fs, ROOT_INODE, "Media");
        let ino = file_ino(&fs, media, "hello.txt");

        let fh = fs.open(ino, OpenFlags::read_only()).unwrap();
        assert_eq!(fs.read(fh, 0, 5).unwrap(), b"hello");
        assert_eq!(fs.read(fh, 6, 64).unwrap(), b"world");
        fs.release(fh).unwrap();
        assert_eq!(fs.open_count(), 0);
    }

    #[test]
    fn test_read_past_eof_is_empty_not_error() {
        let (fs, _store) = session(&[("ab01", "f", b"short")]);
        let ino = file_ino(&fs, ROOT_INODE, "f");
        let fh = fs.open(ino, OpenFlags::read_only()).unwrap();
        assert!(fs.read(fh, 1000, 16).unwrap().is_empty());
        fs.release(fh).unwrap();
    }

    #[test]
    fn test_write_intent_denied() {
        let (fs, _store) = session(&[("ab01", "f", b"data")]);
        let ino = file_ino(&fs, ROOT_INODE, "f");
        let err = fs.open(ino, OpenFlags::write()).unwrap_err();
        assert!(matches!(err, FsError::PermissionDenied(_)));
        assert_eq!(fs.open_count(), 0);
    }

    #[test]
    fn test_refcount_sharing() {
        let (fs, _store) = session(&[("ab01", "f", b"data")]);
        let ino = file_ino(&fs, ROOT_INODE, "f");

        let fh1 = fs.open(ino, OpenFlags::read_only()).unwrap();
        let fh2 = fs.open(ino, OpenFlags::read_only()).unwrap();
        assert_eq!(fh1, fh2);
        assert_eq!(fs.handle_refcount(fh1), Some(2));
        assert_eq!(fs.open_count(), 1);

        fs.release(fh1).unwrap();
        assert_eq!(fs.handle_refcount(fh1), Some(1));
        fs.release(fh2).unwrap();
        assert_eq!(fs.open_count(), 0);

        // Third release: the handle is gone.
        assert!(matches!(fs.release(fh1), Err(FsError::BadHandle(_))));
    }

    #[test]
    fn test_concurrent_opens_share_descriptor() {
        let (fs, _store) = session(&[("ab01", "f", b"data")]);
        let ino = file_ino(&fs, ROOT_INODE, "f");
        let fs = Arc::new(fs);
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let fs = Arc::clone(&fs);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let fh = fs.open(ino, OpenFlags::read_only()).unwrap();
                    assert_eq!(fs.read(fh, 0, 4).unwrap(), b"data");
                    fh
                })
            })
            .collect();
        let fhs: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(fs.open_count(), 1);
        assert_eq!(fs.handle_refcount(ino), Some(8));
        for fh in fhs {
            fs.release(fh).unwrap();
        }
        assert_eq!(fs.open_count(), 0);
    }

    #[test]
    fn test_open_directory_rejected() {
        let (fs, _store) = session(&[("ab01", "dir/f", b"data")]);
        let dir = file_ino(&fs, ROOT_INODE, "dir");
        assert!(matches!(
            fs.open(dir, OpenFlags::read_only()),
            Err(FsError::IsDirectory(_))
        ));
    }

    #[test]
    fn test_getattr_directory_size_is_child_count() {
        let (fs, _store) = session(&[
            ("ab01", "dir/a", b"x"),
            ("ab02", "dir/b", b"y"),
            ("ab03", "dir/deep/nested/c", b"z"),
        ]);
        let dir = file_ino(&fs, ROOT_INODE, "dir");
        let attr = fs.getattr(dir).unwrap();
        // a, b, deep: direct children only, regardless of nesting depth.
        assert_eq!(attr.size, 3);
        assert_eq!(attr.perm, 0o755);
    }

    #[test]
    fn test_getattr_file_reflects_backing_blob() {
        let (fs, _store) = session(&[("ab01", "f", b"hello world")]);
        let ino = file_ino(&fs, ROOT_INODE, "f");
        let attr = fs.getattr(ino).unwrap();
        assert_eq!(attr.size, 11);
        assert!(attr.kind.is_file());
        assert!(attr.uid.is_some());
    }

    #[test]
    fn test_getattr_missing_blob_is_local_io_error() {
        let store = tempfile::tempdir().unwrap();
        let mut builder = TreeBuilder::new(false);
        builder.insert("ab01", DOMAIN, "ghost").unwrap();
        let fs = FsSession::new(builder.finish(), store.path());

        let ino = file_ino(&fs, ROOT_INODE, "ghost");
        assert!(matches!(fs.getattr(ino), Err(FsError::Io(_))));
        // The session stays usable.
        assert!(fs.getattr(ROOT_INODE).is_ok());
    }

    #[test]
    fn test_xattrs() {
        let (fs, store) = session(&[("ab01", "f", b"data")]);
        let ino = file_ino(&fs, ROOT_INODE, "f");

        assert_eq!(
            fs.list_xattrs(ino).unwrap(),
            vec![XATTR_PATH, XATTR_ID, XATTR_DOMAIN]
        );
        assert_eq!(fs.get_xattr(ino, XATTR_ID).unwrap(), b"ab01");
        assert_eq!(fs.get_xattr(ino, XATTR_DOMAIN).unwrap(), DOMAIN.as_bytes());
        let path = String::from_utf8(fs.get_xattr(ino, XATTR_PATH).unwrap()).unwrap();
        assert_eq!(
            Path::new(&path),
            store.path().join("ab").join("ab01")
        );

        // Directories expose the domain only.
        assert_eq!(fs.list_xattrs(ROOT_INODE).unwrap(), vec![XATTR_DOMAIN]);
        assert!(matches!(
            fs.get_xattr(ROOT_INODE, XATTR_ID),
            Err(FsError::NotSupported(_))
        ));
    }

    #[test]
    fn test_release_unknown_handle() {
        let (fs, _store) = session(&[("ab01", "f", b"data")]);
        assert!(matches!(fs.release(9999), Err(FsError::BadHandle(9999))));
    }
}
