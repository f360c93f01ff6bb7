//! `fuser::Filesystem` implementation over the kernel session.
//!
//! This shim owns no logic of its own: it decodes native arguments
//! (inodes, flag words, offsets), calls the session, and encodes results
//! back into replies and errno codes. Mutating callbacks are answered
//! with `ENOSYS` across the board; the mount is read-only.

use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, SystemTime};

use fuser::{
    FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use libc::c_int;
use tracing::debug;

use backupfs_kernel::{DirEntry, FileAttr, FileKind, FsError, FsSession, OpenFlags, ROOT_INODE};

/// Attribute validity window handed to the kernel.
const TTL: Duration = Duration::from_secs(1);

/// FUSE adapter for a mounted backup session.
pub struct BackupFs {
    session: FsSession,
}

impl BackupFs {
    /// Wrap a session for mounting.
    pub fn new(session: FsSession) -> Self {
        Self { session }
    }

    /// The wrapped session.
    pub fn session(&self) -> &FsSession {
        &self.session
    }
}

/// Map a session error onto the closest errno.
pub fn errno(err: &FsError) -> c_int {
    match err {
        FsError::NotFound(_) => libc::ENOENT,
        FsError::Conflict(_) => libc::EIO,
        FsError::PermissionDenied(_) => libc::EACCES,
        FsError::NotSupported(_) => libc::ENOSYS,
        FsError::IsDirectory(_) => libc::EISDIR,
        FsError::BadHandle(_) => libc::EBADF,
        FsError::InvalidPath(_) => libc::EINVAL,
        FsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
    }
}

/// Decode a native open flag word into the session's open intent.
pub fn decode_open_flags(raw: i32) -> OpenFlags {
    let access = raw & libc::O_ACCMODE;
    OpenFlags {
        read: access != libc::O_WRONLY,
        write: access != libc::O_RDONLY,
        append: raw & libc::O_APPEND != 0,
        truncate: raw & libc::O_TRUNC != 0,
    }
}

fn file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::File => FileType::RegularFile,
        FileKind::Directory => FileType::Directory,
    }
}

/// Project session attributes into the host's attribute struct. The
/// caller context supplies uid/gid for synthesized directory attributes.
pub fn fuse_attr(attr: &FileAttr, fallback_uid: u32, fallback_gid: u32) -> fuser::FileAttr {
    fuser::FileAttr {
        ino: attr.ino,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.ctime,
        kind: file_type(attr.kind),
        perm: attr.perm as u16,
        nlink: attr.nlink,
        uid: attr.uid.unwrap_or(fallback_uid),
        gid: attr.gid.unwrap_or(fallback_gid),
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

fn reply_xattr_sized(data: &[u8], size: u32, reply: ReplyXattr) {
    if size == 0 {
        reply.size(data.len() as u32);
    } else if data.len() as u32 <= size {
        reply.data(data);
    } else {
        reply.error(libc::ERANGE);
    }
}

impl Filesystem for BackupFs {
    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = name.to_string_lossy();
        match self
            .session
            .lookup(parent, &name)
            .and_then(|node| self.session.getattr(node.inode()))
        {
            Ok(attr) => reply.entry(&TTL, &fuse_attr(&attr, req.uid(), req.gid()), 0),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.session.getattr(ino) {
            Ok(attr) => reply.attr(&TTL, &fuse_attr(&attr, req.uid(), req.gid())),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self.session.readdir(ino) {
            Ok(entries) => entries,
            Err(err) => {
                reply.error(errno(&err));
                return;
            }
        };
        let mut listing = Vec::with_capacity(entries.len() + 2);
        listing.push(DirEntry {
            name: ".".to_owned(),
            ino,
            kind: FileKind::Directory,
        });
        listing.push(DirEntry {
            name: "..".to_owned(),
            ino: ROOT_INODE,
            kind: FileKind::Directory,
        });
        listing.extend(entries);

        for (idx, entry) in listing.into_iter().enumerate().skip(offset.max(0) as usize) {
            let full = reply.add(
                entry.ino,
                (idx + 1) as i64,
                file_type(entry.kind),
                &entry.name,
            );
            if full {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.session.open(ino, decode_open_flags(flags)) {
            Ok(fh) => reply.opened(fh, 0),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match self.session.read(fh, offset as u64, size) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.session.release(fh) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        let name = name.to_string_lossy();
        match self.session.get_xattr(ino, &name) {
            Ok(value) => reply_xattr_sized(&value, size, reply),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        match self.session.list_xattrs(ino) {
            Ok(names) => {
                let mut data = Vec::new();
                for name in names {
                    data.extend_from_slice(name.as_bytes());
                    data.push(0);
                }
                reply_xattr_sized(&data, size, reply);
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    // Everything below mutates; the mount is read-only.

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!(ino, "setattr refused");
        reply.error(libc::ENOSYS);
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        reply.error(libc::ENOSYS);
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        reply.error(libc::ENOSYS);
    }

    fn unlink(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(libc::ENOSYS);
    }

    fn rmdir(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(libc::ENOSYS);
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _link_name: &OsStr,
        _target: &Path,
        reply: ReplyEntry,
    ) {
        reply.error(libc::ENOSYS);
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(libc::ENOSYS);
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _newparent: u64,
        _newname: &OsStr,
        reply: ReplyEntry,
    ) {
        reply.error(libc::ENOSYS);
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        reply.error(libc::ENOSYS);
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        reply.error(libc::ENOSYS);
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(libc::ENOSYS);
    }

    fn removexattr(&mut self, _req: &Request<'_>, _ino: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(libc::ENOSYS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(errno(&FsError::not_found("x")), libc::ENOENT);
        assert_eq!(errno(&FsError::permission_denied("x")), libc::EACCES);
        assert_eq!(errno(&FsError::NotSupported("x")), libc::ENOSYS);
        assert_eq!(errno(&FsError::BadHandle(3)), libc::EBADF);
        assert_eq!(errno(&FsError::is_directory("x")), libc::EISDIR);
        assert_eq!(errno(&FsError::InvalidPath("".into())), libc::EINVAL);
        assert_eq!(
            errno(&FsError::Io(std::io::Error::from_raw_os_error(libc::ENOENT))),
            libc::ENOENT
        );
    }

    #[test]
    fn test_decode_open_flags() {
        assert!(!decode_open_flags(libc::O_RDONLY).write_intent());
        assert!(decode_open_flags(libc::O_WRONLY).write_intent());
        assert!(decode_open_flags(libc::O_RDWR).write_intent());
        assert!(decode_open_flags(libc::O_RDONLY | libc::O_TRUNC).write_intent());
        assert!(decode_open_flags(libc::O_RDONLY | libc::O_APPEND).write_intent());
    }

    #[test]
    fn test_fuse_attr_projection() {
        let attr = FileAttr {
            ino: 9,
            size: 1025,
            kind: FileKind::File,
            perm: 0o640,
            nlink: 1,
            mtime: UNIX_EPOCH,
            atime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            uid: Some(501),
            gid: None,
        };
        let fuse = fuse_attr(&attr, 1000, 1000);
        assert_eq!(fuse.ino, 9);
        assert_eq!(fuse.blocks, 3);
        assert_eq!(fuse.perm, 0o640);
        assert_eq!(fuse.kind, FileType::RegularFile);
        assert_eq!(fuse.uid, 501);
        assert_eq!(fuse.gid, 1000);
    }
}
