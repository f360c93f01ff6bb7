//! # backupfs-kernel
//!
//! Core of backupfs: turns the flat manifest listing of a device backup
//! into an immutable in-memory directory tree and serves read-only
//! filesystem operations against it.
//!
//! Key components:
//!
//! - [`clean_domain`] - normalizes compact domain tags into path segments
//! - [`TreeBuilder`] / [`FileTree`] - builds and freezes the node tree
//! - [`FsSession`] - the host-agnostic adapter: lookup, attributes,
//!   directory listing, open/read/release with refcounted handles, xattrs
//!
//! ## Design Decisions
//!
//! - **Inode-addressed arena**: nodes live in an inode-keyed map so both
//!   path walks and inode-addressed host protocols (FUSE) resolve cheaply.
//! - **Immutable after build**: the tree is constructed once per mount
//!   session and never changes, so reads need no locking. The open-handle
//!   table is the only shared mutable state.
//! - **No caching**: file attributes re-derive from the backing store on
//!   every query; the OS page cache is the only cache.

pub mod domain;
pub mod error;
pub mod session;
pub mod tree;
pub mod types;

pub use domain::clean_domain;
pub use error::{FsError, FsResult};
pub use session::{FsSession, XATTR_DOMAIN, XATTR_ID, XATTR_PATH};
pub use tree::{DirNode, FileNode, FileTree, Node, ROOT_INODE, TreeBuilder};
pub use types::{DirEntry, FileAttr, FileKind, OpenFlags};
