//! Path tree construction and the node model.
//!
//! The manifest is a flat, unordered stream of `(id, domain, path)` rows.
//! [`TreeBuilder`] folds that stream into a single-rooted tree of
//! [`Node`]s, then freezes it into an immutable [`FileTree`] for the
//! lifetime of the mount.
//!
//! Nodes live in an inode-keyed arena; directory children map names to
//! inodes. This gives stable inode addressing for inode-based host
//! protocols and keeps path walks a chain of map lookups.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::clean_domain;
use crate::error::{FsError, FsResult};
use crate::types::{DirEntry, FileKind};

/// Inode of the tree root. Hosts conventionally expect 1.
pub const ROOT_INODE: u64 = 1;

/// A directory reconstructed from manifest path segments.
#[derive(Debug, Clone)]
pub struct DirNode {
    /// Segment name; empty for the root.
    pub name: String,
    /// Inode, unique among live nodes.
    pub inode: u64,
    /// Domain of the record that first created this directory. The root
    /// belongs to no domain.
    pub domain: Option<String>,
    children: HashMap<String, u64>,
}

impl DirNode {
    /// Inode of the child with the given name, if any.
    pub fn child(&self, name: &str) -> Option<u64> {
        self.children.get(name).copied()
    }

    /// Number of direct children. Reported as the directory's size.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Iterate over `(name, inode)` pairs in unspecified order.
    pub fn children(&self) -> impl Iterator<Item = (&str, u64)> {
        self.children.iter().map(|(name, ino)| (name.as_str(), *ino))
    }
}

/// A file backed by a content-addressed blob in the store.
#[derive(Debug, Clone)]
pub struct FileNode {
    /// Final path segment.
    pub name: String,
    /// Inode, unique among live nodes.
    pub inode: u64,
    /// Domain of the manifest record.
    pub domain: String,
    /// Content-derived identifier; locates the blob on disk.
    pub content_id: String,
}

impl FileNode {
    /// On-disk location of the backing blob:
    /// `<store-root>/<id[0..2]>/<id>` (two-level hash-bucket fan-out).
    pub fn blob_path(&self, store_root: &Path) -> PathBuf {
        let bucket = self.content_id.get(..2).unwrap_or(&self.content_id);
        store_root.join(bucket).join(&self.content_id)
    }
}

/// Closed union over the two node kinds.
#[derive(Debug, Clone)]
pub enum Node {
    /// Directory variant.
    Directory(DirNode),
    /// File variant.
    File(FileNode),
}

impl Node {
    /// Node name (final path segment; empty for the root).
    pub fn name(&self) -> &str {
        match self {
            Node::Directory(d) => &d.name,
            Node::File(f) => &f.name,
        }
    }

    /// Inode number.
    pub fn inode(&self) -> u64 {
        match self {
            Node::Directory(d) => d.inode,
            Node::File(f) => f.inode,
        }
    }

    /// Node kind.
    pub fn kind(&self) -> FileKind {
        match self {
            Node::Directory(_) => FileKind::Directory,
            Node::File(_) => FileKind::File,
        }
    }

    /// Domain tag, when the node carries one.
    pub fn domain(&self) -> Option<&str> {
        match self {
            Node::Directory(d) => d.domain.as_deref(),
            Node::File(f) => Some(&f.domain),
        }
    }

    /// Directory view of this node.
    pub fn as_dir(&self) -> Option<&DirNode> {
        match self {
            Node::Directory(d) => Some(d),
            Node::File(_) => None,
        }
    }

    /// File view of this node.
    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Node::Directory(_) => None,
            Node::File(f) => Some(f),
        }
    }
}

/// Builds the tree from manifest rows, then freezes it.
///
/// Ingestion is sequential: rows are drained from the manifest before the
/// mount goes live, so the inode sequence is a plain counter. Inodes are
/// never reused while the tree is alive; a node displaced by
/// last-write-wins leaves the arena entirely.
pub struct TreeBuilder {
    nodes: HashMap<u64, Node>,
    next_inode: u64,
    group_domains: bool,
}

impl TreeBuilder {
    /// Create a builder with an empty root.
    ///
    /// With `group_domains` set, every inserted path is prefixed by its
    /// normalized domain segments (see [`clean_domain`]).
    pub fn new(group_domains: bool) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_INODE,
            Node::Directory(DirNode {
                name: String::new(),
                inode: ROOT_INODE,
                domain: None,
                children: HashMap::new(),
            }),
        );
        Self {
            nodes,
            next_inode: ROOT_INODE + 1,
            group_domains,
        }
    }

    fn alloc_inode(&mut self) -> u64 {
        let ino = self.next_inode;
        self.next_inode += 1;
        ino
    }

    /// Number of live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Insert one manifest record.
    ///
    /// Empty path segments (leading, trailing, or doubled separators) are
    /// canonicalized away; a path with nothing left is rejected. A file
    /// found where a directory is expected, or a directory found at a file
    /// slot, is a [`FsError::Conflict`] and should abort the mount. A file
    /// already present at the final slot is replaced: last write wins.
    pub fn insert(&mut self, id: &str, domain: &str, path: &str) -> FsResult<()> {
        let mut segments: Vec<String> = if self.group_domains {
            clean_domain(domain)
        } else {
            Vec::new()
        };
        segments.extend(
            path.split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
        );
        let Some((leaf, dirs)) = segments.split_last() else {
            return Err(FsError::InvalidPath(path.to_owned()));
        };

        let mut cursor = ROOT_INODE;
        for (depth, segment) in dirs.iter().enumerate() {
            let existing = self
                .nodes
                .get(&cursor)
                .and_then(Node::as_dir)
                .and_then(|d| d.child(segment));
            match existing {
                Some(child) => match &self.nodes[&child] {
                    Node::Directory(_) => cursor = child,
                    Node::File(_) => {
                        return Err(FsError::conflict(format!(
                            "file where directory expected: {}",
                            segments[..=depth].join("/")
                        )));
                    }
                },
                None => {
                    let ino = self.alloc_inode();
                    self.nodes.insert(
                        ino,
                        Node::Directory(DirNode {
                            name: segment.clone(),
                            inode: ino,
                            domain: Some(domain.to_owned()),
                            children: HashMap::new(),
                        }),
                    );
                    self.link_child(cursor, segment.clone(), ino);
                    cursor = ino;
                }
            }
        }

        if let Some(existing) = self
            .nodes
            .get(&cursor)
            .and_then(Node::as_dir)
            .and_then(|d| d.child(leaf))
        {
            match &self.nodes[&existing] {
                Node::Directory(_) => {
                    return Err(FsError::conflict(format!(
                        "directory where file expected: {}",
                        segments.join("/")
                    )));
                }
                Node::File(old) => {
                    // Duplicate leaf: last write wins, drop the old node.
                    debug!(path, old_id = %old.content_id, new_id = %id, "duplicate entry replaced");
                }
            }
            self.nodes.remove(&existing);
        }

        let ino = self.alloc_inode();
        self.nodes.insert(
            ino,
            Node::File(FileNode {
                name: leaf.clone(),
                inode: ino,
                domain: domain.to_owned(),
                content_id: id.to_owned(),
            }),
        );
        self.link_child(cursor, leaf.clone(), ino);
        Ok(())
    }

    fn link_child(&mut self, parent: u64, name: String, child: u64) {
        if let Some(Node::Directory(dir)) = self.nodes.get_mut(&parent) {
            dir.children.insert(name, child);
        }
    }

    /// Freeze into an immutable tree.
    pub fn finish(self) -> FileTree {
        FileTree { nodes: self.nodes }
    }
}

/// The frozen tree. Read-only for the lifetime of the mount; reads need
/// no locking.
#[derive(Debug)]
pub struct FileTree {
    nodes: HashMap<u64, Node>,
}

impl FileTree {
    /// The root directory node.
    pub fn root(&self) -> &Node {
        &self.nodes[&ROOT_INODE]
    }

    /// Node by inode.
    pub fn node(&self, ino: u64) -> Option<&Node> {
        self.nodes.get(&ino)
    }

    /// Child of a directory by name.
    pub fn lookup(&self, parent: u64, name: &str) -> FsResult<&Node> {
        let dir = self
            .nodes
            .get(&parent)
            .and_then(Node::as_dir)
            .ok_or_else(|| FsError::not_found(format!("inode {parent}")))?;
        let child = dir
            .child(name)
            .ok_or_else(|| FsError::not_found(name.to_owned()))?;
        Ok(&self.nodes[&child])
    }

    /// Entries of a directory in unspecified order.
    pub fn entries(&self, ino: u64) -> FsResult<Vec<DirEntry>> {
        let dir = self
            .nodes
            .get(&ino)
            .and_then(Node::as_dir)
            .ok_or_else(|| FsError::not_found(format!("inode {ino}")))?;
        Ok(dir
            .children()
            .map(|(name, child)| DirEntry {
                name: name.to_owned(),
                ino: child,
                kind: self.nodes[&child].kind(),
            })
            .collect())
    }

    /// Number of live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
