//! # backupfs-fuse
//!
//! FUSE host shim for backupfs: translates `fuser` callback signatures
//! into [`backupfs_kernel::FsSession`] calls, plus the session assembly
//! used by the `backupfs` binary.

pub mod fs;

pub use fs::BackupFs;

use anyhow::{Context, Result};
use tracing::info;

use backupfs_kernel::{FsSession, TreeBuilder};
use backupfs_manifest::ManifestDb;
use std::path::Path;

/// Which manifest records end up in the tree.
#[derive(Debug, Clone)]
pub enum DomainFilter {
    /// Only records of one domain, mounted at the root without grouping.
    One(String),
    /// Every domain, grouped under its normalized domain segments.
    All,
}

impl DomainFilter {
    fn matches(&self, domain: &str) -> bool {
        match self {
            DomainFilter::One(selected) => selected == domain,
            DomainFilter::All => true,
        }
    }
}

/// Snapshot the manifest and build a mount session.
///
/// The tree is built in full before the mount goes live; any path
/// conflict in the manifest aborts here, so a partial mount never
/// appears.
pub fn build_session(
    manifest: &ManifestDb,
    store_root: &Path,
    filter: &DomainFilter,
) -> Result<FsSession> {
    let mut builder = TreeBuilder::new(matches!(filter, DomainFilter::All));
    let mut kept = 0usize;
    for record in manifest.files().context("list manifest files")? {
        if !filter.matches(&record.domain) {
            continue;
        }
        builder
            .insert(&record.file_id, &record.domain, &record.relative_path)
            .with_context(|| format!("manifest entry {:?}", record.relative_path))?;
        kept += 1;
    }
    info!(records = kept, nodes = builder.node_count(), "tree built");
    Ok(FsSession::new(builder.finish(), store_root))
}
