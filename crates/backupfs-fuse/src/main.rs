//! backupfs mount binary.
//!
//! ```bash
//! # Mount the camera roll of a backup
//! backupfs ~/backups/DEVICE /mnt/backup
//!
//! # Mount every domain, grouped by readable domain names
//! backupfs --all-domains ~/backups/DEVICE /mnt/backup
//!
//! # See which domains the manifest carries
//! backupfs --list-domains ~/backups/DEVICE
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use fuser::MountOption;
use tracing::info;
use tracing_subscriber::EnvFilter;

use backupfs_fuse::{BackupFs, DomainFilter, build_session};
use backupfs_manifest::ManifestDb;

/// Mount a device backup as a read-only filesystem.
#[derive(Debug, Parser)]
#[command(name = "backupfs", version)]
struct Cli {
    /// Backup directory (holds Manifest.db and the content store).
    backup_dir: PathBuf,

    /// Where to mount; omit with --list-domains.
    mountpoint: Option<PathBuf>,

    /// Domain to mount at the root.
    #[arg(long, default_value = "CameraRollDomain", conflicts_with = "all_domains")]
    domain: String,

    /// Mount every domain, grouped under readable domain names.
    #[arg(long)]
    all_domains: bool,

    /// Print the manifest's domains and exit.
    #[arg(long)]
    list_domains: bool,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let manifest = ManifestDb::open(&cli.backup_dir)
        .with_context(|| format!("open backup at {}", cli.backup_dir.display()))?;

    if cli.list_domains {
        for domain in manifest.domains().context("list domains")? {
            println!("{domain}");
        }
        return Ok(());
    }

    let Some(mountpoint) = cli.mountpoint else {
        bail!("a mountpoint is required unless --list-domains is given");
    };

    let domain_filter = if cli.all_domains {
        DomainFilter::All
    } else {
        DomainFilter::One(cli.domain.clone())
    };
    let session = build_session(&manifest, &cli.backup_dir, &domain_filter)
        .context("build filesystem tree")?;

    info!(mountpoint = %mountpoint.display(), "mounting");
    let options = [
        MountOption::RO,
        MountOption::FSName("backupfs".to_owned()),
        MountOption::AutoUnmount,
    ];
    // Blocks until the filesystem is unmounted.
    fuser::mount2(BackupFs::new(session), &mountpoint, &options)
        .with_context(|| format!("mount {}", mountpoint.display()))?;
    Ok(())
}
