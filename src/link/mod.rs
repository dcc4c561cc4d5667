pub mod privilege;

pub use privilege::PrivilegeProbe;

use crate::error::{RecoveryError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Result of a `link` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The target already pointed at the source; nothing changed
    AlreadyLinked,
    Linked {
        /// Where a pre-existing directory was moved to
        backup: Option<PathBuf>,
        /// Previous destination of a replaced link
        replaced: Option<PathBuf>,
    },
}

/// Makes a directory link from the app's models folder to external storage
pub trait ModelLinker {
    fn link(&self, source: &Path, target: &Path) -> Result<LinkOutcome>;
}

/// Points the application's models directory at external storage
#[derive(Debug, Default)]
pub struct SymlinkManager;

impl SymlinkManager {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Make `target` a directory link to `source`
    ///
    /// A plain directory at `target` is renamed to a `.backup-<timestamp>`
    /// sibling, never deleted. A link to somewhere else is replaced. Calling
    /// this again with the same arguments is a no-op.
    ///
    /// # Errors
    /// - `RecoveryError::Config` if `source` is not a directory
    /// - `RecoveryError::Privilege` if the OS refused to create the link
    pub fn link(&self, source: &Path, target: &Path) -> Result<LinkOutcome> {
        if !source.is_dir() {
            return Err(RecoveryError::Config(format!(
                "Models path does not exist or is not a directory: {}",
                source.display()
            )));
        }
        let source = fs::canonicalize(source)?;

        tracing::info!("Setting up model symlink:");
        tracing::info!("  Link:   {}", target.display());
        tracing::info!("  Points: {}", source.display());

        if let Some(parent) = target.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created parent directory: {}", parent.display());
            }
        }

        let mut backup = None;
        let mut replaced = None;
        match fs::symlink_metadata(target) {
            Ok(meta) if meta.file_type().is_symlink() => {
                if points_to(target, &source) {
                    tracing::info!("Models directory already linked, nothing to do");
                    return Ok(LinkOutcome::AlreadyLinked);
                }
                let previous = fs::read_link(target)?;
                tracing::info!("Replacing existing link to {}", previous.display());
                remove_link(target)?;
                replaced = Some(previous);
            }
            Ok(_) => {
                let moved = backup_path(target);
                tracing::info!(
                    "Moving existing {} out of the way to {}",
                    target.display(),
                    moved.display()
                );
                fs::rename(target, &moved)?;
                backup = Some(moved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = create_dir_link(&source, target) {
            if let Some(moved) = &backup {
                if let Err(restore) = fs::rename(moved, target) {
                    tracing::error!(
                        "Failed to restore {} from {}: {restore}",
                        target.display(),
                        moved.display()
                    );
                }
            }
            if privilege::is_privilege_error(&e) {
                return Err(RecoveryError::Privilege(
                    PrivilegeProbe::current().diagnose(&e),
                ));
            }
            return Err(e.into());
        }

        tracing::info!("Symlink created: {} -> {}", target.display(), source.display());
        Ok(LinkOutcome::Linked { backup, replaced })
    }
}

impl ModelLinker for SymlinkManager {
    fn link(&self, source: &Path, target: &Path) -> Result<LinkOutcome> {
        Self::link(self, source, target)
    }
}

fn points_to(link: &Path, source: &Path) -> bool {
    fs::canonicalize(link).is_ok_and(|resolved| resolved == source)
}

/// `<name>.backup-<timestamp>` next to `path`, not yet taken
fn backup_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "models".into(), |n| n.to_string_lossy().into_owned());
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let base = path.with_file_name(format!("{name}.backup-{stamp}"));

    let mut candidate = base.clone();
    let mut n = 1;
    while fs::symlink_metadata(&candidate).is_ok() {
        candidate = PathBuf::from(format!("{}-{n}", base.display()));
        n += 1;
    }
    candidate
}

#[cfg(unix)]
fn create_dir_link(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn create_dir_link(source: &Path, target: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(source, target)
}

#[cfg(unix)]
fn remove_link(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

#[cfg(windows)]
fn remove_link(path: &Path) -> io::Result<()> {
    // Directory symlinks are removed like directories on Windows
    fs::remove_dir(path).or_else(|_| fs::remove_file(path))
}
