pub mod layout;
pub mod tools;

pub use layout::{detect_layout, DirListing, InstallPaths, Layout};
pub use tools::{default_tools, ArchiveTool, SevenZipBinary, SevenZipLibrary};

use crate::config::schema::AppProfile;
use crate::error::{RecoveryError, Result};
use std::fs;
use std::path::Path;

/// Unpacks the release archive and works out which layout it produced
pub struct Extractor<'a> {
    tools: &'a [Box<dyn ArchiveTool>],
    profile: &'a AppProfile,
}

impl<'a> Extractor<'a> {
    #[must_use]
    pub const fn new(tools: &'a [Box<dyn ArchiveTool>], profile: &'a AppProfile) -> Self {
        Self { tools, profile }
    }

    /// Extract `archive` into `dest` and detect the resulting layout
    ///
    /// Tools are tried in order; the next one is used when a tool is
    /// unavailable or fails.
    ///
    /// # Errors
    /// - `RecoveryError::Extraction` if the archive is missing, every tool fails,
    ///   or neither known layout is found afterwards
    pub fn extract(&self, archive: &Path, dest: &Path) -> Result<Layout> {
        if !archive.is_file() {
            return Err(RecoveryError::Extraction(format!(
                "Archive does not exist: {}",
                archive.display()
            )));
        }
        fs::create_dir_all(dest)?;

        let mut failures = Vec::new();
        let mut extracted = false;
        for tool in self.tools {
            if !tool.is_available() {
                tracing::warn!("{} not available, trying next extractor", tool.name());
                failures.push(format!("{}: not available", tool.name()));
                continue;
            }

            tracing::info!(
                "Extracting {} to {} with {}",
                archive.display(),
                dest.display(),
                tool.name()
            );
            match tool.extract(archive, dest) {
                Ok(()) => {
                    extracted = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!("{} extraction failed: {e}", tool.name());
                    failures.push(format!("{}: {e}", tool.name()));
                }
            }
        }

        if !extracted {
            return Err(RecoveryError::Extraction(format!(
                "All extractors failed for {}:\n{}",
                archive.display(),
                failures.join("\n")
            )));
        }

        let layout = Layout::resolve(dest, self.profile)?;
        tracing::info!("Extraction completed, detected {layout} layout");
        Ok(layout)
    }
}
