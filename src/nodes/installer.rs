use crate::error::{RecoveryError, Result};
use crate::nodes::git::VcsClient;
use crate::nodes::repo_list::{repo_dir_name, RepoList};
use crate::nodes::runtime::DependencyInstaller;
use std::fmt;
use std::fs;
use std::path::Path;

const REQUIREMENTS_FILE: &str = "requirements.txt";

/// One repository that could not be installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub url: String,
    pub reason: String,
}

/// Per-run tally of the node stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSummary {
    pub installed: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<NodeFailure>,
}

impl InstallSummary {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.installed + self.updated + self.skipped + self.failed
    }

    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }

    /// `Err(PartialFailure)` if any repository failed
    ///
    /// # Errors
    /// `RecoveryError::PartialFailure` with the failed and total counts
    pub fn into_result(self) -> Result<Self> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(RecoveryError::PartialFailure {
                failed: self.failed,
                total: self.total(),
            })
        }
    }

    fn fail(&mut self, url: &str, reason: String) {
        tracing::error!("Failed to install {url}: {reason}");
        self.failed += 1;
        self.failures.push(NodeFailure {
            url: url.to_string(),
            reason,
        });
    }
}

impl fmt::Display for InstallSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} installed, {} updated, {} skipped, {} failed",
            self.installed, self.updated, self.skipped, self.failed
        )
    }
}

enum Action {
    Installed,
    Updated,
    Skipped,
}

/// Clones custom node repositories into the plugin directory
pub struct NodeInstaller<'a> {
    vcs: &'a dyn VcsClient,
    deps: &'a dyn DependencyInstaller,
    update_existing: bool,
}

impl<'a> NodeInstaller<'a> {
    #[must_use]
    pub fn new(vcs: &'a dyn VcsClient, deps: &'a dyn DependencyInstaller) -> Self {
        Self {
            vcs,
            deps,
            update_existing: false,
        }
    }

    /// Pull already-present repositories instead of skipping them
    #[must_use]
    pub fn update_existing(mut self, update: bool) -> Self {
        self.update_existing = update;
        self
    }

    /// Install every repository in order
    ///
    /// Individual failures are counted in the summary and do not stop the
    /// loop. `runtime` is the embedded interpreter; when it's `None`, any
    /// repository shipping a requirements file counts as failed.
    ///
    /// # Errors
    /// - `RecoveryError::ExternalTool` if git is not usable at all
    /// - `RecoveryError::Io` if the plugin directory can't be created
    pub fn install_all(
        &self,
        repos: &RepoList,
        plugin_dir: &Path,
        runtime: Option<&Path>,
    ) -> Result<InstallSummary> {
        let mut summary = InstallSummary::default();
        if repos.is_empty() {
            tracing::warn!("Repository list is empty, no custom nodes to install");
            return Ok(summary);
        }

        self.vcs.ensure_available()?;
        fs::create_dir_all(plugin_dir)?;
        tracing::info!(
            "Installing {} custom nodes into {}",
            repos.len(),
            plugin_dir.display()
        );

        for (index, url) in repos.urls().iter().enumerate() {
            tracing::info!("[{}/{}] {url}", index + 1, repos.len());
            match self.install_one(url, plugin_dir, runtime) {
                Ok(Action::Installed) => summary.installed += 1,
                Ok(Action::Updated) => summary.updated += 1,
                Ok(Action::Skipped) => summary.skipped += 1,
                Err(e) => summary.fail(url, e.to_string()),
            }
        }

        tracing::info!("Custom nodes: {summary}");
        Ok(summary)
    }

    fn install_one(&self, url: &str, plugin_dir: &Path, runtime: Option<&Path>) -> Result<Action> {
        let name = repo_dir_name(url).ok_or_else(|| {
            RecoveryError::Config(format!("Not a valid repository URL: {url}"))
        })?;
        let dest = plugin_dir.join(&name);

        let action = if dest.exists() {
            if !self.update_existing {
                tracing::info!("{name} already present, skipping");
                return Ok(Action::Skipped);
            }
            tracing::info!("{name} already present, pulling latest changes");
            self.vcs.pull(&dest)?;
            Action::Updated
        } else {
            tracing::info!("Cloning {url} into {}", dest.display());
            self.vcs.clone_repo(url, &dest)?;
            Action::Installed
        };

        let manifest = dest.join(REQUIREMENTS_FILE);
        if manifest.is_file() {
            let runtime = runtime.ok_or_else(|| {
                RecoveryError::Config(format!(
                    "{name} needs its requirements installed but the embedded runtime is missing"
                ))
            })?;
            self.deps.install(runtime, &manifest, &dest)?;
        } else {
            tracing::debug!("{name} has no {REQUIREMENTS_FILE}");
        }

        Ok(action)
    }
}
