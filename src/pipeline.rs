//! Runs the recovery stages in order
//!
//! Download, extract, first run, symlink and custom nodes each run once,
//! strictly one after the other, and each can be skipped on its own. External
//! tools come from a [`Toolkit`] so tests can swap in fakes.

use crate::config::{prompt_missing, Settings, SettingsStore};
use crate::download::{CachePolicy, Downloader, GithubReleases, ReleaseSource};
use crate::error::{RecoveryError, Result};
use crate::extract::{default_tools, ArchiveTool, Extractor, InstallPaths, Layout};
use crate::first_run::{FirstRunInitializer, FirstRunReport, Launcher, SubprocessLauncher, Timing};
use crate::link::{ModelLinker, SymlinkManager};
use crate::nodes::{
    DependencyInstaller, GitCli, InstallSummary, NodeInstaller, PipInstaller, RepoList, VcsClient,
};
use crate::prompt::{Prompter, StdinPrompter};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Extract,
    FirstRun,
    Symlink,
    Nodes,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Download => "download",
            Self::Extract => "extract",
            Self::FirstRun => "first run",
            Self::Symlink => "model symlink",
            Self::Nodes => "custom nodes",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Completed,
    Skipped,
    /// Failed without stopping the run
    Failed(String),
}

impl StageStatus {
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// What happened during a run that got to the end
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub stages: Vec<(Stage, StageStatus)>,
    pub archive: Option<PathBuf>,
    pub paths: Option<InstallPaths>,
    pub nodes: Option<InstallSummary>,
}

impl RunReport {
    #[must_use]
    pub fn status(&self, stage: Stage) -> Option<&StageStatus> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, status)| status)
    }

    fn record(&mut self, stage: Stage, status: StageStatus) {
        match &status {
            StageStatus::Completed => tracing::info!("Stage {stage}: completed"),
            StageStatus::Skipped => tracing::info!("Stage {stage}: skipped"),
            StageStatus::Failed(reason) => tracing::warn!("Stage {stage}: failed: {reason}"),
        }
        self.stages.push((stage, status));
    }

    /// `Ok` when every stage that ran completed cleanly
    ///
    /// # Errors
    /// `RecoveryError::StagesFailed` naming the failed stages
    pub fn outcome(&self) -> Result<()> {
        let failed: Vec<String> = self
            .stages
            .iter()
            .filter(|(_, s)| s.is_failed())
            .map(|(stage, _)| stage.to_string())
            .collect();
        if failed.is_empty() {
            return Ok(());
        }
        Err(RecoveryError::StagesFailed {
            failed: failed.len(),
            total: self.stages.len(),
            stages: failed.join(", "),
        })
    }

    #[must_use]
    pub fn exit_code(&self) -> u8 {
        self.outcome().map_or_else(|e| e.exit_code(), |()| 0)
    }
}

/// External collaborators used by the stages
pub struct Toolkit {
    pub releases: Box<dyn ReleaseSource>,
    pub archivers: Vec<Box<dyn ArchiveTool>>,
    pub launcher: Box<dyn Launcher>,
    pub linker: Box<dyn ModelLinker>,
    pub vcs: Box<dyn VcsClient>,
    pub deps: Box<dyn DependencyInstaller>,
    pub prompter: Box<dyn Prompter>,
}

impl Toolkit {
    /// The real tools: GitHub, 7-Zip, subprocesses, OS symlinks, git, pip and the terminal
    ///
    /// # Errors
    /// `RecoveryError::Network` if the HTTP client can't be built
    pub fn system(settings: &Settings) -> Result<Self> {
        Ok(Self {
            releases: Box::new(GithubReleases::new(&settings.app, &settings.download)?),
            archivers: default_tools(),
            launcher: Box::new(SubprocessLauncher),
            linker: Box::new(SymlinkManager::new()),
            vcs: Box::new(GitCli::locate()),
            deps: Box::new(PipInstaller),
            prompter: Box::new(StdinPrompter::new(settings.flags.assume_yes)),
        })
    }
}

pub struct Pipeline {
    toolkit: Toolkit,
    store: SettingsStore,
}

impl Pipeline {
    #[must_use]
    pub const fn new(toolkit: Toolkit, store: SettingsStore) -> Self {
        Self { toolkit, store }
    }

    /// Run every stage not skipped by `settings.flags`
    ///
    /// A privilege failure while linking and failed custom node installs are
    /// recorded in the report; anything else that goes wrong stops the run.
    ///
    /// # Errors
    /// - `RecoveryError::Config` for invalid settings
    /// - `RecoveryError::Cancelled` if the user declined to continue
    /// - the error of the first stage that failed fatally
    pub async fn run(&mut self, settings: &mut Settings) -> Result<RunReport> {
        prompt_missing(settings, self.toolkit.prompter.as_mut())?;
        self.save(settings);

        for warning in settings.validate()? {
            tracing::warn!("{warning}");
        }
        let install_path = settings
            .install_path
            .clone()
            .ok_or_else(|| RecoveryError::Config("install_path is not set".to_string()))?;
        fs::create_dir_all(&install_path)?;
        let archive_dest = install_path.join(&settings.app.archive_file);

        self.confirm_install_path(settings, &install_path)?;

        let mut report = RunReport::default();

        let archive = self
            .download_stage(settings, &archive_dest, &mut report)
            .await?;
        let layout =
            self.extract_stage(settings, &install_path, archive.as_deref(), &mut report)?;
        report.archive = archive;
        let paths = InstallPaths::new(&install_path, layout, &settings.app);
        tracing::info!("Install layout: {layout} ({})", paths.base.display());

        self.first_run_stage(settings, &paths, &mut report)?;
        self.symlink_stage(settings, &paths, &mut report)?;
        self.nodes_stage(settings, &paths, &mut report)?;

        self.save(settings);
        log_summary(&paths, &report);
        report.paths = Some(paths);
        Ok(report)
    }

    /// A populated install path is only expected when extraction is skipped
    fn confirm_install_path(&mut self, settings: &Settings, install_path: &Path) -> Result<()> {
        if settings.flags.force || settings.flags.skip_extract {
            return Ok(());
        }
        let archive_name = settings.app.archive_file.as_str();
        let populated = fs::read_dir(install_path)?
            .filter_map(std::result::Result::ok)
            .any(|entry| entry.file_name() != archive_name);
        if !populated {
            return Ok(());
        }

        let question = format!(
            "Install path {} is not empty. Existing files may be overwritten. Continue?",
            install_path.display()
        );
        if self.toolkit.prompter.confirm(&question)? {
            Ok(())
        } else {
            Err(RecoveryError::Cancelled)
        }
    }

    async fn download_stage(
        &self,
        settings: &mut Settings,
        archive_dest: &Path,
        report: &mut RunReport,
    ) -> Result<Option<PathBuf>> {
        if settings.flags.skip_download {
            report.record(Stage::Download, StageStatus::Skipped);
            return Ok(Downloader::cached_archive(&settings.cache, archive_dest));
        }

        let policy = CachePolicy::from_latest_flag(settings.flags.latest);
        let outcome = {
            let downloader = Downloader::new(
                self.toolkit.releases.as_ref(),
                &settings.download,
                &settings.app,
            );
            downloader.fetch(policy, &settings.cache, archive_dest).await?
        };

        settings.cache = outcome.cache_record(&settings.cache);
        self.save(settings);
        report.record(Stage::Download, StageStatus::Completed);
        Ok(Some(outcome.archive_path))
    }

    fn extract_stage(
        &self,
        settings: &Settings,
        install_path: &Path,
        archive: Option<&Path>,
        report: &mut RunReport,
    ) -> Result<Layout> {
        if settings.flags.skip_extract {
            report.record(Stage::Extract, StageStatus::Skipped);
            return Layout::resolve(install_path, &settings.app);
        }

        let archive = archive.ok_or_else(|| {
            RecoveryError::Extraction(format!(
                "No archive to extract: {} was not downloaded. Run without --skip-download",
                install_path.join(&settings.app.archive_file).display()
            ))
        })?;
        let layout =
            Extractor::new(&self.toolkit.archivers, &settings.app).extract(archive, install_path)?;
        report.record(Stage::Extract, StageStatus::Completed);
        Ok(layout)
    }

    fn first_run_stage(
        &mut self,
        settings: &Settings,
        paths: &InstallPaths,
        report: &mut RunReport,
    ) -> Result<()> {
        if settings.flags.skip_first_run {
            report.record(Stage::FirstRun, StageStatus::Skipped);
            return Ok(());
        }

        let initializer = FirstRunInitializer::new(
            Timing::from(&settings.first_run),
            settings.app.ready_patterns.clone(),
        );
        let result = initializer
            .initialize(paths, self.toolkit.launcher.as_ref())
            .and_then(FirstRunReport::into_result);

        match result {
            Ok(_) => report.record(Stage::FirstRun, StageStatus::Completed),
            Err(e) => {
                tracing::error!("First run failed: {e}");
                let question = "First run did not complete. Continue with the remaining steps?";
                if !self.toolkit.prompter.confirm(question)? {
                    return Err(e);
                }
                report.record(Stage::FirstRun, StageStatus::Failed(e.to_string()));
            }
        }
        Ok(())
    }

    fn symlink_stage(
        &self,
        settings: &Settings,
        paths: &InstallPaths,
        report: &mut RunReport,
    ) -> Result<()> {
        if settings.flags.skip_symlink {
            report.record(Stage::Symlink, StageStatus::Skipped);
            return Ok(());
        }

        let models = settings
            .models_path
            .as_deref()
            .ok_or_else(|| RecoveryError::Config("models_path is not set".to_string()))?;
        match self.toolkit.linker.link(models, &paths.models_dir) {
            Ok(_) => report.record(Stage::Symlink, StageStatus::Completed),
            Err(e) if e.is_recoverable() => {
                tracing::error!("{e}");
                report.record(Stage::Symlink, StageStatus::Failed(e.to_string()));
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn nodes_stage(
        &mut self,
        settings: &Settings,
        paths: &InstallPaths,
        report: &mut RunReport,
    ) -> Result<()> {
        if settings.flags.skip_nodes {
            report.record(Stage::Nodes, StageStatus::Skipped);
            return Ok(());
        }

        let list_path = &settings.repo_list_path;
        if !list_path.is_file() {
            tracing::warn!("Repository list not found: {}", list_path.display());
            let question = format!(
                "Repository list {} not found. Skip custom node installation?",
                list_path.display()
            );
            if self.toolkit.prompter.confirm(&question)? {
                report.record(Stage::Nodes, StageStatus::Skipped);
                return Ok(());
            }
            return Err(RecoveryError::Config(format!(
                "Repository list not found: {}",
                list_path.display()
            )));
        }

        let repos = RepoList::load(list_path)?;
        let runtime = paths.runtime_exists().then_some(paths.runtime_exe.as_path());
        let summary = NodeInstaller::new(self.toolkit.vcs.as_ref(), self.toolkit.deps.as_ref())
            .update_existing(settings.flags.update_nodes)
            .install_all(&repos, &paths.custom_nodes_dir, runtime)?;

        let status = if summary.is_clean() {
            StageStatus::Completed
        } else {
            StageStatus::Failed(format!("{summary}"))
        };
        report.record(Stage::Nodes, status);
        report.nodes = Some(summary);
        Ok(())
    }

    /// Failing to persist settings is not fatal
    fn save(&self, settings: &Settings) {
        if let Err(e) = self.store.save(settings) {
            tracing::error!(
                "Failed to save settings to {}: {e}",
                self.store.path().display()
            );
        }
    }
}

fn log_summary(paths: &InstallPaths, report: &RunReport) {
    tracing::info!("========================================");
    for (stage, status) in &report.stages {
        let text = match status {
            StageStatus::Completed => "completed".to_string(),
            StageStatus::Skipped => "skipped".to_string(),
            StageStatus::Failed(reason) => format!("FAILED ({})", first_line(reason)),
        };
        tracing::info!("  {stage:<14} {text}");
    }
    if let Some(summary) = &report.nodes {
        for failure in &summary.failures {
            tracing::warn!("  node failed: {} ({})", failure.url, first_line(&failure.reason));
        }
    }
    tracing::info!("To start ComfyUI, run: {}", paths.launch_script.display());
    tracing::info!(
        "Install extra Python packages with the tools in: {}",
        paths.runtime_scripts_dir().display()
    );
    tracing::info!("========================================");
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
