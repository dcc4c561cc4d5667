use async_trait::async_trait;
use comfyui_recovery::config::{AppProfile, Settings, SettingsStore};
use comfyui_recovery::download::{Release, ReleaseSource, Transfer};
use comfyui_recovery::extract::ArchiveTool;
use comfyui_recovery::first_run::{AppProcess, Launcher};
use comfyui_recovery::link::{LinkOutcome, ModelLinker, SymlinkManager};
use comfyui_recovery::nodes::{DependencyInstaller, VcsClient};
use comfyui_recovery::pipeline::{Pipeline, Stage, StageStatus, Toolkit};
use comfyui_recovery::prompt::Prompter;
use comfyui_recovery::{RecoveryError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Shared call counters, so tests can inspect them after handing the fakes over
#[derive(Default)]
struct Calls {
    latest: AtomicUsize,
    downloads: AtomicUsize,
    extractions: AtomicUsize,
    launches: AtomicUsize,
    clones: AtomicUsize,
    confirms: AtomicUsize,
}

impl Calls {
    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

struct FakeReleases(Arc<Calls>);

#[async_trait]
impl ReleaseSource for FakeReleases {
    async fn latest_release(&self) -> Result<Release> {
        self.0.latest.fetch_add(1, Ordering::SeqCst);
        Ok(Release {
            version: "v0.4.0".to_string(),
            url: "https://example.com/releases/download/v0.4.0/comfyui.7z".to_string(),
            size: None,
        })
    }

    async fn download(&self, _url: &str, dest: &Path, _resume: bool) -> Result<Transfer> {
        self.0.downloads.fetch_add(1, Ordering::SeqCst);
        fs::write(dest, b"7z-bytes")?;
        Ok(Transfer {
            expected_len: Some(8),
        })
    }
}

/// "Extracts" by writing a bootstrapped nested install tree
struct FakeArchiver {
    calls: Arc<Calls>,
    profile: AppProfile,
}

impl ArchiveTool for FakeArchiver {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn extract(&self, _archive: &Path, dest: &Path) -> Result<()> {
        self.calls.extractions.fetch_add(1, Ordering::SeqCst);
        populate_install(dest, &self.profile);
        Ok(())
    }
}

struct FakeLauncher(Arc<Calls>);

impl Launcher for FakeLauncher {
    fn launch(&self, script: &Path, _cwd: &Path) -> Result<Box<dyn AppProcess>> {
        self.0.launches.fetch_add(1, Ordering::SeqCst);
        Err(RecoveryError::ExternalTool(format!(
            "unexpected launch of {}",
            script.display()
        )))
    }
}

/// Refuses every link the way Windows does without the symlink privilege
struct DeniedLinker;

impl ModelLinker for DeniedLinker {
    fn link(&self, _source: &Path, target: &Path) -> Result<LinkOutcome> {
        Err(RecoveryError::Privilege(format!(
            "Symbolic link creation was denied for {}",
            target.display()
        )))
    }
}

/// Clones by creating the directory; URLs containing "broken" fail
struct FakeGit(Arc<Calls>);

impl VcsClient for FakeGit {
    fn ensure_available(&self) -> Result<()> {
        Ok(())
    }

    fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        self.0.clones.fetch_add(1, Ordering::SeqCst);
        if url.contains("broken") {
            return Err(RecoveryError::ExternalTool(format!(
                "git clone {url} failed: repository not found"
            )));
        }
        fs::create_dir_all(dest)?;
        Ok(())
    }

    fn pull(&self, _repo_dir: &Path) -> Result<()> {
        Ok(())
    }
}

struct NoDeps;

impl DependencyInstaller for NoDeps {
    fn install(&self, _runtime: &Path, _manifest: &Path, _cwd: &Path) -> Result<()> {
        Ok(())
    }
}

struct Answers {
    calls: Arc<Calls>,
    confirm: bool,
}

impl Prompter for Answers {
    fn ask(&mut self, question: &str) -> Result<String> {
        Err(RecoveryError::Config(format!("unexpected prompt: {question}")))
    }

    fn confirm(&mut self, _question: &str) -> Result<bool> {
        self.calls.confirms.fetch_add(1, Ordering::SeqCst);
        Ok(self.confirm)
    }
}

fn toolkit(calls: &Arc<Calls>, confirm: bool) -> Toolkit {
    Toolkit {
        releases: Box::new(FakeReleases(Arc::clone(calls))),
        archivers: vec![Box::new(FakeArchiver {
            calls: Arc::clone(calls),
            profile: AppProfile::default(),
        })],
        launcher: Box::new(FakeLauncher(Arc::clone(calls))),
        linker: Box::new(SymlinkManager::new()),
        vcs: Box::new(FakeGit(Arc::clone(calls))),
        deps: Box::new(NoDeps),
        prompter: Box::new(Answers {
            calls: Arc::clone(calls),
            confirm,
        }),
    }
}

/// Nested layout with the embedded runtime already present
fn populate_install(root: &Path, profile: &AppProfile) {
    let base = root.join(&profile.outer_dir).join(&profile.inner_dir);
    fs::create_dir_all(base.join(&profile.runtime_dir)).unwrap();
    fs::create_dir_all(base.join(&profile.app_dir).join("models")).unwrap();
    fs::write(base.join(&profile.marker_file), "@echo off\n").unwrap();
    fs::write(base.join(&profile.runtime_dir).join(&profile.runtime_exe), "").unwrap();
}

struct Fixture {
    temp: TempDir,
    settings: Settings,
    store: SettingsStore,
}

impl Fixture {
    fn new(repos: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let models = temp.path().join("models");
        fs::create_dir_all(models.join("checkpoints")).unwrap();
        let repo_list = temp.path().join("repos.txt");
        fs::write(&repo_list, repos).unwrap();

        let settings = Settings {
            install_path: Some(temp.path().join("install")),
            models_path: Some(models),
            repo_list_path: repo_list,
            ..Settings::default()
        };
        let store = SettingsStore::new(temp.path().join("settings.toml"));
        Self {
            temp,
            settings,
            store,
        }
    }

    fn install_path(&self) -> PathBuf {
        self.temp.path().join("install")
    }

    fn models_link(&self) -> PathBuf {
        let profile = &self.settings.app;
        self.install_path()
            .join(&profile.outer_dir)
            .join(&profile.inner_dir)
            .join(&profile.app_dir)
            .join("models")
    }
}

const THREE_REPOS: &str = "# nodes\n\
    https://github.com/owner/first.git\n\
    https://github.com/owner/second\n\
    https://github.com/owner/third.git\n";

#[tokio::test]
async fn test_full_run_downloads_extracts_and_links() {
    let mut fx = Fixture::new(THREE_REPOS);
    let calls = Arc::new(Calls::default());

    let mut pipeline = Pipeline::new(toolkit(&calls, true), fx.store.clone());
    let report = pipeline.run(&mut fx.settings).await.unwrap();

    assert_eq!(report.exit_code(), 0);
    assert_eq!(Calls::get(&calls.downloads), 1);
    assert_eq!(Calls::get(&calls.extractions), 1);
    // Runtime already present, so first run is a no-op
    assert_eq!(Calls::get(&calls.launches), 0);
    assert_eq!(report.status(Stage::FirstRun), Some(&StageStatus::Completed));
    assert_eq!(report.nodes.as_ref().unwrap().installed, 3);

    let link = fx.models_link();
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert!(link.join("checkpoints").is_dir());

    // Old models directory from the archive was kept as a backup
    let backups = fs::read_dir(link.parent().unwrap())
        .unwrap()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("models.backup-"))
        .count();
    assert_eq!(backups, 1);

    let saved = fx.store.load().unwrap();
    assert_eq!(saved.cache.version.as_deref(), Some("v0.4.0"));
    assert_eq!(saved.install_path, fx.settings.install_path);
}

#[tokio::test]
async fn test_skip_download_and_extract_leave_archive_alone() {
    let mut fx = Fixture::new(THREE_REPOS);
    populate_install(&fx.install_path(), &fx.settings.app);
    fx.settings.flags.skip_download = true;
    fx.settings.flags.skip_extract = true;
    let calls = Arc::new(Calls::default());

    let mut pipeline = Pipeline::new(toolkit(&calls, true), fx.store.clone());
    let report = pipeline.run(&mut fx.settings).await.unwrap();

    assert_eq!(Calls::get(&calls.latest), 0);
    assert_eq!(Calls::get(&calls.downloads), 0);
    assert_eq!(Calls::get(&calls.extractions), 0);
    // Populated install path is expected here, no confirmation needed
    assert_eq!(Calls::get(&calls.confirms), 0);
    assert!(!fx.install_path().join(&fx.settings.app.archive_file).exists());

    assert_eq!(report.status(Stage::Download), Some(&StageStatus::Skipped));
    assert_eq!(report.status(Stage::Extract), Some(&StageStatus::Skipped));
    assert_eq!(report.status(Stage::Symlink), Some(&StageStatus::Completed));
    assert_eq!(report.status(Stage::Nodes), Some(&StageStatus::Completed));
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_node_partial_failure_exit_code() {
    let mut fx = Fixture::new(
        "https://github.com/owner/first.git\n\
         https://github.com/owner/broken.git\n\
         https://github.com/owner/third.git\n",
    );
    populate_install(&fx.install_path(), &fx.settings.app);
    fx.settings.flags.skip_download = true;
    fx.settings.flags.skip_extract = true;
    let calls = Arc::new(Calls::default());

    let mut pipeline = Pipeline::new(toolkit(&calls, true), fx.store.clone());
    let report = pipeline.run(&mut fx.settings).await.unwrap();

    let nodes = report.nodes.as_ref().unwrap();
    assert_eq!(nodes.installed, 2);
    assert_eq!(nodes.skipped, 0);
    assert_eq!(nodes.failed, 1);
    assert!(matches!(
        report.status(Stage::Nodes),
        Some(StageStatus::Failed(_))
    ));
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn test_denied_symlink_does_not_stop_the_run() {
    let mut fx = Fixture::new(THREE_REPOS);
    populate_install(&fx.install_path(), &fx.settings.app);
    fx.settings.flags.skip_download = true;
    fx.settings.flags.skip_extract = true;
    let calls = Arc::new(Calls::default());
    let mut tools = toolkit(&calls, true);
    tools.linker = Box::new(DeniedLinker);

    let mut pipeline = Pipeline::new(tools, fx.store.clone());
    let report = pipeline.run(&mut fx.settings).await.unwrap();

    assert!(matches!(
        report.status(Stage::Symlink),
        Some(StageStatus::Failed(_))
    ));
    assert_eq!(report.status(Stage::Nodes), Some(&StageStatus::Completed));
    assert_eq!(report.nodes.as_ref().unwrap().installed, 3);
    assert_eq!(report.exit_code(), 2);

    let err = report.outcome().unwrap_err();
    assert!(err.to_string().ends_with("stages failed: model symlink"));
}

#[tokio::test]
async fn test_second_run_reuses_link_and_skips_nodes() {
    let mut fx = Fixture::new(THREE_REPOS);
    populate_install(&fx.install_path(), &fx.settings.app);
    fx.settings.flags.skip_download = true;
    fx.settings.flags.skip_extract = true;
    let calls = Arc::new(Calls::default());

    let mut first = Pipeline::new(toolkit(&calls, true), fx.store.clone());
    first.run(&mut fx.settings).await.unwrap();
    let mut second = Pipeline::new(toolkit(&calls, true), fx.store.clone());
    let report = second.run(&mut fx.settings).await.unwrap();

    assert_eq!(report.nodes.as_ref().unwrap().skipped, 3);
    assert_eq!(Calls::get(&calls.clones), 3);
    assert_eq!(report.exit_code(), 0);
    assert!(fs::symlink_metadata(fx.models_link())
        .unwrap()
        .file_type()
        .is_symlink());
}

#[tokio::test]
async fn test_declining_non_empty_install_path_cancels() {
    let mut fx = Fixture::new(THREE_REPOS);
    fs::create_dir_all(fx.install_path()).unwrap();
    fs::write(fx.install_path().join("stray.txt"), "").unwrap();
    let calls = Arc::new(Calls::default());

    let mut pipeline = Pipeline::new(toolkit(&calls, false), fx.store.clone());
    let err = pipeline.run(&mut fx.settings).await.unwrap_err();

    assert!(matches!(err, RecoveryError::Cancelled));
    assert_eq!(err.exit_code(), 130);
    assert_eq!(Calls::get(&calls.downloads), 0);
}

#[tokio::test]
async fn test_missing_repo_list_can_be_skipped() {
    let mut fx = Fixture::new("");
    populate_install(&fx.install_path(), &fx.settings.app);
    fx.settings.repo_list_path = fx.temp.path().join("missing.txt");
    fx.settings.flags.skip_download = true;
    fx.settings.flags.skip_extract = true;
    fx.settings.flags.skip_symlink = true;
    let calls = Arc::new(Calls::default());

    let mut pipeline = Pipeline::new(toolkit(&calls, true), fx.store.clone());
    let report = pipeline.run(&mut fx.settings).await.unwrap();

    assert_eq!(Calls::get(&calls.confirms), 1);
    assert_eq!(report.status(Stage::Nodes), Some(&StageStatus::Skipped));
    assert_eq!(report.status(Stage::Symlink), Some(&StageStatus::Skipped));
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_skip_extract_on_empty_install_path_fails() {
    let mut fx = Fixture::new(THREE_REPOS);
    fx.settings.flags.skip_download = true;
    fx.settings.flags.skip_extract = true;
    let calls = Arc::new(Calls::default());

    let mut pipeline = Pipeline::new(toolkit(&calls, true), fx.store.clone());
    let err = pipeline.run(&mut fx.settings).await.unwrap_err();

    assert!(matches!(err, RecoveryError::Extraction(_)));
    assert_eq!(err.exit_code(), 1);
}
