use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persisted settings plus the flags of the current invocation
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models_path: Option<PathBuf>,
    #[serde(default = "default_repo_list_path")]
    pub repo_list_path: PathBuf,
    #[serde(default)]
    pub cache: CacheRecord,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub first_run: FirstRunConfig,
    #[serde(default)]
    pub app: AppProfile,
    /// Per-invocation switches, never written back
    #[serde(skip)]
    pub flags: RunFlags,
}

/// Archive left on disk by a previous run
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct DownloadConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Initial attempt plus re-downloads after a truncated transfer
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct FirstRunConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Quiet period after the readiness line before shutting down
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

/// Where things live in the released archive and how the app signals readiness
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AppProfile {
    #[serde(default = "default_release_repo")]
    pub release_repo: String,
    #[serde(default = "default_asset_name")]
    pub asset_name: String,
    #[serde(default = "default_fallback_url")]
    pub fallback_url: String,
    #[serde(default = "default_archive_file")]
    pub archive_file: String,
    #[serde(default = "default_outer_dir")]
    pub outer_dir: String,
    #[serde(default = "default_inner_dir")]
    pub inner_dir: String,
    #[serde(default = "default_marker_file")]
    pub marker_file: String,
    #[serde(default = "default_launch_script")]
    pub launch_script: String,
    #[serde(default = "default_app_dir")]
    pub app_dir: String,
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: String,
    #[serde(default = "default_runtime_exe")]
    pub runtime_exe: String,
    #[serde(default = "default_ready_patterns")]
    pub ready_patterns: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunFlags {
    pub force: bool,
    pub latest: bool,
    pub skip_download: bool,
    pub skip_extract: bool,
    pub skip_first_run: bool,
    pub skip_symlink: bool,
    pub skip_nodes: bool,
    pub update_nodes: bool,
    pub assume_yes: bool,
}

// Default value functions
fn default_repo_list_path() -> PathBuf {
    PathBuf::from("RepoLists").join("default.txt")
}
fn default_user_agent() -> String {
    concat!("ComfyUI-Recovery/", env!("CARGO_PKG_VERSION")).to_string()
}
const fn default_connect_timeout_secs() -> u64 {
    10
}
const fn default_max_attempts() -> u32 {
    2
}
const fn default_timeout_secs() -> u64 {
    300
}
const fn default_poll_interval_ms() -> u64 {
    100
}
const fn default_settle_secs() -> u64 {
    5
}
const fn default_shutdown_grace_secs() -> u64 {
    5
}
fn default_release_repo() -> String {
    "comfyanonymous/ComfyUI".to_string()
}
fn default_asset_name() -> String {
    "ComfyUI_windows_portable_nvidia.7z".to_string()
}
fn default_fallback_url() -> String {
    "https://github.com/comfyanonymous/ComfyUI/releases/download/v0.3.27/ComfyUI_windows_portable_nvidia.7z".to_string()
}
fn default_archive_file() -> String {
    "comfyui.7z".to_string()
}
fn default_outer_dir() -> String {
    "ComfyUI_windows_portable_nvidia".to_string()
}
fn default_inner_dir() -> String {
    "ComfyUI_windows_portable".to_string()
}
fn default_marker_file() -> String {
    "run_nvidia_gpu.bat".to_string()
}
fn default_launch_script() -> String {
    "run_nvidia_gpu.bat".to_string()
}
fn default_app_dir() -> String {
    "ComfyUI".to_string()
}
fn default_runtime_dir() -> String {
    "python_embeded".to_string()
}
fn default_runtime_exe() -> String {
    "python.exe".to_string()
}
fn default_ready_patterns() -> Vec<String> {
    vec![
        "To see the GUI go to:".to_string(),
        "http://127.0.0.1:8188".to_string(),
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            install_path: None,
            models_path: None,
            repo_list_path: default_repo_list_path(),
            cache: CacheRecord::default(),
            download: DownloadConfig::default(),
            first_run: FirstRunConfig::default(),
            app: AppProfile::default(),
            flags: RunFlags::default(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for FirstRunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_secs: default_settle_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for AppProfile {
    fn default() -> Self {
        Self {
            release_repo: default_release_repo(),
            asset_name: default_asset_name(),
            fallback_url: default_fallback_url(),
            archive_file: default_archive_file(),
            outer_dir: default_outer_dir(),
            inner_dir: default_inner_dir(),
            marker_file: default_marker_file(),
            launch_script: default_launch_script(),
            app_dir: default_app_dir(),
            runtime_dir: default_runtime_dir(),
            runtime_exe: default_runtime_exe(),
            ready_patterns: default_ready_patterns(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_merges_with_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            install_path = "D:/ComfyUI"

            [first_run]
            timeout_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(settings.install_path, Some(PathBuf::from("D:/ComfyUI")));
        assert_eq!(settings.models_path, None);
        assert_eq!(settings.first_run.timeout_secs, 60);
        assert_eq!(settings.first_run.poll_interval_ms, 100);
        assert_eq!(settings.app, AppProfile::default());
        assert_eq!(settings.repo_list_path, default_repo_list_path());
    }

    #[test]
    fn test_flags_are_not_persisted() {
        let mut settings = Settings::default();
        settings.flags.skip_nodes = true;
        settings.install_path = Some(PathBuf::from("/opt/comfy"));

        let text = toml::to_string_pretty(&settings).unwrap();
        assert!(!text.contains("skip_nodes"));

        let back: Settings = toml::from_str(&text).unwrap();
        assert!(!back.flags.skip_nodes);
        assert_eq!(back.install_path, settings.install_path);
    }
}
