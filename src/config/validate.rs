use crate::config::schema::Settings;
use crate::error::{RecoveryError, Result};
use crate::extract::layout::{InstallPaths, Layout};
use std::fmt;
use std::path::Path;

/// Soft problems with a run's configuration, logged but not fatal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Neither first-run nor symlinking will happen and the embedded runtime is absent
    RuntimeNeverBootstrapped,
    /// Custom nodes need the embedded runtime, which first-run would have created
    NodesWithoutRuntime,
    /// `--latest` only matters when downloading
    LatestIgnored,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RuntimeNeverBootstrapped => write!(
                f,
                "--skip-first-run and --skip-symlink on an install without an embedded runtime: \
                 the runtime will not be bootstrapped by this run"
            ),
            Self::NodesWithoutRuntime => write!(
                f,
                "--skip-first-run with no embedded runtime present: custom node dependencies cannot be installed"
            ),
            Self::LatestIgnored => write!(f, "--latest has no effect together with --skip-download"),
        }
    }
}

impl Settings {
    /// Check paths and flag combinations before any stage runs
    ///
    /// # Errors
    /// Returns `RecoveryError::Config` for missing or nonexistent required paths.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>> {
        let install_path = self
            .install_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| RecoveryError::Config("install_path is not set".to_string()))?;

        if let Some(parent) = install_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(RecoveryError::Config(format!(
                    "Parent directory of install_path does not exist: {}",
                    parent.display()
                )));
            }
        }

        if !self.flags.skip_symlink {
            let models = self
                .models_path
                .as_deref()
                .filter(|p| !p.as_os_str().is_empty())
                .ok_or_else(|| RecoveryError::Config("models_path is not set".to_string()))?;
            if !models.is_dir() {
                return Err(RecoveryError::Config(format!(
                    "models_path does not exist: {}",
                    models.display()
                )));
            }
        }

        let mut warnings = Vec::new();
        if self.flags.latest && self.flags.skip_download {
            warnings.push(ConfigWarning::LatestIgnored);
        }
        if self.flags.skip_first_run && !self.runtime_present(install_path) {
            if self.flags.skip_symlink {
                warnings.push(ConfigWarning::RuntimeNeverBootstrapped);
            }
            if !self.flags.skip_nodes {
                warnings.push(ConfigWarning::NodesWithoutRuntime);
            }
        }
        Ok(warnings)
    }

    fn runtime_present(&self, install_path: &Path) -> bool {
        Layout::resolve(install_path, &self.app)
            .map(|layout| InstallPaths::new(install_path, layout, &self.app).runtime_exists())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn settings_in(temp: &TempDir) -> Settings {
        let models = temp.path().join("models");
        fs::create_dir_all(&models).unwrap();
        let mut settings = Settings::default();
        settings.install_path = Some(temp.path().join("install"));
        settings.models_path = Some(models);
        settings
    }

    #[test]
    fn test_valid_settings() {
        let temp = TempDir::new().unwrap();
        let settings = settings_in(&temp);
        assert!(settings.validate().unwrap().is_empty());
    }

    #[test]
    fn test_missing_install_path() {
        let settings = Settings::default();
        assert!(matches!(settings.validate(), Err(RecoveryError::Config(_))));
    }

    #[test]
    fn test_missing_models_dir() {
        let temp = TempDir::new().unwrap();
        let mut settings = settings_in(&temp);
        settings.models_path = Some(temp.path().join("nope"));

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("models_path does not exist"));

        settings.flags.skip_symlink = true;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_parent() {
        let temp = TempDir::new().unwrap();
        let mut settings = settings_in(&temp);
        settings.install_path = Some(temp.path().join("a").join("b"));
        assert!(matches!(settings.validate(), Err(RecoveryError::Config(_))));
    }

    #[test]
    fn test_fresh_install_skipping_first_run_and_symlink_warns() {
        let temp = TempDir::new().unwrap();
        let mut settings = settings_in(&temp);
        settings.flags.skip_first_run = true;
        settings.flags.skip_symlink = true;
        settings.flags.skip_nodes = true;

        let warnings = settings.validate().unwrap();
        assert_eq!(warnings, vec![ConfigWarning::RuntimeNeverBootstrapped]);
    }

    #[test]
    fn test_no_warning_when_runtime_exists() {
        let temp = TempDir::new().unwrap();
        let mut settings = settings_in(&temp);
        settings.flags.skip_first_run = true;
        settings.flags.skip_symlink = true;

        let runtime = temp
            .path()
            .join("install")
            .join("ComfyUI_windows_portable")
            .join("python_embeded");
        fs::create_dir_all(&runtime).unwrap();
        fs::write(runtime.join("python.exe"), "").unwrap();
        fs::write(
            temp.path()
                .join("install")
                .join("ComfyUI_windows_portable")
                .join("run_nvidia_gpu.bat"),
            "",
        )
        .unwrap();

        assert!(settings.validate().unwrap().is_empty());
    }

    #[test]
    fn test_latest_with_skip_download_warns() {
        let temp = TempDir::new().unwrap();
        let mut settings = settings_in(&temp);
        settings.flags.latest = true;
        settings.flags.skip_download = true;

        assert_eq!(settings.validate().unwrap(), vec![ConfigWarning::LatestIgnored]);
    }
}
