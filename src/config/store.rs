use crate::config::schema::Settings;
use crate::error::{RecoveryError, Result};
use crate::prompt::Prompter;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the settings file location
pub const SETTINGS_ENV: &str = "COMFYUI_RECOVERY_SETTINGS";

/// Reads and writes the persisted settings file
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `$COMFYUI_RECOVERY_SETTINGS` or `<config dir>/comfyui-recovery/settings.toml`
    pub fn at_default_location() -> Result<Self> {
        Ok(Self::new(default_path()?))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, returning defaults if the file doesn't exist
    pub fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            tracing::info!("No settings file found at {}", self.path.display());
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&self.path)?;
        let settings = toml::from_str(&content).map_err(|e| {
            RecoveryError::Config(format!(
                "Failed to parse settings file {}: {e}",
                self.path.display()
            ))
        })?;

        tracing::info!("Settings loaded from {}", self.path.display());
        Ok(settings)
    }

    /// Load settings, falling back to defaults (and thus prompting) on a malformed file
    #[must_use]
    pub fn load_or_default(&self) -> Settings {
        match self.load() {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!("{e}");
                tracing::warn!("Ignoring settings file, starting from defaults");
                Settings::default()
            }
        }
    }

    /// Save settings atomically (tmp + rename)
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(settings)
            .map_err(|e| RecoveryError::Config(format!("Failed to serialize settings: {e}")))?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;

        tracing::info!("Settings saved to {}", self.path.display());
        Ok(())
    }
}

fn default_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(SETTINGS_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    let config_dir = dirs::config_dir().ok_or_else(|| {
        RecoveryError::Config(format!(
            "Could not determine the user config directory, set {SETTINGS_ENV} or pass --settings"
        ))
    })?;
    Ok(config_dir.join("comfyui-recovery").join("settings.toml"))
}

/// Fields a run cannot do without
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    InstallPath,
    ModelsPath,
}

impl RequiredField {
    #[must_use]
    pub const fn question(self) -> &'static str {
        match self {
            Self::InstallPath => "Enter the path where ComfyUI should be installed",
            Self::ModelsPath => "Enter the path to your models storage folder",
        }
    }
}

impl Settings {
    /// Required fields that are still unset, given the skip flags
    #[must_use]
    pub fn missing_required(&self) -> Vec<RequiredField> {
        let mut missing = Vec::new();
        if is_unset(self.install_path.as_deref()) {
            missing.push(RequiredField::InstallPath);
        }
        if !self.flags.skip_symlink && is_unset(self.models_path.as_deref()) {
            missing.push(RequiredField::ModelsPath);
        }
        missing
    }
}

fn is_unset(path: Option<&Path>) -> bool {
    path.map_or(true, |p| p.as_os_str().is_empty())
}

/// Ask for every required field that is still unset
///
/// Empty answers leave the field unset; `Settings::validate` reports it afterwards.
pub fn prompt_missing(settings: &mut Settings, prompter: &mut dyn Prompter) -> Result<()> {
    let missing = settings.missing_required();
    if missing.is_empty() {
        return Ok(());
    }

    tracing::info!("Some required settings are missing");
    for field in missing {
        let answer = prompter.ask(field.question())?;
        if answer.is_empty() {
            continue;
        }
        let value = Some(PathBuf::from(answer));
        match field {
            RequiredField::InstallPath => settings.install_path = value,
            RequiredField::ModelsPath => settings.models_path = value,
        }
    }
    Ok(())
}
