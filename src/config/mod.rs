//! Settings for a recovery run
//!
//! Loads settings from `$COMFYUI_RECOVERY_SETTINGS` or
//! `<config dir>/comfyui-recovery/settings.toml`, falling back to defaults if
//! the file doesn't exist. Partial files are merged with defaults using serde's
//! default attributes. CLI overrides and run flags are applied on top and the
//! paths are written back at the end of the run.
//!
//! # Example
//!
//! ```no_run
//! use comfyui_recovery::config::SettingsStore;
//!
//! let store = SettingsStore::at_default_location().expect("no config dir");
//! let settings = store.load_or_default();
//! println!("Repository list: {}", settings.repo_list_path.display());
//! ```

pub mod schema;
pub mod store;
pub mod validate;

pub use schema::{AppProfile, CacheRecord, DownloadConfig, FirstRunConfig, RunFlags, Settings};
pub use store::{prompt_missing, RequiredField, SettingsStore};
pub use validate::ConfigWarning;
