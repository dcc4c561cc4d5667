use crate::error::Result;
use crate::extract::tools::run_command;
use std::path::Path;
use std::process::Command;

/// Installs a plugin's Python requirements
pub trait DependencyInstaller {
    /// Install `manifest` using the interpreter at `runtime`, from `cwd`
    fn install(&self, runtime: &Path, manifest: &Path, cwd: &Path) -> Result<()>;
}

/// `pip` through the embedded interpreter
///
/// `-s` keeps the user's site-packages out of the embedded runtime.
#[derive(Debug, Default)]
pub struct PipInstaller;

impl PipInstaller {
    fn build_command(runtime: &Path, manifest: &Path, cwd: &Path) -> Command {
        let mut command = Command::new(runtime);
        command
            .arg("-s")
            .arg("-m")
            .arg("pip")
            .arg("install")
            .arg("-r")
            .arg(manifest)
            .current_dir(cwd);
        command
    }
}

impl DependencyInstaller for PipInstaller {
    fn install(&self, runtime: &Path, manifest: &Path, cwd: &Path) -> Result<()> {
        let mut command = Self::build_command(runtime, manifest, cwd);
        tracing::info!("Installing requirements: {}", manifest.display());
        run_command(
            &mut command,
            &format!("pip install -r {} failed", manifest.display()),
        )
    }
}
