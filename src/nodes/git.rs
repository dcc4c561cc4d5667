use crate::error::{RecoveryError, Result};
use crate::extract::tools::run_command;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Version control operations the node installer needs
pub trait VcsClient {
    /// Fails with `RecoveryError::ExternalTool` when the client can't run at all
    fn ensure_available(&self) -> Result<()>;

    fn clone_repo(&self, url: &str, dest: &Path) -> Result<()>;

    fn pull(&self, repo_dir: &Path) -> Result<()>;
}

/// The `git` command line client
#[derive(Debug)]
pub struct GitCli {
    program: Option<PathBuf>,
}

impl GitCli {
    #[must_use]
    pub fn locate() -> Self {
        Self {
            program: which::which("git").ok(),
        }
    }

    fn base_command(&self) -> Result<Command> {
        let program = self.program.as_deref().ok_or_else(|| {
            RecoveryError::ExternalTool("git executable not found on PATH".to_string())
        })?;
        let mut command = Command::new(program);
        command
            .arg("-c")
            .arg("core.autocrlf=false")
            .arg("-c")
            .arg("core.eol=lf");
        if cfg!(windows) {
            command.arg("-c").arg("core.longpaths=true");
        }
        // Never block on a credential prompt for a private or missing repo
        command.env("GIT_TERMINAL_PROMPT", "0");
        Ok(command)
    }
}

impl VcsClient for GitCli {
    fn ensure_available(&self) -> Result<()> {
        let mut command = self.base_command()?;
        command.arg("--version");
        run_command(&mut command, "git is not usable")
    }

    fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        let mut command = self.base_command()?;
        command.arg("clone").arg("--").arg(url).arg(dest);
        tracing::debug!("Running {command:?}");
        run_command(&mut command, &format!("git clone {url} failed"))
    }

    fn pull(&self, repo_dir: &Path) -> Result<()> {
        let mut command = self.base_command()?;
        command.arg("pull").arg("--ff-only").current_dir(repo_dir);
        tracing::debug!("Running {command:?} in {}", repo_dir.display());
        run_command(
            &mut command,
            &format!("git pull in {} failed", repo_dir.display()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_git_is_external_tool_error() {
        let git = GitCli { program: None };
        assert!(matches!(
            git.ensure_available(),
            Err(RecoveryError::ExternalTool(_))
        ));
        assert!(git
            .clone_repo("https://example.com/a/b.git", Path::new("b"))
            .is_err());
    }

    #[test]
    fn test_base_command_disables_line_ending_conversion() {
        let git = GitCli {
            program: Some(PathBuf::from("git")),
        };
        let command = git.base_command().unwrap();
        let args: Vec<_> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(&args[..4], &["-c", "core.autocrlf=false", "-c", "core.eol=lf"]);
    }

    #[test]
    fn test_clone_local_repository() {
        let git = GitCli::locate();
        if git.ensure_available().is_err() {
            return;
        }
        let temp = tempfile::TempDir::new().unwrap();
        let origin = temp.path().join("origin");
        std::fs::create_dir_all(&origin).unwrap();
        let status = Command::new("git")
            .args(["init", "--quiet"])
            .current_dir(&origin)
            .status()
            .unwrap();
        assert!(status.success());

        let url = format!("file://{}", origin.display());
        let dest = temp.path().join("clone");
        git.clone_repo(&url, &dest).unwrap();
        assert!(dest.join(".git").exists());
    }
}
