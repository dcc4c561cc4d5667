use crate::config::Settings;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "comfyui-recovery")]
#[command(
    about = "Rebuild a portable ComfyUI install: download, extract, first run, model link and custom nodes",
    long_about = None
)]
pub struct Cli {
    /// Directory to install ComfyUI into
    #[arg(long, value_name = "DIR")]
    pub install_path: Option<PathBuf>,

    /// Existing models directory to link into the install
    #[arg(long, value_name = "DIR")]
    pub models_path: Option<PathBuf>,

    /// Text file listing custom node repositories, one URL per line
    #[arg(long, value_name = "FILE")]
    pub repo_list: Option<PathBuf>,

    /// Install into a non-empty directory without asking
    #[arg(long)]
    pub force: bool,

    /// Download the latest release even if a cached archive exists
    #[arg(long)]
    pub latest: bool,

    /// Reuse the archive already on disk instead of downloading
    #[arg(long)]
    pub skip_download: bool,

    /// Use the existing install instead of extracting the archive
    #[arg(long)]
    pub skip_extract: bool,

    /// Leave the models directory as it is
    #[arg(long)]
    pub skip_symlink: bool,

    /// Don't launch ComfyUI to bootstrap its embedded Python
    #[arg(long)]
    pub skip_first_run: bool,

    /// Don't install custom nodes
    #[arg(long)]
    pub skip_nodes: bool,

    /// Pull custom node repositories that are already present
    #[arg(long)]
    pub update_nodes: bool,

    /// Answer yes to every confirmation
    #[arg(short = 'y', long = "yes")]
    pub assume_yes: bool,

    /// Seconds to wait for the first run to become ready
    #[arg(long, value_name = "SECS")]
    pub first_run_timeout: Option<u64>,

    /// Settings file to read and update
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Directory for run logs
    #[arg(long, value_name = "DIR", default_value = "logs")]
    pub log_dir: PathBuf,
}

impl Cli {
    /// Layer command line overrides and run flags onto loaded settings
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(path) = &self.install_path {
            settings.install_path = Some(path.clone());
        }
        if let Some(path) = &self.models_path {
            settings.models_path = Some(path.clone());
        }
        if let Some(path) = &self.repo_list {
            settings.repo_list_path.clone_from(path);
        }
        if let Some(secs) = self.first_run_timeout {
            settings.first_run.timeout_secs = secs;
        }

        let flags = &mut settings.flags;
        flags.force = self.force;
        flags.latest = self.latest;
        flags.skip_download = self.skip_download;
        flags.skip_extract = self.skip_extract;
        flags.skip_symlink = self.skip_symlink;
        flags.skip_first_run = self.skip_first_run;
        flags.skip_nodes = self.skip_nodes;
        flags.update_nodes = self.update_nodes;
        flags.assume_yes = self.assume_yes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_overrides_paths_and_flags() {
        let cli = Cli::parse_from([
            "comfyui-recovery",
            "--install-path",
            "/opt/comfy",
            "--repo-list",
            "nodes.txt",
            "--skip-download",
            "--skip-extract",
            "--yes",
            "--first-run-timeout",
            "60",
        ]);
        let mut settings = Settings {
            models_path: Some(PathBuf::from("/data/models")),
            ..Settings::default()
        };
        cli.apply(&mut settings);

        assert_eq!(settings.install_path, Some(PathBuf::from("/opt/comfy")));
        assert_eq!(settings.models_path, Some(PathBuf::from("/data/models")));
        assert_eq!(settings.repo_list_path, PathBuf::from("nodes.txt"));
        assert_eq!(settings.first_run.timeout_secs, 60);
        assert!(settings.flags.skip_download);
        assert!(settings.flags.skip_extract);
        assert!(settings.flags.assume_yes);
        assert!(!settings.flags.skip_nodes);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["comfyui-recovery"]);
        assert_eq!(cli.log_dir, PathBuf::from("logs"));
        assert!(cli.settings.is_none());
        assert!(!cli.force);
    }
}
