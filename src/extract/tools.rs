use crate::error::{RecoveryError, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Something able to unpack the release archive
pub trait ArchiveTool {
    /// Name for logs
    fn name(&self) -> &str;

    /// Whether the tool can run on this machine
    fn is_available(&self) -> bool;

    /// Unpack `archive` into `dest`, which already exists
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// Pure Rust 7z decoder
#[derive(Debug, Default)]
pub struct SevenZipLibrary;

impl ArchiveTool for SevenZipLibrary {
    fn name(&self) -> &str {
        "sevenz-rust"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        sevenz_rust::decompress_file(archive, dest).map_err(|e| {
            RecoveryError::Extraction(format!(
                "sevenz-rust failed to extract {}: {e}",
                archive.display()
            ))
        })
    }
}

/// The 7-Zip command line binary
#[derive(Debug)]
pub struct SevenZipBinary {
    program: Option<PathBuf>,
}

const WINDOWS_INSTALL_DIRS: &[&str] = &[
    r"C:\Program Files\7-Zip\7z.exe",
    r"C:\Program Files (x86)\7-Zip\7z.exe",
];

impl SevenZipBinary {
    /// Look for `7z`/`7za` on PATH, then in the default Windows install directories
    #[must_use]
    pub fn locate() -> Self {
        let program = ["7z", "7za"]
            .iter()
            .find_map(|name| which::which(name).ok())
            .or_else(|| {
                if cfg!(windows) {
                    WINDOWS_INSTALL_DIRS
                        .iter()
                        .map(PathBuf::from)
                        .find(|p| p.exists())
                } else {
                    None
                }
            });
        Self { program }
    }

    #[must_use]
    pub const fn with_program(program: PathBuf) -> Self {
        Self {
            program: Some(program),
        }
    }

    fn build_command(program: &Path, archive: &Path, dest: &Path) -> Command {
        let mut command = Command::new(program);
        command
            .arg("x")
            .arg(archive)
            .arg(format!("-o{}", dest.display()))
            .arg("-y");
        command
    }
}

impl ArchiveTool for SevenZipBinary {
    fn name(&self) -> &str {
        "7z"
    }

    fn is_available(&self) -> bool {
        self.program.is_some()
    }

    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let program = self.program.as_deref().ok_or_else(|| {
            RecoveryError::Extraction(
                "7-Zip executable not found. Install 7-Zip and ensure '7z' is on PATH".to_string(),
            )
        })?;

        let mut command = Self::build_command(program, archive, dest);
        tracing::info!("Extracting using command: {command:?}");
        run_command(&mut command, "7z extraction failed")
    }
}

/// Run a command, folding its output into the error on failure
pub(crate) fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command.output().map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            RecoveryError::ExternalTool(format!("{context_message}: program not found: {e}"))
        } else {
            RecoveryError::ExternalTool(format!("{context_message}: command failed to start: {e}"))
        }
    })?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(RecoveryError::ExternalTool(format!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    )))
}

/// Preferred tool first, binary fallback second
#[must_use]
pub fn default_tools() -> Vec<Box<dyn ArchiveTool>> {
    vec![
        Box::new(SevenZipLibrary),
        Box::new(SevenZipBinary::locate()),
    ]
}
