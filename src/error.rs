use thiserror::Error;

/// Main error type for the recovery tool
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Configuration error: {0}\n\nTroubleshooting:\n- Pass the path explicitly (--install-path, --models-path, --repo-list)\n- Check the settings file (see --settings)\n- Delete a corrupted settings file to start over with defaults")]
    Config(String),

    #[error("Network error: {0}\n\nTroubleshooting:\n- Check internet connection and proxy settings\n- GitHub may be rate limiting anonymous requests, try again later\n- Re-run with --skip-download if the archive is already on disk")]
    Network(String),

    #[error("Extraction error: {0}\n\nTroubleshooting:\n- The archive may be corrupt: delete it and re-run with --latest\n- Install the 7-Zip command line tool (7z) and ensure it is on PATH\n- Check free disk space in the install path")]
    Extraction(String),

    #[error("Privilege error: {0}")]
    Privilege(String),

    #[error("Timeout: {0}\n\nTroubleshooting:\n- Raise the limit with --first-run-timeout\n- Start the application manually once, then re-run with --skip-first-run")]
    Timeout(String),

    #[error("External tool error: {0}\n\nTroubleshooting:\n- Is git installed and on PATH? Check with: git --version\n- Check network access to the repository host")]
    ExternalTool(String),

    #[error("{failed} of {total} custom node repositories failed to install")]
    PartialFailure { failed: usize, total: usize },

    #[error("{failed} of {total} stages failed: {stages}")]
    StagesFailed {
        failed: usize,
        total: usize,
        /// Names of the failed stages, comma separated
        stages: String,
    },

    #[error("Cancelled by user")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecoveryError {
    /// Process exit code for this error
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::PartialFailure { .. } | Self::StagesFailed { .. } => 2,
            Self::Cancelled => 130,
            _ => 1,
        }
    }

    /// Whether the pipeline may carry on after this error
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::PartialFailure { .. } | Self::Privilege(_))
    }
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
