use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Name of the log file for a run started now
#[must_use]
pub fn log_file_name() -> String {
    format!("recovery_{}.log", chrono::Local::now().format("%Y%m%d-%H%M%S"))
}

/// Log to the console and to a fresh file in `log_dir`
///
/// Keep the returned guard alive until exit or buffered lines are lost.
/// `RUST_LOG` overrides the default `info` filter.
///
/// # Errors
/// Fails if `log_dir` can't be created or a global subscriber is already set
pub fn init(log_dir: &Path) -> anyhow::Result<(WorkerGuard, PathBuf)> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_name = log_file_name();
    let file_appender = tracing_appender::rolling::never(log_dir, &file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stdout))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    Ok((guard, log_dir.join(file_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name() {
        let name = log_file_name();
        assert!(name.starts_with("recovery_"));
        assert!(name.ends_with(".log"));
        // recovery_YYYYmmdd-HHMMSS.log
        assert_eq!(name.len(), "recovery_".len() + 15 + ".log".len());
    }
}
