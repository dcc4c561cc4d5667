use clap::Parser;
use comfyui_recovery::cli::Cli;
use comfyui_recovery::config::SettingsStore;
use comfyui_recovery::pipeline::{Pipeline, Toolkit};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (_guard, log_file) = match comfyui_recovery::logging::init(&cli.log_dir) {
        Ok(logging) => logging,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Starting ComfyUI recovery, logging to {}", log_file.display());

    let store = match &cli.settings {
        Some(path) => SettingsStore::new(path),
        None => match SettingsStore::at_default_location() {
            Ok(store) => store,
            Err(e) => {
                tracing::error!("{e}");
                return ExitCode::FAILURE;
            }
        },
    };
    tracing::info!("Settings file: {}", store.path().display());

    let mut settings = store.load_or_default();
    cli.apply(&mut settings);

    let toolkit = match Toolkit::system(&settings) {
        Ok(toolkit) => toolkit,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(e.exit_code());
        }
    };

    let mut pipeline = Pipeline::new(toolkit, store);
    match pipeline.run(&mut settings).await {
        Ok(report) => {
            if let Err(e) = report.outcome() {
                tracing::warn!("Finished with problems: {e}");
            } else {
                tracing::info!("Recovery completed successfully");
            }
            ExitCode::from(report.exit_code())
        }
        Err(e) => {
            tracing::error!("Recovery failed: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
