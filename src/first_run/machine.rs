use crate::config::schema::FirstRunConfig;
use crate::error::{RecoveryError, Result};
use crate::extract::layout::InstallPaths;
use std::fmt;
use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

/// How a child process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub success: bool,
    pub description: String,
}

/// Handle on the launched application
pub trait AppProcess {
    fn id(&self) -> Option<u32>;

    /// Exit status if the process has finished, without blocking
    fn poll(&mut self) -> Option<ProcessExit>;

    /// Output lines produced since the last call
    fn read_lines(&mut self) -> Vec<String>;

    /// Ask the process (tree) to stop
    fn terminate(&mut self) -> io::Result<()>;

    /// Stop the process (tree) unconditionally
    fn kill(&mut self) -> io::Result<()>;

    /// Wait up to `timeout`; true if the process exited
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool>;
}

/// Starts the application's entry point
pub trait Launcher {
    fn launch(&self, script: &Path, cwd: &Path) -> Result<Box<dyn AppProcess>>;
}

/// Stages of a first run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    NotStarted,
    Launching,
    WaitingForReady,
    ShuttingDown,
    Done,
    /// Readiness not observed in time; the process was killed
    TimedOut,
    /// The process exited before the embedded runtime appeared
    Failed,
}

impl InitState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::TimedOut | Self::Failed)
    }
}

impl fmt::Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::Launching => "launching",
            Self::WaitingForReady => "waiting for ready",
            Self::ShuttingDown => "shutting down",
            Self::Done => "done",
            Self::TimedOut => "timed out",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What happened during a first run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstRunReport {
    pub final_state: InitState,
    /// Every state entered, in order
    pub transitions: Vec<InitState>,
    pub forced_kill: bool,
    /// The runtime already existed and nothing was launched
    pub already_bootstrapped: bool,
    pub message: String,
}

impl FirstRunReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.final_state == InitState::Done
    }

    /// Turn an unsuccessful report into the matching error
    pub fn into_result(self) -> Result<Self> {
        match self.final_state {
            InitState::Done => Ok(self),
            InitState::TimedOut => Err(RecoveryError::Timeout(self.message)),
            _ => Err(RecoveryError::ExternalTool(self.message)),
        }
    }
}

/// Timing knobs, in one place so tests can shrink them
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub settle: Duration,
    pub shutdown_grace: Duration,
}

impl From<&FirstRunConfig> for Timing {
    fn from(config: &FirstRunConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            settle: Duration::from_secs(config.settle_secs),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
        }
    }
}

/// Launches the app once so its embedded runtime bootstraps, then stops it
#[derive(Debug, Clone)]
pub struct FirstRunInitializer {
    timing: Timing,
    ready_patterns: Vec<String>,
}

impl FirstRunInitializer {
    #[must_use]
    pub fn new(timing: Timing, ready_patterns: Vec<String>) -> Self {
        Self {
            timing,
            ready_patterns,
        }
    }

    /// Drive the state machine until it reaches a terminal state
    ///
    /// # Errors
    /// - `RecoveryError::Config` if the launch script is missing
    /// - errors from the launcher or from stopping the process
    pub fn initialize(
        &self,
        paths: &InstallPaths,
        launcher: &dyn Launcher,
    ) -> Result<FirstRunReport> {
        let mut run = Run::new(self, paths);
        while !run.state.is_terminal() {
            let next = run.step(launcher)?;
            run.enter(next);
        }
        Ok(run.into_report())
    }
}

struct Run<'a> {
    init: &'a FirstRunInitializer,
    paths: &'a InstallPaths,
    state: InitState,
    transitions: Vec<InitState>,
    process: Option<Box<dyn AppProcess>>,
    started: Instant,
    ready_seen: bool,
    last_output: Instant,
    forced_kill: bool,
    already_bootstrapped: bool,
    message: String,
}

impl<'a> Run<'a> {
    fn new(init: &'a FirstRunInitializer, paths: &'a InstallPaths) -> Self {
        let now = Instant::now();
        Self {
            init,
            paths,
            state: InitState::NotStarted,
            transitions: vec![InitState::NotStarted],
            process: None,
            started: now,
            ready_seen: false,
            last_output: now,
            forced_kill: false,
            already_bootstrapped: false,
            message: String::new(),
        }
    }

    fn enter(&mut self, next: InitState) {
        if next != self.state {
            tracing::debug!("First run: {} -> {}", self.state, next);
            self.state = next;
            self.transitions.push(next);
        }
    }

    fn step(&mut self, launcher: &dyn Launcher) -> Result<InitState> {
        match self.state {
            InitState::NotStarted => self.check_preconditions(),
            InitState::Launching => self.launch(launcher),
            InitState::WaitingForReady => Ok(self.wait_for_ready()),
            InitState::ShuttingDown => self.shut_down(),
            terminal => Ok(terminal),
        }
    }

    fn check_preconditions(&mut self) -> Result<InitState> {
        if self.paths.runtime_exists() {
            tracing::info!(
                "Embedded runtime verified at: {}",
                self.paths.runtime_exe.display()
            );
            self.already_bootstrapped = true;
            self.message =
                "Embedded runtime already exists, skipping first-run initialization".to_string();
            return Ok(InitState::Done);
        }
        if !self.paths.launch_script.exists() {
            return Err(RecoveryError::Config(format!(
                "Run script not found: {}",
                self.paths.launch_script.display()
            )));
        }
        Ok(InitState::Launching)
    }

    fn launch(&mut self, launcher: &dyn Launcher) -> Result<InitState> {
        tracing::info!("Starting the application for first-run initialization...");
        tracing::info!("Timeout: {} seconds", self.init.timing.timeout.as_secs());

        let cwd = self
            .paths
            .launch_script
            .parent()
            .unwrap_or(&self.paths.base);
        let process = launcher.launch(&self.paths.launch_script, cwd)?;
        match process.id() {
            Some(pid) => tracing::info!("Application process started (PID: {pid})"),
            None => tracing::info!("Application process started"),
        }

        self.process = Some(process);
        self.started = Instant::now();
        self.last_output = self.started;
        Ok(InitState::WaitingForReady)
    }

    fn wait_for_ready(&mut self) -> InitState {
        let Some(process) = self.process.as_mut() else {
            return InitState::Failed;
        };
        let timing = self.init.timing;

        if self.started.elapsed() > timing.timeout {
            tracing::warn!(
                "Initialization timeout after {} seconds, killing process",
                timing.timeout.as_secs()
            );
            if let Err(e) = process.kill() {
                tracing::error!("Failed to kill application process: {e}");
            }
            self.forced_kill = true;
            self.message = format!(
                "First-run initialization timed out after {} seconds",
                timing.timeout.as_secs()
            );
            return InitState::TimedOut;
        }

        for line in process.read_lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            tracing::info!("ComfyUI: {line}");
            self.last_output = Instant::now();
            if self.init.ready_patterns.iter().any(|p| line.contains(p.as_str())) {
                if !self.ready_seen {
                    tracing::info!("Application server is ready!");
                }
                self.ready_seen = true;
            }
        }

        if let Some(exit) = process.poll() {
            for line in process.read_lines() {
                tracing::info!("ComfyUI: {}", line.trim());
            }
            if self.paths.runtime_exists() {
                self.message = format!(
                    "First-run initialization completed (process exited: {})",
                    exit.description
                );
                return InitState::Done;
            }
            self.message = format!(
                "Application exited ({}) but embedded runtime not found at {}",
                exit.description,
                self.paths.runtime_exe.display()
            );
            return InitState::Failed;
        }

        if self.ready_seen && self.last_output.elapsed() >= timing.settle {
            if self.paths.runtime_exists() {
                tracing::info!("Application appears stable, proceeding to shutdown...");
                return InitState::ShuttingDown;
            }
            tracing::warn!("Readiness detected but embedded runtime still not found, waiting...");
            self.ready_seen = false;
        }

        thread::sleep(timing.poll_interval);
        InitState::WaitingForReady
    }

    fn shut_down(&mut self) -> Result<InitState> {
        let Some(process) = self.process.as_mut() else {
            return Ok(InitState::Done);
        };

        tracing::info!("Shutting down the application...");
        if let Err(e) = process.terminate() {
            tracing::warn!("Graceful termination failed: {e}");
        }
        if !process.wait_timeout(self.init.timing.shutdown_grace)? {
            tracing::warn!(
                "Process still running after {} seconds, killing it",
                self.init.timing.shutdown_grace.as_secs()
            );
            process.kill()?;
            self.forced_kill = true;
        }

        self.message = "First-run initialization completed successfully".to_string();
        Ok(InitState::Done)
    }

    fn into_report(self) -> FirstRunReport {
        FirstRunReport {
            final_state: self.state,
            transitions: self.transitions,
            forced_kill: self.forced_kill,
            already_bootstrapped: self.already_bootstrapped,
            message: self.message,
        }
    }
}
