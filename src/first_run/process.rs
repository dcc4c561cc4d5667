use crate::error::{RecoveryError, Result};
use crate::first_run::machine::{AppProcess, Launcher, ProcessExit};
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;
use subprocess::{Exec, Popen, Redirection};

/// Launches the entry script as a real child process
#[derive(Debug, Default)]
pub struct SubprocessLauncher;

impl Launcher for SubprocessLauncher {
    fn launch(&self, script: &Path, cwd: &Path) -> Result<Box<dyn AppProcess>> {
        // Batch files need the command interpreter
        let exec = if cfg!(windows) {
            Exec::cmd("cmd").arg("/C").arg(script)
        } else {
            Exec::cmd(script)
        };

        let mut popen = exec
            .cwd(cwd)
            .stdout(Redirection::Pipe)
            .stderr(Redirection::Merge)
            .popen()
            .map_err(|e| {
                RecoveryError::ExternalTool(format!(
                    "Failed to start {}: {e}",
                    script.display()
                ))
            })?;

        let (tx, lines) = mpsc::channel();
        if let Some(stdout) = popen.stdout.take() {
            thread::spawn(move || {
                for line in BufReader::new(stdout).lines().map_while(std::result::Result::ok) {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
        }

        Ok(Box::new(SubprocessHandle { popen, lines }))
    }
}

/// Running child plus the channel its output arrives on
#[derive(Debug)]
pub struct SubprocessHandle {
    popen: Popen,
    lines: Receiver<String>,
}

impl SubprocessHandle {
    /// `cmd /C` does not forward signals, so stop the whole tree on Windows
    fn taskkill(pid: u32, force: bool) -> io::Result<()> {
        let mut command = std::process::Command::new("taskkill");
        command.arg("/T").arg("/PID").arg(pid.to_string());
        if force {
            command.arg("/F");
        }
        let output = command.output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "taskkill failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl AppProcess for SubprocessHandle {
    fn id(&self) -> Option<u32> {
        self.popen.pid()
    }

    fn poll(&mut self) -> Option<ProcessExit> {
        self.popen.poll().map(|status| ProcessExit {
            success: status.success(),
            description: format!("{status:?}"),
        })
    }

    fn read_lines(&mut self) -> Vec<String> {
        self.lines.try_iter().collect()
    }

    fn terminate(&mut self) -> io::Result<()> {
        if cfg!(windows) {
            if let Some(pid) = self.popen.pid() {
                return Self::taskkill(pid, false);
            }
        }
        self.popen.terminate()
    }

    fn kill(&mut self) -> io::Result<()> {
        if cfg!(windows) {
            if let Some(pid) = self.popen.pid() {
                if Self::taskkill(pid, true).is_ok() {
                    return Ok(());
                }
            }
        }
        self.popen.kill()
    }

    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool> {
        self.popen
            .wait_timeout(timeout)
            .map(|status| status.is_some())
            .map_err(|e| io::Error::other(e.to_string()))
    }
}

impl Drop for SubprocessHandle {
    fn drop(&mut self) {
        if self.popen.poll().is_none() {
            let _ = self.kill();
            let _ = self.popen.wait_timeout(Duration::from_secs(5));
        }
    }
}
