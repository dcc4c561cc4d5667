use crate::error::{RecoveryError, Result};
use std::io::{self, BufRead, Write};

/// Interactive questions asked while a run is in progress
pub trait Prompter {
    /// Ask for a free-form value, returned trimmed
    fn ask(&mut self, question: &str) -> Result<String>;

    /// Ask a yes/no question
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Prompter reading answers from the terminal
#[derive(Debug, Default)]
pub struct StdinPrompter {
    assume_yes: bool,
}

impl StdinPrompter {
    #[must_use]
    pub const fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    fn read_line(question: &str) -> Result<String> {
        let mut stdout = io::stdout();
        write!(stdout, "{question}")?;
        stdout.flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(RecoveryError::Config(format!(
                "no answer for \"{}\" (stdin closed)",
                question.trim_end_matches([':', ' '])
            )));
        }
        Ok(line.trim().to_string())
    }
}

impl Prompter for StdinPrompter {
    fn ask(&mut self, question: &str) -> Result<String> {
        Self::read_line(&format!("{question}: "))
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        if self.assume_yes {
            tracing::info!("{question} (y/n): y (--yes)");
            return Ok(true);
        }
        let answer = Self::read_line(&format!("{question} (y/n): "))?;
        Ok(is_yes(&answer))
    }
}

/// Parse a yes/no answer, anything but y/yes is a no
#[must_use]
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
