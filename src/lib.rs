pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod first_run;
pub mod link;
pub mod logging;
pub mod nodes;
pub mod pipeline;
pub mod prompt;

pub use error::{RecoveryError, Result};
