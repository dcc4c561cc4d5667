//! Custom node (plugin) installation
//!
//! Each repository in the list is handled on its own: a failed clone or
//! dependency install is recorded in the [`InstallSummary`] and the loop
//! moves on to the next one.

pub mod git;
pub mod installer;
pub mod repo_list;
pub mod runtime;

pub use git::{GitCli, VcsClient};
pub use installer::{InstallSummary, NodeFailure, NodeInstaller};
pub use repo_list::{repo_dir_name, RepoList};
pub use runtime::{DependencyInstaller, PipInstaller};
