//! Process execution seam for the gpg tool chain.

use crate::error::{Result, UploadError};
use std::process::{Command, Output};

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::GpgUnavailable`] when the command cannot be
    /// spawned.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use courier_uploader::gpg::{CommandExecutor, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run("gpg", &["--version"])?;
    /// assert!(output.status.success());
    /// # Ok::<(), courier_uploader::error::UploadError>(())
    /// ```
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        Command::new(cmd)
            .args(args)
            .output()
            .map_err(|err| UploadError::GpgUnavailable {
                reason: format!("{cmd}: {err}"),
            })
    }
}

/// Returns `true` when `gpg --version` runs successfully.
#[must_use]
pub fn gpg_available(executor: &dyn CommandExecutor) -> bool {
    executor
        .run("gpg", &["--version"])
        .is_ok_and(|output| output.status.success())
}
