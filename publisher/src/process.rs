//! External command execution with a deadline.
//!
//! Git is driven through the [`CommandExecutor`] seam so that publishers can
//! be exercised without touching a real repository.

use camino::Utf8Path;
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use wait_timeout::ChildExt;

/// Errors raised while running an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// The program that was invoked.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The program did not finish before its deadline and was killed.
    #[error("{program} timed out after {} seconds", timeout.as_secs())]
    TimedOut {
        /// The program that was invoked.
        program: String,
        /// The deadline that expired.
        timeout: Duration,
    },

    /// Waiting for the program or collecting its output failed.
    #[error("failed to collect output from {program}: {source}")]
    Io {
        /// The program that was invoked.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Abstraction for running external commands.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor: Send + Sync {
    /// Run `program` with `args` in `cwd`, killing it after `timeout`.
    ///
    /// A non-zero exit status is not an error; callers inspect
    /// [`Output::status`].
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when the program cannot be started, times
    /// out, or its output cannot be collected.
    fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Utf8Path,
        timeout: Duration,
    ) -> Result<Output, CommandError>;
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for std::sync::Arc<E> {
    fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Utf8Path,
        timeout: Duration,
    ) -> Result<Output, CommandError> {
        (**self).run(program, args, cwd, timeout)
    }
}

/// Executes commands on the host system.
///
/// # Examples
///
/// ```no_run
/// use apkrelay_publisher::process::{CommandExecutor, SystemCommandExecutor};
/// use camino::Utf8Path;
/// use std::time::Duration;
///
/// let output = SystemCommandExecutor.run(
///     "git",
///     &["--version".to_owned()],
///     Utf8Path::new("."),
///     Duration::from_secs(10),
/// )?;
/// assert!(output.status.success());
/// # Ok::<(), apkrelay_publisher::process::CommandError>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Utf8Path,
        timeout: Duration,
    ) -> Result<Output, CommandError> {
        let io_error = |source| CommandError::Io {
            program: program.to_owned(),
            source,
        };
        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd.as_std_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_owned(),
                source,
            })?;

        let Some(status) = child.wait_timeout(timeout).map_err(io_error)? else {
            // Deadline expired: reap the child before reporting.
            let _ = child.kill();
            let _ = child.wait();
            return Err(CommandError::TimedOut {
                program: program.to_owned(),
                timeout,
            });
        };

        let stdout = child
            .stdout
            .take()
            .map(std::io::read_to_string)
            .transpose()
            .map_err(io_error)?
            .unwrap_or_default();
        let stderr = child
            .stderr
            .take()
            .map(std::io::read_to_string)
            .transpose()
            .map_err(io_error)?
            .unwrap_or_default();

        Ok(Output {
            status,
            stdout: stdout.into_bytes(),
            stderr: stderr.into_bytes(),
        })
    }
}
