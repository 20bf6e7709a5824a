//! Process runner capability
//!
//! Runs external executables and shell pipelines for step bodies.
//! Output is streamed line by line through the logger, so the secret
//! mask pass applies to tool output as well. A non-zero exit code is a
//! result, not an error; the step decides what it means. Errors are
//! reserved for spawn and I/O failures.

use crate::errors::StepError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-call options for the process runner.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory; inherits the process cwd when unset.
    pub cwd: Option<PathBuf>,
    /// Environment entries appended to the inherited environment.
    pub env: Vec<(String, String)>,
    /// Maximum wall-clock time; the child is killed on expiry.
    pub timeout: Option<Duration>,
}

impl RunOptions {
    /// Options inheriting everything from the current process.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Appends an environment entry.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of one process run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit code; `-1` when the child was killed by a signal.
    pub exit_code: i32,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl RunResult {
    /// Returns true if the child exited with code 0.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Process execution capability of the utility bundle.
pub trait ProcessRunner: Send + Sync {
    /// Runs a named executable with arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`StepError`] with category Infrastructure when the
    /// child cannot be spawned or its output cannot be read, and when
    /// the per-call timeout expires.
    fn run(
        &self,
        executable: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<RunResult, StepError>;

    /// Runs a shell pipeline via `<shell> -c`.
    ///
    /// # Errors
    ///
    /// Same contract as [`ProcessRunner::run`].
    fn run_shell(&self, script: &str, options: &RunOptions) -> Result<RunResult, StepError>;
}

impl<T: ProcessRunner> ProcessRunner for Arc<T> {
    fn run(
        &self,
        executable: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<RunResult, StepError> {
        T::run(self, executable, args, options)
    }

    fn run_shell(&self, script: &str, options: &RunOptions) -> Result<RunResult, StepError> {
        T::run_shell(self, script, options)
    }
}

/// Runner executing on the host system.
#[derive(Debug, Clone)]
pub struct LocalRunner {
    shell: String,
    base_env: HashMap<String, String>,
}

impl LocalRunner {
    /// Creates a runner using `sh` for shell pipelines.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
            base_env: HashMap::new(),
        }
    }

    /// Sets the shell used for pipelines.
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Adds an environment entry applied to every run.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_env.insert(key.into(), value.into());
        self
    }

    fn execute(
        &self,
        executable: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<RunResult, StepError> {
        let start = Instant::now();
        tracing::debug!(executable = %executable, "Running external command");

        let mut cmd = Command::new(executable);
        cmd.args(args);
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(&self.base_env);
        cmd.envs(options.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            StepError::infrastructure(format!("failed to start '{executable}': {e}"))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            StepError::infrastructure(format!("no stdout pipe for '{executable}'"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            StepError::infrastructure(format!("no stderr pipe for '{executable}'"))
        })?;

        let stdout_buf = Arc::new(Mutex::new(String::new()));
        let stderr_buf = Arc::new(Mutex::new(String::new()));

        // Output goes through tracing so the secret mask pass at the
        // sink covers tool output too.
        let stdout_thread = {
            let buf = Arc::clone(&stdout_buf);
            std::thread::spawn(move || {
                for line in io::BufReader::new(stdout).lines().map_while(Result::ok) {
                    tracing::info!(stream = "stdout", "{line}");
                    let mut guard = buf.lock();
                    guard.push_str(&line);
                    guard.push('\n');
                }
            })
        };
        let stderr_thread = {
            let buf = Arc::clone(&stderr_buf);
            std::thread::spawn(move || {
                for line in io::BufReader::new(stderr).lines().map_while(Result::ok) {
                    tracing::info!(stream = "stderr", "{line}");
                    let mut guard = buf.lock();
                    guard.push_str(&line);
                    guard.push('\n');
                }
            })
        };

        let status = match options.timeout {
            None => child
                .wait()
                .map_err(|e| StepError::infrastructure(e.to_string()))?,
            Some(timeout) => loop {
                match child.try_wait() {
                    Ok(Some(status)) => break status,
                    Ok(None) if start.elapsed() >= timeout => {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = stdout_thread.join();
                        let _ = stderr_thread.join();
                        return Err(StepError::infrastructure(format!(
                            "'{executable}' timed out after {timeout:?}"
                        )));
                    }
                    Ok(None) => std::thread::sleep(Duration::from_millis(20)),
                    Err(e) => return Err(StepError::infrastructure(e.to_string())),
                }
            },
        };

        let _ = stdout_thread.join();
        let _ = stderr_thread.join();

        let result = RunResult {
            stdout: stdout_buf.lock().clone(),
            stderr: stderr_buf.lock().clone(),
            exit_code: status.code().unwrap_or(-1),
            duration: start.elapsed(),
        };
        tracing::debug!(
            executable = %executable,
            exit_code = result.exit_code,
            duration_ms = u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            "Command finished"
        );
        Ok(result)
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner for LocalRunner {
    fn run(
        &self,
        executable: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<RunResult, StepError> {
        self.execute(executable, args, options)
    }

    fn run_shell(&self, script: &str, options: &RunOptions) -> Result<RunResult, StepError> {
        self.execute(&self.shell, &["-c".to_string(), script.to_string()], options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_run_captures_stdout_and_exit_code() {
        let runner = LocalRunner::new();
        let result = runner
            .run(
                "sh",
                &["-c".to_string(), "echo hello".to_string()],
                &RunOptions::new(),
            )
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.is_success());
        assert_eq!(result.stdout, "hello\n");
    }

    #[test]
    fn test_non_zero_exit_is_a_result_not_an_error() {
        let runner = LocalRunner::new();
        let result = runner
            .run_shell("echo oops >&2; exit 3", &RunOptions::new())
            .unwrap();
        assert_eq!(result.exit_code, 3);
        assert!(!result.is_success());
        assert_eq!(result.stderr, "oops\n");
    }

    #[test]
    fn test_missing_executable_is_infrastructure_error() {
        let runner = LocalRunner::new();
        let err = runner
            .run("definitely-not-a-binary-qq", &[], &RunOptions::new())
            .unwrap_err();
        assert_eq!(err.category, crate::errors::ErrorCategory::Infrastructure);
    }

    #[test]
    fn test_env_append_reaches_child() {
        let runner = LocalRunner::new();
        let result = runner
            .run_shell(
                "printf '%s' \"$STEP_TEST_VAR\"",
                &RunOptions::new().with_env("STEP_TEST_VAR", "42"),
            )
            .unwrap();
        assert_eq!(result.stdout, "42");
    }

    #[test]
    fn test_cwd_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let runner = LocalRunner::new();
        let result = runner
            .run_shell("pwd", &RunOptions::new().with_cwd(dir.path()))
            .unwrap();
        let reported = result.stdout.trim();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(reported).canonicalize().unwrap(),
            expected
        );
    }

    #[test]
    fn test_timeout_kills_the_child() {
        let runner = LocalRunner::new();
        let err = runner
            .run_shell(
                "sleep 5",
                &RunOptions::new().with_timeout(Duration::from_millis(100)),
            )
            .unwrap_err();
        assert!(err.message.contains("timed out"));
    }
}
