//! Test doubles for the utility bundle capabilities
//!
//! Public, not test-gated: downstream step crates use these in their
//! own tests. Each double implements the same trait as the real
//! implementation and records what was asked of it.

use super::files::FileUtils;
use super::http::{HttpMethod, HttpOptions, HttpResponse, HttpSender};
use super::runner::{ProcessRunner, RunOptions, RunResult};
use crate::errors::StepError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A call recorded by [`MockRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Executable or shell string.
    pub command: String,
    /// Arguments passed.
    pub args: Vec<String>,
    /// Whether the call went through `run_shell`.
    pub shell: bool,
}

/// Process runner double: canned results per command, calls recorded.
#[derive(Debug, Default)]
pub struct MockRunner {
    results: Mutex<HashMap<String, RunResult>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockRunner {
    /// Creates a runner where every command succeeds with empty output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the result returned for a command or shell string.
    pub fn stub(&self, command: impl Into<String>, result: RunResult) {
        self.results.lock().insert(command.into(), result);
    }

    /// Convenience stub: exit code and stdout.
    pub fn stub_output(&self, command: impl Into<String>, exit_code: i32, stdout: &str) {
        self.stub(
            command,
            RunResult {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code,
                duration: Duration::ZERO,
            },
        );
    }

    /// Calls observed so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    fn result_for(&self, command: &str) -> RunResult {
        self.results.lock().get(command).cloned().unwrap_or(RunResult {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::ZERO,
        })
    }
}

impl ProcessRunner for MockRunner {
    fn run(
        &self,
        executable: &str,
        args: &[String],
        _options: &RunOptions,
    ) -> Result<RunResult, StepError> {
        self.calls.lock().push(RecordedCall {
            command: executable.to_string(),
            args: args.to_vec(),
            shell: false,
        });
        Ok(self.result_for(executable))
    }

    fn run_shell(&self, script: &str, _options: &RunOptions) -> Result<RunResult, StepError> {
        self.calls.lock().push(RecordedCall {
            command: script.to_string(),
            args: Vec::new(),
            shell: true,
        });
        Ok(self.result_for(script))
    }
}

/// In-memory file system double.
#[derive(Debug, Default)]
pub struct MockFiles {
    entries: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MockFiles {
    /// Creates an empty in-memory file system.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a file.
    pub fn add_file(&self, path: impl Into<PathBuf>, data: &[u8]) {
        self.entries.lock().insert(path.into(), data.to_vec());
    }
}

impl FileUtils for MockFiles {
    fn exists(&self, path: &Path) -> bool {
        self.entries.lock().contains_key(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.entries
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        String::from_utf8(self.read(path)?)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.entries.lock().insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn mkdir_all(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        self.entries
            .lock()
            .retain(|p, _| !p.starts_with(path) && p != path);
        Ok(())
    }

    fn temp_dir(&self, prefix: &str) -> io::Result<PathBuf> {
        Ok(PathBuf::from(format!(
            "/tmp/{prefix}-{}",
            uuid::Uuid::new_v4().simple()
        )))
    }

    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>> {
        let matcher = glob::Pattern::new(pattern)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        Ok(self
            .entries
            .lock()
            .keys()
            .filter(|p| matcher.matches_path(p))
            .cloned()
            .collect())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut entries = self.entries.lock();
        let data = entries
            .remove(from)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, from.display().to_string()))?;
        entries.insert(to.to_path_buf(), data);
        Ok(())
    }

    fn chmod(&self, _path: &Path, _mode: u32) -> io::Result<()> {
        Ok(())
    }
}

/// A request recorded by [`MockHttpSender`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request method.
    pub method: HttpMethod,
    /// Request URL.
    pub url: String,
    /// Request body, if any.
    pub body: Option<Vec<u8>>,
}

/// HTTP double: responses dequeued in order, requests recorded.
#[derive(Debug, Default)]
pub struct MockHttpSender {
    responses: Mutex<Vec<HttpResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockHttpSender {
    /// Creates a sender answering `200` with an empty body by default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next response.
    pub fn push_response(&self, response: HttpResponse) {
        self.responses.lock().push(response);
    }

    /// Requests observed so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    fn next_response(&self) -> HttpResponse {
        let mut responses = self.responses.lock();
        if responses.is_empty() {
            HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: Vec::new(),
            }
        } else {
            responses.remove(0)
        }
    }
}

impl HttpSender for MockHttpSender {
    fn send(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<Vec<u8>>,
        _options: &HttpOptions,
    ) -> Result<HttpResponse, StepError> {
        self.requests.lock().push(RecordedRequest {
            method,
            url: url.to_string(),
            body,
        });
        Ok(self.next_response())
    }

    fn download(&self, url: &str, target: &Path, options: &HttpOptions) -> Result<(), StepError> {
        let response = self.send(HttpMethod::Get, url, None, options)?;
        std::fs::write(target, &response.body)
            .map_err(|e| StepError::infrastructure(e.to_string()))
    }
}
