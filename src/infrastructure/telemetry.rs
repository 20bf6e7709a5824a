//! Telemetry pipeline
//!
//! One [`TelemetryRecord`] per step run, created at entry and sealed at
//! teardown, then handed to every registered sink exactly once. Sinks
//! are best-effort: a failing sink is logged at warn level and never
//! changes the step's exit code.

use crate::errors::ErrorCategory;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Commit hash baked into the binary at build time, when available.
const COMMIT_HASH: &str = match option_env!("STEPLINE_COMMIT_HASH") {
    Some(hash) => hash,
    None => "n/a",
};

/// Per-step measurement envelope.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TelemetryRecord {
    /// Step the record measures.
    pub step_name: String,
    /// Correlation ID of the run.
    pub correlation_id: String,
    /// Step entry time, milliseconds since the unix epoch.
    pub started_at_ms: u64,
    /// Run duration in milliseconds; filled at teardown.
    pub duration_ms: u64,
    /// `"0"` on success, `"1"` on any failure.
    pub error_code: String,
    /// Recorded error category.
    pub error_category: String,
    /// Commit hash of the binary.
    pub commit_hash: String,
    /// Free-form custom fields set by the step body.
    pub custom: BTreeMap<String, String>,
}

impl TelemetryRecord {
    /// Creates a record at step entry.
    #[must_use]
    pub fn new(step_name: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        let started_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self {
            step_name: step_name.into(),
            correlation_id: correlation_id.into(),
            started_at_ms,
            duration_ms: 0,
            error_code: "0".to_string(),
            error_category: ErrorCategory::Undefined.to_string(),
            commit_hash: COMMIT_HASH.to_string(),
            custom: BTreeMap::new(),
        }
    }

    /// Seals the record at teardown with the run outcome.
    pub fn seal(&mut self, duration: Duration, failed: bool, category: ErrorCategory) {
        self.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.error_code = if failed { "1" } else { "0" }.to_string();
        self.error_category = category.to_string();
    }

    /// Sets a numbered custom field plus its label, the shape pipeline
    /// dashboards expect (`custom1`, `custom1Label`).
    pub fn set_custom_numbered(&mut self, index: u8, label: &str, value: &str) {
        self.custom
            .insert(format!("custom{index}"), value.to_string());
        self.custom
            .insert(format!("custom{index}Label"), label.to_string());
    }
}

/// A telemetry sink; best-effort, never raises past the pipeline.
pub trait TelemetrySink: Send + Sync {
    /// Accepts a sealed record.
    ///
    /// # Errors
    ///
    /// A failed side effect is reported as text; the pipeline logs it
    /// at warn level and moves on.
    fn send(&self, record: &TelemetryRecord) -> Result<(), String>;

    /// Sink name used in warn logs.
    fn name(&self) -> &str;
}

/// Sink writing the record to the structured log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn send(&self, record: &TelemetryRecord) -> Result<(), String> {
        let payload = serde_json::to_string(record).map_err(|e| e.to_string())?;
        tracing::info!(telemetry = %payload, "Step telemetry");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Sink appending one JSON line per record to a file.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// Creates a sink appending to the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TelemetrySink for FileSink {
    fn send(&self, record: &TelemetryRecord) -> Result<(), String> {
        use std::io::Write;
        let line = serde_json::to_string(record).map_err(|e| e.to_string())?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| e.to_string())?;
        writeln!(file, "{line}").map_err(|e| e.to_string())
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// The registered sinks for the current invocation.
#[derive(Default)]
pub struct Telemetry {
    sinks: Vec<Box<dyn TelemetrySink>>,
    disabled: bool,
}

impl Telemetry {
    /// A pipeline with no sinks registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A disabled pipeline; `emit` does nothing. Used for
    /// `--noTelemetry`.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            sinks: Vec::new(),
            disabled: true,
        }
    }

    /// Registers a sink.
    pub fn register_sink(&mut self, sink: Box<dyn TelemetrySink>) {
        self.sinks.push(sink);
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Hands the sealed record to every sink in registration order.
    /// Sink failures are logged at warn level and swallowed.
    pub fn emit(&self, record: &TelemetryRecord) {
        if self.disabled {
            tracing::debug!(step = %record.step_name, "Telemetry disabled, skipping emit");
            return;
        }
        for sink in &self.sinks {
            if let Err(err) = sink.send(record) {
                tracing::warn!(sink = %sink.name(), error = %err, "Telemetry sink failed");
            }
        }
    }
}
