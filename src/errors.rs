//! Error types and error categorization for step runs
//!
//! Every failing step run carries exactly one [`ErrorCategory`]. The
//! category is coarse by design: it feeds dashboards and alerting, not
//! debugging. Each run owns a first-writer-wins [`CategoryCell`] so that
//! the code path closest to the root cause decides the bucket; step
//! bodies reach it through the step context.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coarse failure bucket attached to a step run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Category was never set.
    Undefined,
    /// Missing/invalid parameter, bad config file, unknown step.
    Configuration,
    /// Compilation or assembly failure inside the step's domain.
    Build,
    /// A remote service returned an error (HTTP 4xx/5xx, tool non-zero).
    Service,
    /// Underlying OS or network failure (DNS, TLS, disk full).
    Infrastructure,
    /// A test run reported failures.
    Test,
    /// Policy or gate violation.
    Compliance,
    /// Step-specific, none of the above.
    Custom,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undefined => "Undefined",
            Self::Configuration => "Configuration",
            Self::Build => "Build",
            Self::Service => "Service",
            Self::Infrastructure => "Infrastructure",
            Self::Test => "Test",
            Self::Compliance => "Compliance",
            Self::Custom => "Custom",
        };
        write!(f, "{name}")
    }
}

/// First-writer-wins cell holding the category of the current run.
#[derive(Debug, Default)]
pub struct CategoryCell(Mutex<Option<ErrorCategory>>);

impl CategoryCell {
    /// Creates an empty cell.
    #[must_use]
    pub const fn new() -> Self {
        Self(Mutex::new(None))
    }

    /// Sets the category. Only the first set per run takes effect;
    /// returns whether this call was the one that stuck.
    pub fn set(&self, category: ErrorCategory) -> bool {
        let mut guard = self.0.lock();
        if guard.is_none() {
            *guard = Some(category);
            true
        } else {
            false
        }
    }

    /// Returns the recorded category, or `Undefined` if none was set.
    #[must_use]
    pub fn get(&self) -> ErrorCategory {
        self.0.lock().unwrap_or(ErrorCategory::Undefined)
    }

    /// Clears the cell.
    pub fn reset(&self) {
        *self.0.lock() = None;
    }
}

/// Invalid configuration for one step, with every violation collected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationError {
    /// Step whose configuration is invalid.
    pub step: String,
    /// Human-readable violations, one per failed check.
    pub violations: Vec<String>,
}

impl ConfigurationError {
    /// Creates a configuration error with a single violation.
    #[must_use]
    pub fn new(step: impl Into<String>, violation: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            violations: vec![violation.into()],
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid configuration for step '{}': {}",
            self.step,
            self.violations.join("; ")
        )
    }
}

/// Typed failure signalled by a step body.
///
/// Carries the category the step diagnosed; `Undefined` when the body
/// could not tell. The lifecycle driver records the category and turns
/// the error into a non-zero exit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StepError {
    /// Failure bucket diagnosed by the step.
    pub category: ErrorCategory,
    /// Human-readable description.
    pub message: String,
}

impl StepError {
    /// Creates a step error with an explicit category.
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    /// A failure whose cause the step could not classify.
    #[must_use]
    pub fn undefined(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Undefined, message)
    }

    /// A remote service failure.
    #[must_use]
    pub fn service(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Service, message)
    }

    /// An OS or network level failure.
    #[must_use]
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Infrastructure, message)
    }

    /// A build failure inside the step's domain.
    #[must_use]
    pub fn build(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Build, message)
    }
}

impl From<std::io::Error> for StepError {
    fn from(err: std::io::Error) -> Self {
        Self::infrastructure(err.to_string())
    }
}

/// Errors surfaced by the framework itself, outside any step body.
#[derive(Error, Debug)]
pub enum FrameworkError {
    /// The invoked step name is not registered.
    #[error("unknown step '{0}'")]
    UnknownStep(String),

    /// Configuration resolution or validation failed.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The step body signalled a typed failure.
    #[error("step '{step}' failed: {source}")]
    Step {
        /// Name of the failing step.
        step: String,
        /// The failure the body signalled.
        source: StepError,
    },

    /// The step body panicked; the panic was contained by the driver.
    #[error("step '{step}' panicked: {message}")]
    Panic {
        /// Name of the failing step.
        step: String,
        /// Panic payload rendered as text.
        message: String,
    },

    /// A teardown stage failed severely enough to fail the run.
    #[error("teardown failed: {0}")]
    Teardown(String),
}

impl FrameworkError {
    /// The category this framework error implies.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownStep(_) | Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Step { source, .. } => source.category,
            Self::Panic { .. } => ErrorCategory::Undefined,
            Self::Teardown(_) => ErrorCategory::Infrastructure,
        }
    }
}
