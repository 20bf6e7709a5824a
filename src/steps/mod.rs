//! Step body contract and registry
//!
//! A step body receives its validated configuration, a telemetry handle
//! for custom fields, a CPE writer restricted to its declared outputs
//! and the utility bundle. It returns normally on success or signals a
//! typed [`StepError`] carrying the failure category.
//!
//! The registry pairs each body with its metadata; the CLI derives the
//! subcommand surface from it and the lifecycle driver looks steps up
//! by name.

pub mod echo;
pub mod shell_execute;

pub use echo::EchoStep;
pub use shell_execute::ShellExecuteStep;

use crate::config::ResolvedConfig;
use crate::cpe::CpeWriter;
use crate::errors::{CategoryCell, ErrorCategory, StepError};
use crate::executor::UtilityBundle;
use crate::infrastructure::TelemetryRecord;
use crate::metadata::StepMetadata;

/// Everything a step body is handed for one run.
pub struct StepContext<'a> {
    /// Validated, typed configuration.
    pub config: &'a ResolvedConfig,
    /// Telemetry handle for custom fields.
    pub telemetry: &'a mut TelemetryRecord,
    /// CPE writer restricted to the step's declared outputs.
    pub cpe: &'a mut CpeWriter,
    /// Capability bundle for process, file and HTTP access.
    pub utils: &'a UtilityBundle,
    /// First-writer-wins failure category of this run.
    pub category: &'a CategoryCell,
}

impl StepContext<'_> {
    /// Records the failure category for this run. The first recorded
    /// category sticks; in particular it beats the category of whatever
    /// error the body later returns.
    pub fn set_error_category(&self, category: ErrorCategory) {
        self.category.set(category);
    }
}

/// One pipeline step's executable body.
pub trait StepBody: Send + Sync {
    /// The step's immutable metadata.
    fn metadata(&self) -> StepMetadata;

    /// Runs the step.
    ///
    /// # Errors
    ///
    /// Returns a [`StepError`] carrying the failure category.
    fn run(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError>;
}

/// A registered step with its metadata computed once.
pub struct RegisteredStep {
    /// The step's metadata.
    pub metadata: StepMetadata,
    /// The step's body.
    pub body: Box<dyn StepBody>,
}

/// Lookup table from step name to metadata and body.
#[derive(Default)]
pub struct StepRegistry {
    steps: Vec<RegisteredStep>,
}

impl StepRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry of steps compiled into this binary.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(EchoStep));
        registry.register(Box::new(ShellExecuteStep));
        registry
    }

    /// Adds a step.
    pub fn register(&mut self, body: Box<dyn StepBody>) {
        let metadata = body.metadata();
        self.steps.push(RegisteredStep { metadata, body });
    }

    /// Looks a step up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredStep> {
        self.steps.iter().find(|s| s.metadata.name == name)
    }

    /// All registered steps, in registration order.
    #[must_use]
    pub fn steps(&self) -> &[RegisteredStep] {
        &self.steps
    }
}
