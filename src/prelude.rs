//! Prelude module for common imports

// Step authoring surface
pub use crate::errors::{ErrorCategory, StepError};
pub use crate::metadata::{
    Alias, OutputResource, ParamCheck, ParamType, ParamValue, Parameter, ResourceReference, Scope,
    SecretSpec, StepMetadata,
};
pub use crate::steps::{StepBody, StepContext, StepRegistry};

// Framework plumbing
pub use crate::cli;
pub use crate::config::{PipelineConfig, ResolvedConfig, ValueSource};
pub use crate::cpe::{CommonPipelineEnvironment, CpeValue, CpeWriter};
pub use crate::lifecycle::{GlobalOptions, LifecycleDriver, RunOutcome};

// Utilities available to step bodies
pub use crate::executor::{
    FileUtils, HttpMethod, HttpOptions, HttpSender, ProcessRunner, RunOptions, RunResult,
    UtilityBundle,
};
