//! # Stepline - pipeline steps as CLI subcommands
//!
//! Stepline packages CI/CD pipeline steps into a single binary: every
//! registered step becomes a subcommand whose flags are derived from the
//! step's metadata. Around each step run the framework resolves layered
//! configuration, validates it, masks secrets in the log stream, hands
//! state between steps through an on-disk pipeline environment, and
//! reports telemetry.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run a step with a CLI flag
//! stepline echoStep --message "hello"
//!
//! # Layer config files below the flags
//! stepline shellExecute --defaultConfig defaults.yml --customConfig project.yml
//! ```
//!
//! ## Features
//!
//! - **Layered configuration**: CLI flags over step, stage and general
//!   config sections, over pipeline environment and secret stores, over
//!   `PIPER_*` environment variables, over metadata defaults
//! - **Secret masking**: every registered secret is replaced at the log
//!   sink, so no code path can print one
//! - **Pipeline environment**: file-backed key/value handoff between
//!   steps, scalar and structured
//! - **Telemetry**: one record per run, sealed at teardown, pluggable
//!   sinks
//!
//! ## Writing a step
//!
//! Implement [`steps::StepBody`], declare parameters and outputs in the
//! returned [`metadata::StepMetadata`], and register the step in a
//! [`steps::StepRegistry`]. The lifecycle driver does the rest.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cli;
pub mod config;
pub mod cpe;
pub mod errors;
pub mod executor;
pub mod infrastructure;
pub mod lifecycle;
pub mod metadata;
pub mod secrets;
pub mod steps;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use config::{PipelineConfig, ResolvedConfig, Resolver, ValueSource};
pub use cpe::{CommonPipelineEnvironment, CpeEntry, CpeValue, CpeWriter};
pub use errors::{ConfigurationError, ErrorCategory, FrameworkError, StepError};
pub use executor::{FileUtils, HttpSender, ProcessRunner, UtilityBundle};
pub use lifecycle::{GlobalOptions, LifecycleDriver, RunOutcome};
pub use metadata::{Parameter, StepMetadata};
pub use steps::{StepBody, StepContext, StepRegistry};

/// Version of the stepline crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
