//! stepline - run pipeline steps from the command line
//!
//! Every registered step is a subcommand; per-step flags come from the
//! step's metadata.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run a step with a CLI flag
//! stepline echoStep --message "hello"
//!
//! # Run a shell command through the framework
//! stepline shellExecute --command "make test" --stageName Build
//!
//! # Layer config files below the flags
//! stepline shellExecute --defaultConfig defaults.yml --customConfig project.yml
//! ```

use std::process::ExitCode;
use stepline::cli;
use stepline::steps::StepRegistry;

fn main() -> ExitCode {
    let registry = StepRegistry::builtin();
    cli::run(&registry)
}
