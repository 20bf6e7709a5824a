//! Command line surface
//!
//! One subcommand per registered step, with the per-step flags derived
//! at runtime from the step's metadata. Global flags control the
//! framework plumbing and are accepted before or after the subcommand.
//!
//! Flag parsing is deliberately permissive about types: every per-step
//! flag takes a string value, and coercion into the declared parameter
//! type happens in the resolver so that a bad value is reported
//! alongside every other configuration violation instead of as a bare
//! parse error.

use crate::infrastructure::logging::init_logging;
use crate::lifecycle::{GlobalOptions, LifecycleDriver};
use crate::steps::StepRegistry;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

/// Builds the full command tree for the given registry.
#[must_use]
pub fn build_cli(registry: &StepRegistry) -> Command {
    let mut cli = Command::new("stepline")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs pipeline steps with layered configuration")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at debug level"),
        )
        .arg(
            Arg::new("correlationID")
                .long("correlationID")
                .global(true)
                .help("Correlation ID attached to logs and telemetry"),
        )
        .arg(
            Arg::new("noTelemetry")
                .long("noTelemetry")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Disable telemetry emission"),
        )
        .arg(
            Arg::new("customConfig")
                .long("customConfig")
                .global(true)
                .help("Config file overlaying the defaults"),
        )
        .arg(
            Arg::new("defaultConfig")
                .long("defaultConfig")
                .global(true)
                .action(ArgAction::Append)
                .help("Default config file; repeatable, merged in order"),
        )
        .arg(
            Arg::new("stageName")
                .long("stageName")
                .global(true)
                .help("Stage consulted for stages.<name> config values"),
        )
        .arg(
            Arg::new("envRootPath")
                .long("envRootPath")
                .global(true)
                .default_value(".")
                .help("Workspace root holding the pipeline environment"),
        );

    for step in registry.steps() {
        let mut sub = Command::new(step.metadata.name.clone()).about(step.metadata.description.clone());
        for param in &step.metadata.parameters {
            let mut arg = Arg::new(param.name.clone())
                .long(param.name.clone())
                .help(param.description.clone());
            for alias in &param.aliases {
                arg = arg.alias(alias.name.clone());
            }
            sub = sub.arg(arg);
        }
        cli = cli.subcommand(sub);
    }
    cli
}

/// Parses `std::env::args` and runs the selected step.
#[must_use]
pub fn run(registry: &StepRegistry) -> ExitCode {
    let matches = build_cli(registry).get_matches();
    ExitCode::from(dispatch(registry, &matches))
}

/// Parses the given argument list and runs the selected step; parse
/// errors print to stderr and yield clap's usage exit code.
pub fn run_from<I, T>(registry: &StepRegistry, args: I) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match build_cli(registry).try_get_matches_from(args) {
        Ok(matches) => dispatch(registry, &matches),
        Err(err) => {
            let _ = err.print();
            2
        }
    }
}

fn dispatch(registry: &StepRegistry, matches: &ArgMatches) -> u8 {
    let options = global_options(matches);
    init_logging(if options.verbose { "debug" } else { "info" });

    let Some((step_name, sub)) = matches.subcommand() else {
        // subcommand_required makes this unreachable from parsing.
        return 2;
    };
    let flags = step_flags(registry, step_name, sub);

    let driver = LifecycleDriver::new(registry, options);
    let outcome = driver.run(step_name, flags);
    u8::try_from(outcome.exit_code).unwrap_or(1)
}

fn global_options(matches: &ArgMatches) -> GlobalOptions {
    GlobalOptions {
        verbose: matches.get_flag("verbose"),
        correlation_id: matches.get_one::<String>("correlationID").cloned(),
        no_telemetry: matches.get_flag("noTelemetry"),
        custom_config: matches.get_one::<String>("customConfig").map(PathBuf::from),
        default_configs: matches
            .get_many::<String>("defaultConfig")
            .map(|paths| paths.map(PathBuf::from).collect())
            .unwrap_or_default(),
        stage_name: matches.get_one::<String>("stageName").cloned(),
        env_root_path: matches
            .get_one::<String>("envRootPath")
            .map_or_else(|| PathBuf::from("."), PathBuf::from),
    }
}

/// Collects the flags the user actually passed, keyed by canonical
/// parameter name. Alias spellings land under the canonical name.
fn step_flags(registry: &StepRegistry, step_name: &str, sub: &ArgMatches) -> HashMap<String, String> {
    let mut flags = HashMap::new();
    if let Some(step) = registry.get(step_name) {
        for param in &step.metadata.parameters {
            if let Some(value) = sub.get_one::<String>(&param.name) {
                flags.insert(param.name.clone(), value.clone());
            }
        }
    }
    flags
}
