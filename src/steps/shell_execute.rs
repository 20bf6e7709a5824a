//! Shell execute step
//!
//! Runs an external command through the process-runner capability and
//! records its exit code in the pipeline environment. A non-zero exit
//! is surfaced as a Service failure.

use super::{StepBody, StepContext};
use crate::errors::StepError;
use crate::executor::RunOptions;
use crate::metadata::{
    OutputResource, ParamCheck, ParamType, ParamValue, Parameter, StepMetadata,
};
use std::time::Duration;

/// Runs `command` via the utility bundle's process runner.
pub struct ShellExecuteStep;

impl StepBody for ShellExecuteStep {
    fn metadata(&self) -> StepMetadata {
        StepMetadata::new("shellExecute", "Runs a command and records its exit code")
            .with_parameter(
                Parameter::new("command", ParamType::String)
                    .mandatory()
                    .with_check(ParamCheck::NonEmpty)
                    .with_description("Command line to run, split shell-style"),
            )
            .with_parameter(
                Parameter::new("timeoutSeconds", ParamType::Integer)
                    .with_default(ParamValue::Integer(0))
                    .with_description("Kill the command after this many seconds; 0 means no limit"),
            )
            .with_output(OutputResource::new("custom", vec!["exitCode".to_string()]))
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
        let command = ctx
            .config
            .string("command")
            .ok_or_else(|| StepError::undefined("parameter 'command' missing after validation"))?;
        let words = shell_words::split(command)
            .map_err(|e| StepError::new(crate::errors::ErrorCategory::Configuration, format!(
                "cannot parse command '{command}': {e}"
            )))?;
        let (executable, args) = words
            .split_first()
            .ok_or_else(|| StepError::undefined("empty command after parsing"))?;

        let mut options = RunOptions::new();
        let timeout = ctx.config.integer("timeoutSeconds").unwrap_or(0);
        if timeout > 0 {
            options = options.with_timeout(Duration::from_secs(timeout.unsigned_abs()));
        }

        let result = ctx.utils.runner().run(executable, args, &options)?;
        ctx.cpe
            .write_text("custom", "exitCode", result.exit_code.to_string())
            .map_err(|e| StepError::undefined(e.to_string()))?;
        ctx.telemetry
            .set_custom_numbered(1, "exitCode", &result.exit_code.to_string());

        if result.is_success() {
            Ok(())
        } else {
            Err(StepError::service(format!(
                "'{executable}' exited with code {}",
                result.exit_code
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResolvedConfig, ValueSource};
    use crate::cpe::{CpeValue, CpeWriter};
    use crate::errors::ErrorCategory;
    use crate::executor::UtilityBundle;
    use crate::executor::mock::{MockFiles, MockHttpSender, MockRunner};
    use crate::infrastructure::TelemetryRecord;
    use pretty_assertions::assert_eq;

    use std::sync::Arc;

    fn run_with(command: &str, runner: Arc<MockRunner>) -> (Result<(), StepError>, CpeWriter) {
        let step = ShellExecuteStep;
        let mut config = ResolvedConfig::empty("shellExecute");
        config.set(
            "command",
            ParamValue::Text(command.to_string()),
            ValueSource::CliFlag,
        );
        let mut telemetry = TelemetryRecord::new("shellExecute", "corr");
        let mut cpe = CpeWriter::for_step(&step.metadata());
        let utils = UtilityBundle::new(
            Box::new(runner),
            Box::new(MockFiles::new()),
            Box::new(MockHttpSender::new()),
        );
        let category = crate::errors::CategoryCell::new();
        let result = step.run(&mut StepContext {
            config: &config,
            telemetry: &mut telemetry,
            cpe: &mut cpe,
            utils: &utils,
            category: &category,
        });
        (result, cpe)
    }

    #[test]
    fn test_successful_command_records_exit_code() {
        let runner = Arc::new(MockRunner::new());
        runner.stub_output("git", 0, "ok\n");

        let (result, cpe) = run_with("git status --short", Arc::clone(&runner));
        result.unwrap();
        assert_eq!(cpe.entries()[0].value, CpeValue::Text("0".to_string()));
    }

    #[test]
    fn test_non_zero_exit_is_service_failure() {
        let runner = Arc::new(MockRunner::new());
        runner.stub_output("make", 2, "");

        let (result, cpe) = run_with("make all", Arc::clone(&runner));
        let err = result.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Service);
        // The exit code is still recorded for downstream steps.
        assert_eq!(cpe.entries()[0].value, CpeValue::Text("2".to_string()));
    }

    #[test]
    fn test_command_is_split_shell_style() {
        let runner = Arc::new(MockRunner::new());
        let (result, _cpe) = run_with("printf '%s %s' a b", Arc::clone(&runner));
        result.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].command, "printf");
        assert_eq!(
            calls[0].args,
            vec!["%s %s".to_string(), "a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_unparsable_command_is_configuration_failure() {
        let (result, _cpe) = run_with("echo 'unterminated", Arc::new(MockRunner::new()));
        assert_eq!(result.unwrap_err().category, ErrorCategory::Configuration);
    }
}
