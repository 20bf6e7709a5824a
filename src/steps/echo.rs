//! Echo step
//!
//! The smallest complete step: one mandatory parameter, one declared
//! CPE output. Serves as the template new steps are written from.

use super::{StepBody, StepContext};
use crate::errors::StepError;
use crate::metadata::{OutputResource, ParamType, Parameter, StepMetadata};

/// Writes its `message` parameter to the log and to `custom/echoed`.
pub struct EchoStep;

impl StepBody for EchoStep {
    fn metadata(&self) -> StepMetadata {
        StepMetadata::new("echoStep", "Echoes a message into the pipeline environment")
            .with_parameter(
                Parameter::new("message", ParamType::String)
                    .mandatory()
                    .with_description("The message to echo"),
            )
            .with_output(OutputResource::new("custom", vec!["echoed".to_string()]))
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
        let message = ctx
            .config
            .string("message")
            .ok_or_else(|| StepError::undefined("parameter 'message' missing after validation"))?;

        tracing::info!(message = %message, "Echoing message");
        ctx.cpe
            .write_text("custom", "echoed", message)
            .map_err(|e| StepError::undefined(e.to_string()))?;
        Ok(())
    }
}
