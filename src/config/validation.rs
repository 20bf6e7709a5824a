//! Parameter validation
//!
//! Runs after resolution and before the step body. Every check is
//! enforced and every violation is collected, so one error names all
//! problems at once: missing mandatory parameters, type mismatches
//! surviving coercion, and failed metadata predicates.

use crate::config::ResolvedConfig;
use crate::errors::ConfigurationError;
use crate::metadata::{ParamCheck, StepMetadata};

/// Validates the resolved configuration against the step's metadata.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] listing every violation.
pub fn validate(metadata: &StepMetadata, config: &ResolvedConfig) -> Result<(), ConfigurationError> {
    let mut violations = Vec::new();

    for param in &metadata.parameters {
        let Some(value) = config.value(&param.name) else {
            if param.mandatory {
                violations.push(format!("mandatory parameter '{}' is not set", param.name));
            }
            continue;
        };

        if value.param_type() != param.param_type {
            violations.push(format!(
                "parameter '{}': expected {}, got {}",
                param.name,
                param.param_type,
                value.param_type()
            ));
            continue;
        }

        for check in &param.checks {
            if let Some(violation) = check_value(&param.name, check, value.as_str()) {
                violations.push(violation);
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConfigurationError {
            step: metadata.name.clone(),
            violations,
        })
    }
}

fn check_value(name: &str, check: &ParamCheck, text: Option<&str>) -> Option<String> {
    match check {
        ParamCheck::NonEmpty => match text {
            Some("") => Some(format!("parameter '{name}' must not be empty")),
            _ => None,
        },
        ParamCheck::OneOf(candidates) => match text {
            Some(value) if !candidates.iter().any(|c| c == value) => Some(format!(
                "parameter '{name}' must be one of [{}], got '{value}'",
                candidates.join(", ")
            )),
            _ => None,
        },
        ParamCheck::Matches(pattern) => {
            let regex = match regex::Regex::new(pattern) {
                Ok(regex) => regex,
                Err(err) => {
                    return Some(format!(
                        "parameter '{name}' has an invalid pattern check '{pattern}': {err}"
                    ));
                }
            };
            match text {
                Some(value) if !regex.is_match(value) => Some(format!(
                    "parameter '{name}' must match '{pattern}', got '{value}'"
                )),
                _ => None,
            }
        }
    }
}
