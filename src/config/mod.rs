//! Layered pipeline configuration
//!
//! The config file is a YAML document with `general`, `stages` and
//! `steps` sections. Several default config files can be layered below
//! one custom config; later defaults override earlier ones and the
//! custom file overrides them all. Resolution order across sections and
//! the other sources lives in [`resolver`].

pub mod resolver;
pub mod validation;

pub use resolver::{ResolvedConfig, Resolver, ValueSource};

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Values of one config section, keyed by parameter name.
pub type Section = HashMap<String, serde_json::Value>;

/// Parsed pipeline configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Values applying to every step.
    pub general: Section,
    /// Per-stage overrides, keyed by stage name.
    pub stages: HashMap<String, Section>,
    /// Per-step overrides, keyed by step name.
    pub steps: HashMap<String, Section>,
}

impl PipelineConfig {
    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] when the document is not valid
    /// YAML or does not match the `general`/`stages`/`steps` shape.
    pub fn from_yaml(step: &str, text: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(text)
            .map_err(|err| ConfigurationError::new(step, format!("invalid config file: {err}")))
    }

    /// Reads and parses a config file from disk.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] when the file cannot be read or
    /// parsed.
    pub fn from_file(step: &str, path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            ConfigurationError::new(
                step,
                format!("cannot read config file '{}': {err}", path.display()),
            )
        })?;
        Self::from_yaml(step, &text)
    }

    /// Builds the effective configuration from default config files
    /// (merged in the order given) overlaid by an optional custom file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for the first unreadable or
    /// unparsable file.
    pub fn layered(
        step: &str,
        default_paths: &[std::path::PathBuf],
        custom_path: Option<&Path>,
    ) -> Result<Self, ConfigurationError> {
        let mut merged = Self::default();
        for path in default_paths {
            merged.merge_over(Self::from_file(step, path)?);
        }
        if let Some(path) = custom_path {
            merged.merge_over(Self::from_file(step, path)?);
        }
        Ok(merged)
    }

    /// Overlays `other` on top of this configuration, key by key.
    /// Map-valued keys present on both sides deep-merge instead of
    /// replacing, so a custom file can add one nested entry without
    /// restating the rest.
    pub fn merge_over(&mut self, other: Self) {
        merge_section(&mut self.general, other.general);
        for (stage, section) in other.stages {
            merge_section(self.stages.entry(stage).or_default(), section);
        }
        for (step, section) in other.steps {
            merge_section(self.steps.entry(step).or_default(), section);
        }
    }

    /// The `steps.<name>` section, if present.
    #[must_use]
    pub fn step_section(&self, step: &str) -> Option<&Section> {
        self.steps.get(step)
    }

    /// The `stages.<name>` section, if present.
    #[must_use]
    pub fn stage_section(&self, stage: &str) -> Option<&Section> {
        self.stages.get(stage)
    }
}

fn merge_section(base: &mut Section, overlay: Section) {
    for (key, value) in overlay {
        match base.get_mut(&key) {
            Some(existing) => crate::executor::helpers::merge_json(existing, &value),
            None => {
                base.insert(key, value);
            }
        }
    }
}
