//! Common Pipeline Environment (CPE)
//!
//! On-disk key/value store shared between steps running in the same
//! workspace. Layout below `<envRootPath>/commonPipelineEnvironment/`:
//! one directory per category, one file per entry. Scalars are plain
//! text files named after the entry, structured values carry a `.json`
//! suffix. Unknown files in the tree are ignored.
//!
//! Writes are atomic per key (temp file in the same directory, then
//! rename) and happen only through a [`CpeWriter`] restricted to the
//! resources the step declared.

use crate::metadata::StepMetadata;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory name below the environment root.
pub const CPE_DIR: &str = "commonPipelineEnvironment";

/// A value stored in the CPE.
#[derive(Debug, Clone, PartialEq)]
pub enum CpeValue {
    /// Scalar text, stored as a plain file.
    Text(String),
    /// Structured value, stored with a `.json` suffix.
    Json(serde_json::Value),
}

/// One (category, name, value) tuple scheduled for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct CpeEntry {
    /// Category directory.
    pub category: String,
    /// Entry name within the category.
    pub name: String,
    /// Value to write.
    pub value: CpeValue,
}

/// Errors raised by CPE operations.
#[derive(Error, Debug)]
pub enum CpeError {
    /// A step wrote a key missing from its declared OutputResources.
    #[error("step '{step}' did not declare CPE output '{category}/{name}'")]
    UndeclaredKey {
        /// Writing step.
        step: String,
        /// Category of the refused write.
        category: String,
        /// Name of the refused write.
        name: String,
    },

    /// One or more keys failed to persist; the rest were written.
    #[error("failed to persist {} CPE entr(ies): {}", errors.len(), errors.join("; "))]
    Persist {
        /// One message per failed key.
        errors: Vec<String>,
    },
}

/// Handle on the workspace CPE tree.
#[derive(Debug, Clone)]
pub struct CommonPipelineEnvironment {
    base: PathBuf,
}

impl CommonPipelineEnvironment {
    /// Opens the CPE below the given environment root. Nothing is
    /// created until the first write.
    #[must_use]
    pub fn new(env_root: impl Into<PathBuf>) -> Self {
        Self {
            base: env_root.into().join(CPE_DIR),
        }
    }

    /// Root directory of the CPE tree.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Loads the entry at `category/name`.
    ///
    /// A plain file wins over a `.json` sibling. Absent files mean the
    /// value is unset. A present but malformed `.json` file is treated
    /// as absent and logged at warn level; it must not fail a step on
    /// its own.
    #[must_use]
    pub fn load(&self, category: &str, name: &str) -> Option<CpeValue> {
        let scalar = self.base.join(category).join(name);
        if scalar.is_file() {
            return match fs::read_to_string(&scalar) {
                Ok(text) => Some(CpeValue::Text(text)),
                Err(err) => {
                    tracing::warn!(path = %scalar.display(), error = %err, "Failed to read CPE entry");
                    None
                }
            };
        }

        let structured = self.base.join(category).join(format!("{name}.json"));
        if structured.is_file() {
            let text = match fs::read_to_string(&structured) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(path = %structured.display(), error = %err, "Failed to read CPE entry");
                    return None;
                }
            };
            return match serde_json::from_str(&text) {
                Ok(value) => Some(CpeValue::Json(value)),
                Err(err) => {
                    tracing::warn!(path = %structured.display(), error = %err, "Malformed JSON in CPE entry, treating as unset");
                    None
                }
            };
        }

        None
    }

    /// Persists a batch of entries, atomically per key.
    ///
    /// A failure writing one key does not abort the remainder.
    ///
    /// # Errors
    ///
    /// Returns [`CpeError::Persist`] carrying every per-key failure.
    pub fn persist(&self, entries: &[CpeEntry]) -> Result<(), CpeError> {
        let mut errors = Vec::new();
        for entry in entries {
            if let Err(err) = self.persist_one(entry) {
                errors.push(format!("{}/{}: {err}", entry.category, entry.name));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CpeError::Persist { errors })
        }
    }

    fn persist_one(&self, entry: &CpeEntry) -> std::io::Result<()> {
        let dir = self.base.join(&entry.category);
        fs::create_dir_all(&dir)?;
        let (file_name, bytes) = match &entry.value {
            CpeValue::Text(text) => (entry.name.clone(), text.clone().into_bytes()),
            CpeValue::Json(value) => (
                format!("{}.json", entry.name),
                serde_json::to_vec(value).map_err(std::io::Error::other)?,
            ),
        };
        write_atomic(&dir.join(file_name), &bytes)
    }
}

/// Writes via temp file plus rename; the target is never truncated in
/// place.
fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = target
        .parent()
        .ok_or_else(|| std::io::Error::other("target has no parent directory"))?;
    let tmp = dir.join(format!(
        ".{}.tmp-{}",
        target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("entry"),
        uuid::Uuid::new_v4().simple()
    ));
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    match fs::rename(&tmp, target) {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            Err(err)
        }
    }
}

/// Write handle restricted to the step's declared OutputResources.
///
/// Writes are buffered; the lifecycle driver flushes them to disk at
/// teardown so downstream steps observe them only after this step ends.
#[derive(Debug)]
pub struct CpeWriter {
    step: String,
    allowed: HashSet<(String, String)>,
    entries: Vec<CpeEntry>,
}

impl CpeWriter {
    /// Creates a writer allowing exactly the metadata's OutputResources.
    #[must_use]
    pub fn for_step(metadata: &StepMetadata) -> Self {
        let mut allowed = HashSet::new();
        for output in &metadata.outputs {
            for name in &output.names {
                allowed.insert((output.category.clone(), name.clone()));
            }
        }
        Self {
            step: metadata.name.clone(),
            allowed,
            entries: Vec::new(),
        }
    }

    /// Buffers a scalar write.
    ///
    /// # Errors
    ///
    /// Returns [`CpeError::UndeclaredKey`] when the key is missing from
    /// the step's OutputResources.
    pub fn write_text(
        &mut self,
        category: &str,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), CpeError> {
        self.write(category, name, CpeValue::Text(value.into()))
    }

    /// Buffers a structured write.
    ///
    /// # Errors
    ///
    /// Returns [`CpeError::UndeclaredKey`] when the key is missing from
    /// the step's OutputResources.
    pub fn write_json(
        &mut self,
        category: &str,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), CpeError> {
        self.write(category, name, CpeValue::Json(value))
    }

    fn write(&mut self, category: &str, name: &str, value: CpeValue) -> Result<(), CpeError> {
        if !self
            .allowed
            .contains(&(category.to_string(), name.to_string()))
        {
            return Err(CpeError::UndeclaredKey {
                step: self.step.clone(),
                category: category.to_string(),
                name: name.to_string(),
            });
        }
        // Last write to a key wins within the run.
        self.entries
            .retain(|e| !(e.category == category && e.name == name));
        self.entries.push(CpeEntry {
            category: category.to_string(),
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    /// Buffered entries, in write order.
    #[must_use]
    pub fn entries(&self) -> &[CpeEntry] {
        &self.entries
    }

    /// Drains the buffered entries for the teardown flush.
    pub(crate) fn take_entries(&mut self) -> Vec<CpeEntry> {
        std::mem::take(&mut self.entries)
    }
}
