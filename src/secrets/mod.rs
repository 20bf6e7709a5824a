//! Secret registry and scrubber
//!
//! The registry is process-wide: every secret value the resolver or a
//! step body learns is appended here, and the logging sink masks those
//! values out of every line written afterwards. Secret files are
//! scheduled here and deleted at teardown.
//!
//! Masking happens at the log sink, not at call sites, so any component
//! is covered without knowing which values are sensitive.

pub mod stores;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// Token substituted for secret values in log output.
pub const MASK: &str = "****";

#[derive(Debug, Default)]
struct Inner {
    secrets: Vec<String>,
    files: Vec<PathBuf>,
}

/// Append-only set of live secret values plus files scheduled for
/// deletion at teardown.
#[derive(Debug, Default)]
pub struct SecretRegistry {
    inner: Mutex<Inner>,
}

impl SecretRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                secrets: Vec::new(),
                files: Vec::new(),
            }),
        }
    }

    /// Adds a secret value. Every log line emitted after this call has
    /// occurrences of the value replaced by [`MASK`].
    ///
    /// Empty values are ignored; masking the empty string would mangle
    /// every line.
    pub fn register_secret(&self, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        if !inner.secrets.contains(&value) {
            inner.secrets.push(value);
        }
    }

    /// Schedules a file for best-effort deletion at teardown.
    pub fn register_secret_file(&self, path: impl Into<PathBuf>) {
        self.inner.lock().files.push(path.into());
    }

    /// Replaces every registered secret occurring in `text` with [`MASK`].
    #[must_use]
    pub fn mask(&self, text: &str) -> String {
        let inner = self.inner.lock();
        let mut out = text.to_string();
        for secret in &inner.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), MASK);
            }
        }
        out
    }

    /// Returns whether any secret is currently registered.
    #[must_use]
    pub fn has_secrets(&self) -> bool {
        !self.inner.lock().secrets.is_empty()
    }

    /// Deletes all scheduled secret files, best-effort. Failures are
    /// logged and do not propagate; the schedule is cleared either way.
    pub fn scrub_all(&self) {
        let files = std::mem::take(&mut self.inner.lock().files);
        for path in files {
            if let Err(err) = remove_if_present(&path) {
                tracing::warn!(path = %path.display(), error = %err, "Failed to remove secret file");
            }
        }
    }
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

static GLOBAL: Lazy<SecretRegistry> = Lazy::new(SecretRegistry::new);

/// The process-wide registry the logging sink masks through.
#[must_use]
pub fn global() -> &'static SecretRegistry {
    &GLOBAL
}
