//! File system capability
//!
//! Thin polymorphic layer over the workspace file system so step logic
//! stays testable against the in-memory double in [`crate::executor::mock`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File system capability of the utility bundle.
pub trait FileUtils: Send + Sync {
    /// Returns whether the path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Reads the file contents.
    ///
    /// # Errors
    ///
    /// Propagates the underlying I/O error.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Reads the file contents as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Propagates the underlying I/O error.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Writes the file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Propagates the underlying I/O error.
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Creates a directory and all missing parents.
    ///
    /// # Errors
    ///
    /// Propagates the underlying I/O error.
    fn mkdir_all(&self, path: &Path) -> io::Result<()>;

    /// Removes a file or directory tree, if present.
    ///
    /// # Errors
    ///
    /// Propagates the underlying I/O error.
    fn remove_all(&self, path: &Path) -> io::Result<()>;

    /// Creates a fresh temporary directory with the given prefix.
    ///
    /// # Errors
    ///
    /// Propagates the underlying I/O error.
    fn temp_dir(&self, prefix: &str) -> io::Result<PathBuf>;

    /// Expands a glob pattern into matching paths.
    ///
    /// # Errors
    ///
    /// Fails on an invalid pattern.
    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>>;

    /// Renames a file or directory.
    ///
    /// # Errors
    ///
    /// Propagates the underlying I/O error.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Sets unix permission bits; no-op on other platforms.
    ///
    /// # Errors
    ///
    /// Propagates the underlying I/O error.
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;
}

/// Real file system backing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Files;

impl FileUtils for Files {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)
    }

    fn mkdir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        if !path.exists() {
            return Ok(());
        }
        if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn temp_dir(&self, prefix: &str) -> io::Result<PathBuf> {
        let dir = std::env::temp_dir().join(format!("{prefix}-{}", uuid::Uuid::new_v4().simple()));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>> {
        let paths = glob::glob(pattern)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        Ok(paths.filter_map(Result::ok).collect())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    #[cfg(unix)]
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }

    #[cfg(not(unix))]
    fn chmod(&self, _path: &Path, _mode: u32) -> io::Result<()> {
        Ok(())
    }
}
