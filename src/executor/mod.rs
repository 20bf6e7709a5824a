//! Utility bundle: the capability sets steps program against
//!
//! Step bodies never reach a real process, file system or socket
//! directly; they go through the narrow per-family traits in this
//! module ([`ProcessRunner`], [`FileUtils`], [`HttpSender`]). The
//! concrete bundle composes the real implementations; the doubles in
//! [`mock`] implement the same traits so step tests stay hermetic.

pub mod files;
pub mod helpers;
pub mod http;
pub mod mock;
pub mod runner;

pub use files::{FileUtils, Files};
pub use http::{HttpClient, HttpMethod, HttpOptions, HttpResponse, HttpSender};
pub use runner::{LocalRunner, ProcessRunner, RunOptions, RunResult};

/// Per-step capability bundle handed to the step body.
pub struct UtilityBundle {
    runner: Box<dyn ProcessRunner>,
    files: Box<dyn FileUtils>,
    http: Box<dyn HttpSender>,
}

impl UtilityBundle {
    /// Composes a bundle from explicit capability implementations.
    #[must_use]
    pub fn new(
        runner: Box<dyn ProcessRunner>,
        files: Box<dyn FileUtils>,
        http: Box<dyn HttpSender>,
    ) -> Self {
        Self {
            runner,
            files,
            http,
        }
    }

    /// The standard bundle: real processes, real files, real HTTP.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(
            Box::new(LocalRunner::new()),
            Box::new(Files),
            Box::new(HttpClient::new()),
        )
    }

    /// The process runner capability.
    #[must_use]
    pub fn runner(&self) -> &dyn ProcessRunner {
        self.runner.as_ref()
    }

    /// The file system capability.
    #[must_use]
    pub fn files(&self) -> &dyn FileUtils {
        self.files.as_ref()
    }

    /// The HTTP sender capability.
    #[must_use]
    pub fn http(&self) -> &dyn HttpSender {
        self.http.as_ref()
    }
}

impl Default for UtilityBundle {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockFiles, MockHttpSender, MockRunner};
    use super::*;

    #[test]
    fn test_bundle_composes_mocks() {
        let bundle = UtilityBundle::new(
            Box::new(MockRunner::new()),
            Box::new(MockFiles::new()),
            Box::new(MockHttpSender::new()),
        );
        assert!(!bundle.files().exists(std::path::Path::new("/anything")));
    }
}
