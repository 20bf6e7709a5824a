//! Logging configuration, secret masking and the fatal hook chain
//!
//! Initializes tracing for the binary. Every line passes through a
//! masking writer that replaces values registered with the process-wide
//! [`crate::secrets::SecretRegistry`]; the mask lives at the sink, so a
//! secret learned mid-run is masked from that point on regardless of
//! which component logs it.

use crate::errors::ErrorCategory;
use crate::secrets::SecretRegistry;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Initializes logging with the specified level, masking through the
/// process-wide secret registry. Safe to call more than once; later
/// calls are ignored.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(MaskingMakeWriter::new(crate::secrets::global(), io::stderr))
        .try_init();
}

/// Writer wrapper applying the secret mask pass before each write.
pub struct MaskingWriter<W> {
    registry: &'static SecretRegistry,
    inner: W,
}

impl<W: Write> Write for MaskingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let masked = self.registry.mask(&text);
        self.inner.write_all(masked.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// `MakeWriter` composing the mask pass over any sink.
pub struct MaskingMakeWriter<M> {
    registry: &'static SecretRegistry,
    inner: M,
}

impl<M> MaskingMakeWriter<M> {
    /// Wraps a sink with the mask pass of the given registry.
    pub fn new(registry: &'static SecretRegistry, inner: M) -> Self {
        Self { registry, inner }
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for MaskingMakeWriter<M> {
    type Writer = MaskingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        MaskingWriter {
            registry: self.registry,
            inner: self.inner.make_writer(),
        }
    }
}

/// In-memory log sink for tests: hand it to a subscriber, run code,
/// read back what was logged.
#[derive(Clone, Default)]
pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CaptureWriter {
    /// Creates an empty capture buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, as lossy UTF-8.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).to_string()
    }
}

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CaptureWriter {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// The final structured record written when a step run is fatal.
#[derive(Debug, Clone)]
pub struct FatalRecord {
    /// Failing step.
    pub step: String,
    /// Correlation ID of the run.
    pub correlation_id: String,
    /// Recorded category.
    pub category: ErrorCategory,
    /// Failure message, already secret-free at the sink.
    pub message: String,
}

type FatalHook = Box<dyn Fn(&FatalRecord) + Send + Sync>;

static FATAL_HOOKS: Lazy<Mutex<Vec<FatalHook>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Registers a hook invoked when a step run turns fatal, before the
/// process exits non-zero.
pub fn register_fatal_hook(hook: impl Fn(&FatalRecord) + Send + Sync + 'static) {
    FATAL_HOOKS.lock().push(Box::new(hook));
}

/// Writes the final structured record and runs the registered hooks.
/// The lifecycle driver calls this on every fatal exit path; the caller
/// owns the actual process termination.
pub fn fire_fatal(record: &FatalRecord) {
    tracing::error!(
        step = %record.step,
        correlation_id = %record.correlation_id,
        category = %record.category,
        "fatal error: {}",
        record.message
    );
    for hook in FATAL_HOOKS.lock().iter() {
        hook(record);
    }
}
