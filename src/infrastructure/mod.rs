//! Infrastructure layer
//!
//! Process-wide facilities: structured logging with secret masking at
//! the sink, the fatal hook chain, and the telemetry pipeline.

pub mod logging;
pub mod telemetry;

pub use logging::{CaptureWriter, FatalRecord, init_logging, register_fatal_hook};
pub use telemetry::{FileSink, LogSink, Telemetry, TelemetryRecord, TelemetrySink};
