//! Step lifecycle driver
//!
//! Drives one step run through its four phases:
//!
//! ```text
//! init     start timer, correlation ID, reset category
//! prepare  load config files, resolve, register secrets, validate
//! invoke   call the step body (panics are contained)
//! teardown persist CPE, scrub secrets, send telemetry
//! ```
//!
//! Teardown runs on every exit path, in the fixed order CPE persist,
//! secret scrub, telemetry. A teardown failure can turn a success into
//! a failure but never shadows an existing failure cause.

use crate::config::{PipelineConfig, Resolver, validation};
use crate::cpe::{CommonPipelineEnvironment, CpeWriter};
use crate::errors::{CategoryCell, ErrorCategory, FrameworkError};
use crate::executor::UtilityBundle;
use crate::infrastructure::logging::{FatalRecord, fire_fatal};
use crate::infrastructure::telemetry::{LogSink, Telemetry, TelemetryRecord, TelemetrySink};
use crate::secrets::SecretRegistry;
use crate::secrets::stores::SecretStores;
use crate::steps::{StepContext, StepRegistry};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::time::Instant;

/// Options shared by every step subcommand.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    /// Log at debug level.
    pub verbose: bool,
    /// Correlation ID; a fresh UUID when unset.
    pub correlation_id: Option<String>,
    /// Disable telemetry emission.
    pub no_telemetry: bool,
    /// Custom config file overlaying the defaults.
    pub custom_config: Option<PathBuf>,
    /// Default config files, merged in order.
    pub default_configs: Vec<PathBuf>,
    /// Stage consulted for `stages.<name>` values.
    pub stage_name: Option<String>,
    /// Workspace root holding the Common Pipeline Environment.
    pub env_root_path: PathBuf,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            correlation_id: None,
            no_telemetry: false,
            custom_config: None,
            default_configs: Vec::new(),
            stage_name: None,
            env_root_path: PathBuf::from("."),
        }
    }
}

/// Outcome of one step run.
#[derive(Debug)]
pub struct RunOutcome {
    /// 0 on success, 1 on any failure.
    pub exit_code: i32,
    /// The sealed telemetry record of the run.
    pub telemetry: TelemetryRecord,
}

/// Per-invocation driver owning the framework plumbing around one step.
pub struct LifecycleDriver<'a> {
    registry: &'a StepRegistry,
    options: GlobalOptions,
    telemetry: Telemetry,
    stores: SecretStores,
    bundle: UtilityBundle,
    secrets: &'static SecretRegistry,
}

impl<'a> LifecycleDriver<'a> {
    /// Creates a driver with the standard plumbing: log-sink telemetry
    /// (unless disabled), environment-backed secret stores, real
    /// utility bundle, process-wide secret registry.
    #[must_use]
    pub fn new(registry: &'a StepRegistry, options: GlobalOptions) -> Self {
        let telemetry = if options.no_telemetry {
            Telemetry::disabled()
        } else {
            let mut t = Telemetry::new();
            t.register_sink(Box::new(LogSink));
            t
        };
        Self {
            registry,
            options,
            telemetry,
            stores: SecretStores::from_env(),
            bundle: UtilityBundle::standard(),
            secrets: crate::secrets::global(),
        }
    }

    /// Registers an additional telemetry sink.
    pub fn register_sink(&mut self, sink: Box<dyn TelemetrySink>) {
        self.telemetry.register_sink(sink);
    }

    /// Substitutes the secret stores; test seam.
    #[must_use]
    pub fn with_stores(mut self, stores: SecretStores) -> Self {
        self.stores = stores;
        self
    }

    /// Substitutes the utility bundle; test seam.
    #[must_use]
    pub fn with_bundle(mut self, bundle: UtilityBundle) -> Self {
        self.bundle = bundle;
        self
    }

    /// Runs one step to completion and returns its outcome. Teardown
    /// has run by the time this returns, on every path.
    pub fn run(&self, step_name: &str, cli_flags: HashMap<String, String>) -> RunOutcome {
        // init
        let start = Instant::now();
        let correlation_id = self
            .options
            .correlation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let category = CategoryCell::new();
        let mut record = TelemetryRecord::new(step_name, &correlation_id);

        // Every log line of this run, the step body's included, carries
        // the step name and correlation id through this span.
        let span = tracing::info_span!(
            "step",
            step = %step_name,
            correlation_id = %correlation_id,
        );
        let _span = span.enter();
        tracing::info!("Step starting");

        let cpe = CommonPipelineEnvironment::new(&self.options.env_root_path);

        // prepare + invoke; teardown runs below on every path.
        let mut writer = None;
        let result = self.prepare_and_invoke(
            step_name,
            cli_flags,
            &cpe,
            &mut record,
            &mut writer,
            &category,
        );

        self.teardown(
            step_name,
            &correlation_id,
            start,
            result,
            &cpe,
            writer,
            &mut record,
            &category,
        )
    }

    fn prepare_and_invoke(
        &self,
        step_name: &str,
        cli_flags: HashMap<String, String>,
        cpe: &CommonPipelineEnvironment,
        record: &mut TelemetryRecord,
        writer: &mut Option<CpeWriter>,
        category: &CategoryCell,
    ) -> Result<(), FrameworkError> {
        let step = self
            .registry
            .get(step_name)
            .ok_or_else(|| FrameworkError::UnknownStep(step_name.to_string()))?;

        // prepare
        let config_file = PipelineConfig::layered(
            step_name,
            &self.options.default_configs,
            self.options.custom_config.as_deref(),
        )?;

        let mut resolver = Resolver::new(&step.metadata, &config_file, cpe, &self.stores)
            .with_cli_flags(cli_flags)
            .with_secret_registry(self.secrets);
        if let Some(stage) = &self.options.stage_name {
            resolver = resolver.with_stage(stage.clone());
        }
        let resolved = resolver.resolve()?;
        validation::validate(&step.metadata, &resolved)?;

        // invoke
        let mut cpe_writer = CpeWriter::for_step(&step.metadata);
        let invoke_result = {
            let mut ctx = StepContext {
                config: &resolved,
                telemetry: record,
                cpe: &mut cpe_writer,
                utils: &self.bundle,
                category,
            };
            catch_unwind(AssertUnwindSafe(|| step.body.run(&mut ctx)))
        };
        // Whatever the body did, keep its buffered CPE writes for the
        // teardown flush.
        *writer = Some(cpe_writer);

        match invoke_result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(step_err)) => Err(FrameworkError::Step {
                step: step_name.to_string(),
                source: step_err,
            }),
            Err(payload) => Err(FrameworkError::Panic {
                step: step_name.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn teardown(
        &self,
        step_name: &str,
        correlation_id: &str,
        start: Instant,
        result: Result<(), FrameworkError>,
        cpe: &CommonPipelineEnvironment,
        writer: Option<CpeWriter>,
        record: &mut TelemetryRecord,
        category: &CategoryCell,
    ) -> RunOutcome {
        let mut teardown_failure = None;

        // 1. CPE persist first, to keep as much downstream state as
        //    possible even on partial failure.
        if let Some(mut writer) = writer {
            let entries = writer.take_entries();
            if !entries.is_empty() {
                if let Err(err) = cpe.persist(&entries) {
                    tracing::error!(error = %err, "Persisting pipeline environment failed");
                    teardown_failure = Some(err.to_string());
                }
            }
        }

        // 2. Secret scrub.
        self.secrets.scrub_all();

        // A teardown error converts a success into a failure but never
        // shadows an existing failure cause.
        let result = match (result, teardown_failure) {
            (Ok(()), Some(failure)) => Err(FrameworkError::Teardown(failure)),
            (result, _) => result,
        };

        let failed = result.is_err();
        if failed {
            // First writer wins; a category the step body recorded
            // through its context stays over the error's own bucket.
            category.set(
                result
                    .as_ref()
                    .err()
                    .map_or(ErrorCategory::Undefined, FrameworkError::category),
            );
        }
        let final_category = if failed {
            category.get()
        } else {
            ErrorCategory::Undefined
        };

        // 3. Telemetry last.
        record.seal(start.elapsed(), failed, final_category);
        self.telemetry.emit(record);

        match result {
            Ok(()) => {
                tracing::info!(duration_ms = record.duration_ms, "Step finished");
                RunOutcome {
                    exit_code: 0,
                    telemetry: record.clone(),
                }
            }
            Err(err) => {
                fire_fatal(&FatalRecord {
                    step: step_name.to_string(),
                    correlation_id: correlation_id.to_string(),
                    category: final_category,
                    message: err.to_string(),
                });
                RunOutcome {
                    exit_code: 1,
                    telemetry: record.clone(),
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpe::CpeValue;
    use crate::errors::StepError;
    use crate::metadata::{
        OutputResource, ParamType, Parameter, ResourceReference, StepMetadata,
    };
    use crate::steps::StepBody;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct CollectingSink {
        records: Arc<Mutex<Vec<TelemetryRecord>>>,
    }

    impl TelemetrySink for CollectingSink {
        fn send(&self, record: &TelemetryRecord) -> Result<(), String> {
            self.records.lock().push(record.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "collecting"
        }
    }

    fn driver_with_sink<'a>(
        registry: &'a StepRegistry,
        options: GlobalOptions,
    ) -> (LifecycleDriver<'a>, Arc<Mutex<Vec<TelemetryRecord>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let mut driver = LifecycleDriver::new(registry, options);
        driver.register_sink(Box::new(CollectingSink {
            records: Arc::clone(&records),
        }));
        (driver, records)
    }

    fn flags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_happy_path_persists_output_and_sends_telemetry() {
        let workspace = tempfile::tempdir().unwrap();
        let registry = StepRegistry::builtin();
        let options = GlobalOptions {
            env_root_path: workspace.path().to_path_buf(),
            ..GlobalOptions::default()
        };
        let (driver, records) = driver_with_sink(&registry, options);

        let outcome = driver.run("echoStep", flags(&[("message", "hello")]));

        assert_eq!(outcome.exit_code, 0);
        let cpe = CommonPipelineEnvironment::new(workspace.path());
        assert_eq!(
            cpe.load("custom", "echoed"),
            Some(CpeValue::Text("hello".to_string()))
        );
        let records = records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].step_name, "echoStep");
        assert_eq!(records[0].error_code, "0");
        assert_eq!(records[0].error_category, "Undefined");
    }

    #[test]
    fn test_missing_mandatory_parameter_fails_before_step_body() {
        use crate::infrastructure::logging::CaptureWriter;

        let workspace = tempfile::tempdir().unwrap();
        let registry = StepRegistry::builtin();
        let options = GlobalOptions {
            env_root_path: workspace.path().to_path_buf(),
            ..GlobalOptions::default()
        };
        let (driver, records) = driver_with_sink(&registry, options);

        let capture = CaptureWriter::new();
        let subscriber = tracing_subscriber::fmt().with_writer(capture.clone()).finish();
        let outcome =
            tracing::subscriber::with_default(subscriber, || driver.run("echoStep", HashMap::new()));

        assert_eq!(outcome.exit_code, 1);
        let cpe = CommonPipelineEnvironment::new(workspace.path());
        assert_eq!(cpe.load("custom", "echoed"), None);
        let records = records.lock();
        assert_eq!(records[0].error_code, "1");
        assert_eq!(records[0].error_category, "Configuration");
        // The fatal log line names the missing parameter.
        assert!(capture.contents().contains("'message'"));
    }

    #[test]
    fn test_unknown_step_is_configuration_failure() {
        let registry = StepRegistry::builtin();
        let (driver, records) = driver_with_sink(&registry, GlobalOptions::default());

        let outcome = driver.run("noSuchStep", HashMap::new());

        assert_eq!(outcome.exit_code, 1);
        assert_eq!(records.lock()[0].error_category, "Configuration");
    }

    struct CommitWriterStep;

    impl StepBody for CommitWriterStep {
        fn metadata(&self) -> StepMetadata {
            StepMetadata::new("commitWriter", "Writes the commit id")
                .with_output(OutputResource::new("git", vec!["commitId".to_string()]))
        }

        fn run(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
            ctx.cpe
                .write_text("git", "commitId", "abc123")
                .map_err(|e| StepError::undefined(e.to_string()))
        }
    }

    struct CommitReaderStep;

    impl StepBody for CommitReaderStep {
        fn metadata(&self) -> StepMetadata {
            StepMetadata::new("commitReader", "Reads the commit id").with_parameter(
                Parameter::new("commitId", ParamType::String).with_resource_ref(
                    ResourceReference::CpeEntry {
                        category: "git".to_string(),
                        name: "commitId".to_string(),
                    },
                ),
            )
        }

        fn run(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
            let commit = ctx.config.string("commitId").unwrap_or("unset").to_string();
            ctx.telemetry.set_custom_numbered(1, "commitId", &commit);
            Ok(())
        }
    }

    #[test]
    fn test_cpe_handoff_between_steps() {
        let workspace = tempfile::tempdir().unwrap();
        let mut registry = StepRegistry::new();
        registry.register(Box::new(CommitWriterStep));
        registry.register(Box::new(CommitReaderStep));
        let options = GlobalOptions {
            env_root_path: workspace.path().to_path_buf(),
            no_telemetry: true,
            ..GlobalOptions::default()
        };

        let driver = LifecycleDriver::new(&registry, options.clone());
        assert_eq!(driver.run("commitWriter", HashMap::new()).exit_code, 0);

        let driver = LifecycleDriver::new(&registry, options);
        let outcome = driver.run("commitReader", HashMap::new());
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.telemetry.custom["custom1"], "abc123");
    }

    struct FatalServiceStep {
        secret_file: PathBuf,
    }

    impl StepBody for FatalServiceStep {
        fn metadata(&self) -> StepMetadata {
            StepMetadata::new("fatalService", "Fails with a service error")
                .with_output(OutputResource::new("custom", vec!["marker".to_string()]))
        }

        fn run(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
            crate::secrets::global().register_secret_file(&self.secret_file);
            ctx.cpe
                .write_text("custom", "marker", "written-before-failure")
                .map_err(|e| StepError::undefined(e.to_string()))?;
            Err(StepError::service("remote returned HTTP 502"))
        }
    }

    #[test]
    fn test_teardown_runs_on_fatal_step_failure() {
        let workspace = tempfile::tempdir().unwrap();
        let secret_file = workspace.path().join("session-token");
        std::fs::write(&secret_file, "token").unwrap();

        let mut registry = StepRegistry::new();
        registry.register(Box::new(FatalServiceStep {
            secret_file: secret_file.clone(),
        }));
        let options = GlobalOptions {
            env_root_path: workspace.path().to_path_buf(),
            ..GlobalOptions::default()
        };
        let (driver, records) = driver_with_sink(&registry, options);

        let outcome = driver.run("fatalService", HashMap::new());

        assert_eq!(outcome.exit_code, 1);
        // CPE writes made before the failure survive teardown.
        let cpe = CommonPipelineEnvironment::new(workspace.path());
        assert_eq!(
            cpe.load("custom", "marker"),
            Some(CpeValue::Text("written-before-failure".to_string()))
        );
        // The scheduled secret file is gone.
        assert!(!secret_file.exists());
        assert_eq!(records.lock()[0].error_category, "Service");
    }

    struct DiagnosedBuildStep;

    impl StepBody for DiagnosedBuildStep {
        fn metadata(&self) -> StepMetadata {
            StepMetadata::new("diagnosedBuild", "Classifies its own failure")
        }

        fn run(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
            ctx.set_error_category(ErrorCategory::Build);
            Err(StepError::undefined("compiler crashed without diagnostics"))
        }
    }

    #[test]
    fn test_category_recorded_by_the_body_beats_the_error_category() {
        let workspace = tempfile::tempdir().unwrap();
        let mut registry = StepRegistry::new();
        registry.register(Box::new(DiagnosedBuildStep));
        let options = GlobalOptions {
            env_root_path: workspace.path().to_path_buf(),
            ..GlobalOptions::default()
        };
        let (driver, records) = driver_with_sink(&registry, options);

        let outcome = driver.run("diagnosedBuild", HashMap::new());

        assert_eq!(outcome.exit_code, 1);
        // The body diagnosed the cause before returning an unclassified
        // error, so its bucket lands in telemetry.
        assert_eq!(records.lock()[0].error_category, "Build");
    }

    #[test]
    fn test_body_log_lines_carry_step_and_correlation_id() {
        use crate::infrastructure::logging::CaptureWriter;

        let workspace = tempfile::tempdir().unwrap();
        let registry = StepRegistry::builtin();
        let options = GlobalOptions {
            correlation_id: Some("corr-span-check".to_string()),
            no_telemetry: true,
            env_root_path: workspace.path().to_path_buf(),
            ..GlobalOptions::default()
        };
        let driver = LifecycleDriver::new(&registry, options);

        let capture = CaptureWriter::new();
        let subscriber = tracing_subscriber::fmt().with_writer(capture.clone()).finish();
        let outcome = tracing::subscriber::with_default(subscriber, || {
            driver.run("echoStep", flags(&[("message", "hello")]))
        });

        assert_eq!(outcome.exit_code, 0);
        let logged = capture.contents();
        let body_line = logged
            .lines()
            .find(|line| line.contains("Echoing message"))
            .unwrap();
        assert!(body_line.contains("echoStep"));
        assert!(body_line.contains("corr-span-check"));
    }

    struct TokenLoggingStep;

    impl StepBody for TokenLoggingStep {
        fn metadata(&self) -> StepMetadata {
            StepMetadata::new("tokenLogger", "Logs its token parameter").with_parameter(
                Parameter::new("token", ParamType::String)
                    .secret()
                    .with_resource_ref(ResourceReference::VaultSecret {
                        path: "pipeline/deploy".to_string(),
                        name: "apiToken".to_string(),
                    }),
            )
        }

        fn run(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
            let token = ctx.config.string("token").unwrap_or("unset");
            tracing::info!("authenticating with token {token}");
            Ok(())
        }
    }

    #[test]
    fn test_secret_never_reaches_the_log_sink() {
        use crate::infrastructure::logging::{CaptureWriter, MaskingMakeWriter};
        use crate::secrets::stores::{InMemorySecretStore, SecretStores};

        let workspace = tempfile::tempdir().unwrap();
        let mut vault = InMemorySecretStore::new();
        vault.add_vault_secret("pipeline/deploy", "apiToken", "vault-secret-3f9a");
        let stores = SecretStores {
            credentials: Box::new(InMemorySecretStore::new()),
            vault: Box::new(vault),
        };

        let mut registry = StepRegistry::new();
        registry.register(Box::new(TokenLoggingStep));
        let options = GlobalOptions {
            env_root_path: workspace.path().to_path_buf(),
            no_telemetry: true,
            ..GlobalOptions::default()
        };
        let driver = LifecycleDriver::new(&registry, options).with_stores(stores);

        let capture = CaptureWriter::new();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(MaskingMakeWriter::new(
                crate::secrets::global(),
                capture.clone(),
            ))
            .finish();
        let outcome =
            tracing::subscriber::with_default(subscriber, || driver.run("tokenLogger", HashMap::new()));

        assert_eq!(outcome.exit_code, 0);
        let logged = capture.contents();
        assert!(logged.contains("authenticating with token"));
        assert!(!logged.contains("vault-secret-3f9a"));
        assert!(logged.contains("****"));
    }

    struct PanickingStep;

    impl StepBody for PanickingStep {
        fn metadata(&self) -> StepMetadata {
            StepMetadata::new("panicky", "Panics mid-run")
        }

        fn run(&self, _ctx: &mut StepContext<'_>) -> Result<(), StepError> {
            panic!("boom");
        }
    }

    #[test]
    fn test_panic_is_contained_and_telemetry_still_sent() {
        let mut registry = StepRegistry::new();
        registry.register(Box::new(PanickingStep));
        let (driver, records) = driver_with_sink(&registry, GlobalOptions::default());

        let outcome = driver.run("panicky", HashMap::new());

        assert_eq!(outcome.exit_code, 1);
        let records = records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error_code, "1");
        assert_eq!(records[0].error_category, "Undefined");
    }

    #[test]
    fn test_cli_flag_beats_step_config() {
        let workspace = tempfile::tempdir().unwrap();
        let config_path = workspace.path().join("config.yml");
        std::fs::write(
            &config_path,
            "steps:\n  echoStep:\n    message: fromSteps\n",
        )
        .unwrap();

        let registry = StepRegistry::builtin();
        let options = GlobalOptions {
            env_root_path: workspace.path().to_path_buf(),
            custom_config: Some(config_path),
            no_telemetry: true,
            ..GlobalOptions::default()
        };

        let driver = LifecycleDriver::new(&registry, options.clone());
        let outcome = driver.run("echoStep", flags(&[("message", "fromCli")]));
        assert_eq!(outcome.exit_code, 0);
        let cpe = CommonPipelineEnvironment::new(workspace.path());
        assert_eq!(
            cpe.load("custom", "echoed"),
            Some(CpeValue::Text("fromCli".to_string()))
        );

        // Without the flag the config file value applies.
        let driver = LifecycleDriver::new(&registry, options);
        let outcome = driver.run("echoStep", HashMap::new());
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(
            cpe.load("custom", "echoed"),
            Some(CpeValue::Text("fromSteps".to_string()))
        );
    }

    #[test]
    fn test_telemetry_disabled_emits_to_no_sink() {
        let workspace = tempfile::tempdir().unwrap();
        let registry = StepRegistry::builtin();
        let options = GlobalOptions {
            no_telemetry: true,
            env_root_path: workspace.path().to_path_buf(),
            ..GlobalOptions::default()
        };
        let driver = LifecycleDriver::new(&registry, options);
        // The run itself still succeeds and seals a record.
        let outcome = driver.run("echoStep", flags(&[("message", "quiet")]));
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.telemetry.error_code, "0");
    }
}
