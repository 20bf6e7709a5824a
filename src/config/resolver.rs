//! Configuration resolver
//!
//! Walks the fixed precedence order for every declared parameter and
//! stops at the first present value:
//!
//! 1. explicit CLI flag
//! 2. `steps.<stepName>` in the config file
//! 3. `stages.<stageName>` in the config file
//! 4. `general` in the config file
//! 5. previously persisted CPE value named by a resource reference
//! 6. secret store value named by a resource reference
//! 7. environment variable `PIPER_<parameterName>`
//! 8. metadata default
//!
//! Aliases are tried in addition to the canonical name at each level.
//! Equal-precedence resource references resolve in declaration order, so
//! ties are deterministic. Values originating from a secret store, and
//! values of parameters marked secret, are registered for log masking
//! before they land in the resolved configuration.

use crate::config::{PipelineConfig, Section};
use crate::cpe::{CommonPipelineEnvironment, CpeValue};
use crate::errors::ConfigurationError;
use crate::metadata::{ParamValue, Parameter, ResourceReference, Scope, StepMetadata};
use crate::secrets::SecretRegistry;
use crate::secrets::stores::SecretStores;
use std::collections::HashMap;
use std::fmt;

/// Where a resolved value came from; kept for logging only, never
/// exposed through the step contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Explicit CLI flag.
    CliFlag,
    /// `steps.<stepName>` section of the config file.
    StepConfig,
    /// `stages.<stageName>` section of the config file.
    StageConfig,
    /// `general` section of the config file.
    GeneralConfig,
    /// Previously persisted Common Pipeline Environment value.
    PipelineEnvironment,
    /// Credentials store or vault.
    SecretStore,
    /// `PIPER_<name>` environment variable.
    EnvVar,
    /// Metadata default.
    Default,
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CliFlag => "cli",
            Self::StepConfig => "steps config",
            Self::StageConfig => "stages config",
            Self::GeneralConfig => "general config",
            Self::PipelineEnvironment => "pipeline environment",
            Self::SecretStore => "secret store",
            Self::EnvVar => "environment variable",
            Self::Default => "default",
        };
        write!(f, "{name}")
    }
}

/// The typed configuration a step body programs against.
///
/// One value per resolved parameter, aliases collapsed to the canonical
/// name. Mandatory parameters are guaranteed populated once validation
/// has passed.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    step: String,
    values: HashMap<String, ParamValue>,
    sources: HashMap<String, ValueSource>,
}

impl ResolvedConfig {
    /// Creates an empty configuration for a step; test seam for step
    /// bodies.
    #[must_use]
    pub fn empty(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            values: HashMap::new(),
            sources: HashMap::new(),
        }
    }

    /// Name of the step this configuration belongs to.
    #[must_use]
    pub fn step(&self) -> &str {
        &self.step
    }

    /// Inserts a value under its canonical name.
    pub fn set(&mut self, name: impl Into<String>, value: ParamValue, source: ValueSource) {
        let name = name.into();
        self.sources.insert(name.clone(), source);
        self.values.insert(name, value);
    }

    /// The value of a parameter, if resolution produced one.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// The source that supplied a parameter, if resolution produced one.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<ValueSource> {
        self.sources.get(name).copied()
    }

    /// String content of a parameter.
    #[must_use]
    pub fn string(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(ParamValue::as_str)
    }

    /// Integer content of a parameter.
    #[must_use]
    pub fn integer(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(ParamValue::as_int)
    }

    /// Boolean content of a parameter, or `default` when unset.
    #[must_use]
    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.values
            .get(name)
            .and_then(ParamValue::as_bool)
            .unwrap_or(default)
    }

    /// List content of a parameter.
    #[must_use]
    pub fn list(&self, name: &str) -> Option<&[String]> {
        self.values.get(name).and_then(ParamValue::as_list)
    }

    /// Map content of a parameter.
    #[must_use]
    pub fn map(&self, name: &str) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.values.get(name).and_then(ParamValue::as_map)
    }
}

/// One value found while walking the precedence chain.
struct Hit {
    value: ParamValue,
    source: ValueSource,
    via_alias: Option<String>,
}

/// Resolves one step's configuration from the layered sources.
pub struct Resolver<'a> {
    metadata: &'a StepMetadata,
    config: &'a PipelineConfig,
    cpe: &'a CommonPipelineEnvironment,
    stores: &'a SecretStores,
    registry: &'a SecretRegistry,
    cli_flags: HashMap<String, String>,
    stage_name: Option<String>,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over the given sources. Secrets register with
    /// the process-wide registry unless one is substituted.
    #[must_use]
    pub fn new(
        metadata: &'a StepMetadata,
        config: &'a PipelineConfig,
        cpe: &'a CommonPipelineEnvironment,
        stores: &'a SecretStores,
    ) -> Self {
        Self {
            metadata,
            config,
            cpe,
            stores,
            registry: crate::secrets::global(),
            cli_flags: HashMap::new(),
            stage_name: None,
        }
    }

    /// Sets the raw CLI flag values, keyed by flag name.
    #[must_use]
    pub fn with_cli_flags(mut self, flags: HashMap<String, String>) -> Self {
        self.cli_flags = flags;
        self
    }

    /// Sets the running stage consulted for `stages.<name>` values.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage_name = Some(stage.into());
        self
    }

    /// Substitutes the secret registry; test seam.
    #[must_use]
    pub fn with_secret_registry(mut self, registry: &'a SecretRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Resolves every parameter, collecting coercion failures into one
    /// error.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] naming every parameter whose
    /// value failed to coerce to its declared type.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigurationError> {
        let mut resolved = ResolvedConfig::empty(&self.metadata.name);
        let mut violations = Vec::new();

        for param in &self.metadata.parameters {
            match self.lookup(param) {
                Ok(Some(hit)) => {
                    if let Some(alias) = &hit.via_alias {
                        tracing::warn!(
                            step = %self.metadata.name,
                            parameter = %param.name,
                            alias = %alias,
                            "Parameter alias is deprecated, use the canonical name"
                        );
                    }
                    if param.secret || hit.source == ValueSource::SecretStore {
                        if let Some(text) = hit.value.as_str() {
                            self.registry.register_secret(text);
                        }
                    }
                    tracing::debug!(
                        step = %self.metadata.name,
                        parameter = %param.name,
                        source = %hit.source,
                        "Resolved parameter"
                    );
                    resolved.set(&param.name, hit.value, hit.source);
                }
                Ok(None) => {}
                Err(message) => violations.push(format!("parameter '{}': {message}", param.name)),
            }
        }

        if violations.is_empty() {
            Ok(resolved)
        } else {
            Err(ConfigurationError {
                step: self.metadata.name.clone(),
                violations,
            })
        }
    }

    fn lookup(&self, param: &Parameter) -> Result<Option<Hit>, String> {
        if param.scopes.contains(&Scope::Parameters) {
            if let Some(hit) = self.from_cli(param)? {
                return Ok(Some(hit));
            }
        }
        if param.scopes.contains(&Scope::Steps) {
            if let Some(section) = self.config.step_section(&self.metadata.name) {
                if let Some(hit) = from_section(param, section, ValueSource::StepConfig)? {
                    return Ok(Some(hit));
                }
            }
        }
        if param.scopes.contains(&Scope::Stages) {
            if let Some(stage) = &self.stage_name {
                if let Some(section) = self.config.stage_section(stage) {
                    if let Some(hit) = from_section(param, section, ValueSource::StageConfig)? {
                        return Ok(Some(hit));
                    }
                }
            }
        }
        if param.scopes.contains(&Scope::General) {
            if let Some(hit) = from_section(param, &self.config.general, ValueSource::GeneralConfig)?
            {
                return Ok(Some(hit));
            }
        }
        if let Some(hit) = self.from_cpe(param)? {
            return Ok(Some(hit));
        }
        if let Some(hit) = self.from_secret_store(param)? {
            return Ok(Some(hit));
        }
        if let Some(hit) = from_env(param)? {
            return Ok(Some(hit));
        }
        if let Some(default) = &param.default {
            return Ok(Some(Hit {
                value: default.clone(),
                source: ValueSource::Default,
                via_alias: None,
            }));
        }
        Ok(None)
    }

    fn from_cli(&self, param: &Parameter) -> Result<Option<Hit>, String> {
        if let Some(raw) = self.cli_flags.get(&param.name) {
            let value = ParamValue::from_text(param.param_type, raw)?;
            return Ok(Some(Hit {
                value,
                source: ValueSource::CliFlag,
                via_alias: None,
            }));
        }
        for alias in &param.aliases {
            if let Some(raw) = self.cli_flags.get(&alias.name) {
                let value = ParamValue::from_text(param.param_type, raw)?;
                return Ok(Some(Hit {
                    value,
                    source: ValueSource::CliFlag,
                    via_alias: alias.deprecated.then(|| alias.name.clone()),
                }));
            }
        }
        Ok(None)
    }

    /// Reads only the CPE paths named by the parameter's resource
    /// references, in declaration order; never scans the tree.
    fn from_cpe(&self, param: &Parameter) -> Result<Option<Hit>, String> {
        for resource_ref in &param.resource_refs {
            if let ResourceReference::CpeEntry { category, name } = resource_ref {
                let value = match self.cpe.load(category, name) {
                    Some(CpeValue::Text(text)) => {
                        Some(ParamValue::from_text(param.param_type, &text)?)
                    }
                    Some(CpeValue::Json(json)) => {
                        Some(ParamValue::from_json(param.param_type, &json)?)
                    }
                    None => None,
                };
                if let Some(value) = value {
                    return Ok(Some(Hit {
                        value,
                        source: ValueSource::PipelineEnvironment,
                        via_alias: None,
                    }));
                }
            }
        }
        Ok(None)
    }

    fn from_secret_store(&self, param: &Parameter) -> Result<Option<Hit>, String> {
        for resource_ref in &param.resource_refs {
            let text = match resource_ref {
                ResourceReference::Credential { id, field } => self
                    .stores
                    .credentials
                    .credential(id)
                    .and_then(|c| c.field(field).map(str::to_string)),
                ResourceReference::VaultSecret { path, name } => {
                    self.stores.vault.secret(path, name)
                }
                ResourceReference::CpeEntry { .. } => None,
            };
            if let Some(text) = text {
                self.registry.register_secret(&text);
                let value = ParamValue::from_text(param.param_type, &text)?;
                return Ok(Some(Hit {
                    value,
                    source: ValueSource::SecretStore,
                    via_alias: None,
                }));
            }
        }
        Ok(None)
    }
}

fn from_section(
    param: &Parameter,
    section: &Section,
    source: ValueSource,
) -> Result<Option<Hit>, String> {
    if let Some(raw) = section.get(&param.name) {
        let value = ParamValue::from_json(param.param_type, raw)?;
        return Ok(Some(Hit {
            value,
            source,
            via_alias: None,
        }));
    }
    for alias in &param.aliases {
        if let Some(raw) = section.get(&alias.name) {
            let value = ParamValue::from_json(param.param_type, raw)?;
            return Ok(Some(Hit {
                value,
                source,
                via_alias: alias.deprecated.then(|| alias.name.clone()),
            }));
        }
    }
    Ok(None)
}

fn from_env(param: &Parameter) -> Result<Option<Hit>, String> {
    for name in param.all_names() {
        if let Ok(raw) = std::env::var(format!("PIPER_{name}")) {
            let value = ParamValue::from_text(param.param_type, &raw)?;
            let via_alias = param
                .aliases
                .iter()
                .find(|a| a.name == name && a.deprecated)
                .map(|a| a.name.clone());
            return Ok(Some(Hit {
                value,
                source: ValueSource::EnvVar,
                via_alias,
            }));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpe::CpeEntry;
    use crate::metadata::{Alias, ParamType};
    use crate::secrets::stores::{Credential, InMemorySecretStore};
    use pretty_assertions::assert_eq;

    fn empty_stores() -> SecretStores {
        SecretStores {
            credentials: Box::new(InMemorySecretStore::new()),
            vault: Box::new(InMemorySecretStore::new()),
        }
    }

    fn metadata_with(param: Parameter) -> StepMetadata {
        StepMetadata::new("stepX", "test step").with_parameter(param)
    }

    fn resolve_with(
        metadata: &StepMetadata,
        config: &PipelineConfig,
        cpe: &CommonPipelineEnvironment,
        stores: &SecretStores,
        registry: &SecretRegistry,
        flags: HashMap<String, String>,
        stage: Option<&str>,
    ) -> Result<ResolvedConfig, ConfigurationError> {
        let mut resolver = Resolver::new(metadata, config, cpe, stores)
            .with_secret_registry(registry)
            .with_cli_flags(flags);
        if let Some(stage) = stage {
            resolver = resolver.with_stage(stage);
        }
        resolver.resolve()
    }

    #[test]
    fn test_precedence_order_walks_down() {
        let dir = tempfile::tempdir().unwrap();
        let cpe = CommonPipelineEnvironment::new(dir.path());
        let stores = empty_stores();
        let registry = SecretRegistry::new();
        let metadata = metadata_with(
            Parameter::new("p", ParamType::String)
                .with_default(ParamValue::Text("fromDefault".to_string())),
        );

        let mut config = PipelineConfig::from_yaml(
            "stepX",
            "general:\n  p: fromGeneral\nstages:\n  build:\n    p: fromStages\nsteps:\n  stepX:\n    p: fromSteps\n",
        )
        .unwrap();

        let mut flags = HashMap::new();
        flags.insert("p".to_string(), "fromCli".to_string());

        // CLI wins over everything.
        let resolved = resolve_with(
            &metadata, &config, &cpe, &stores, &registry, flags, Some("build"),
        )
        .unwrap();
        assert_eq!(resolved.string("p"), Some("fromCli"));
        assert_eq!(resolved.source("p"), Some(ValueSource::CliFlag));

        // Remove the CLI flag: steps section wins.
        let resolved = resolve_with(
            &metadata, &config, &cpe, &stores, &registry, HashMap::new(), Some("build"),
        )
        .unwrap();
        assert_eq!(resolved.string("p"), Some("fromSteps"));

        // Remove the steps entry: stages section wins.
        config.steps.clear();
        let resolved = resolve_with(
            &metadata, &config, &cpe, &stores, &registry, HashMap::new(), Some("build"),
        )
        .unwrap();
        assert_eq!(resolved.string("p"), Some("fromStages"));

        // Remove the stages entry: general wins.
        config.stages.clear();
        let resolved = resolve_with(
            &metadata, &config, &cpe, &stores, &registry, HashMap::new(), Some("build"),
        )
        .unwrap();
        assert_eq!(resolved.string("p"), Some("fromGeneral"));

        // Remove general: the metadata default remains.
        config.general.clear();
        let resolved = resolve_with(
            &metadata, &config, &cpe, &stores, &registry, HashMap::new(), Some("build"),
        )
        .unwrap();
        assert_eq!(resolved.string("p"), Some("fromDefault"));
        assert_eq!(resolved.source("p"), Some(ValueSource::Default));
    }

    #[test]
    fn test_cpe_reference_beats_secret_store_and_default() {
        let dir = tempfile::tempdir().unwrap();
        let cpe = CommonPipelineEnvironment::new(dir.path());
        cpe.persist(&[CpeEntry {
            category: "git".to_string(),
            name: "commitId".to_string(),
            value: CpeValue::Text("abc123".to_string()),
        }])
        .unwrap();

        let stores = empty_stores();
        let registry = SecretRegistry::new();
        let metadata = metadata_with(
            Parameter::new("commitId", ParamType::String)
                .with_resource_ref(ResourceReference::CpeEntry {
                    category: "git".to_string(),
                    name: "commitId".to_string(),
                })
                .with_default(ParamValue::Text("HEAD".to_string())),
        );
        let config = PipelineConfig::default();

        let resolved = resolve_with(
            &metadata, &config, &cpe, &stores, &registry, HashMap::new(), None,
        )
        .unwrap();
        assert_eq!(resolved.string("commitId"), Some("abc123"));
        assert_eq!(
            resolved.source("commitId"),
            Some(ValueSource::PipelineEnvironment)
        );
    }

    #[test]
    fn test_cpe_store_and_env_peel_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let cpe = CommonPipelineEnvironment::new(dir.path());
        cpe.persist(&[CpeEntry {
            category: "custom".to_string(),
            name: "handoffToken".to_string(),
            value: CpeValue::Text("fromCpe".to_string()),
        }])
        .unwrap();

        let mut vault = InMemorySecretStore::new();
        vault.add_vault_secret("pipeline/creds", "handoffToken", "fromStore");
        let stores = SecretStores {
            credentials: Box::new(InMemorySecretStore::new()),
            vault: Box::new(vault),
        };
        let registry = SecretRegistry::new();
        let metadata = metadata_with(
            Parameter::new("handoffToken", ParamType::String)
                .with_resource_ref(ResourceReference::CpeEntry {
                    category: "custom".to_string(),
                    name: "handoffToken".to_string(),
                })
                .with_resource_ref(ResourceReference::VaultSecret {
                    path: "pipeline/creds".to_string(),
                    name: "handoffToken".to_string(),
                }),
        );
        let config = PipelineConfig::default();
        unsafe { std::env::set_var("PIPER_handoffToken", "fromEnv") };

        // All three fallback sources present: the persisted CPE value
        // wins over the store and the environment.
        let resolved = resolve_with(
            &metadata, &config, &cpe, &stores, &registry, HashMap::new(), None,
        )
        .unwrap();
        assert_eq!(resolved.string("handoffToken"), Some("fromCpe"));
        assert_eq!(
            resolved.source("handoffToken"),
            Some(ValueSource::PipelineEnvironment)
        );

        // Without a persisted CPE value the store wins over the
        // environment.
        let empty_dir = tempfile::tempdir().unwrap();
        let empty_cpe = CommonPipelineEnvironment::new(empty_dir.path());
        let resolved = resolve_with(
            &metadata, &config, &empty_cpe, &stores, &registry, HashMap::new(), None,
        )
        .unwrap();
        assert_eq!(resolved.string("handoffToken"), Some("fromStore"));
        assert_eq!(
            resolved.source("handoffToken"),
            Some(ValueSource::SecretStore)
        );

        // Without either, the environment variable remains.
        let resolved = resolve_with(
            &metadata, &config, &empty_cpe, &empty_stores(), &registry, HashMap::new(), None,
        )
        .unwrap();
        unsafe { std::env::remove_var("PIPER_handoffToken") };
        assert_eq!(resolved.string("handoffToken"), Some("fromEnv"));
        assert_eq!(resolved.source("handoffToken"), Some(ValueSource::EnvVar));
    }

    #[test]
    fn test_equal_precedence_refs_resolve_in_declaration_order() {
        let dir = tempfile::tempdir().unwrap();
        let cpe = CommonPipelineEnvironment::new(dir.path());
        cpe.persist(&[
            CpeEntry {
                category: "custom".to_string(),
                name: "first".to_string(),
                value: CpeValue::Text("one".to_string()),
            },
            CpeEntry {
                category: "custom".to_string(),
                name: "second".to_string(),
                value: CpeValue::Text("two".to_string()),
            },
        ])
        .unwrap();

        let stores = empty_stores();
        let registry = SecretRegistry::new();
        let metadata = metadata_with(
            Parameter::new("p", ParamType::String)
                .with_resource_ref(ResourceReference::CpeEntry {
                    category: "custom".to_string(),
                    name: "first".to_string(),
                })
                .with_resource_ref(ResourceReference::CpeEntry {
                    category: "custom".to_string(),
                    name: "second".to_string(),
                }),
        );
        let config = PipelineConfig::default();

        let resolved = resolve_with(
            &metadata, &config, &cpe, &stores, &registry, HashMap::new(), None,
        )
        .unwrap();
        assert_eq!(resolved.string("p"), Some("one"));
    }

    #[test]
    fn test_secret_store_value_registers_for_masking() {
        let dir = tempfile::tempdir().unwrap();
        let cpe = CommonPipelineEnvironment::new(dir.path());
        let mut store = InMemorySecretStore::new();
        store.add_credential(
            "deployCredentialsId",
            Credential {
                username: None,
                password: None,
                token: Some("supersecret123".to_string()),
            },
        );
        let stores = SecretStores {
            credentials: Box::new(store),
            vault: Box::new(InMemorySecretStore::new()),
        };
        let registry = SecretRegistry::new();
        let metadata = metadata_with(
            Parameter::new("token", ParamType::String)
                .secret()
                .with_resource_ref(ResourceReference::Credential {
                    id: "deployCredentialsId".to_string(),
                    field: "token".to_string(),
                }),
        );
        let config = PipelineConfig::default();

        let resolved = resolve_with(
            &metadata, &config, &cpe, &stores, &registry, HashMap::new(), None,
        )
        .unwrap();
        assert_eq!(resolved.string("token"), Some("supersecret123"));
        assert_eq!(
            registry.mask("using token supersecret123"),
            "using token ****"
        );
    }

    #[test]
    fn test_alias_collapses_to_canonical_name() {
        let dir = tempfile::tempdir().unwrap();
        let cpe = CommonPipelineEnvironment::new(dir.path());
        let stores = empty_stores();
        let registry = SecretRegistry::new();
        let metadata = metadata_with(
            Parameter::new("dockerImage", ParamType::String)
                .with_alias(Alias::deprecated("image")),
        );
        let config = PipelineConfig::default();

        let mut flags = HashMap::new();
        flags.insert("image".to_string(), "alpine:3".to_string());
        let resolved = resolve_with(
            &metadata, &config, &cpe, &stores, &registry, flags, None,
        )
        .unwrap();

        assert_eq!(resolved.string("dockerImage"), Some("alpine:3"));
        assert_eq!(resolved.string("image"), None);
    }

    #[test]
    fn test_env_var_is_read_by_convention() {
        let dir = tempfile::tempdir().unwrap();
        let cpe = CommonPipelineEnvironment::new(dir.path());
        let stores = empty_stores();
        let registry = SecretRegistry::new();
        let metadata = metadata_with(Parameter::new("envOnlyParam", ParamType::String));
        let config = PipelineConfig::default();

        unsafe { std::env::set_var("PIPER_envOnlyParam", "fromEnv") };
        let resolved = resolve_with(
            &metadata, &config, &cpe, &stores, &registry, HashMap::new(), None,
        )
        .unwrap();
        unsafe { std::env::remove_var("PIPER_envOnlyParam") };

        assert_eq!(resolved.string("envOnlyParam"), Some("fromEnv"));
        assert_eq!(resolved.source("envOnlyParam"), Some(ValueSource::EnvVar));
    }

    #[test]
    fn test_coercion_failure_names_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let cpe = CommonPipelineEnvironment::new(dir.path());
        let stores = empty_stores();
        let registry = SecretRegistry::new();
        let metadata = metadata_with(Parameter::new("retries", ParamType::Integer));
        let config = PipelineConfig::default();

        let mut flags = HashMap::new();
        flags.insert("retries".to_string(), "many".to_string());
        let err = resolve_with(
            &metadata, &config, &cpe, &stores, &registry, flags, None,
        )
        .unwrap_err();

        assert!(err.to_string().contains("'retries'"));
        assert!(err.to_string().contains("not an integer"));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let cpe = CommonPipelineEnvironment::new(dir.path());
        let stores = empty_stores();
        let registry = SecretRegistry::new();
        let metadata = metadata_with(
            Parameter::new("p", ParamType::String)
                .with_default(ParamValue::Text("stable".to_string())),
        );
        let config = PipelineConfig::default();

        let first = resolve_with(
            &metadata, &config, &cpe, &stores, &registry, HashMap::new(), None,
        )
        .unwrap();
        let second = resolve_with(
            &metadata, &config, &cpe, &stores, &registry, HashMap::new(), None,
        )
        .unwrap();
        assert_eq!(first.string("p"), second.string("p"));
        assert_eq!(first.source("p"), second.source("p"));
    }
}
