//! Declarative step metadata
//!
//! Each pipeline step is described by an immutable [`StepMetadata`] record:
//! its parameters (type, scope, aliases, defaults, resource references),
//! the secrets it consumes, the Common Pipeline Environment resources it
//! writes, and an optional container descriptor. The configuration
//! resolver, the validator and the CLI flag surface are all driven from
//! this one record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared data type of a step parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// Plain text.
    String,
    /// Signed integer.
    Integer,
    /// Boolean.
    Bool,
    /// Ordered sequence of strings.
    List,
    /// Mapping of string to arbitrary JSON.
    Map,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Map => "map",
        };
        write!(f, "{name}")
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Plain text value.
    Text(String),
    /// Integer value.
    Integer(i64),
    /// Boolean value.
    Bool(bool),
    /// Ordered sequence of strings.
    List(Vec<String>),
    /// Mapping of string to arbitrary JSON.
    Map(serde_json::Map<String, serde_json::Value>),
}

impl ParamValue {
    /// The declared type this value satisfies.
    #[must_use]
    pub fn param_type(&self) -> ParamType {
        match self {
            Self::Text(_) => ParamType::String,
            Self::Integer(_) => ParamType::Integer,
            Self::Bool(_) => ParamType::Bool,
            Self::List(_) => ParamType::List,
            Self::Map(_) => ParamType::Map,
        }
    }

    /// Returns the text content, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer value.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a boolean value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the sequence content, if this is a list value.
    #[must_use]
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the mapping content, if this is a map value.
    #[must_use]
    pub fn as_map(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Renders this value as JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Integer(n) => serde_json::Value::from(*n),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::List(items) => serde_json::Value::from(items.clone()),
            Self::Map(m) => serde_json::Value::Object(m.clone()),
        }
    }

    /// Coerces raw text (from an environment variable, a CPE scalar or a
    /// CLI flag) into a value of the declared type.
    ///
    /// Integer and boolean coercions use standard textual forms; list and
    /// map types are parsed as JSON.
    ///
    /// # Errors
    ///
    /// Returns a message describing the failed coercion.
    pub fn from_text(param_type: ParamType, text: &str) -> Result<Self, String> {
        match param_type {
            ParamType::String => Ok(Self::Text(text.to_string())),
            ParamType::Integer => text
                .trim()
                .parse::<i64>()
                .map(Self::Integer)
                .map_err(|_| format!("'{text}' is not an integer")),
            ParamType::Bool => match text.trim() {
                "true" | "True" | "1" => Ok(Self::Bool(true)),
                "false" | "False" | "0" => Ok(Self::Bool(false)),
                other => Err(format!("'{other}' is not a boolean")),
            },
            ParamType::List => {
                let parsed: serde_json::Value = serde_json::from_str(text)
                    .map_err(|e| format!("'{text}' is not a JSON list: {e}"))?;
                Self::from_json(param_type, &parsed)
            }
            ParamType::Map => {
                let parsed: serde_json::Value = serde_json::from_str(text)
                    .map_err(|e| format!("'{text}' is not a JSON map: {e}"))?;
                Self::from_json(param_type, &parsed)
            }
        }
    }

    /// Coerces a JSON value (from a config file or a structured CPE
    /// entry) into a value of the declared type.
    ///
    /// # Errors
    ///
    /// Returns a message describing the failed coercion.
    pub fn from_json(param_type: ParamType, value: &serde_json::Value) -> Result<Self, String> {
        use serde_json::Value;
        match (param_type, value) {
            (_, Value::String(s)) if param_type != ParamType::String => {
                // Textual forms inside structured sources still coerce.
                Self::from_text(param_type, s)
            }
            (ParamType::String, Value::String(s)) => Ok(Self::Text(s.clone())),
            (ParamType::String, Value::Number(n)) => Ok(Self::Text(n.to_string())),
            (ParamType::String, Value::Bool(b)) => Ok(Self::Text(b.to_string())),
            (ParamType::Integer, Value::Number(n)) => n
                .as_i64()
                .map(Self::Integer)
                .ok_or_else(|| format!("'{n}' is not an integer")),
            (ParamType::Bool, Value::Bool(b)) => Ok(Self::Bool(*b)),
            (ParamType::List, Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => out.push(s.clone()),
                        other => out.push(other.to_string()),
                    }
                }
                Ok(Self::List(out))
            }
            (ParamType::Map, Value::Object(m)) => Ok(Self::Map(m.clone())),
            (expected, other) => Err(format!("expected {expected}, got '{other}'")),
        }
    }
}

/// Configuration scope a parameter may be supplied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scope {
    /// `general` section of the config file.
    General,
    /// `stages.<stageName>` section.
    Stages,
    /// `steps.<stepName>` section.
    Steps,
    /// Direct CLI flag.
    Parameters,
}

/// An alternative name a parameter is still reachable under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    /// The alias name.
    pub name: String,
    /// Whether use of the alias logs a deprecation notice.
    pub deprecated: bool,
}

impl Alias {
    /// Creates a non-deprecated alias.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deprecated: false,
        }
    }

    /// Creates a deprecated alias; resolving through it logs a notice.
    #[must_use]
    pub fn deprecated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deprecated: true,
        }
    }
}

/// A source a parameter value may be drawn from besides the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceReference {
    /// A Common Pipeline Environment entry.
    CpeEntry {
        /// CPE category directory.
        category: String,
        /// Entry name within the category.
        name: String,
    },
    /// A credential in the credentials store.
    Credential {
        /// Credential identifier.
        id: String,
        /// Field of the credential (`username`, `password`, `token`).
        field: String,
    },
    /// A named secret below a vault path.
    VaultSecret {
        /// Vault path.
        path: String,
        /// Secret name below the path.
        name: String,
    },
}

/// Predicate checked by the validator beyond the type check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamCheck {
    /// The string value must be one of the listed candidates.
    OneOf(Vec<String>),
    /// The string value must be non-empty.
    NonEmpty,
    /// The string value must match the regular expression.
    Matches(String),
}

/// One parameter of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Canonical name; also the CLI flag and `PIPER_<name>` suffix.
    pub name: String,
    /// Declared data type.
    pub param_type: ParamType,
    /// Whether resolution must produce a value.
    pub mandatory: bool,
    /// Metadata default, the lowest-precedence source.
    pub default: Option<ParamValue>,
    /// Scopes the parameter may be supplied in.
    pub scopes: Vec<Scope>,
    /// Older names still honored for compatibility.
    pub aliases: Vec<Alias>,
    /// Secret-store and CPE locations the value may be drawn from.
    pub resource_refs: Vec<ResourceReference>,
    /// Whether the resolved value is registered for log masking.
    pub secret: bool,
    /// Additional predicates enforced by the validator.
    pub checks: Vec<ParamCheck>,
    /// Short human description, shown in `--help`.
    pub description: String,
}

impl Parameter {
    /// Creates a parameter allowed in every scope, with no default.
    #[must_use]
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            mandatory: false,
            default: None,
            scopes: vec![Scope::General, Scope::Stages, Scope::Steps, Scope::Parameters],
            aliases: Vec::new(),
            resource_refs: Vec::new(),
            secret: false,
            checks: Vec::new(),
            description: String::new(),
        }
    }

    /// Marks the parameter mandatory.
    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Sets the metadata default.
    #[must_use]
    pub fn with_default(mut self, value: ParamValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Restricts the scopes the parameter may be supplied in.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<Scope>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Adds an alias.
    #[must_use]
    pub fn with_alias(mut self, alias: Alias) -> Self {
        self.aliases.push(alias);
        self
    }

    /// Adds a resource reference, consulted in declaration order.
    #[must_use]
    pub fn with_resource_ref(mut self, resource_ref: ResourceReference) -> Self {
        self.resource_refs.push(resource_ref);
        self
    }

    /// Marks the resolved value as a secret.
    #[must_use]
    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    /// Adds a validator predicate.
    #[must_use]
    pub fn with_check(mut self, check: ParamCheck) -> Self {
        self.checks.push(check);
        self
    }

    /// Sets the human description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// All names this parameter answers to, canonical name first.
    #[must_use]
    pub fn all_names(&self) -> Vec<&str> {
        let mut names = vec![self.name.as_str()];
        names.extend(self.aliases.iter().map(|a| a.name.as_str()));
        names
    }
}

/// A credential a step consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSpec {
    /// Credential identifier in the credentials store.
    pub id: String,
    /// Kind of credential (`usernamePassword`, `token`, `file`).
    pub kind: String,
}

/// A CPE resource a step is allowed to write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputResource {
    /// CPE category directory.
    pub category: String,
    /// Entry names the step writes within the category.
    pub names: Vec<String>,
}

impl OutputResource {
    /// Creates an output resource declaration.
    #[must_use]
    pub fn new(category: impl Into<String>, names: Vec<String>) -> Self {
        Self {
            category: category.into(),
            names,
        }
    }
}

/// Container the step prefers to run in, when the orchestrator supports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Image reference.
    pub image: String,
    /// Environment entries for the container.
    pub env: Vec<(String, String)>,
    /// Raw runtime options.
    pub options: Vec<String>,
}

/// Immutable description of one pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMetadata {
    /// Logical step name, the CLI subcommand.
    pub name: String,
    /// Human description, shown in `--help`.
    pub description: String,
    /// Declared parameters.
    pub parameters: Vec<Parameter>,
    /// Credentials the step consumes.
    pub secrets: Vec<SecretSpec>,
    /// CPE resources the step may write.
    pub outputs: Vec<OutputResource>,
    /// Preferred container, if any.
    pub container: Option<ContainerSpec>,
}

impl StepMetadata {
    /// Creates metadata with no parameters, secrets or outputs.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            secrets: Vec::new(),
            outputs: Vec::new(),
            container: None,
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Adds a secret declaration.
    #[must_use]
    pub fn with_secret(mut self, secret: SecretSpec) -> Self {
        self.secrets.push(secret);
        self
    }

    /// Adds an output resource declaration.
    #[must_use]
    pub fn with_output(mut self, output: OutputResource) -> Self {
        self.outputs.push(output);
        self
    }

    /// Looks up a parameter by canonical name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}
