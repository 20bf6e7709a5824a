//! Pluggable secret stores
//!
//! The resolver reaches credentials and vault secrets only through these
//! traits; the concrete backing (orchestrator credential plugin, vault
//! server, plain environment) is swappable. The environment-backed store
//! is the default for CLI invocations, the in-memory store serves tests.

use std::collections::HashMap;

/// A credential held by the credentials store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    /// Account name, if the credential carries one.
    pub username: Option<String>,
    /// Password, if the credential carries one.
    pub password: Option<String>,
    /// Bearer token, if the credential carries one.
    pub token: Option<String>,
}

impl Credential {
    /// Returns the named field (`username`, `password` or `token`).
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "username" => self.username.as_deref(),
            "password" => self.password.as_deref(),
            "token" => self.token.as_deref(),
            _ => None,
        }
    }
}

/// Maps credential IDs to credentials.
pub trait CredentialStore: Send + Sync {
    /// Looks up a credential by its logical ID.
    fn credential(&self, id: &str) -> Option<Credential>;
}

/// Maps vault paths to named secrets.
pub trait Vault: Send + Sync {
    /// Looks up one named secret below a vault path.
    fn secret(&self, path: &str, name: &str) -> Option<String>;
}

/// The secret-store bundle handed to the resolver.
pub struct SecretStores {
    /// Credentials store backing.
    pub credentials: Box<dyn CredentialStore>,
    /// Vault backing.
    pub vault: Box<dyn Vault>,
}

impl SecretStores {
    /// Stores backed by `PIPER_*` environment variables, the default
    /// for CLI invocations.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            credentials: Box::new(EnvSecretStore),
            vault: Box::new(EnvSecretStore),
        }
    }
}

/// Environment-backed store: credential `id` reads `PIPER_<id>`, vault
/// secret `name` reads `PIPER_<name>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretStore;

impl CredentialStore for EnvSecretStore {
    fn credential(&self, id: &str) -> Option<Credential> {
        let value = std::env::var(format!("PIPER_{id}")).ok()?;
        Some(Credential {
            username: std::env::var(format!("PIPER_{id}_username")).ok(),
            password: Some(value.clone()),
            token: Some(value),
        })
    }
}

impl Vault for EnvSecretStore {
    fn secret(&self, _path: &str, name: &str) -> Option<String> {
        std::env::var(format!("PIPER_{name}")).ok()
    }
}

/// In-memory store for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct InMemorySecretStore {
    credentials: HashMap<String, Credential>,
    vault: HashMap<(String, String), String>,
}

impl InMemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a credential under an ID.
    pub fn add_credential(&mut self, id: impl Into<String>, credential: Credential) {
        self.credentials.insert(id.into(), credential);
    }

    /// Adds a vault secret under a path and name.
    pub fn add_vault_secret(
        &mut self,
        path: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.vault.insert((path.into(), name.into()), value.into());
    }
}

impl CredentialStore for InMemorySecretStore {
    fn credential(&self, id: &str) -> Option<Credential> {
        self.credentials.get(id).cloned()
    }
}

impl Vault for InMemorySecretStore {
    fn secret(&self, path: &str, name: &str) -> Option<String> {
        self.vault
            .get(&(path.to_string(), name.to_string()))
            .cloned()
    }
}
