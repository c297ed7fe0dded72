//! Scoped secret resolution
//!
//! Secrets are referenced by name in configuration and resolved through a
//! capability handed to each task executor. Values never reach the run
//! record, logs, or serialized output.

use std::collections::HashMap;
use std::fmt;

/// A resolved secret value. Redacted in `Debug` and `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Capability for resolving named secrets
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<SecretValue>;
}

/// Resolves `name` from the environment variable `<prefix><NAME>`
#[derive(Debug, Clone, Default)]
pub struct EnvSecretResolver {
    prefix: String,
}

impl EnvSecretResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable consulted for `name`
    pub fn variable_for(&self, name: &str) -> String {
        let normalized: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{}{}", self.prefix, normalized)
    }
}

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, name: &str) -> Option<SecretValue> {
        std::env::var(self.variable_for(name)).ok().map(SecretValue)
    }
}

/// Fixed set of secrets, for tests and embedding
#[derive(Default)]
pub struct StaticSecrets {
    values: HashMap<String, SecretValue>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), SecretValue::new(value));
        self
    }
}

impl SecretResolver for StaticSecrets {
    fn resolve(&self, name: &str) -> Option<SecretValue> {
        self.values.get(name).cloned()
    }
}

impl fmt::Debug for StaticSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        f.debug_struct("StaticSecrets").field("names", &names).finish()
    }
}
