// src/warehouse/credentials.rs

//! Access-key resolution for bulk copies.

use std::collections::HashMap;
use std::fmt;

use crate::errors::CredentialError;

/// Key pair handed to the warehouse for reading the batch source.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Resolves a credential reference (e.g. `"aws_credentials"`) to keys.
pub trait CredentialProvider: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<Credentials, CredentialError>;
}

/// Reads `<REF>_ACCESS_KEY_ID` and `<REF>_SECRET_ACCESS_KEY` from the
/// environment, with the reference upper-cased and non-alphanumerics mapped
/// to `_`.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialProvider;

impl EnvCredentialProvider {
    fn var_prefix(reference: &str) -> String {
        reference
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }

    fn read(reference: &str, var: &str) -> Result<String, CredentialError> {
        match std::env::var(var) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            Ok(_) => Err(CredentialError::Unresolved {
                reference: reference.to_string(),
                reason: format!("{var} is empty"),
            }),
            Err(e) => Err(CredentialError::Unresolved {
                reference: reference.to_string(),
                reason: format!("{var}: {e}"),
            }),
        }
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn resolve(&self, reference: &str) -> Result<Credentials, CredentialError> {
        let prefix = Self::var_prefix(reference);
        Ok(Credentials {
            access_key: Self::read(reference, &format!("{prefix}_ACCESS_KEY_ID"))?,
            secret_key: Self::read(reference, &format!("{prefix}_SECRET_ACCESS_KEY"))?,
        })
    }
}

/// Fixed reference → keys map.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    entries: HashMap<String, Credentials>,
}

impl StaticCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        reference: &str,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.entries.insert(
            reference.to_string(),
            Credentials {
                access_key: access_key.into(),
                secret_key: secret_key.into(),
            },
        );
        self
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn resolve(&self, reference: &str) -> Result<Credentials, CredentialError> {
        self.entries
            .get(reference)
            .cloned()
            .ok_or_else(|| CredentialError::Unresolved {
                reference: reference.to_string(),
                reason: "no such credential".to_string(),
            })
    }
}
