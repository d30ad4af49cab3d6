use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by provider implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Requested secret does not exist.
    #[error("missing secret {name}")]
    NotFound { name: String },
    /// Provider could not be built or its key/config is unusable.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },
    /// No factory is registered for the requested type.
    #[error("unknown provider type: {kind}")]
    UnknownType { kind: String },
    /// Underlying storage failure (lock, io, decryption, parse).
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// A secret value plus optional metadata for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub value: String,
    /// `None` when the backend does not know when the secret was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Contract shared by every secret backend.
///
/// Names passed in are unprefixed; each provider applies the prefix policy of
/// the environment it was built for.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Retrieve a single secret by name.
    async fn get(&self, name: &str) -> Result<String, ProviderError>;

    /// Return all secrets whose name starts with `filter`, keyed by unprefixed name.
    async fn list(&self, filter: &str) -> Result<BTreeMap<String, String>, ProviderError>;

    /// Create or update a secret.
    async fn set(&self, name: &str, value: &str) -> Result<(), ProviderError>;

    /// Expose the metadata capability when the backend has one.
    fn as_metadata_lister(&self) -> Option<&dyn MetadataLister> {
        None
    }
}

/// Optional capability: list values together with their metadata in one call.
#[async_trait]
pub trait MetadataLister: Send + Sync {
    async fn list_with_metadata(
        &self,
        filter: &str,
    ) -> Result<BTreeMap<String, SecretRecord>, ProviderError>;
}

/// Fetch secrets with metadata when the provider supports it.
///
/// Providers without the capability still return every value, with
/// `created_at` left as `None` to signal "unknown".
pub async fn list_or_describe(
    provider: &dyn Provider,
    filter: &str,
) -> Result<BTreeMap<String, SecretRecord>, ProviderError> {
    if let Some(lister) = provider.as_metadata_lister() {
        return lister.list_with_metadata(filter).await;
    }

    let values = provider.list(filter).await?;
    Ok(values
        .into_iter()
        .map(|(name, value)| {
            (
                name,
                SecretRecord {
                    value,
                    created_at: None,
                },
            )
        })
        .collect())
}
