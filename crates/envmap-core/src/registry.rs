use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    config::{EnvConfig, ProviderConfig},
    provider::{Provider, ProviderError},
};

/// Builds a provider for one environment from its provider config.
pub type Factory = fn(&EnvConfig, &ProviderConfig) -> Result<Box<dyn Provider>, ProviderError>;

/// Metadata about a registered provider type.
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    /// Unique identifier (e.g. `local-file`).
    pub kind: &'static str,
    pub description: &'static str,
    pub factory: Factory,
    pub required_fields: &'static [&'static str],
    pub optional_fields: &'static [&'static str],
}

/// Explicit table of provider types, populated once at startup.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, ProviderInfo>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider type. Empty and duplicate type names are rejected.
    pub fn register(&mut self, info: ProviderInfo) -> Result<(), ProviderError> {
        if info.kind.is_empty() {
            return Err(ProviderError::Configuration {
                reason: "provider type cannot be empty".into(),
            });
        }
        if self.providers.contains_key(info.kind) {
            return Err(ProviderError::Configuration {
                reason: format!("provider type {:?} already registered", info.kind),
            });
        }
        debug!(kind = info.kind, "registered provider type");
        self.providers.insert(info.kind, info);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<&ProviderInfo> {
        self.providers.get(kind)
    }

    /// Registered types, sorted by name.
    pub fn infos(&self) -> impl Iterator<Item = &ProviderInfo> {
        self.providers.values()
    }

    pub fn types(&self) -> Vec<&'static str> {
        self.providers.keys().copied().collect()
    }

    /// Construct a provider for `env` using the factory named by `provider.kind`.
    pub fn build(
        &self,
        env: &EnvConfig,
        provider: &ProviderConfig,
    ) -> Result<Box<dyn Provider>, ProviderError> {
        let info = self
            .get(&provider.kind)
            .ok_or_else(|| ProviderError::UnknownType {
                kind: provider.kind.clone(),
            })?;
        (info.factory)(env, provider)
    }
}
