use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{
    config::{EnvConfig, ProviderConfig},
    provider::{Provider, ProviderError},
};

/// Non-persistent provider for tests and dry runs.
/// Values live only as long as the instance; there is no metadata capability.
#[derive(Debug, Default, Clone)]
pub struct InMemoryProvider {
    env: EnvConfig,
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl InMemoryProvider {
    pub fn new(env: EnvConfig) -> Self {
        Self {
            env,
            inner: Arc::default(),
        }
    }

    /// Registry factory; the provider config carries nothing this backend needs.
    pub fn factory(
        env: &EnvConfig,
        _provider: &ProviderConfig,
    ) -> Result<Box<dyn Provider>, ProviderError> {
        Ok(Box::new(Self::new(env.clone())))
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, ProviderError> {
        self.inner.lock().map_err(|err| ProviderError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    async fn get(&self, name: &str) -> Result<String, ProviderError> {
        let entries = self.entries()?;
        entries
            .get(&self.env.apply_prefix(name))
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                name: name.to_string(),
            })
    }

    async fn list(&self, filter: &str) -> Result<BTreeMap<String, String>, ProviderError> {
        let entries = self.entries()?;
        let wanted = self.env.apply_prefix(filter);
        Ok(entries
            .iter()
            .filter(|(name, _)| name.starts_with(&wanted))
            .map(|(name, value)| (self.env.trim_prefix(name).to_string(), value.clone()))
            .collect())
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), ProviderError> {
        let mut entries = self.entries()?;
        entries.insert(self.env.apply_prefix(name), value.to_string());
        Ok(())
    }
}
