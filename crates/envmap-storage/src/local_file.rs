use std::{
    collections::BTreeMap,
    fs,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use envmap_core::{
    EnvConfig, MetadataLister, Provider, ProviderConfig, ProviderError, SecretRecord,
};
use tracing::{debug, instrument};

use crate::{
    atomic, cipher,
    error::StoreError,
    key::{derive_key, load_key_material, DerivedKey},
    lock::StoreLock,
    records::{self, Entries},
};

/// Single encrypted file holding every entry, guarded by [`StoreLock`].
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    key: DerivedKey,
    lock: StoreLock,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>, key: DerivedKey) -> Self {
        let path = path.into();
        let lock = StoreLock::for_store(&path);
        Self { path, key, lock }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of all entries under the lock.
    pub fn read_all(&self) -> Result<Entries, StoreError> {
        self.lock.with_exclusive(|| self.read_unlocked())
    }

    /// Read-modify-write under one lock acquisition.
    pub fn update<T>(&self, f: impl FnOnce(&mut Entries) -> T) -> Result<T, StoreError> {
        self.lock.with_exclusive(|| {
            let mut entries = self.read_unlocked()?;
            let out = f(&mut entries);
            self.write_unlocked(&entries)?;
            Ok(out)
        })
    }

    fn read_unlocked(&self) -> Result<Entries, StoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(err) => return Err(StoreError::io("read local store")(err)),
        };
        if raw.is_empty() {
            return Ok(Entries::new());
        }
        let plaintext = cipher::decrypt(&raw, &self.key)?;
        let entries = records::deserialize(&plaintext)?;
        debug!(path = %self.path.display(), entries = entries.len(), "store read");
        Ok(entries)
    }

    fn write_unlocked(&self, entries: &Entries) -> Result<(), StoreError> {
        let plaintext = records::serialize(entries)?;
        let blob = cipher::encrypt(&plaintext, &self.key)?;
        atomic::write(&self.path, &blob)?;
        debug!(path = %self.path.display(), entries = entries.len(), "store written");
        Ok(())
    }
}

/// `local-file` provider: the encrypted store seen through one environment's prefix.
pub struct LocalFileProvider {
    env: EnvConfig,
    store: Arc<LocalStore>,
}

impl LocalFileProvider {
    /// Validate config, load key material and derive the store key.
    pub fn new(env: EnvConfig, cfg: &ProviderConfig) -> Result<Self, StoreError> {
        let path = cfg.path.as_deref().ok_or(StoreError::MissingField {
            provider: "local-file",
            field: "path",
        })?;
        let encryption = cfg.encryption.as_ref().ok_or(StoreError::MissingField {
            provider: "local-file",
            field: "encryption",
        })?;
        let key = derive_key(&load_key_material(encryption)?)?;
        Ok(Self::with_store(env, LocalStore::new(path, key)))
    }

    pub fn with_store(env: EnvConfig, store: LocalStore) -> Self {
        Self {
            env,
            store: Arc::new(store),
        }
    }

    /// Registry factory for `local-file` / `local-store`.
    pub fn factory(
        env: &EnvConfig,
        cfg: &ProviderConfig,
    ) -> Result<Box<dyn Provider>, ProviderError> {
        Ok(Box::new(Self::new(env.clone(), cfg)?))
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Run blocking store work off the async executor.
    async fn blocking<T, F>(&self, f: F) -> Result<T, ProviderError>
    where
        T: Send + 'static,
        F: FnOnce(&LocalStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| ProviderError::Storage {
                reason: format!("store task failed: {e}"),
            })?
            .map_err(ProviderError::from)
    }

    /// Entries whose stored name starts with the prefixed `filter`, keyed by unprefixed name.
    fn select(&self, entries: Entries, filter: &str) -> BTreeMap<String, SecretRecord> {
        let wanted = self.env.apply_prefix(filter);
        entries
            .into_iter()
            .filter(|(name, _)| name.starts_with(&wanted))
            .map(|(name, entry)| (self.env.trim_prefix(&name).to_string(), entry.into()))
            .collect()
    }
}

#[async_trait]
impl Provider for LocalFileProvider {
    #[instrument(skip_all, fields(name = %name))]
    async fn get(&self, name: &str) -> Result<String, ProviderError> {
        let full = self.env.apply_prefix(name);
        let found = self
            .blocking(move |store| Ok(store.read_all()?.remove(&full)))
            .await?;
        found
            .map(|entry| entry.value)
            .ok_or_else(|| ProviderError::NotFound {
                name: name.to_string(),
            })
    }

    #[instrument(skip_all, fields(filter = %filter))]
    async fn list(&self, filter: &str) -> Result<BTreeMap<String, String>, ProviderError> {
        let records = self.list_with_metadata(filter).await?;
        Ok(records
            .into_iter()
            .map(|(name, record)| (name, record.value))
            .collect())
    }

    #[instrument(skip_all, fields(name = %name))]
    async fn set(&self, name: &str, value: &str) -> Result<(), ProviderError> {
        let full = self.env.apply_prefix(name);
        let value = value.to_string();
        self.blocking(move |store| {
            store.update(|entries| records::upsert(entries, full, value, Utc::now()))
        })
        .await
    }

    fn as_metadata_lister(&self) -> Option<&dyn MetadataLister> {
        Some(self)
    }
}

#[async_trait]
impl MetadataLister for LocalFileProvider {
    #[instrument(skip_all, fields(filter = %filter))]
    async fn list_with_metadata(
        &self,
        filter: &str,
    ) -> Result<BTreeMap<String, SecretRecord>, ProviderError> {
        let entries = self.blocking(|store| store.read_all()).await?;
        Ok(self.select(entries, filter))
    }
}
