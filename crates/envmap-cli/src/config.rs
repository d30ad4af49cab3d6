use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use color_eyre::{eyre::eyre, Result};
use dirs::{config_dir, data_dir};
use envmap_core::{EncryptionConfig, EnvConfig, ProviderConfig};
use serde::{Deserialize, Serialize};

/// User-level configuration loaded from `~/.config/envmap/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Named provider instances.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Named environments, each pointing at a provider.
    #[serde(default)]
    pub envs: BTreeMap<String, EnvConfig>,
}

impl Config {
    /// Environment settings and the provider entry they reference.
    pub fn resolve(&self, env: &str) -> Result<(&EnvConfig, &ProviderConfig)> {
        let env_cfg = self
            .envs
            .get(env)
            .ok_or_else(|| eyre!("environment {env:?} is not configured"))?;
        let provider = self.providers.get(&env_cfg.provider).ok_or_else(|| {
            eyre!(
                "environment {env:?} references unknown provider {:?}",
                env_cfg.provider
            )
        })?;
        Ok((env_cfg, provider))
    }

    /// Starter config: one local encrypted store and a `dev` environment.
    pub fn starter(store_path: PathBuf, key_path: PathBuf) -> Self {
        let provider = ProviderConfig {
            kind: "local-file".into(),
            path: Some(store_path),
            encryption: Some(EncryptionConfig {
                kind: Some("aes-gcm".into()),
                key_file: Some(key_path),
                key_env: None,
            }),
        };
        let env = EnvConfig {
            provider: "local".into(),
            path_prefix: Some("/app/dev".into()),
            prefix: None,
        };
        Self {
            providers: BTreeMap::from([("local".to_string(), provider)]),
            envs: BTreeMap::from([("dev".to_string(), env)]),
        }
    }
}

/// Load config from an explicit path or the default one; if missing, return defaults.
pub fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_from_path(path),
        None => load_from_path(default_path()?),
    }
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| eyre!("no config dir available"))?;
    Ok(base.join("envmap").join("config.toml"))
}

/// Default location of the local store file.
pub fn default_store_path() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| eyre!("no data dir available"))?;
    Ok(base.join("envmap").join("secrets.db"))
}

/// Default location of the local store key file.
pub fn default_key_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| eyre!("no config dir available"))?;
    Ok(base.join("envmap").join("key"))
}

/// Write `config` to `path` unless a file is already there, to avoid clobbering user edits.
pub fn write_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
