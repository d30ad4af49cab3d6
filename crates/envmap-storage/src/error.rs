use std::{io, path::PathBuf};

use envmap_core::ProviderError;
use thiserror::Error;

/// Failures of the local encrypted store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{provider} provider missing {field}")]
    MissingField {
        provider: &'static str,
        field: &'static str,
    },
    #[error("unsupported encryption type {0:?}; use aes-gcm")]
    UnsupportedEncryption(String),
    #[error("no key source provided; set encryption.key_env or encryption.key_file")]
    MissingKeySource,
    #[error("key env var {0} is empty or not set")]
    EmptyKeyEnv(String),
    #[error(
        "key file {} is too permissive ({mode:#o}); run: chmod 600 {}",
        .path.display(),
        .path.display()
    )]
    InsecurePermissions { path: PathBuf, mode: u32 },
    #[error(
        "key file {} is too short ({len} bytes); use at least {min} bytes of random data",
        .path.display()
    )]
    KeyTooShort { path: PathBuf, len: usize, min: usize },
    #[error("key file {} already exists; refusing to overwrite", .0.display())]
    KeyFileExists(PathBuf),
    #[error("key derivation failed: {0}")]
    InvalidMaterial(String),
    #[error("ciphertext too short")]
    CiphertextTooShort,
    #[error("authentication failed: wrong key or corrupted data")]
    AuthenticationFailed,
    #[error("encrypt failed: {0}")]
    Encrypt(String),
    #[error("acquire lock {}: {source}", .path.display())]
    LockAcquisition {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("in-process store lock poisoned")]
    Poisoned,
    #[error("parse local store: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> StoreError {
        let context = context.into();
        move |source| StoreError::Io { context, source }
    }

    /// True for failures caused by configuration or key sourcing rather than store state.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StoreError::MissingField { .. }
                | StoreError::UnsupportedEncryption(_)
                | StoreError::MissingKeySource
                | StoreError::EmptyKeyEnv(_)
                | StoreError::InsecurePermissions { .. }
                | StoreError::KeyTooShort { .. }
                | StoreError::InvalidMaterial(_)
        )
    }
}

impl From<StoreError> for ProviderError {
    fn from(err: StoreError) -> Self {
        if err.is_configuration() {
            ProviderError::Configuration {
                reason: err.to_string(),
            }
        } else {
            ProviderError::Storage {
                reason: err.to_string(),
            }
        }
    }
}
