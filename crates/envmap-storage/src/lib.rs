//! Local encrypted secret store: one AES-256-GCM sealed file per provider,
//! keyed via HKDF-SHA256, guarded by a sidecar file lock and replaced atomically on write.

pub mod atomic;
pub mod cipher;
pub mod error;
pub mod key;
pub mod local_file;
pub mod lock;
pub mod records;

use envmap_core::{ProviderError, ProviderInfo, ProviderRegistry};

pub use error::StoreError;
pub use key::generate_key_file;
pub use local_file::{LocalFileProvider, LocalStore};

const LOCAL_FIELDS: &[&str] = &["path", "encryption"];

/// Add the local store under `local-file` and its `local-store` alias.
pub fn register(registry: &mut ProviderRegistry) -> Result<(), ProviderError> {
    registry.register(ProviderInfo {
        kind: "local-file",
        description: "Encrypted local file storage",
        factory: LocalFileProvider::factory,
        required_fields: LOCAL_FIELDS,
        optional_fields: &[],
    })?;
    registry.register(ProviderInfo {
        kind: "local-store",
        description: "Encrypted local file storage (alias for local-file)",
        factory: LocalFileProvider::factory,
        required_fields: LOCAL_FIELDS,
        optional_fields: &[],
    })
}
