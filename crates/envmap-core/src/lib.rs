//! Core abstractions for envmap: the provider contract, prefix policy and the provider registry.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod config;
pub mod memory;
pub mod provider;
pub mod registry;

pub use config::{EncryptionConfig, EnvConfig, ProviderConfig};
pub use provider::{list_or_describe, MetadataLister, Provider, ProviderError, SecretRecord};
pub use registry::{ProviderInfo, ProviderRegistry};
