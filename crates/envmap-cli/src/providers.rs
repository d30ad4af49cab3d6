use color_eyre::Result;
use envmap_core::{memory::InMemoryProvider, Provider, ProviderInfo, ProviderRegistry};
use tracing::debug;

use crate::config::Config;

/// Build the table of provider types available to this binary.
pub fn registry() -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    envmap_storage::register(&mut registry)?;
    registry.register(ProviderInfo {
        kind: "memory",
        description: "In-memory storage, discarded on exit (dry runs)",
        factory: InMemoryProvider::factory,
        required_fields: &[],
        optional_fields: &[],
    })?;
    Ok(registry)
}

/// Construct the provider configured for `env`.
pub fn open(config: &Config, registry: &ProviderRegistry, env: &str) -> Result<Box<dyn Provider>> {
    let (env_cfg, provider_cfg) = config.resolve(env)?;
    debug!(env, kind = %provider_cfg.kind, "opening provider");
    Ok(registry.build(env_cfg, provider_cfg)?)
}
