use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Per-environment settings: which provider to use and how names are qualified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Name of the provider entry in the global config.
    #[serde(default)]
    pub provider: String,
    /// Hierarchical prefix (e.g. `/app/dev`); a trailing slash is implied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
    /// Flat prefix prepended verbatim (e.g. `myapp_`). Ignored when `path_prefix` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl EnvConfig {
    pub fn with_path_prefix(path_prefix: impl Into<String>) -> Self {
        Self {
            path_prefix: Some(path_prefix.into()),
            ..Self::default()
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Build the fully-qualified secret name for `key`.
    pub fn apply_prefix(&self, key: &str) -> String {
        format!("{}{key}", self.resolved_prefix())
    }

    /// Strip the configured prefix from a stored name for presentation.
    pub fn trim_prefix<'a>(&self, name: &'a str) -> &'a str {
        let prefix = self.resolved_prefix();
        name.strip_prefix(prefix.as_str()).unwrap_or(name)
    }

    /// The configured prefix in normalized form, or an empty string.
    pub fn resolved_prefix(&self) -> String {
        if let Some(path_prefix) = non_empty(&self.path_prefix) {
            return ensure_trailing_slash(path_prefix);
        }
        non_empty(&self.prefix).unwrap_or_default().to_string()
    }
}

/// Provider entry from the global config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registered provider type (e.g. `local-file`).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionConfig>,
}

/// Encryption settings for local storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
    /// Environment variable holding key material; preferred over `key_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_env: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn ensure_trailing_slash(prefix: &str) -> String {
    if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_prefix_gets_trailing_slash() {
        assert_eq!(
            EnvConfig::with_path_prefix("/app/dev").apply_prefix("DB_URL"),
            "/app/dev/DB_URL"
        );
        assert_eq!(
            EnvConfig::with_path_prefix("/app/dev/").apply_prefix("DB_URL"),
            "/app/dev/DB_URL"
        );
    }

    #[test]
    fn flat_prefix_is_verbatim() {
        let cfg = EnvConfig::with_prefix("myapp_");
        assert_eq!(cfg.apply_prefix("DB_URL"), "myapp_DB_URL");
        assert_eq!(cfg.trim_prefix("myapp_DB_URL"), "DB_URL");
    }

    #[test]
    fn path_prefix_wins_over_flat_prefix() {
        let cfg = EnvConfig {
            provider: "local".into(),
            path_prefix: Some("/app/prod".into()),
            prefix: Some("ignored_".into()),
        };
        assert_eq!(cfg.resolved_prefix(), "/app/prod/");
        assert_eq!(cfg.apply_prefix("KEY"), "/app/prod/KEY");
    }

    #[test]
    fn empty_prefixes_are_ignored() {
        let cfg = EnvConfig {
            provider: String::new(),
            path_prefix: Some(String::new()),
            prefix: None,
        };
        assert_eq!(cfg.resolved_prefix(), "");
        assert_eq!(cfg.apply_prefix("KEY"), "KEY");
    }

    #[test]
    fn trim_leaves_foreign_names_alone() {
        let cfg = EnvConfig::with_path_prefix("/app/dev");
        assert_eq!(cfg.trim_prefix("/app/dev/KEY"), "KEY");
        assert_eq!(cfg.trim_prefix("/other/KEY"), "/other/KEY");
    }
}
