//! Module manifest definition

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::application::errors::ModuleError;

/// File every module directory carries
pub const MANIFEST_FILE: &str = "module.yaml";

/// Module metadata
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleManifest {
    /// Module name (required)
    pub name: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub author: Option<String>,

    /// Shared library, relative to the module directory
    #[serde(default)]
    pub library: Option<PathBuf>,

    /// Disabled modules load but expose no handlers
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Minimum mirbot version required
    #[serde(default)]
    pub min_bot_version: Option<String>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_enabled() -> bool {
    true
}

impl ModuleManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            description: None,
            author: None,
            library: None,
            enabled: true,
            min_bot_version: None,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModuleError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModuleError::Load(format!("Failed to read manifest: {}", e)))?;

        let manifest: Self = serde_yaml::from_str(&content)
            .map_err(|e| ModuleError::Load(format!("Failed to parse manifest: {}", e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ModuleError> {
        let valid_name = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_name {
            return Err(ModuleError::Load(format!("Invalid module name '{}'", self.name)));
        }

        if let Some(min) = &self.min_bot_version {
            if !version_satisfies(env!("CARGO_PKG_VERSION"), min) {
                return Err(ModuleError::Load(format!(
                    "Module '{}' needs mirbot >= {}, running {}",
                    self.name,
                    min,
                    env!("CARGO_PKG_VERSION")
                )));
            }
        }
        Ok(())
    }
}

/// `current >= required`, comparing dotted numeric parts
fn version_satisfies(current: &str, required: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split(|c: char| c == '.' || c == '-')
            .map_while(|part| part.parse().ok())
            .collect()
    };
    let (mut current, mut required) = (parse(current), parse(required));
    let len = current.len().max(required.len());
    current.resize(len, 0);
    required.resize(len, 0);
    current >= required
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_manifest() {
        let manifest: ModuleManifest = serde_yaml::from_str("name: afk\n").unwrap();
        assert_eq!(manifest.name, "afk");
        assert_eq!(manifest.version, "0.1.0");
        assert!(manifest.enabled);
        assert!(manifest.library.is_none());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_kebab_case_fields() {
        let manifest: ModuleManifest = serde_yaml::from_str(
            "name: seen\nlibrary: libmirbot_seen.so\nenabled: false\nmin-bot-version: '0.1'\n",
        )
        .unwrap();
        assert_eq!(manifest.library, Some(PathBuf::from("libmirbot_seen.so")));
        assert!(!manifest.enabled);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_name_and_future_version() {
        assert!(ModuleManifest::new("../escape").validate().is_err());

        let mut manifest = ModuleManifest::new("future");
        manifest.min_bot_version = Some("99.0.0".to_string());
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_version_compare() {
        assert!(version_satisfies("0.1.0", "0.1"));
        assert!(version_satisfies("1.2.3", "1.2.0"));
        assert!(!version_satisfies("1.2.3", "1.10.0"));
    }
}
