//! Configuration for a patch session.
//!
//! ```ignore
//! use patchdeck::config::PatchConfig;
//!
//! // From a TOML file, missing keys fall back to defaults
//! let config = PatchConfig::load("patchdeck.toml")?;
//!
//! // Or built in code
//! let config = PatchConfig::builder()
//!     .catalog_dir("hacks")
//!     .target_version("2.204")
//!     .build();
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::component::TogglePolicy;
use crate::error::{Error, Result};
use crate::resolver::MatchPolicy;
use crate::version::{AnyVersion, GameVersion, VersionCheck};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// Directory scanned for catalog files
    pub catalog_dir: PathBuf,
    /// Catalog file extension, without the dot
    pub extension: String,
    /// JSON file holding toggle state
    pub preferences: PathBuf,
    /// Version of the patched program; `None` accepts every constraint
    pub target_version: Option<String>,
    pub match_policy: MatchPolicy,
    pub toggle_policy: TogglePolicy,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            catalog_dir: PathBuf::from("hacks"),
            extension: "json".to_string(),
            preferences: PathBuf::from("patchdeck-prefs.json"),
            target_version: None,
            match_policy: MatchPolicy::default(),
            toggle_policy: TogglePolicy::default(),
        }
    }
}

impl PatchConfig {
    pub fn builder() -> PatchConfigBuilder {
        PatchConfigBuilder::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let extension = self.extension.trim_start_matches('.');
        if extension.is_empty() {
            return Err(Error::Config("extension must not be empty".to_string()));
        }
        if self.target_version.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(Error::Config("target_version must not be empty".to_string()));
        }
        Ok(())
    }

    /// Version gate for the configured target version.
    pub fn version_check(&self) -> Box<dyn VersionCheck> {
        match &self.target_version {
            Some(version) => Box::new(GameVersion::parse(version)),
            None => Box::new(AnyVersion),
        }
    }
}

/// Builder for PatchConfig
#[derive(Debug, Clone, Default)]
pub struct PatchConfigBuilder {
    catalog_dir: Option<PathBuf>,
    extension: Option<String>,
    preferences: Option<PathBuf>,
    target_version: Option<String>,
    match_policy: Option<MatchPolicy>,
    toggle_policy: Option<TogglePolicy>,
}

impl PatchConfigBuilder {
    pub fn catalog_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.catalog_dir = Some(path.into());
        self
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn preferences<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.preferences = Some(path.into());
        self
    }

    pub fn target_version(mut self, version: impl Into<String>) -> Self {
        self.target_version = Some(version.into());
        self
    }

    pub fn match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = Some(policy);
        self
    }

    pub fn toggle_policy(mut self, policy: TogglePolicy) -> Self {
        self.toggle_policy = Some(policy);
        self
    }

    pub fn build(self) -> PatchConfig {
        let default = PatchConfig::default();
        PatchConfig {
            catalog_dir: self.catalog_dir.unwrap_or(default.catalog_dir),
            extension: self.extension.unwrap_or(default.extension),
            preferences: self.preferences.unwrap_or(default.preferences),
            target_version: self.target_version.or(default.target_version),
            match_policy: self.match_policy.unwrap_or(default.match_policy),
            toggle_policy: self.toggle_policy.unwrap_or(default.toggle_policy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PatchConfig::default();
        assert_eq!(config.catalog_dir, PathBuf::from("hacks"));
        assert_eq!(config.extension, "json");
        assert_eq!(config.match_policy, MatchPolicy::First);
        assert_eq!(config.toggle_policy, TogglePolicy::Requested);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = PatchConfig::parse(
            r#"
            target_version = "2.204"
            match_policy = "unique"
            toggle_policy = "outcome"
            "#,
        )
        .unwrap();
        assert_eq!(config.target_version.as_deref(), Some("2.204"));
        assert_eq!(config.match_policy, MatchPolicy::Unique);
        assert_eq!(config.toggle_policy, TogglePolicy::Outcome);
        assert_eq!(config.extension, "json");
    }

    #[test]
    fn test_parse_rejects_unknown_policy() {
        assert!(matches!(
            PatchConfig::parse(r#"match_policy = "sometimes""#),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_parse_rejects_empty_extension() {
        assert!(matches!(
            PatchConfig::parse(r#"extension = ".""#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("patchdeck.toml");
        fs::write(&path, "catalog_dir = \"catalogs\"\n").unwrap();

        let config = PatchConfig::load(&path).unwrap();
        assert_eq!(config.catalog_dir, PathBuf::from("catalogs"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = PatchConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_builder() {
        let config = PatchConfig::builder()
            .catalog_dir("catalogs")
            .target_version("2.113")
            .match_policy(MatchPolicy::All)
            .build();
        assert_eq!(config.catalog_dir, PathBuf::from("catalogs"));
        assert_eq!(config.match_policy, MatchPolicy::All);
        assert_eq!(config.preferences, PathBuf::from("patchdeck-prefs.json"));

        let version = config.version_check();
        assert!(version.satisfies("2.113"));
        assert!(!version.satisfies(">=2.200"));
    }

    #[test]
    fn test_version_check_without_target() {
        let version = PatchConfig::default().version_check();
        assert!(version.satisfies("<1.0"));
    }
}
