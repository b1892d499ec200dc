//! Persisted toggle state.
//!
//! Toggle components store their enabled flag under `"hack." + id`.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Result;

pub trait Preferences {
    fn get_bool(&self, key: &str, default: bool) -> bool;
    fn set_bool(&mut self, key: &str, value: bool);
}

/// Preference key for a toggle component's enabled flag.
pub fn toggle_key(id: &str) -> String {
    format!("hack.{}", id)
}

/// Process-lifetime preferences.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    values: HashMap<String, bool>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preferences with the given toggle ids switched on.
    pub fn with_enabled<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values = ids
            .into_iter()
            .map(|id| (toggle_key(id.as_ref()), true))
            .collect();
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Preferences for MemoryPreferences {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values.get(key).copied().unwrap_or(default)
    }

    fn set_bool(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_string(), value);
    }
}

/// Preferences stored as a flat JSON object.
///
/// Values of other types written by other tools are kept untouched.
#[derive(Debug, Clone)]
pub struct JsonPreferences {
    path: PathBuf,
    values: BTreeMap<String, Value>,
    autosave: bool,
    dirty: bool,
}

impl JsonPreferences {
    /// Load from `path`; a missing file yields empty preferences.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No preferences at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            values,
            autosave: false,
            dirty: false,
        })
    }

    /// Save after every change.
    pub fn autosave(mut self, enabled: bool) -> Self {
        self.autosave = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn save(&mut self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, content)?;
        self.dirty = false;
        info!("Saved preferences to {}", self.path.display());
        Ok(())
    }

    /// Save only if something changed since the last save.
    pub fn flush(&mut self) -> Result<()> {
        if self.dirty { self.save() } else { Ok(()) }
    }
}

impl Preferences for JsonPreferences {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(Value::Bool(value)) => *value,
            Some(other) => {
                warn!("Preference {} is not a boolean: {}", key, other);
                default
            }
            None => default,
        }
    }

    fn set_bool(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_string(), Value::Bool(value));
        self.dirty = true;
        if self.autosave
            && let Err(e) = self.save()
        {
            warn!("Failed to save preferences: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_toggle_key() {
        assert_eq!(toggle_key("noclip"), "hack.noclip");
    }

    #[test]
    fn test_memory_preferences_defaults() {
        let mut prefs = MemoryPreferences::with_enabled(["noclip"]);
        assert!(prefs.get_bool("hack.noclip", false));
        assert!(!prefs.get_bool("hack.speedhack", false));
        assert!(prefs.get_bool("hack.speedhack", true));

        prefs.set_bool("hack.noclip", false);
        assert!(!prefs.get_bool("hack.noclip", true));
    }

    #[test]
    fn test_json_preferences_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");

        let mut prefs = JsonPreferences::load(&path).unwrap();
        assert!(!prefs.get_bool("hack.noclip", false));
        prefs.set_bool("hack.noclip", true);
        assert!(prefs.is_dirty());
        prefs.flush().unwrap();
        assert!(!prefs.is_dirty());

        let reloaded = JsonPreferences::load(&path).unwrap();
        assert!(reloaded.get_bool("hack.noclip", false));
    }

    #[test]
    fn test_json_preferences_autosave() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");

        let mut prefs = JsonPreferences::load(&path).unwrap().autosave(true);
        prefs.set_bool("hack.speedhack", true);
        assert!(path.exists());
        assert!(JsonPreferences::load(&path).unwrap().get_bool("hack.speedhack", false));
    }

    #[test]
    fn test_json_preferences_keep_foreign_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, r#"{"menu.scale": 1.5, "hack.noclip": "yes"}"#).unwrap();

        let mut prefs = JsonPreferences::load(&path).unwrap();
        assert!(!prefs.get_bool("hack.noclip", false));
        prefs.set_bool("hack.noclip", true);
        prefs.save().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["menu.scale"], 1.5);
        assert_eq!(value["hack.noclip"], true);
    }

    #[test]
    fn test_json_preferences_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "not json").unwrap();
        assert!(JsonPreferences::load(&path).is_err());
    }
}
