//! Settings store — last-used credential fields for pre-population.
//!
//! Persists a `SettingsFile` JSON document at a caller-supplied path.
//! Writes use an atomic `.tmp` + rename pattern.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Key-value persistence consumed by the orchestrator. Only the last email
/// and username are kept; passwords are never stored.
pub trait SettingsStore: Send + Sync {
    fn set_last_email(&self, email: &str) -> Result<(), StoreError>;
    fn set_last_username(&self, username: &str) -> Result<(), StoreError>;
    fn last_email(&self) -> Result<String, StoreError>;
    fn last_username(&self) -> Result<String, StoreError>;
}

/// On-disk settings payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct SettingsFile {
    #[serde(default)]
    last_email: String,
    #[serde(default)]
    last_username: String,
    updated_at: DateTime<Utc>,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            last_email: String::new(),
            last_username: String::new(),
            updated_at: Utc::now(),
        }
    }
}

/// File-backed [`SettingsStore`].
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the settings document; a missing file yields empty defaults.
    fn load(&self) -> Result<SettingsFile, StoreError> {
        if !self.path.exists() {
            return Ok(SettingsFile::default());
        }
        let contents =
            std::fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save atomically: write `<path>.tmp`, then rename to `<path>`.
    fn save(&self, settings: &SettingsFile) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| StoreError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::io(&self.path, e))?;
        Ok(())
    }

    fn update(
        &self,
        mutate: impl FnOnce(&mut SettingsFile),
    ) -> Result<(), StoreError> {
        let mut settings = self.load()?;
        mutate(&mut settings);
        settings.updated_at = Utc::now();
        self.save(&settings)
    }
}

impl SettingsStore for JsonSettingsStore {
    fn set_last_email(&self, email: &str) -> Result<(), StoreError> {
        self.update(|settings| settings.last_email = email.to_string())
    }

    fn set_last_username(&self, username: &str) -> Result<(), StoreError> {
        self.update(|settings| settings.last_username = username.to_string())
    }

    fn last_email(&self) -> Result<String, StoreError> {
        Ok(self.load()?.last_email)
    }

    fn last_username(&self) -> Result<String, StoreError> {
        Ok(self.load()?.last_username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_defaults_when_file_missing() {
        let tmp = TempDir::new().expect("tempdir");
        let store = JsonSettingsStore::new(tmp.path().join("settings.json"));
        assert_eq!(store.last_email().expect("load"), "");
        assert_eq!(store.last_username().expect("load"), "");
    }

    #[test]
    fn roundtrip_email_and_username() {
        let tmp = TempDir::new().expect("tempdir");
        let store = JsonSettingsStore::new(tmp.path().join("settings.json"));

        store.set_last_email("grid@example.org").expect("set email");
        store.set_last_username("gridwalker").expect("set username");

        assert_eq!(store.last_email().expect("load"), "grid@example.org");
        assert_eq!(store.last_username().expect("load"), "gridwalker");
    }

    #[test]
    fn setting_one_field_preserves_the_other() {
        let tmp = TempDir::new().expect("tempdir");
        let store = JsonSettingsStore::new(tmp.path().join("settings.json"));

        store.set_last_email("grid@example.org").expect("set email");
        store.set_last_username("gridwalker").expect("set username");
        store.set_last_email("other@example.org").expect("update email");

        assert_eq!(store.last_username().expect("load"), "gridwalker");
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("settings.json");
        let store = JsonSettingsStore::new(&path);
        store.set_last_email("grid@example.org").expect("set email");
        assert!(
            !path.with_extension("json.tmp").exists(),
            "tmp file should be removed after atomic rename"
        );
    }

    #[test]
    fn creates_missing_parent_directories() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("nested").join("dir").join("settings.json");
        let store = JsonSettingsStore::new(&path);
        store.set_last_username("gridwalker").expect("set username");
        assert_eq!(store.last_username().expect("load"), "gridwalker");
    }
}
