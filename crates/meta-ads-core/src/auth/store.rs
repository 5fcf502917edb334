use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigLocator;

use super::{AuthError, Profile};

/// Persistence abstraction for profiles and the active-profile marker.
pub trait CredentialStore {
    /// Fetch a profile by name, or the active profile when no name is given.
    fn get(&self, name: Option<&str>) -> Result<Option<Profile>, AuthError>;
    /// Insert or replace a profile. The first profile ever saved becomes active.
    fn save(&self, profile: &Profile) -> Result<(), AuthError>;
    /// Remove a profile. If it was active, an arbitrary remaining profile is
    /// promoted, or the active marker is cleared when none remain.
    fn delete(&self, name: &str) -> Result<(), AuthError>;
    /// Mark an existing profile as active; fails for unknown names.
    fn set_active(&self, name: &str) -> Result<(), AuthError>;
    fn list(&self) -> Result<Vec<Profile>, AuthError>;
    fn active_name(&self) -> Result<Option<String>, AuthError>;
}

/// Filesystem-backed profile storage located in the user configuration directory.
pub struct FileCredentialStore {
    locator: ConfigLocator,
}

impl FileCredentialStore {
    pub fn new(locator: ConfigLocator) -> Self {
        Self { locator }
    }

    pub fn with_default_locator() -> Result<Self, AuthError> {
        Ok(Self::new(ConfigLocator::new()?))
    }

    fn read_document(&self) -> Result<ConfigDocument, AuthError> {
        let path = self.locator.config_file();
        if !path.exists() {
            return Ok(ConfigDocument::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_document(&self, document: &ConfigDocument) -> Result<(), AuthError> {
        let payload = serde_json::to_string_pretty(document)?;
        Self::write_file(&self.locator.config_file(), &payload)
    }

    fn write_file(path: &Path, payload: &str) -> Result<(), AuthError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(payload.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perm = file.metadata()?.permissions();
            perm.set_mode(0o600);
            fs::set_permissions(path, perm)?;
        }

        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, name: Option<&str>) -> Result<Option<Profile>, AuthError> {
        let document = self.read_document()?;
        let name = match name {
            Some(name) => name.to_owned(),
            None => match document.active_profile.clone() {
                Some(active) => active,
                None => return Ok(None),
            },
        };
        Ok(document.profiles.get(&name).cloned())
    }

    fn save(&self, profile: &Profile) -> Result<(), AuthError> {
        let mut document = self.read_document()?;
        document
            .profiles
            .insert(profile.name.clone(), profile.clone());
        if document.active_profile.is_none() {
            document.active_profile = Some(profile.name.clone());
        }
        self.write_document(&document)
    }

    fn delete(&self, name: &str) -> Result<(), AuthError> {
        let mut document = self.read_document()?;
        document.profiles.remove(name);
        if document.active_profile.as_deref() == Some(name) {
            document.active_profile = document.profiles.keys().next().cloned();
        }
        self.write_document(&document)
    }

    fn set_active(&self, name: &str) -> Result<(), AuthError> {
        let mut document = self.read_document()?;
        if !document.profiles.contains_key(name) {
            return Err(AuthError::ProfileNotFound(name.to_owned()));
        }
        document.active_profile = Some(name.to_owned());
        self.write_document(&document)
    }

    fn list(&self) -> Result<Vec<Profile>, AuthError> {
        let document = self.read_document()?;
        Ok(document.profiles.into_values().collect())
    }

    fn active_name(&self) -> Result<Option<String>, AuthError> {
        Ok(self.read_document()?.active_profile)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigDocument {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    active_profile: Option<String>,
    #[serde(default)]
    profiles: BTreeMap<String, Profile>,
}

fn default_version() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> FileCredentialStore {
        let locator = ConfigLocator::from_root_for_tests(temp_dir.path().to_path_buf());
        FileCredentialStore::new(locator)
    }

    #[test]
    fn round_trip_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let profile = Profile::new("default", "123", "s3cret").with_ad_account_id("act_42");
        store.save(&profile).unwrap();
        let loaded = store.get(Some("default")).unwrap().unwrap();
        assert_eq!(loaded.app_id, "123");
        assert_eq!(loaded.ad_account_id.as_deref(), Some("act_42"));
    }

    #[test]
    fn first_save_becomes_active() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.save(&Profile::new("work", "1", "a")).unwrap();
        store.save(&Profile::new("personal", "2", "b")).unwrap();
        assert_eq!(store.active_name().unwrap().as_deref(), Some("work"));
        let active = store.get(None).unwrap().unwrap();
        assert_eq!(active.name, "work");
    }

    #[test]
    fn delete_promotes_remaining_profile() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.save(&Profile::new("work", "1", "a")).unwrap();
        store.save(&Profile::new("personal", "2", "b")).unwrap();
        store.delete("work").unwrap();
        assert_eq!(store.active_name().unwrap().as_deref(), Some("personal"));
        store.delete("personal").unwrap();
        assert!(store.active_name().unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn set_active_unknown_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let err = store.set_active("missing").unwrap_err();
        assert!(matches!(err, AuthError::ProfileNotFound(name) if name == "missing"));
    }

    #[test]
    fn get_without_name_and_no_active_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        assert!(store.get(None).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_is_user_only() {
        use std::os::unix::fs::PermissionsExt;
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.save(&Profile::new("default", "1", "a")).unwrap();
        let metadata = fs::metadata(temp_dir.path().join("config.json")).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    }
}
