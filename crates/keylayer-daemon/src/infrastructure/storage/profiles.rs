//! JSON file persistence for device profiles.
//!
//! The whole profile set lives in one file, written as a JSON array of
//! [`DeviceProfile`]s.  Profiles are held in memory; every `save` rewrites
//! the file so it always mirrors the in-memory map.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use keylayer_core::{DeviceId, DeviceProfile};
use tracing::{debug, info};

use crate::application::profiles::{ProfileStore, ProfileStoreError};

/// [`ProfileStore`] backed by a JSON file.
pub struct JsonProfileStore {
    path: PathBuf,
    profiles: Mutex<BTreeMap<DeviceId, DeviceProfile>>,
}

impl JsonProfileStore {
    /// Loads the profile file at `path`.  A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// [`ProfileStoreError::Io`] when the file cannot be read and
    /// [`ProfileStoreError::Malformed`] when its content is not a profile list.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ProfileStoreError> {
        let path = path.into();
        let profiles = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let list: Vec<DeviceProfile> =
                    serde_json::from_str(&content).map_err(|source| {
                        ProfileStoreError::Malformed {
                            path: path.clone(),
                            source,
                        }
                    })?;
                list.into_iter()
                    .map(|p| (p.device_id.clone(), p))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no profile file yet");
                BTreeMap::new()
            }
            Err(source) => return Err(ProfileStoreError::Io { path, source }),
        };

        info!(path = %path.display(), count = profiles.len(), "profiles loaded");
        Ok(Self {
            path,
            profiles: Mutex::new(profiles),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<DeviceId, DeviceProfile>> {
        self.profiles.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self, profiles: &BTreeMap<DeviceId, DeviceProfile>) -> Result<(), ProfileStoreError> {
        let list: Vec<&DeviceProfile> = profiles.values().collect();
        let content = serde_json::to_string_pretty(&list).map_err(ProfileStoreError::Serialize)?;

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ProfileStoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&self.path, content).map_err(|source| ProfileStoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl ProfileStore for JsonProfileStore {
    fn get(&self, device: &DeviceId) -> Option<DeviceProfile> {
        self.lock().get(device).cloned()
    }

    fn save(&self, profile: DeviceProfile) -> Result<(), ProfileStoreError> {
        let mut profiles = self.lock();
        let device = profile.device_id.clone();
        let previous = profiles.insert(device.clone(), profile);

        if let Err(e) = self.write(&profiles) {
            // Keep memory and disk in agreement.
            match previous {
                Some(old) => profiles.insert(device, old),
                None => profiles.remove(&device),
            };
            return Err(e);
        }
        debug!(%device, "profile saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylayer_core::{Action, Macro};

    fn notepad_profile() -> DeviceProfile {
        let mut profile = DeviceProfile::new(DeviceId::from("1A2C:2124:Pad"));
        profile.map_key(0x1E, Macro::sequence([Action::application("notepad.exe")]));
        profile
    }

    #[test]
    fn test_missing_file_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonProfileStore::open(dir.path().join("profiles.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_saved_profiles_survive_reopen() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("profiles.json");
        let store = JsonProfileStore::open(&path).unwrap();

        // Act
        store.save(notepad_profile()).unwrap();
        let reopened = JsonProfileStore::open(&path).unwrap();

        // Assert
        let profile = reopened.get(&DeviceId::from("1A2C:2124:Pad")).unwrap();
        assert_eq!(profile, notepad_profile());
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = JsonProfileStore::open(&path);

        assert!(matches!(result, Err(ProfileStoreError::Malformed { .. })));
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        // Arrange: the parent "directory" is a regular file.
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = JsonProfileStore::open(blocker.join("profiles.json")).unwrap();

        // Act
        let result = store.save(notepad_profile());

        // Assert
        assert!(matches!(result, Err(ProfileStoreError::Io { .. })));
        assert!(store.is_empty());
    }
}
