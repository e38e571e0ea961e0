//! ProfileStore: where per-device configuration comes from.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use keylayer_core::{DeviceId, DeviceProfile};
use thiserror::Error;

/// Error type for profile persistence.
#[derive(Debug, Error)]
pub enum ProfileStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed profile file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialise profiles: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Loads and persists [`DeviceProfile`]s.
///
/// A missing profile is not an error: the device simply has nothing mapped.
pub trait ProfileStore: Send + Sync {
    fn get(&self, device: &DeviceId) -> Option<DeviceProfile>;
    fn save(&self, profile: DeviceProfile) -> Result<(), ProfileStoreError>;
}

/// Profiles kept only in memory.
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: Mutex<HashMap<DeviceId, DeviceProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = DeviceProfile>) -> Self {
        let map = profiles
            .into_iter()
            .map(|p| (p.device_id.clone(), p))
            .collect();
        Self {
            profiles: Mutex::new(map),
        }
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn get(&self, device: &DeviceId) -> Option<DeviceProfile> {
        self.profiles
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(device)
            .cloned()
    }

    fn save(&self, profile: DeviceProfile) -> Result<(), ProfileStoreError> {
        self.profiles
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(profile.device_id.clone(), profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_device_has_no_profile() {
        let store = InMemoryProfileStore::new();
        assert!(store.get(&DeviceId::from("1A2C:2124:Pad")).is_none());
    }

    #[test]
    fn test_save_replaces_existing_profile() {
        let store = InMemoryProfileStore::new();
        let id = DeviceId::from("1A2C:2124:Pad");
        let mut profile = DeviceProfile::new(id.clone());
        store.save(profile.clone()).unwrap();

        profile.name = "Editing".to_string();
        store.save(profile).unwrap();

        assert_eq!(store.get(&id).unwrap().name, "Editing");
    }
}
