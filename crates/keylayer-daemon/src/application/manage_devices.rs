//! Device registry: which keyboards are attached and which are isolated.
//!
//! The daemon rescans HID devices periodically.  [`DeviceRegistry::apply_scan`]
//! diffs each scan against the previous one and produces the
//! `DeviceConnected` / `DeviceDisconnected` events for the difference.
//!
//! # Device lifecycle
//!
//! ```text
//! (absent)  ──scan──►  Connected  ──isolate──►  Isolated
//!     ▲                    │   ◄──release──         │
//!     └────────scan────────┴────────────────────────┘
//! ```

use std::collections::HashMap;

use keylayer_core::{DeviceId, KeyLayerEvent, PhysicalDevice};

/// Whether KeyLayer currently owns a device's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Seen in the last scan; input goes to the operating system.
    Connected,
    /// A capture session owns the device's interfaces.
    Isolated,
}

/// Registry entry for one attached device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEntry {
    pub device: PhysicalDevice,
    pub status: DeviceStatus,
}

/// In-memory registry of attached keyboards.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, DeviceEntry>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the known device set with `found` and returns what changed.
    ///
    /// Disconnections are reported before connections.  A device that stays
    /// attached keeps its status but picks up its current interface paths.
    pub fn apply_scan(&mut self, found: Vec<PhysicalDevice>) -> Vec<KeyLayerEvent> {
        let mut events = Vec::new();

        let mut gone: Vec<DeviceId> = self
            .devices
            .keys()
            .filter(|id| !found.iter().any(|d| &d.id() == *id))
            .cloned()
            .collect();
        gone.sort();
        for id in gone {
            if let Some(entry) = self.devices.remove(&id) {
                events.push(KeyLayerEvent::DeviceDisconnected(entry.device));
            }
        }

        for device in found {
            match self.devices.get_mut(&device.id()) {
                Some(entry) => entry.device = device,
                None => {
                    events.push(KeyLayerEvent::DeviceConnected(device.clone()));
                    self.devices.insert(
                        device.id(),
                        DeviceEntry {
                            device,
                            status: DeviceStatus::Connected,
                        },
                    );
                }
            }
        }
        events
    }

    /// Returns a snapshot of all devices, sorted by id.
    pub fn all(&self) -> Vec<DeviceEntry> {
        let mut entries: Vec<_> = self.devices.values().cloned().collect();
        entries.sort_by_key(|e| e.device.id());
        entries
    }

    pub fn get(&self, id: &DeviceId) -> Option<&DeviceEntry> {
        self.devices.get(id)
    }

    /// Updates the status of a known device.  Unknown ids are ignored.
    pub fn set_status(&mut self, id: &DeviceId, status: DeviceStatus) {
        if let Some(entry) = self.devices.get_mut(id) {
            entry.status = status;
        }
    }

    pub fn remove(&mut self, id: &DeviceId) -> Option<DeviceEntry> {
        self.devices.remove(id)
    }
}
