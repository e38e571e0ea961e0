//! Use case: find candidate keyboards and group their sibling interfaces.
//!
//! The platform lists every HID top-level collection separately.  A macro pad
//! typically shows up three or four times (boot keyboard, consumer control,
//! vendor configuration).  [`DeviceEnumerator`] collapses those entries into
//! one [`PhysicalDevice`] per `(vendor, product, name)` and keeps the device
//! only if it looks like a keyboard.

use std::sync::Arc;

use keylayer_core::{InterfacePath, PhysicalDevice};
use tracing::{debug, warn};

use crate::infrastructure::hid::{HidBackend, HidInterfaceInfo};

/// Product name used when a device reports none.
const UNNAMED_DEVICE: &str = "Unknown Device";

/// Vendors whose devices are treated as keyboards even when no interface
/// advertises the keyboard usage.  Many cheap macro pads only expose vendor
/// collections.
pub const KNOWN_KEYBOARD_VENDORS: &[u16] = &[
    0x046D, // Logitech
    0x1532, // Razer
    0x04F2, // Chicony
    0x413C, // Dell
    0x045E, // Microsoft
    0x0458, // KYE Systems (Genius)
    0x1A2C, // China Resource Semico
    0x04CA, // Lite-On
    0x0B05, // ASUS
    0x1B1C, // Corsair
    0x3938, // MOSART Semi
    0x04D9, // Holtek
    0x0C45, // Microdia
    0x1C4F, // SiGma Micro
    0x0E8F, // GreenAsia
    0x1241, // Belkin
    0x0A5C, // Broadcom
    0x05AC, // Apple
    0x0079, // DragonRise
    0x1D57, // Xenta
    0x04B4, // Cypress
    0x090C, // Silicon Motion
    0x046A, // Cherry
    0x05F3, // PI Engineering
    0x0738, // Mad Catz
    0x093A, // Pixart
    0x16C0, // Van Ooijen (V-USB)
    0x1B4F, // SparkFun
    0x1209, // pid.codes
    0x31E3, // Wooting
    0x258A, // SINO WEALTH
    0x8013, // generic macro pads
    0x8554, // generic macro pads
    0xF055, // generic macro pads
    0x1A86, // QinHeng (CH55x pads)
    0x8808, // generic macro pads
    0x09DA, // A4Tech
];

/// Lists keyboard-like devices through a [`HidBackend`].
pub struct DeviceEnumerator {
    backend: Arc<dyn HidBackend>,
    extra_vendors: Vec<u16>,
}

impl DeviceEnumerator {
    pub fn new(backend: Arc<dyn HidBackend>) -> Self {
        Self {
            backend,
            extra_vendors: Vec::new(),
        }
    }

    /// Adds vendor ids to the known-keyboard fallback list.
    pub fn with_extra_vendors(mut self, vendors: impl IntoIterator<Item = u16>) -> Self {
        self.extra_vendors.extend(vendors);
        self
    }

    pub fn backend(&self) -> &Arc<dyn HidBackend> {
        &self.backend
    }

    /// Returns one [`PhysicalDevice`] per keyboard-like device.
    ///
    /// Interfaces that fail to query are skipped; if the whole scan fails the
    /// result is empty.
    pub fn list_candidate_keyboards(&self) -> Vec<PhysicalDevice> {
        let mut groups: Vec<(PhysicalDevice, bool)> = Vec::new();

        for info in self.readable_interfaces() {
            let name = info.product_name.as_deref().unwrap_or(UNNAMED_DEVICE);
            let is_keyboard = info.is_keyboard_usage() || self.is_known_vendor(info.vendor_id);
            let index = groups.iter().position(|(d, _)| {
                d.vendor_id == info.vendor_id
                    && d.product_id == info.product_id
                    && d.product_name == name
            });
            match index {
                Some(i) => {
                    groups[i].0.interfaces.push(info.path);
                    groups[i].1 |= is_keyboard;
                }
                None => {
                    let mut device = PhysicalDevice::new(info.vendor_id, info.product_id, name);
                    device.interfaces.push(info.path);
                    groups.push((device, is_keyboard));
                }
            }
        }

        groups
            .into_iter()
            .filter_map(|(device, is_keyboard)| is_keyboard.then_some(device))
            .collect()
    }

    /// Re-resolves the current interface paths of `device`.
    ///
    /// Paths change when a device is re-plugged, so capture sessions call this
    /// before reopening.
    pub fn sibling_interfaces(&self, device: &PhysicalDevice) -> Vec<InterfacePath> {
        self.readable_interfaces()
            .filter(|info| {
                info.vendor_id == device.vendor_id
                    && info.product_id == device.product_id
                    && info.product_name.as_deref().unwrap_or(UNNAMED_DEVICE) == device.product_name
            })
            .map(|info| info.path)
            .collect()
    }

    /// Finds the candidate keyboard that owns `path`.
    pub fn find_by_path(&self, path: &InterfacePath) -> Option<PhysicalDevice> {
        self.list_candidate_keyboards()
            .into_iter()
            .find(|device| device.owns(path))
    }

    fn is_known_vendor(&self, vendor_id: u16) -> bool {
        KNOWN_KEYBOARD_VENDORS.contains(&vendor_id) || self.extra_vendors.contains(&vendor_id)
    }

    fn readable_interfaces(&self) -> impl Iterator<Item = HidInterfaceInfo> {
        let entries = match self.backend.enumerate() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "HID enumeration failed");
                Vec::new()
            }
        };
        entries.into_iter().filter_map(|entry| match entry {
            Ok(info) => Some(info),
            Err(e) => {
                debug!(error = %e, "skipping HID interface that failed to query");
                None
            }
        })
    }
}
