//! Physical devices, their sibling interfaces, and key events.
//!
//! A single USB keyboard commonly exposes several HID interfaces (boot
//! keyboard, consumer control, vendor configuration …).  The operating system
//! lists each interface separately; KeyLayer groups them back into one
//! [`PhysicalDevice`] keyed by vendor id, product id and product name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::keymap::KeyIdentifier;

/// Platform path of one HID interface (e.g. `/dev/hidraw3` or a Windows
/// device interface path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfacePath(String);

impl InterfacePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfacePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InterfacePath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Stable identity of a physical device: `VVVV:PPPP:Product Name`.
///
/// Two interfaces with the same id are siblings of one device.  Profiles are
/// stored under this id so they survive re-plugging into another port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Builds the id for a vendor/product/name triple.
    pub fn from_parts(vendor_id: u16, product_id: u16, product_name: &str) -> Self {
        Self(format!("{vendor_id:04X}:{product_id:04X}:{product_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One physical keyboard and all of its HID interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    pub product_name: String,
    /// Sibling interface paths in enumeration order.
    pub interfaces: Vec<InterfacePath>,
}

impl PhysicalDevice {
    pub fn new(vendor_id: u16, product_id: u16, product_name: impl Into<String>) -> Self {
        Self {
            vendor_id,
            product_id,
            product_name: product_name.into(),
            interfaces: Vec::new(),
        }
    }

    pub fn id(&self) -> DeviceId {
        DeviceId::from_parts(self.vendor_id, self.product_id, &self.product_name)
    }

    /// The first enumerated interface, used as the device's display path.
    pub fn primary_path(&self) -> Option<&InterfacePath> {
        self.interfaces.first()
    }

    /// Returns `true` if `path` is one of this device's interfaces.
    pub fn owns(&self, path: &InterfacePath) -> bool {
        self.interfaces.iter().any(|p| p == path)
    }
}

impl fmt::Display for PhysicalDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:04X}:{:04X}, {} interface(s))",
            self.product_name,
            self.vendor_id,
            self.product_id,
            self.interfaces.len()
        )
    }
}

/// A decoded report from one interface of an isolated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub device_id: DeviceId,
    /// The interface that produced the report.
    pub interface: InterfacePath,
    pub key: KeyIdentifier,
    /// Raw byte 2 of the report; 0 means "no key held".
    pub scan_code: u8,
    /// Every scan code held in this report, in slot order.
    pub keys: Vec<u8>,
    /// Raw byte 0 of the report.
    pub modifiers: u8,
    pub timestamp: SystemTime,
}

impl KeyEvent {
    /// Builds an event from a raw report.  Missing bytes read as zero.
    ///
    /// Full boot reports contribute all six key slots to [`keys`](Self::keys);
    /// shorter reports fall back to byte 2 alone.
    pub fn from_report(device_id: DeviceId, interface: InterfacePath, report: &[u8]) -> Self {
        let scan_code = report.get(2).copied().unwrap_or(0);
        let keys = match crate::keymap::parse_boot_report(report) {
            Some(boot) => boot.keys().to_vec(),
            None if scan_code != 0 => vec![scan_code],
            None => Vec::new(),
        };
        Self {
            device_id,
            interface,
            key: crate::keymap::decode(report),
            scan_code,
            keys,
            modifiers: report.first().copied().unwrap_or(0),
            timestamp: SystemTime::now(),
        }
    }

    /// `true` when the report carried no pressed key.
    pub fn is_release(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::HidKeyCode;

    fn macro_pad() -> PhysicalDevice {
        let mut device = PhysicalDevice::new(0x1A2C, 0x2124, "USB Macro Pad");
        device.interfaces = vec!["/dev/hidraw3".into(), "/dev/hidraw4".into()];
        device
    }

    #[test]
    fn test_device_id_formats_vendor_product_and_name() {
        assert_eq!(macro_pad().id().as_str(), "1A2C:2124:USB Macro Pad");
    }

    #[test]
    fn test_owns_matches_sibling_paths_only() {
        let device = macro_pad();
        assert!(device.owns(&"/dev/hidraw4".into()));
        assert!(!device.owns(&"/dev/hidraw5".into()));
        assert_eq!(device.primary_path(), Some(&InterfacePath::new("/dev/hidraw3")));
    }

    #[test]
    fn test_key_event_from_full_report() {
        let event = KeyEvent::from_report(
            macro_pad().id(),
            "/dev/hidraw3".into(),
            &[0x01, 0, 0x1E, 0, 0, 0, 0, 0],
        );
        assert_eq!(event.key, KeyIdentifier::Key(HidKeyCode::Digit1));
        assert_eq!(event.scan_code, 0x1E);
        assert_eq!(event.keys, vec![0x1E]);
        assert_eq!(event.modifiers, 0x01);
        assert!(!event.is_release());
    }

    #[test]
    fn test_key_event_collects_every_occupied_slot() {
        // Arrange: layer key still held in slot 0, new key in slot 1
        let report = [0x00, 0, 0x29, 0x1E, 0, 0x04, 0, 0];

        // Act
        let event = KeyEvent::from_report(macro_pad().id(), "/dev/hidraw3".into(), &report);

        // Assert
        assert_eq!(event.key, KeyIdentifier::Key(HidKeyCode::Escape));
        assert_eq!(event.keys, vec![0x29, 0x1E, 0x04]);
    }

    #[test]
    fn test_key_event_with_only_a_later_slot_is_not_a_release() {
        let event = KeyEvent::from_report(
            macro_pad().id(),
            "/dev/hidraw3".into(),
            &[0x00, 0, 0x00, 0x1E, 0, 0, 0, 0],
        );
        assert_eq!(event.scan_code, 0);
        assert_eq!(event.keys, vec![0x1E]);
        assert!(!event.is_release());
    }

    #[test]
    fn test_key_event_from_vendor_short_report_uses_byte_two() {
        let event =
            KeyEvent::from_report(macro_pad().id(), "/dev/hidraw3".into(), &[0x00, 0, 0x1E]);
        assert_eq!(event.keys, vec![0x1E]);
    }

    #[test]
    fn test_key_event_from_short_report_is_a_release() {
        let event = KeyEvent::from_report(macro_pad().id(), "/dev/hidraw3".into(), &[0x00]);
        assert_eq!(event.key, KeyIdentifier::Unknown(None));
        assert!(event.keys.is_empty());
        assert!(event.is_release());
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&macro_pad().id()).unwrap();
        assert_eq!(json, "\"1A2C:2124:USB Macro Pad\"");
    }
}
