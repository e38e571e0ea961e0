//! Key vocabulary and raw report decoding.
//!
//! The canonical key representation is the USB HID Usage ID (page 0x07,
//! Keyboard/Keypad).  Raw input reports are turned into [`KeyIdentifier`]s at
//! the capture boundary by [`report::decode`].

pub mod hid;
pub mod report;

pub use hid::HidKeyCode;
pub use report::{decode, parse_boot_report, BootReport};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The semantic identity of a key read from a device.
///
/// Decoding never fails: anything that is not a known key becomes
/// [`KeyIdentifier::Unknown`], carrying the scan code when one was present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyIdentifier {
    /// A key from the HID keyboard/keypad table.
    Key(HidKeyCode),
    /// `Some(code)` for an unmapped scan code, `None` for a truncated report.
    Unknown(Option<u8>),
}

impl KeyIdentifier {
    /// Returns the HID key code, if the key is known.
    pub fn key_code(self) -> Option<HidKeyCode> {
        match self {
            KeyIdentifier::Key(code) => Some(code),
            KeyIdentifier::Unknown(_) => None,
        }
    }

    /// Returns the raw scan code behind this identifier, if any.
    pub fn scan_code(self) -> Option<u8> {
        match self {
            KeyIdentifier::Key(code) => Some(code.as_u8()),
            KeyIdentifier::Unknown(code) => code,
        }
    }
}

impl fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyIdentifier::Key(code) => f.write_str(code.name()),
            KeyIdentifier::Unknown(Some(code)) => write!(f, "Unknown ({code:02X})"),
            KeyIdentifier::Unknown(None) => f.write_str("Unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_of_known_key_uses_table_name() {
        assert_eq!(KeyIdentifier::Key(HidKeyCode::Numpad7).to_string(), "Keypad 7");
    }

    #[test]
    fn test_display_of_unknown_code_is_two_digit_hex() {
        assert_eq!(KeyIdentifier::Unknown(Some(0x0A)).to_string(), "Unknown (0A)");
        assert_eq!(KeyIdentifier::Unknown(Some(0xF1)).to_string(), "Unknown (F1)");
    }

    #[test]
    fn test_display_of_truncated_report_is_bare_unknown() {
        assert_eq!(KeyIdentifier::Unknown(None).to_string(), "Unknown");
    }

    #[test]
    fn test_scan_code_is_preserved_for_known_and_unknown_keys() {
        assert_eq!(KeyIdentifier::Key(HidKeyCode::Digit1).scan_code(), Some(0x1E));
        assert_eq!(KeyIdentifier::Unknown(Some(0x70)).scan_code(), Some(0x70));
        assert_eq!(KeyIdentifier::Unknown(None).scan_code(), None);
        assert_eq!(KeyIdentifier::Unknown(Some(0x70)).key_code(), None);
    }
}
