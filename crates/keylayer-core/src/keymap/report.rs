//! Boot-protocol keyboard report decoding.
//!
//! A boot keyboard report is 8 bytes:
//!
//! ```text
//! byte 0     modifier bitmap (bit 0 = Left Ctrl … bit 7 = Right GUI)
//! byte 1     reserved
//! bytes 2–7  up to six pressed key Usage IDs, 0x00 when unused
//! ```
//!
//! [`decode`] names the key in the first slot (byte 2) for logging.
//! [`parse_boot_report`] yields every held key and is what key routing diffs
//! between reports.  Devices that prepend a report ID or send shorter vendor
//! reports still decode without error; they simply yield
//! [`KeyIdentifier::Unknown`].

use super::{HidKeyCode, KeyIdentifier};

/// Offset of the first key slot in a boot keyboard report.
const FIRST_KEY_OFFSET: usize = 2;
/// Length of a complete boot keyboard report.
const BOOT_REPORT_LEN: usize = 8;

/// Decodes a raw input report into the key in its first key slot.
///
/// Total and deterministic: reports shorter than three bytes yield
/// `Unknown(None)` and scan codes missing from the HID table yield
/// `Unknown(Some(code))`.
pub fn decode(report: &[u8]) -> KeyIdentifier {
    match report.get(FIRST_KEY_OFFSET) {
        None => KeyIdentifier::Unknown(None),
        Some(&code) => match HidKeyCode::from_u8(code) {
            Some(key) => KeyIdentifier::Key(key),
            None => KeyIdentifier::Unknown(Some(code)),
        },
    }
}

/// A parsed 8-byte boot keyboard report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootReport {
    /// Modifier bitmap from byte 0.
    pub modifiers: u8,
    /// Non-zero key slots from bytes 2–7, in report order.
    keys: [u8; 6],
    key_count: usize,
}

impl BootReport {
    /// Pressed scan codes, excluding empty slots.
    pub fn keys(&self) -> &[u8] {
        &self.keys[..self.key_count]
    }

    /// `true` when no key slot is occupied, i.e. every key has been released.
    pub fn is_release(&self) -> bool {
        self.key_count == 0
    }

    /// Returns `true` if `modifier` (one of the `0xE0..=0xE7` keys) is held.
    pub fn has_modifier(&self, modifier: HidKeyCode) -> bool {
        modifier.is_modifier() && self.modifiers & (1 << (modifier.as_u8() - 0xE0)) != 0
    }
}

/// Parses a full boot report, or `None` when fewer than eight bytes were read.
pub fn parse_boot_report(report: &[u8]) -> Option<BootReport> {
    if report.len() < BOOT_REPORT_LEN {
        return None;
    }
    let mut keys = [0u8; 6];
    let mut key_count = 0;
    for &code in &report[FIRST_KEY_OFFSET..BOOT_REPORT_LEN] {
        if code != 0 {
            keys[key_count] = code;
            key_count += 1;
        }
    }
    Some(BootReport {
        modifiers: report[0],
        keys,
        key_count,
    })
}
