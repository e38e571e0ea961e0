//! HID device access.
//!
//! The capture subsystem talks to devices through two small traits:
//!
//! - [`HidBackend`] enumerates HID interfaces and opens one for exclusive
//!   reading.
//! - [`HidStream`] is one opened interface.  Reads block for at most the
//!   given timeout so reader threads can notice a shutdown request.
//!
//! The production implementation is [`hidapi_backend::HidapiBackend`]; tests
//! use [`mock::MockHidBackend`], which needs no hardware.

use std::time::Duration;

use keylayer_core::InterfacePath;

pub mod hidapi_backend;
pub mod mock;

/// Usage page for generic desktop controls.
pub const USAGE_PAGE_GENERIC_DESKTOP: u16 = 0x01;
/// Keyboard usage on the generic desktop page.
pub const USAGE_KEYBOARD: u16 = 0x06;

/// Error type for HID operations.
#[derive(Debug, thiserror::Error)]
pub enum HidError {
    /// The platform HID library could not be initialised.
    #[error("HID subsystem unavailable: {0}")]
    Unavailable(String),

    /// Querying one enumerated interface failed.
    #[error("failed to query HID interface: {0}")]
    Query(String),

    /// Opening an interface failed (missing, permission denied, already grabbed …).
    #[error("failed to open {path}: {reason}")]
    Open { path: InterfacePath, reason: String },

    /// A read on an open interface failed, typically because it was unplugged.
    #[error("read failed: {0}")]
    Read(String),

    /// Closing an interface failed.
    #[error("close failed: {0}")]
    Close(String),
}

/// Descriptor of one enumerated HID interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidInterfaceInfo {
    pub path: InterfacePath,
    pub vendor_id: u16,
    pub product_id: u16,
    /// `None` when the device does not report a product string.
    pub product_name: Option<String>,
    pub usage_page: u16,
    pub usage: u16,
    pub interface_number: i32,
}

impl HidInterfaceInfo {
    /// `true` for the Generic Desktop / Keyboard top-level collection.
    pub fn is_keyboard_usage(&self) -> bool {
        self.usage_page == USAGE_PAGE_GENERIC_DESKTOP && self.usage == USAGE_KEYBOARD
    }
}

/// One enumeration entry: either a readable descriptor or the reason it
/// could not be queried.
pub type EnumeratedInterface = Result<HidInterfaceInfo, HidError>;

/// Platform HID layer.
pub trait HidBackend: Send + Sync {
    /// Lists every HID interface currently attached.
    ///
    /// An `Err` means the whole scan failed; per-interface failures are
    /// reported as `Err` entries in the list.
    fn enumerate(&self) -> Result<Vec<EnumeratedInterface>, HidError>;

    /// Opens `path` for exclusive reading.
    fn open_exclusive(&self, path: &InterfacePath) -> Result<Box<dyn HidStream>, HidError>;
}

/// An opened HID interface.
pub trait HidStream: Send {
    /// Reads one input report into `buf`.
    ///
    /// Blocks for at most `timeout` and returns `Ok(0)` if nothing arrived.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, HidError>;

    /// Size of the largest input report the device declares.
    fn max_report_len(&self) -> usize;

    /// Releases the interface back to the operating system.
    fn close(&mut self) -> Result<(), HidError>;
}
