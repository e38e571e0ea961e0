//! [`HidBackend`] on top of the `hidapi` crate.
//!
//! `hidapi` exposes every HID top-level collection as a separate entry with
//! its own path, which is exactly the sibling-interface model the capture
//! session expects.
//!
//! Exclusivity is whatever the platform gives an open handle: Windows opens
//! without share flags, macOS seizes the device, and on Linux `hidraw` reads
//! do not stop the kernel's keyboard driver from also delivering the keys.

use std::ffi::CString;
use std::sync::Mutex;
use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use keylayer_core::InterfacePath;
use tracing::debug;

use super::{EnumeratedInterface, HidBackend, HidError, HidInterfaceInfo, HidStream};

/// Report buffer size.  Boot keyboards send 8 bytes; full-speed devices
/// never exceed 64.
const MAX_REPORT_LEN: usize = 64;

impl From<hidapi::HidError> for HidError {
    fn from(e: hidapi::HidError) -> Self {
        HidError::Read(e.to_string())
    }
}

/// HID backend for real hardware.
pub struct HidapiBackend {
    api: Mutex<HidApi>,
}

impl HidapiBackend {
    /// Initialises the platform HID library.
    ///
    /// # Errors
    ///
    /// Returns [`HidError::Unavailable`] if `hidapi` cannot start, for example
    /// when `libudev` is missing on Linux.
    pub fn new() -> Result<Self, HidError> {
        let api = HidApi::new().map_err(|e| HidError::Unavailable(e.to_string()))?;
        Ok(Self {
            api: Mutex::new(api),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HidApi>, HidError> {
        self.api
            .lock()
            .map_err(|_| HidError::Unavailable("hidapi lock poisoned".to_string()))
    }
}

impl HidBackend for HidapiBackend {
    fn enumerate(&self) -> Result<Vec<EnumeratedInterface>, HidError> {
        let mut api = self.lock()?;
        api.refresh_devices()
            .map_err(|e| HidError::Unavailable(e.to_string()))?;

        let entries = api
            .device_list()
            .map(|info| -> EnumeratedInterface {
                let path = info
                    .path()
                    .to_str()
                    .map_err(|e| HidError::Query(format!("non UTF-8 device path: {e}")))?;
                Ok(HidInterfaceInfo {
                    path: InterfacePath::new(path),
                    vendor_id: info.vendor_id(),
                    product_id: info.product_id(),
                    product_name: info.product_string().map(str::to_string),
                    usage_page: info.usage_page(),
                    usage: info.usage(),
                    interface_number: info.interface_number(),
                })
            })
            .collect();
        Ok(entries)
    }

    fn open_exclusive(&self, path: &InterfacePath) -> Result<Box<dyn HidStream>, HidError> {
        let open_error = |reason: String| HidError::Open {
            path: path.clone(),
            reason,
        };
        let c_path = CString::new(path.as_str()).map_err(|e| open_error(e.to_string()))?;
        let device = self
            .lock()?
            .open_path(&c_path)
            .map_err(|e| open_error(e.to_string()))?;
        // Reads are driven by explicit timeouts.
        device
            .set_blocking_mode(true)
            .map_err(|e| open_error(e.to_string()))?;
        debug!(%path, "opened HID interface");
        Ok(Box::new(HidapiStream {
            device: Some(device),
        }))
    }
}

struct HidapiStream {
    device: Option<HidDevice>,
}

impl HidStream for HidapiStream {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, HidError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| HidError::Read("stream already closed".to_string()))?;
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        Ok(device.read_timeout(buf, millis)?)
    }

    fn max_report_len(&self) -> usize {
        MAX_REPORT_LEN
    }

    fn close(&mut self) -> Result<(), HidError> {
        // Dropping the handle closes it; hidapi has no fallible close.
        self.device.take();
        Ok(())
    }
}
