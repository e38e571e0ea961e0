//! Infrastructure layer for the KeyLayer daemon.
//!
//! Contains OS-facing adapters: HID access, the action executors, the host
//! environment probe, and file-system storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `keylayer_core`.  The application layer only reaches in here for the HID
//! port traits declared in `hid`.

pub mod environment;
pub mod executor;
pub mod hid;
pub mod storage;
