//! Notifications published by the capture subsystem.

use crate::domain::device::{DeviceId, InterfacePath, KeyEvent, PhysicalDevice};

/// Everything a front end can observe about devices and their input.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyLayerEvent {
    /// A keyboard appeared in an enumeration scan.
    DeviceConnected(PhysicalDevice),
    /// A previously seen keyboard is gone.
    DeviceDisconnected(PhysicalDevice),
    /// An isolated device produced a report.
    KeyPressed(KeyEvent),
    /// A different sibling interface became the source of input.
    ActiveInterfaceChanged {
        device_id: DeviceId,
        interface: InterfacePath,
    },
    /// A capture session gave up, e.g. because no interface reopened after a
    /// watchdog restart.
    SessionClosed { device_id: DeviceId, reason: String },
}

impl KeyLayerEvent {
    /// The device this event concerns.
    pub fn device_id(&self) -> DeviceId {
        match self {
            KeyLayerEvent::DeviceConnected(d) | KeyLayerEvent::DeviceDisconnected(d) => d.id(),
            KeyLayerEvent::KeyPressed(e) => e.device_id.clone(),
            KeyLayerEvent::ActiveInterfaceChanged { device_id, .. }
            | KeyLayerEvent::SessionClosed { device_id, .. } => device_id.clone(),
        }
    }
}
