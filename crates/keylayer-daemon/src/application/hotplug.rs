//! Hot-plug monitoring: periodic rescans that keep the registry current.
//!
//! Each [`DeviceMonitor::scan`] enumerates keyboards, diffs the result with
//! the [`DeviceRegistry`], and publishes the connect/disconnect events on the
//! shared event channel.  Unplugged devices that were isolated are released.
//! Devices configured for auto-isolation are isolated whenever they are
//! attached but not isolated, which also retries sessions that closed after a
//! failed restart.

use std::collections::HashSet;
use std::sync::Arc;

use keylayer_core::{DeviceId, KeyLayerEvent, PhysicalDevice};
use tracing::{debug, info, warn};

use crate::application::isolation::IsolationRegistry;
use crate::application::manage_devices::{DeviceRegistry, DeviceStatus};

/// Drives rescans and auto-isolation.
pub struct DeviceMonitor {
    registry: DeviceRegistry,
    isolation: Arc<IsolationRegistry>,
    auto_isolate: HashSet<DeviceId>,
}

impl DeviceMonitor {
    pub fn new(
        isolation: Arc<IsolationRegistry>,
        auto_isolate: impl IntoIterator<Item = DeviceId>,
    ) -> Self {
        Self {
            registry: DeviceRegistry::new(),
            isolation,
            auto_isolate: auto_isolate.into_iter().collect(),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Runs one scan and returns the events it published.
    pub async fn scan(&mut self) -> Vec<KeyLayerEvent> {
        let found = self.enumerate().await;
        let events = self.registry.apply_scan(found);

        let sender = self.isolation.events_sender();
        for event in &events {
            if let KeyLayerEvent::DeviceDisconnected(device) = event {
                let id = device.id();
                if self.isolation.release_device(&id).await {
                    info!(device = %id, "released unplugged device");
                }
            }
            // The receiver only disappears at shutdown.
            let _ = sender.send(event.clone());
        }

        self.sync_isolation().await;
        events
    }

    async fn enumerate(&self) -> Vec<PhysicalDevice> {
        let enumerator = Arc::clone(self.isolation.enumerator());
        match tokio::task::spawn_blocking(move || enumerator.list_candidate_keyboards()).await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "device scan panicked");
                Vec::new()
            }
        }
    }

    /// Isolates auto-isolate devices and refreshes every entry's status.
    async fn sync_isolation(&mut self) {
        let mut isolated: HashSet<DeviceId> =
            self.isolation.isolated_devices().await.into_iter().collect();

        for entry in self.registry.all() {
            let id = entry.device.id();
            if self.auto_isolate.contains(&id) && !isolated.contains(&id) {
                if self.isolation.isolate_device(entry.device).await {
                    info!(device = %id, "auto-isolated");
                    isolated.insert(id.clone());
                } else {
                    debug!(device = %id, "auto-isolation failed, retrying next scan");
                }
            }
            let status = if isolated.contains(&id) {
                DeviceStatus::Isolated
            } else {
                DeviceStatus::Connected
            };
            self.registry.set_status(&id, status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::capture_session::CaptureSettings;
    use crate::application::enumerate_devices::DeviceEnumerator;
    use crate::infrastructure::hid::mock::MockHidBackend;
    use keylayer_core::InterfacePath;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn settings() -> CaptureSettings {
        CaptureSettings {
            watchdog_interval: Duration::from_secs(60),
            inactivity_threshold: Duration::from_secs(600),
            restart_settle_delay: Duration::from_millis(1),
            read_timeout: Duration::from_millis(5),
        }
    }

    fn monitor(
        backend: &MockHidBackend,
        auto: &[&str],
    ) -> (
        DeviceMonitor,
        Arc<IsolationRegistry>,
        mpsc::UnboundedReceiver<KeyLayerEvent>,
    ) {
        let enumerator = Arc::new(DeviceEnumerator::new(Arc::new(backend.clone())));
        let (isolation, rx) = IsolationRegistry::new(enumerator, settings());
        let isolation = Arc::new(isolation);
        let monitor = DeviceMonitor::new(
            Arc::clone(&isolation),
            auto.iter().map(|id| DeviceId::from(*id)),
        );
        (monitor, isolation, rx)
    }

    fn detach_all(backend: &MockHidBackend, paths: &[InterfacePath]) {
        for path in paths {
            backend.detach_interface(path);
        }
    }

    // ── Connect / disconnect ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_new_device_is_published_as_connected() {
        // Arrange
        let backend = MockHidBackend::new();
        backend.attach_device(0x1A2C, 0x2124, "Macro Pad", "/mock/pad", 2);
        let (mut monitor, _isolation, mut rx) = monitor(&backend, &[]);

        // Act
        let events = monitor.scan().await;

        // Assert
        assert_eq!(events.len(), 1);
        assert!(matches!(rx.try_recv(), Ok(KeyLayerEvent::DeviceConnected(d)) if d.interfaces.len() == 2));
        assert_eq!(monitor.registry().all()[0].status, DeviceStatus::Connected);
    }

    #[tokio::test]
    async fn test_unplugged_isolated_device_is_released() {
        // Arrange
        let backend = MockHidBackend::new();
        let paths = backend.attach_device(0x1A2C, 0x2124, "Macro Pad", "/mock/pad", 2);
        let (mut monitor, isolation, mut rx) = monitor(&backend, &[]);
        monitor.scan().await;
        assert!(isolation.isolate(&paths[0]).await);

        // Act
        detach_all(&backend, &paths);
        let events = monitor.scan().await;

        // Assert
        assert!(matches!(events.as_slice(), [KeyLayerEvent::DeviceDisconnected(_)]));
        assert!(isolation.isolated_devices().await.is_empty());
        assert!(backend.open_paths().is_empty());
        assert!(monitor.registry().all().is_empty());
        let mut saw_disconnect = false;
        while let Ok(event) = rx.try_recv() {
            saw_disconnect |= matches!(event, KeyLayerEvent::DeviceDisconnected(_));
        }
        assert!(saw_disconnect);
    }

    // ── Auto-isolation ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_configured_device_is_isolated_on_connect() {
        let backend = MockHidBackend::new();
        let pad = backend.attach_device(0x1A2C, 0x2124, "Macro Pad", "/mock/pad", 2);
        backend.attach_device(0x046D, 0xC31C, "Keyboard", "/mock/kbd", 1);
        let (mut monitor, isolation, _rx) = monitor(&backend, &["1A2C:2124:Macro Pad"]);

        monitor.scan().await;

        assert_eq!(
            isolation.isolated_devices().await,
            vec![DeviceId::from("1A2C:2124:Macro Pad")]
        );
        assert_eq!(backend.open_paths(), pad);
        let statuses: Vec<_> = monitor.registry().all().iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![DeviceStatus::Connected, DeviceStatus::Isolated]);
        isolation.release_all().await;
    }

    #[tokio::test]
    async fn test_failed_auto_isolation_is_retried_next_scan() {
        // Arrange
        let backend = MockHidBackend::new();
        let pad = backend.attach_device(0x1A2C, 0x2124, "Macro Pad", "/mock/pad", 1);
        backend.set_open_failure(&pad[0], true);
        let (mut monitor, isolation, _rx) = monitor(&backend, &["1A2C:2124:Macro Pad"]);
        monitor.scan().await;
        assert!(isolation.isolated_devices().await.is_empty());

        // Act
        backend.set_open_failure(&pad[0], false);
        let events = monitor.scan().await;

        // Assert
        assert!(events.is_empty());
        assert_eq!(isolation.isolated_devices().await.len(), 1);
        isolation.release_all().await;
    }
}
