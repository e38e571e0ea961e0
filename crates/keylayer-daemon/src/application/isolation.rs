//! IsolationRegistry: which devices are currently isolated.
//!
//! The registry owns one [`CaptureSession`] per isolated physical device.
//! Isolating by any interface path isolates every sibling interface of that
//! device; isolating an already-isolated device is a no-op that succeeds.
//! All sessions publish into one shared event channel.
//!
//! Opening a session talks to the HID stack, so it runs on the blocking pool
//! and never under the `sessions` lock.  Isolation attempts are serialised by
//! a separate lock, which keeps lookups and releases responsive meanwhile.

use std::collections::HashMap;
use std::sync::Arc;

use keylayer_core::{DeviceId, InterfacePath, KeyLayerEvent, PhysicalDevice};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::application::capture_session::{CaptureSession, CaptureSettings, SessionState};
use crate::application::enumerate_devices::DeviceEnumerator;

/// Registry of active capture sessions, keyed by device.
pub struct IsolationRegistry {
    enumerator: Arc<DeviceEnumerator>,
    settings: CaptureSettings,
    events: mpsc::UnboundedSender<KeyLayerEvent>,
    sessions: Mutex<HashMap<DeviceId, Arc<CaptureSession>>>,
    opening: Mutex<()>,
}

impl IsolationRegistry {
    /// Creates an empty registry and the receiver for every session's events.
    pub fn new(
        enumerator: Arc<DeviceEnumerator>,
        settings: CaptureSettings,
    ) -> (Self, mpsc::UnboundedReceiver<KeyLayerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                enumerator,
                settings,
                events,
                sessions: Mutex::new(HashMap::new()),
                opening: Mutex::new(()),
            },
            rx,
        )
    }

    /// Sender used by the sessions; device scans publish through it too.
    pub fn events_sender(&self) -> mpsc::UnboundedSender<KeyLayerEvent> {
        self.events.clone()
    }

    pub fn enumerator(&self) -> &Arc<DeviceEnumerator> {
        &self.enumerator
    }

    /// Isolates the device that owns `path`.
    ///
    /// Returns `false` if no candidate keyboard owns the path or none of its
    /// interfaces could be opened.
    pub async fn isolate(&self, path: &InterfacePath) -> bool {
        match self.enumerator.find_by_path(path) {
            Some(device) => self.isolate_device(device).await,
            None => {
                warn!(%path, "no keyboard owns this interface");
                false
            }
        }
    }

    /// Isolates `device` and all of its sibling interfaces.
    pub async fn isolate_device(&self, device: PhysicalDevice) -> bool {
        let id = device.id();
        let _opening = self.opening.lock().await;

        {
            let mut sessions = self.sessions.lock().await;
            if let Some(existing) = sessions.get(&id) {
                if existing.state() != SessionState::Closed {
                    debug!(device = %id, "already isolated");
                    return true;
                }
                sessions.remove(&id);
            }
        }

        let session = CaptureSession::new(
            device,
            Arc::clone(&self.enumerator),
            self.settings,
            self.events.clone(),
        );
        let opened = tokio::task::spawn_blocking(move || {
            let result = session.open().map_err(|e| e.to_string());
            (session, result)
        })
        .await;

        match opened {
            Ok((session, Ok(_))) => {
                self.sessions.lock().await.insert(id, Arc::new(session));
                true
            }
            Ok((_, Err(error))) => {
                warn!(device = %id, %error, "isolation failed");
                false
            }
            Err(e) => {
                warn!(device = %id, error = %e, "isolation task panicked");
                false
            }
        }
    }

    /// Releases the device that owns `path`.  Returns `false` if that device
    /// was not isolated.
    pub async fn release(&self, path: &InterfacePath) -> bool {
        let id = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .find(|(_, session)| session.device().owns(path))
                .map(|(id, _)| id.clone())
        };
        match id {
            Some(id) => self.release_device(&id).await,
            None => false,
        }
    }

    /// Closes the session for `id` and releases all of its interfaces.
    pub async fn release_device(&self, id: &DeviceId) -> bool {
        let session = self.sessions.lock().await.remove(id);
        match session {
            Some(session) => {
                session.close().await;
                true
            }
            None => false,
        }
    }

    /// Releases every isolated device.
    pub async fn release_all(&self) {
        let drained: Vec<_> = self.sessions.lock().await.drain().collect();
        let count = drained.len();
        for (_, session) in drained {
            session.close().await;
        }
        if count > 0 {
            info!(count, "released all devices");
        }
    }

    /// `true` if the device owning `path` has a live session.
    pub async fn is_isolated(&self, path: &InterfacePath) -> bool {
        self.sessions
            .lock()
            .await
            .values()
            .any(|s| s.device().owns(path) && s.state() != SessionState::Closed)
    }

    /// Ids of devices with a live session, sorted.
    pub async fn isolated_devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self
            .sessions
            .lock()
            .await
            .iter()
            .filter(|(_, s)| s.state() != SessionState::Closed)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub async fn session(&self, id: &DeviceId) -> Option<Arc<CaptureSession>> {
        self.sessions.lock().await.get(id).cloned()
    }
}
