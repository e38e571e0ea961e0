//! Capture session: exclusive ownership of one physical device's input.
//!
//! A session opens every sibling interface of a device, runs one reader
//! thread per opened interface, and supervises them with an inactivity
//! watchdog.
//!
//! # Session lifecycle
//!
//! ```text
//! Idle ──open──► Opening ──≥1 interface──► Active ◄──reopened── Restarting
//!                   │                        │  └──silence──────────►│
//!                   └──no interface──► Closed ◄──close────┘          │
//!                                        ▲                           │
//!                                        └──────nothing reopened─────┘
//! ```
//!
//! # Threads and tasks
//!
//! - **Reader threads** (one per interface) block in `read_timeout`, stamp
//!   the session's last-input time, track the active interface and publish
//!   [`KeyLayerEvent::KeyPressed`].  A read error ends only that thread.
//! - **Watchdog task** ticks on the Tokio runtime.  After enough silence it
//!   spawns a restart task, guarded so restarts never overlap.
//! - **Restart task** stops and joins the readers, waits for the handles to
//!   settle, re-resolves the sibling interfaces and reopens them.
//!
//! All shared state lives behind short-lived `std::sync::Mutex` locks that are
//! never held across an `.await`.  Lock order is `state` before `readers`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use keylayer_core::{DeviceId, InterfacePath, KeyEvent, KeyLayerEvent, PhysicalDevice};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::enumerate_devices::DeviceEnumerator;
use crate::application::watchdog::{InactivityWatchdog, RestartGuard, RestartPermit, TickDecision};
use crate::infrastructure::hid::{HidError, HidStream};

/// Smallest buffer handed to a reader, enough for a boot keyboard report.
const MIN_REPORT_BUFFER: usize = 8;

/// Timing knobs for a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    /// How often the watchdog checks for silence.
    pub watchdog_interval: Duration,
    /// Silence that triggers a restart.
    pub inactivity_threshold: Duration,
    /// Pause between closing and reopening interfaces during a restart.
    pub restart_settle_delay: Duration,
    /// Upper bound on one blocking read; also bounds how long stopping a
    /// reader can take.
    pub read_timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            watchdog_interval: Duration::from_secs(1),
            inactivity_threshold: Duration::from_secs(10),
            restart_settle_delay: Duration::from_millis(500),
            read_timeout: Duration::from_millis(100),
        }
    }
}

/// Lifecycle state of a [`CaptureSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Active,
    Restarting,
    Closed,
}

/// Error type for capture sessions.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Not a single sibling interface could be opened.
    #[error("device {device} unavailable: no interface could be opened")]
    DeviceUnavailable { device: DeviceId },

    /// A read or close on one interface failed.
    #[error("stream I/O error on {path}: {source}")]
    StreamIo {
        path: InterfacePath,
        #[source]
        source: HidError,
    },

    /// A watchdog restart could not reopen any interface.
    #[error("restart of {device} failed: no interface reopened")]
    RestartFailure { device: DeviceId },

    /// The operation needs a session that has not been opened yet.
    #[error("session for {device} is {state:?}")]
    InvalidState {
        device: DeviceId,
        state: SessionState,
    },
}

/// Input bookkeeping shared by all reader threads of a session.
struct Activity {
    last_input: Instant,
    active_interface: Option<InterfacePath>,
}

/// Reader threads of one open generation of interfaces.
struct ReaderSet {
    shutdown: Arc<AtomicBool>,
    threads: Vec<(InterfacePath, thread::JoinHandle<()>)>,
}

impl ReaderSet {
    fn paths(&self) -> Vec<InterfacePath> {
        self.threads.iter().map(|(p, _)| p.clone()).collect()
    }

    /// Signals every reader and waits for all of them to exit.
    ///
    /// Each reader closes its own stream on exit, so one failing close never
    /// holds up the others.
    async fn stop(self) {
        self.shutdown.store(true, Ordering::Release);
        let joined = tokio::task::spawn_blocking(move || {
            for (path, handle) in self.threads {
                if handle.join().is_err() {
                    error!(%path, "reader thread panicked");
                }
            }
        })
        .await;
        if let Err(e) = joined {
            error!(error = %e, "failed to join reader threads");
        }
    }
}

struct Shared {
    device: PhysicalDevice,
    device_id: DeviceId,
    enumerator: Arc<DeviceEnumerator>,
    settings: CaptureSettings,
    events: mpsc::UnboundedSender<KeyLayerEvent>,
    state: Mutex<SessionState>,
    activity: Mutex<Activity>,
    readers: Mutex<Option<ReaderSet>>,
    restart_guard: RestartGuard,
    restarts: AtomicUsize,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Owns the open interfaces of one physical device.
pub struct CaptureSession {
    shared: Arc<Shared>,
}

impl CaptureSession {
    /// Creates an idle session.  Nothing is opened until [`CaptureSession::open`].
    pub fn new(
        device: PhysicalDevice,
        enumerator: Arc<DeviceEnumerator>,
        settings: CaptureSettings,
        events: mpsc::UnboundedSender<KeyLayerEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                device_id: device.id(),
                device,
                enumerator,
                settings,
                events,
                state: Mutex::new(SessionState::Idle),
                activity: Mutex::new(Activity {
                    last_input: Instant::now(),
                    active_interface: None,
                }),
                readers: Mutex::new(None),
                restart_guard: RestartGuard::new(),
                restarts: AtomicUsize::new(0),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Opens every sibling interface and starts the readers and watchdog.
    ///
    /// Returns the number of interfaces opened.  Partial isolation is fine;
    /// zero opened interfaces is [`CaptureError::DeviceUnavailable`] and
    /// leaves the session closed.  Must be called within a Tokio runtime.
    pub fn open(&self) -> Result<usize, CaptureError> {
        let shared = &self.shared;
        {
            let mut state = lock(&shared.state);
            if *state != SessionState::Idle {
                return Err(CaptureError::InvalidState {
                    device: shared.device_id.clone(),
                    state: *state,
                });
            }
            *state = SessionState::Opening;
        }

        let paths = shared.device.interfaces.clone();
        let readers = shared.start_readers(&paths);
        let opened = readers.threads.len();
        if opened == 0 {
            *lock(&shared.state) = SessionState::Closed;
            warn!(device = %shared.device_id, "no interface could be opened");
            return Err(CaptureError::DeviceUnavailable {
                device: shared.device_id.clone(),
            });
        }

        if !shared.install(readers) {
            return Err(CaptureError::InvalidState {
                device: shared.device_id.clone(),
                state: SessionState::Closed,
            });
        }
        info!(
            device = %shared.device_id,
            opened,
            of = paths.len(),
            "device isolated"
        );

        let watchdog = tokio::spawn(watchdog_loop(Arc::clone(shared)));
        lock(&shared.tasks).push(watchdog);
        Ok(opened)
    }

    /// Stops readers and the watchdog and releases every open interface.
    ///
    /// Idempotent.
    pub async fn close(&self) {
        let shared = &self.shared;
        let readers = {
            let mut state = lock(&shared.state);
            if *state == SessionState::Closed && lock(&shared.readers).is_none() {
                return;
            }
            *state = SessionState::Closed;
            lock(&shared.readers).take()
        };
        for task in lock(&shared.tasks).drain(..) {
            task.abort();
        }
        if let Some(readers) = readers {
            readers.stop().await;
        }
        info!(device = %shared.device_id, "device released");
    }

    /// Runs one restart cycle now, unless one is already in progress.
    ///
    /// Returns `Ok(false)` when skipped because another restart holds the guard.
    pub async fn restart(&self) -> Result<bool, CaptureError> {
        match self.shared.restart_guard.try_begin() {
            Some(permit) => run_restart(Arc::clone(&self.shared), permit)
                .await
                .map(|_| true),
            None => Ok(false),
        }
    }

    pub fn device(&self) -> &PhysicalDevice {
        &self.shared.device
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.shared.device_id
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.shared.state)
    }

    /// The interface that most recently produced input.
    pub fn active_interface(&self) -> Option<InterfacePath> {
        lock(&self.shared.activity).active_interface.clone()
    }

    /// Interfaces with a running reader.
    pub fn open_interfaces(&self) -> Vec<InterfacePath> {
        lock(&self.shared.readers)
            .as_ref()
            .map(ReaderSet::paths)
            .unwrap_or_default()
    }

    /// Restart cycles started so far.
    pub fn restart_count(&self) -> usize {
        self.shared.restarts.load(Ordering::Acquire)
    }
}

impl Shared {
    fn set_state(&self, state: SessionState) {
        *lock(&self.state) = state;
    }

    /// Opens each path and spawns a reader for each success.
    fn start_readers(self: &Arc<Self>, paths: &[InterfacePath]) -> ReaderSet {
        let shutdown = Arc::new(AtomicBool::new(false));
        let backend = self.enumerator.backend();
        let mut threads = Vec::new();

        for (index, path) in paths.iter().enumerate() {
            let stream = match backend.open_exclusive(path) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(device = %self.device_id, %path, error = %e, "interface not isolated");
                    continue;
                }
            };
            let shared = Arc::clone(self);
            let reader_path = path.clone();
            let reader_shutdown = Arc::clone(&shutdown);
            let spawned = thread::Builder::new()
                .name(format!("keylayer-reader-{index}"))
                .spawn(move || shared.read_loop(reader_path, stream, reader_shutdown));
            match spawned {
                Ok(handle) => threads.push((path.clone(), handle)),
                Err(e) => error!(%path, error = %e, "failed to spawn reader thread"),
            }
        }

        ReaderSet { shutdown, threads }
    }

    /// Makes `readers` the live reader set and marks the session active.
    ///
    /// Returns `false` (and stops the readers) if the session was closed in
    /// the meantime.
    fn install(&self, readers: ReaderSet) -> bool {
        let mut state = lock(&self.state);
        if *state == SessionState::Closed {
            readers.shutdown.store(true, Ordering::Release);
            return false;
        }
        lock(&self.activity).last_input = Instant::now();
        *lock(&self.readers) = Some(readers);
        *state = SessionState::Active;
        true
    }

    /// Blocking read loop for one interface.  Runs on its own thread.
    fn read_loop(
        &self,
        path: InterfacePath,
        mut stream: Box<dyn HidStream>,
        shutdown: Arc<AtomicBool>,
    ) {
        let mut buf = vec![0u8; stream.max_report_len().max(MIN_REPORT_BUFFER)];
        debug!(%path, "reader started");

        while !shutdown.load(Ordering::Acquire) {
            match stream.read_timeout(&mut buf, self.settings.read_timeout) {
                Ok(0) => {}
                Ok(len) => self.on_report(&path, &buf[..len]),
                Err(source) => {
                    if !shutdown.load(Ordering::Acquire) {
                        let e = CaptureError::StreamIo {
                            path: path.clone(),
                            source,
                        };
                        warn!(device = %self.device_id, error = %e, "reader stopped");
                    }
                    break;
                }
            }
        }

        if let Err(source) = stream.close() {
            let e = CaptureError::StreamIo {
                path: path.clone(),
                source,
            };
            warn!(device = %self.device_id, error = %e, "failed to close interface");
        }
        debug!(%path, "reader exited");
    }

    fn on_report(&self, path: &InterfacePath, report: &[u8]) {
        let switched = {
            let mut activity = lock(&self.activity);
            activity.last_input = Instant::now();
            if activity.active_interface.as_ref() != Some(path) {
                activity.active_interface = Some(path.clone());
                true
            } else {
                false
            }
        };
        if switched {
            debug!(device = %self.device_id, %path, "active interface changed");
            self.publish(KeyLayerEvent::ActiveInterfaceChanged {
                device_id: self.device_id.clone(),
                interface: path.clone(),
            });
        }
        let event = KeyEvent::from_report(self.device_id.clone(), path.clone(), report);
        debug!(device = %self.device_id, key = %event.key, "report");
        self.publish(KeyLayerEvent::KeyPressed(event));
    }

    fn publish(&self, event: KeyLayerEvent) {
        // A dropped receiver means the daemon is shutting down.
        let _ = self.events.send(event);
    }
}

async fn watchdog_loop(shared: Arc<Shared>) {
    let watchdog = InactivityWatchdog::new(shared.settings.inactivity_threshold);
    let mut ticker = tokio::time::interval(shared.settings.watchdog_interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if *lock(&shared.state) == SessionState::Closed {
            debug!(device = %shared.device_id, "watchdog stopped");
            break;
        }
        let last_input = lock(&shared.activity).last_input;
        let decision = watchdog.check(
            last_input,
            Instant::now(),
            shared.restart_guard.in_progress(),
        );
        if decision != TickDecision::Restart {
            continue;
        }
        if let Some(permit) = shared.restart_guard.try_begin() {
            let task_shared = Arc::clone(&shared);
            let task = tokio::spawn(async move {
                // Failures are logged and published inside run_restart.
                let _ = run_restart(task_shared, permit).await;
            });
            let mut tasks = lock(&shared.tasks);
            tasks.retain(|t| !t.is_finished());
            tasks.push(task);
        }
    }
}

/// One restart cycle.  Holding `_permit` keeps other restarts out.
async fn run_restart(shared: Arc<Shared>, _permit: RestartPermit) -> Result<usize, CaptureError> {
    let readers = {
        let mut state = lock(&shared.state);
        if matches!(*state, SessionState::Closed | SessionState::Idle) {
            return Err(CaptureError::InvalidState {
                device: shared.device_id.clone(),
                state: *state,
            });
        }
        *state = SessionState::Restarting;
        lock(&shared.readers).take()
    };
    shared.restarts.fetch_add(1, Ordering::AcqRel);
    info!(device = %shared.device_id, "restarting capture after inactivity");

    if let Some(readers) = readers {
        readers.stop().await;
    }
    tokio::time::sleep(shared.settings.restart_settle_delay).await;

    let paths = shared.enumerator.sibling_interfaces(&shared.device);
    let readers = shared.start_readers(&paths);
    let reopened = readers.threads.len();
    if reopened == 0 {
        shared.set_state(SessionState::Closed);
        let e = CaptureError::RestartFailure {
            device: shared.device_id.clone(),
        };
        error!(error = %e, "capture session closed");
        shared.publish(KeyLayerEvent::SessionClosed {
            device_id: shared.device_id.clone(),
            reason: e.to_string(),
        });
        return Err(e);
    }

    if !shared.install(readers) {
        return Err(CaptureError::InvalidState {
            device: shared.device_id.clone(),
            state: SessionState::Closed,
        });
    }
    info!(device = %shared.device_id, reopened, "capture restarted");
    Ok(reopened)
}

/// Locks a mutex, recovering the data if a reader thread panicked while
/// holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
