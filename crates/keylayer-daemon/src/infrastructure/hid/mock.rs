//! In-memory HID backend for tests.
//!
//! Tests describe the attached interfaces, then inject reports into opened
//! streams as if a key had been pressed.  The backend enforces exclusive
//! opens and counts opens and closes so tests can check that sessions
//! release exactly what they acquired.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keylayer_core::InterfacePath;

use super::{EnumeratedInterface, HidBackend, HidError, HidInterfaceInfo, HidStream};

const MOCK_REPORT_LEN: usize = 8;

enum MockRead {
    Report(Vec<u8>),
    Error(String),
}

#[derive(Default)]
struct MockState {
    interfaces: Vec<HidInterfaceInfo>,
    broken_entries: usize,
    enumerate_fails: bool,
    open: HashMap<InterfacePath, Sender<MockRead>>,
    failing_open: HashSet<InterfacePath>,
    failing_close: HashSet<InterfacePath>,
    open_counts: HashMap<InterfacePath, usize>,
    close_counts: HashMap<InterfacePath, usize>,
}

/// A mock implementation of [`HidBackend`].  Cloning shares the same state.
#[derive(Clone, Default)]
pub struct MockHidBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockHidBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `count` keyboard interfaces of one device, named
    /// `{prefix}0`, `{prefix}1`, ….  The first has keyboard usage, the rest
    /// are vendor collections.
    pub fn attach_device(
        &self,
        vendor_id: u16,
        product_id: u16,
        name: &str,
        prefix: &str,
        count: usize,
    ) -> Vec<InterfacePath> {
        (0..count)
            .map(|i| {
                let path = InterfacePath::new(format!("{prefix}{i}"));
                self.attach_interface(HidInterfaceInfo {
                    path: path.clone(),
                    vendor_id,
                    product_id,
                    product_name: Some(name.to_string()),
                    usage_page: if i == 0 { 0x01 } else { 0xFF00 },
                    usage: if i == 0 { 0x06 } else { 0x01 },
                    interface_number: i as i32,
                });
                path
            })
            .collect()
    }

    pub fn attach_interface(&self, info: HidInterfaceInfo) {
        self.lock().interfaces.push(info);
    }

    /// Adds an enumeration entry that fails to query.
    pub fn attach_broken_entry(&self) {
        self.lock().broken_entries += 1;
    }

    /// Unplugs an interface: it disappears from enumeration and any open
    /// stream starts failing reads.
    pub fn detach_interface(&self, path: &InterfacePath) {
        let mut state = self.lock();
        state.interfaces.retain(|i| &i.path != path);
        if let Some(tx) = state.open.get(path) {
            let _ = tx.send(MockRead::Error("device removed".to_string()));
        }
    }

    pub fn set_enumerate_failure(&self, fails: bool) {
        self.lock().enumerate_fails = fails;
    }

    /// Makes future opens of `path` fail (or succeed again).
    pub fn set_open_failure(&self, path: &InterfacePath, fails: bool) {
        let mut state = self.lock();
        if fails {
            state.failing_open.insert(path.clone());
        } else {
            state.failing_open.remove(path);
        }
    }

    /// Makes closing `path` report an error.  The interface is still released.
    pub fn set_close_failure(&self, path: &InterfacePath) {
        self.lock().failing_close.insert(path.clone());
    }

    /// Delivers a report to the open stream for `path`.  Returns `false` if
    /// the interface is not open.
    pub fn inject_report(&self, path: &InterfacePath, report: &[u8]) -> bool {
        self.send(path, MockRead::Report(report.to_vec()))
    }

    /// Makes the next read on `path` fail.
    pub fn inject_read_error(&self, path: &InterfacePath) -> bool {
        self.send(path, MockRead::Error("injected read failure".to_string()))
    }

    pub fn is_open(&self, path: &InterfacePath) -> bool {
        self.lock().open.contains_key(path)
    }

    /// Currently open interfaces, sorted.
    pub fn open_paths(&self) -> Vec<InterfacePath> {
        let mut paths: Vec<_> = self.lock().open.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Successful opens of `path` so far.
    pub fn open_count(&self, path: &InterfacePath) -> usize {
        self.lock().open_counts.get(path).copied().unwrap_or(0)
    }

    /// Closes (successful or not) of `path` so far.
    pub fn close_count(&self, path: &InterfacePath) -> usize {
        self.lock().close_counts.get(path).copied().unwrap_or(0)
    }

    fn send(&self, path: &InterfacePath, read: MockRead) -> bool {
        match self.lock().open.get(path) {
            Some(tx) => tx.send(read).is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock HID state poisoned")
    }
}

impl HidBackend for MockHidBackend {
    fn enumerate(&self) -> Result<Vec<EnumeratedInterface>, HidError> {
        let state = self.lock();
        if state.enumerate_fails {
            return Err(HidError::Unavailable("mock enumeration failure".to_string()));
        }
        let mut entries: Vec<EnumeratedInterface> =
            state.interfaces.iter().cloned().map(Ok).collect();
        for _ in 0..state.broken_entries {
            entries.push(Err(HidError::Query("mock query failure".to_string())));
        }
        Ok(entries)
    }

    fn open_exclusive(&self, path: &InterfacePath) -> Result<Box<dyn HidStream>, HidError> {
        let mut state = self.lock();
        let reason = if !state.interfaces.iter().any(|i| &i.path == path) {
            Some("no such interface")
        } else if state.failing_open.contains(path) {
            Some("access denied")
        } else if state.open.contains_key(path) {
            Some("already opened exclusively")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(HidError::Open {
                path: path.clone(),
                reason: reason.to_string(),
            });
        }

        let (tx, rx) = mpsc::channel();
        state.open.insert(path.clone(), tx);
        *state.open_counts.entry(path.clone()).or_default() += 1;
        Ok(Box::new(MockHidStream {
            path: path.clone(),
            rx,
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct MockHidStream {
    path: InterfacePath,
    rx: Receiver<MockRead>,
    state: Arc<Mutex<MockState>>,
    closed: bool,
}

impl MockHidStream {
    fn release(&mut self) -> bool {
        if std::mem::replace(&mut self.closed, true) {
            return false;
        }
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        state.open.remove(&self.path);
        *state.close_counts.entry(self.path.clone()).or_default() += 1;
        state.failing_close.contains(&self.path)
    }
}

impl HidStream for MockHidStream {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, HidError> {
        match self.rx.recv_timeout(timeout) {
            Ok(MockRead::Report(bytes)) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(len)
            }
            Ok(MockRead::Error(reason)) => Err(HidError::Read(reason)),
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => {
                Err(HidError::Read("stream dropped".to_string()))
            }
        }
    }

    fn max_report_len(&self) -> usize {
        MOCK_REPORT_LEN
    }

    fn close(&mut self) -> Result<(), HidError> {
        if self.release() {
            return Err(HidError::Close(format!("mock close failure on {}", self.path)));
        }
        Ok(())
    }
}

impl Drop for MockHidStream {
    fn drop(&mut self) {
        self.release();
    }
}
