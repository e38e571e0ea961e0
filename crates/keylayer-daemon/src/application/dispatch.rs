//! Per-device dispatch of key events.
//!
//! Each device gets its own worker task and queue, so one device's macros run
//! in the order its keys arrived while other devices proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use keylayer_core::{DeviceId, KeyEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::process_keys::{KeyOutcome, ProcessKeysUseCase};

struct Worker {
    queue: mpsc::UnboundedSender<KeyEvent>,
    task: JoinHandle<()>,
}

/// Fans key events out to one worker per device.
pub struct EventDispatcher {
    keys: Arc<ProcessKeysUseCase>,
    workers: HashMap<DeviceId, Worker>,
}

impl EventDispatcher {
    pub fn new(keys: Arc<ProcessKeysUseCase>) -> Self {
        Self {
            keys,
            workers: HashMap::new(),
        }
    }

    /// Queues `event` on its device's worker, starting the worker if needed.
    pub fn dispatch(&mut self, event: KeyEvent) {
        let device = event.device_id.clone();
        let worker = self
            .workers
            .entry(device.clone())
            .or_insert_with(|| spawn_worker(device.clone(), Arc::clone(&self.keys)));
        if let Err(mpsc::error::SendError(event)) = worker.queue.send(event) {
            warn!(%device, "worker gone, restarting it");
            let worker = spawn_worker(device.clone(), Arc::clone(&self.keys));
            let _ = worker.queue.send(event);
            self.workers.insert(device, worker);
        }
    }

    /// Stops the worker for `device` after it drains its queue and clears the
    /// device's layer state.
    pub fn remove_device(&mut self, device: &DeviceId) {
        if self.workers.remove(device).is_some() {
            debug!(%device, "dispatch worker removed");
        }
        self.keys.forget_device(device);
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Closes every queue and waits for the workers to finish.
    pub async fn shutdown(self) {
        for (device, worker) in self.workers {
            drop(worker.queue);
            if let Err(e) = worker.task.await {
                warn!(%device, error = %e, "dispatch worker failed");
            }
        }
    }
}

fn spawn_worker(device: DeviceId, keys: Arc<ProcessKeysUseCase>) -> Worker {
    let (queue, mut rx) = mpsc::unbounded_channel::<KeyEvent>();
    let task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match keys.handle_key_event(&event).await {
                KeyOutcome::Executed(report) if !report.failures.is_empty() => {
                    warn!(
                        %device,
                        execution = %report.execution_id,
                        failed = report.failures.len(),
                        "macro finished with failures"
                    );
                }
                outcome => debug!(%device, key = %event.key, ?outcome, "key handled"),
            }
        }
        debug!(%device, "dispatch worker stopped");
    });
    Worker { queue, task }
}
