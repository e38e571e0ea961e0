//! Recording executor for tests.
//!
//! Every action handed to the executor is pushed into a `Mutex<Vec<_>>` so
//! assertions can inspect exactly what ran and in what order.  Actions of a
//! kind listed with [`RecordingExecutor::fail_kind`] are recorded and then
//! reported as failed.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use keylayer_core::Action;

use crate::application::interpreter::{ActionExecutor, ExecutionError};

#[derive(Default)]
pub struct RecordingExecutor {
    actions: Mutex<Vec<Action>>,
    failing_kinds: Mutex<HashSet<&'static str>>,
    outputs: Mutex<HashMap<&'static str, String>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every action of `kind` (as in [`Action::kind`]) fail.
    pub fn fail_kind(&self, kind: &'static str) {
        self.failing_kinds.lock().unwrap().insert(kind);
    }

    /// Makes every action of `kind` return `output`.
    pub fn respond_with(&self, kind: &'static str, output: impl Into<String>) {
        self.outputs.lock().unwrap().insert(kind, output.into());
    }

    /// Snapshot of recorded actions in execution order.
    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.actions.lock().unwrap().len()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, action: &Action) -> Result<Option<String>, ExecutionError> {
        self.actions.lock().unwrap().push(action.clone());
        let kind = action.kind();
        if self.failing_kinds.lock().unwrap().contains(kind) {
            return Err(ExecutionError::Failed {
                kind,
                reason: "injected failure".to_string(),
            });
        }
        Ok(self.outputs.lock().unwrap().get(kind).cloned())
    }
}
