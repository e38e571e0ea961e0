//! Macro recording: capture actions as they are observed.

use std::time::{Duration, Instant};

use keylayer_core::{Action, Macro};
use tracing::{debug, info};

/// Gaps shorter than this are not turned into `Delay` actions.
const MIN_RECORDED_GAP: Duration = Duration::from_millis(10);

/// An observed action and when it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAction {
    pub action: Action,
    pub at: Instant,
}

/// Append-only buffer of timestamped actions.
///
/// Actions observed while not recording are dropped.  Starting again while
/// already recording discards the buffer.
#[derive(Debug, Default)]
pub struct Recorder {
    recording: bool,
    buffer: Vec<RecordedAction>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn start_recording(&mut self) {
        if self.recording {
            debug!(discarded = self.buffer.len(), "recording restarted");
        }
        self.buffer.clear();
        self.recording = true;
        info!("recording started");
    }

    /// Ends recording and hands back everything observed, clearing the buffer.
    pub fn stop_recording(&mut self) -> Vec<RecordedAction> {
        self.recording = false;
        let recorded = std::mem::take(&mut self.buffer);
        info!(actions = recorded.len(), "recording stopped");
        recorded
    }

    /// Records `action` as happening now.
    pub fn observe(&mut self, action: Action) {
        self.observe_at(action, Instant::now());
    }

    pub fn observe_at(&mut self, action: Action, at: Instant) {
        if self.recording {
            self.buffer.push(RecordedAction { action, at });
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Builds a flat macro from a recording, inserting a `Delay` wherever the
/// recorded gap between two actions was noticeable.
pub fn into_macro(recorded: &[RecordedAction]) -> Macro {
    let mut actions = Vec::with_capacity(recorded.len() * 2);
    let mut previous: Option<Instant> = None;

    for entry in recorded {
        if let Some(prev) = previous {
            let gap = entry.at.saturating_duration_since(prev);
            if gap >= MIN_RECORDED_GAP {
                actions.push(Action::Delay {
                    ms: gap.as_millis() as u64,
                });
            }
        }
        // Recorded actions are leaves; composite ones have nothing to point at.
        if entry.action.children().next().is_none() {
            actions.push(entry.action.clone());
        }
        previous = Some(entry.at);
    }

    Macro::sequence(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylayer_core::HidKeyCode;

    fn key(code: HidKeyCode) -> Action {
        Action::key_press(code)
    }

    #[test]
    fn test_observe_outside_recording_is_ignored() {
        let mut recorder = Recorder::new();
        recorder.observe(key(HidKeyCode::KeyA));
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_stop_returns_and_clears_buffer() {
        // Arrange
        let mut recorder = Recorder::new();
        recorder.start_recording();
        recorder.observe(key(HidKeyCode::KeyA));
        recorder.observe(key(HidKeyCode::KeyB));

        // Act
        let recorded = recorder.stop_recording();

        // Assert
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].action, key(HidKeyCode::KeyA));
        assert!(recorder.is_empty());
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_restart_while_recording_resets_buffer() {
        let mut recorder = Recorder::new();
        recorder.start_recording();
        recorder.observe(key(HidKeyCode::KeyA));

        recorder.start_recording();
        recorder.observe(key(HidKeyCode::KeyB));

        let recorded = recorder.stop_recording();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].action, key(HidKeyCode::KeyB));
    }

    #[test]
    fn test_into_macro_reproduces_gaps_as_delays() {
        // Arrange
        let t0 = Instant::now();
        let mut recorder = Recorder::new();
        recorder.start_recording();
        recorder.observe_at(key(HidKeyCode::KeyA), t0);
        recorder.observe_at(key(HidKeyCode::KeyB), t0 + Duration::from_millis(250));
        recorder.observe_at(key(HidKeyCode::KeyC), t0 + Duration::from_millis(252));

        // Act
        let program = into_macro(&recorder.stop_recording());

        // Assert
        let actions: Vec<_> = program
            .roots()
            .iter()
            .map(|id| program.node(*id).unwrap().action.clone())
            .collect();
        assert_eq!(
            actions,
            vec![
                key(HidKeyCode::KeyA),
                Action::Delay { ms: 250 },
                key(HidKeyCode::KeyB),
                key(HidKeyCode::KeyC),
            ]
        );
    }
}
