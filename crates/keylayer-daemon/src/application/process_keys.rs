//! ProcessKeysUseCase: turns key events into layer changes and macro runs.
//!
//! This use case sits between capture and the interpreter.  For every key it
//! consults the device's [`DeviceProfile`]:
//!
//! 1. No profile, or an inactive one: nothing happens.
//! 2. While recording, the key is appended to the recording instead.
//! 3. A layer key feeds the [`LayerStateMachine`].
//! 4. Any other key resolves its macro on the active layer and runs it.
//!
//! Boot keyboard reports have no explicit key-up events: each report lists
//! every key currently held.  [`ProcessKeysUseCase::handle_key_event`] keeps
//! the previous set per device and diffs it, so a code that disappears is a
//! key-up and a code that appears is a key-down.  A report that only changes
//! the modifier byte presses nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use keylayer_core::{Action, DeviceId, HidKeyCode, KeyEvent, LayerChange, LayerStateMachine, Macro};
use tracing::{debug, info};

use crate::application::interpreter::{ExecutionReport, MacroInterpreter, StopHandle, StopSignal};
use crate::application::profiles::ProfileStore;
use crate::application::recording::{RecordedAction, Recorder};

/// What a key event led to.
#[derive(Debug)]
pub enum KeyOutcome {
    /// No profile, inactive profile, unmapped key or plain release.
    Ignored,
    /// The key was appended to the active recording.
    Recorded,
    LayerChanged(LayerChange),
    Executed(ExecutionReport),
}

/// Routes key events for every isolated device.
pub struct ProcessKeysUseCase {
    profiles: Arc<dyn ProfileStore>,
    interpreter: Arc<MacroInterpreter>,
    layers: Arc<Mutex<LayerStateMachine>>,
    held: Mutex<HashMap<DeviceId, Vec<u8>>>,
    recorder: Mutex<Recorder>,
    recording_enabled: bool,
    stop: Mutex<StopHandle>,
}

impl ProcessKeysUseCase {
    pub fn new(profiles: Arc<dyn ProfileStore>, interpreter: Arc<MacroInterpreter>) -> Self {
        Self {
            profiles,
            interpreter,
            layers: Arc::new(Mutex::new(LayerStateMachine::new())),
            held: Mutex::new(HashMap::new()),
            recorder: Mutex::new(Recorder::new()),
            recording_enabled: true,
            stop: Mutex::new(StopSignal::new().0),
        }
    }

    /// Disables (or re-enables) [`ProcessKeysUseCase::start_recording`].
    pub fn with_recording(mut self, enabled: bool) -> Self {
        self.recording_enabled = enabled;
        self
    }

    pub fn interpreter(&self) -> &Arc<MacroInterpreter> {
        &self.interpreter
    }

    /// Feeds one decoded report.  Releases run before presses; the result is
    /// the last outcome that did something.
    pub async fn handle_key_event(&self, event: &KeyEvent) -> KeyOutcome {
        let device = &event.device_id;
        let previous = if event.is_release() {
            lock(&self.held).remove(device)
        } else {
            lock(&self.held).insert(device.clone(), event.keys.clone())
        }
        .unwrap_or_default();

        let mut outcome = KeyOutcome::Ignored;
        for &scan in previous.iter().filter(|s| !event.keys.contains(s)) {
            if let Some(change) = self.process_key_release(device, scan) {
                outcome = KeyOutcome::LayerChanged(change);
            }
        }
        for &scan in event.keys.iter().filter(|s| !previous.contains(s)) {
            match self.process_key_press(device, scan, event.modifiers).await {
                KeyOutcome::Ignored => {}
                pressed => outcome = pressed,
            }
        }
        outcome
    }

    /// Handles a key-down of `scan_code` on `device`.
    pub async fn process_key_press(
        &self,
        device: &DeviceId,
        scan_code: u8,
        modifiers: u8,
    ) -> KeyOutcome {
        let Some(profile) = self.profiles.get(device) else {
            debug!(%device, "no profile, key ignored");
            return KeyOutcome::Ignored;
        };
        if !profile.active {
            return KeyOutcome::Ignored;
        }

        // A late timer must not leave an expired momentary layer in charge.
        if let Some(change) = lock(&self.layers).expire_due(device, Instant::now()) {
            info!(%device, from = change.from, to = change.to, "momentary layer past its deadline");
        }

        if self.record(scan_code) {
            return KeyOutcome::Recorded;
        }

        if let Some(layer_key) = profile.layer_key(scan_code) {
            let change = lock(&self.layers).on_key_down(device, layer_key, Instant::now());
            if change.changed() {
                info!(%device, from = change.from, to = change.to, "layer changed");
            }
            if let Some(timer) = change.momentary {
                self.schedule_revert(device.clone(), timer.ticket, timer.duration);
            }
            return KeyOutcome::LayerChanged(change);
        }

        let layer = lock(&self.layers).active_layer(device);
        let Some(program) = profile.resolve(scan_code, layer).cloned() else {
            debug!(%device, scan_code, layer, "key not mapped");
            return KeyOutcome::Ignored;
        };
        debug!(%device, scan_code, modifiers, layer, "running macro");
        KeyOutcome::Executed(self.execute_macro(&program).await)
    }

    /// Handles a key-up.  Only hold layers react to it.
    pub fn process_key_release(&self, device: &DeviceId, scan_code: u8) -> Option<LayerChange> {
        let change = lock(&self.layers).on_key_up(device, scan_code)?;
        info!(%device, from = change.from, to = change.to, "hold layer released");
        Some(change)
    }

    /// Runs `program` on the shared interpreter.  Honours [`ProcessKeysUseCase::stop_running`].
    pub async fn execute_macro(&self, program: &Macro) -> ExecutionReport {
        let signal = lock(&self.stop).signal();
        self.interpreter.execute(program, signal).await
    }

    /// Stops every macro currently running.  Later macros run normally.
    pub fn stop_running(&self) {
        let mut stop = lock(&self.stop);
        stop.stop();
        *stop = StopSignal::new().0;
    }

    pub fn active_layer(&self, device: &DeviceId) -> u8 {
        lock(&self.layers).active_layer(device)
    }

    /// Forgets layer and held-key state for a device that went away.
    pub fn forget_device(&self, device: &DeviceId) {
        lock(&self.layers).reset(device);
        lock(&self.held).remove(device);
    }

    /// Starts recording.  Returns `false` when recording is disabled.
    pub fn start_recording(&self) -> bool {
        if !self.recording_enabled {
            return false;
        }
        lock(&self.recorder).start_recording();
        true
    }

    pub fn stop_recording(&self) -> Vec<RecordedAction> {
        lock(&self.recorder).stop_recording()
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.recorder).is_recording()
    }

    fn record(&self, scan_code: u8) -> bool {
        let mut recorder = lock(&self.recorder);
        if !recorder.is_recording() {
            return false;
        }
        if let Some(key) = HidKeyCode::from_u8(scan_code) {
            recorder.observe(Action::key_press(key));
        }
        true
    }

    fn schedule_revert(&self, device: DeviceId, ticket: u64, after: std::time::Duration) {
        let layers = Arc::clone(&self.layers);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let change = lock(&layers).expire(&device, ticket);
            if let Some(change) = change {
                info!(%device, from = change.from, to = change.to, "momentary layer expired");
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::interpreter::MockActionExecutor;
    use crate::application::profiles::InMemoryProfileStore;
    use crate::infrastructure::environment::SystemEnvironment;
    use keylayer_core::{Activation, DeviceProfile, InterfacePath, LayerKey, BASE_LAYER};
    use std::time::Duration;

    const KEY_1: u8 = 0x1E;
    const KEY_2: u8 = 0x1F;
    const LAYER_KEY: u8 = 0x29;

    fn pad() -> DeviceId {
        DeviceId::from("1A2C:2124:Macro Pad")
    }

    fn text(s: &str) -> Action {
        Action::Text {
            text: s.to_string(),
        }
    }

    fn profile_with(activation: Activation) -> DeviceProfile {
        let mut profile = DeviceProfile::new(pad());
        profile
            .map_key(KEY_1, Macro::sequence([text("base")]))
            .layer_actions
            .insert(1, Macro::sequence([text("layer one")]));
        profile.add_layer_key(LayerKey {
            trigger: LAYER_KEY,
            layer: 1,
            activation,
            priority: 0,
        });
        profile
    }

    fn use_case(
        profile: Option<DeviceProfile>,
        executor: MockActionExecutor,
    ) -> ProcessKeysUseCase {
        let store = InMemoryProfileStore::with_profiles(profile);
        let interpreter =
            MacroInterpreter::new(Arc::new(executor), Arc::new(SystemEnvironment::new()));
        ProcessKeysUseCase::new(Arc::new(store), Arc::new(interpreter))
    }

    fn expect_text(executor: &mut MockActionExecutor, expected: &'static str, times: usize) {
        executor
            .expect_execute()
            .withf(move |a| matches!(a, Action::Text { text } if text == expected))
            .times(times)
            .returning(|_| Ok(None));
    }

    fn report(scan: u8) -> KeyEvent {
        held(0, &[scan])
    }

    /// A boot report with `keys` in consecutive slots.
    fn held(modifiers: u8, keys: &[u8]) -> KeyEvent {
        let mut bytes = [0u8; 8];
        bytes[0] = modifiers;
        bytes[2..2 + keys.len()].copy_from_slice(keys);
        KeyEvent::from_report(pad(), InterfacePath::new("/mock/pad0"), &bytes)
    }

    // ── Macro resolution ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_mapped_key_runs_base_macro() {
        // Arrange
        let mut executor = MockActionExecutor::new();
        expect_text(&mut executor, "base", 1);
        let uc = use_case(Some(profile_with(Activation::Toggle)), executor);

        // Act
        let outcome = uc.process_key_press(&pad(), KEY_1, 0).await;

        // Assert
        assert!(matches!(outcome, KeyOutcome::Executed(ref r) if r.succeeded()));
    }

    #[tokio::test]
    async fn test_missing_profile_is_a_silent_no_op() {
        let uc = use_case(None, MockActionExecutor::new());
        let outcome = uc.process_key_press(&pad(), KEY_1, 0).await;
        assert!(matches!(outcome, KeyOutcome::Ignored));
    }

    #[tokio::test]
    async fn test_inactive_profile_ignores_input() {
        let mut profile = profile_with(Activation::Toggle);
        profile.active = false;
        let uc = use_case(Some(profile), MockActionExecutor::new());

        let outcome = uc.process_key_press(&pad(), KEY_1, 0).await;

        assert!(matches!(outcome, KeyOutcome::Ignored));
    }

    #[tokio::test]
    async fn test_unmapped_key_is_ignored() {
        let uc = use_case(Some(profile_with(Activation::Toggle)), MockActionExecutor::new());
        let outcome = uc.process_key_press(&pad(), KEY_2, 0).await;
        assert!(matches!(outcome, KeyOutcome::Ignored));
    }

    // ── Layers ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_toggle_layer_overrides_then_restores_base() {
        // Arrange
        let mut executor = MockActionExecutor::new();
        expect_text(&mut executor, "layer one", 1);
        expect_text(&mut executor, "base", 1);
        let uc = use_case(Some(profile_with(Activation::Toggle)), executor);

        // Act + Assert
        uc.process_key_press(&pad(), LAYER_KEY, 0).await;
        assert_eq!(uc.active_layer(&pad()), 1);
        uc.process_key_press(&pad(), KEY_1, 0).await;

        uc.process_key_press(&pad(), LAYER_KEY, 0).await;
        assert_eq!(uc.active_layer(&pad()), BASE_LAYER);
        uc.process_key_press(&pad(), KEY_1, 0).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_momentary_layer_reverts_after_duration() {
        // Arrange
        let uc = use_case(
            Some(profile_with(Activation::Momentary { duration_ms: 500 })),
            MockActionExecutor::new(),
        );

        // Act
        uc.process_key_press(&pad(), LAYER_KEY, 0).await;
        let during = uc.active_layer(&pad());
        tokio::time::sleep(Duration::from_millis(600)).await;

        // Assert
        assert_eq!(during, 1);
        assert_eq!(uc.active_layer(&pad()), BASE_LAYER);
    }

    #[tokio::test]
    async fn test_release_report_ends_hold_layer() {
        // Arrange
        let uc = use_case(Some(profile_with(Activation::Hold)), MockActionExecutor::new());

        // Act
        uc.handle_key_event(&report(LAYER_KEY)).await;
        let held = uc.active_layer(&pad());
        let outcome = uc.handle_key_event(&report(0)).await;

        // Assert
        assert_eq!(held, 1);
        assert!(matches!(outcome, KeyOutcome::LayerChanged(c) if c.to == BASE_LAYER));
        assert_eq!(uc.active_layer(&pad()), BASE_LAYER);
    }

    #[tokio::test]
    async fn test_release_without_held_key_is_ignored() {
        let uc = use_case(Some(profile_with(Activation::Hold)), MockActionExecutor::new());
        let outcome = uc.handle_key_event(&report(0)).await;
        assert!(matches!(outcome, KeyOutcome::Ignored));
    }

    #[tokio::test]
    async fn test_layer_key_leaving_the_report_releases_the_hold_layer() {
        let mut executor = MockActionExecutor::new();
        expect_text(&mut executor, "base", 1);
        let uc = use_case(Some(profile_with(Activation::Hold)), executor);

        uc.handle_key_event(&report(LAYER_KEY)).await;
        uc.handle_key_event(&report(KEY_1)).await;

        assert_eq!(uc.active_layer(&pad()), BASE_LAYER);
    }

    #[tokio::test(start_paused = true)]
    async fn test_momentary_layer_past_its_deadline_is_ignored_before_the_timer_fires() {
        // Arrange
        let mut executor = MockActionExecutor::new();
        expect_text(&mut executor, "base", 1);
        let uc = use_case(
            Some(profile_with(Activation::Momentary { duration_ms: 20 })),
            executor,
        );
        uc.process_key_press(&pad(), LAYER_KEY, 0).await;

        // Act: wall-clock time passes without the runtime polling the timer
        std::thread::sleep(Duration::from_millis(40));
        let outcome = uc.process_key_press(&pad(), KEY_1, 0).await;

        // Assert
        assert!(matches!(outcome, KeyOutcome::Executed(_)));
        assert_eq!(uc.active_layer(&pad()), BASE_LAYER);
    }

    // ── Multi-key reports ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_key_pressed_while_hold_key_stays_down_uses_the_hold_layer() {
        // Arrange
        let mut executor = MockActionExecutor::new();
        expect_text(&mut executor, "layer one", 1);
        let uc = use_case(Some(profile_with(Activation::Hold)), executor);

        // Act: layer key in slot 0, then KEY_1 joins it in slot 1
        uc.handle_key_event(&held(0, &[LAYER_KEY])).await;
        let outcome = uc.handle_key_event(&held(0, &[LAYER_KEY, KEY_1])).await;

        // Assert
        assert!(matches!(outcome, KeyOutcome::Executed(_)));
        assert_eq!(uc.active_layer(&pad()), 1);
    }

    #[tokio::test]
    async fn test_hold_layer_ends_when_its_key_leaves_a_multi_key_report() {
        // Arrange
        let mut executor = MockActionExecutor::new();
        expect_text(&mut executor, "layer one", 1);
        let uc = use_case(Some(profile_with(Activation::Hold)), executor);
        uc.handle_key_event(&held(0, &[LAYER_KEY])).await;
        uc.handle_key_event(&held(0, &[LAYER_KEY, KEY_1])).await;

        // Act: layer key lifted, KEY_1 still down (shifts into slot 0)
        let outcome = uc.handle_key_event(&held(0, &[KEY_1])).await;

        // Assert: release only, KEY_1 does not fire again
        assert!(matches!(outcome, KeyOutcome::LayerChanged(c) if c.to == BASE_LAYER));
        assert_eq!(uc.active_layer(&pad()), BASE_LAYER);
    }

    #[tokio::test]
    async fn test_modifier_change_does_not_repeat_the_held_key() {
        // Arrange
        let mut executor = MockActionExecutor::new();
        expect_text(&mut executor, "base", 1);
        let uc = use_case(Some(profile_with(Activation::Toggle)), executor);

        // Act: KEY_1 down, then Left Shift added with KEY_1 still down
        uc.handle_key_event(&held(0x00, &[KEY_1])).await;
        let outcome = uc.handle_key_event(&held(0x02, &[KEY_1])).await;

        // Assert
        assert!(matches!(outcome, KeyOutcome::Ignored));
    }

    #[tokio::test]
    async fn test_key_in_a_later_slot_alone_still_fires() {
        // Arrange
        let mut executor = MockActionExecutor::new();
        expect_text(&mut executor, "base", 1);
        let uc = use_case(Some(profile_with(Activation::Toggle)), executor);
        let mut bytes = [0u8; 8];
        bytes[4] = KEY_1;
        let event = KeyEvent::from_report(pad(), InterfacePath::new("/mock/pad0"), &bytes);

        // Act
        let outcome = uc.handle_key_event(&event).await;

        // Assert
        assert!(matches!(outcome, KeyOutcome::Executed(_)));
    }

    #[tokio::test]
    async fn test_full_release_after_multi_key_report_clears_held_keys() {
        let mut executor = MockActionExecutor::new();
        expect_text(&mut executor, "layer one", 1);
        expect_text(&mut executor, "base", 1);
        let uc = use_case(Some(profile_with(Activation::Hold)), executor);

        uc.handle_key_event(&held(0, &[LAYER_KEY, KEY_1])).await;
        uc.handle_key_event(&held(0, &[])).await;
        uc.handle_key_event(&held(0, &[KEY_1])).await;

        assert_eq!(uc.active_layer(&pad()), BASE_LAYER);
    }

    // ── Recording and cancellation ────────────────────────────────────────────

    #[tokio::test]
    async fn test_recording_captures_keys_instead_of_running_macros() {
        // Arrange
        let uc = use_case(Some(profile_with(Activation::Toggle)), MockActionExecutor::new());
        assert!(uc.start_recording());

        // Act
        let outcome = uc.process_key_press(&pad(), KEY_1, 0).await;
        let recorded = uc.stop_recording();

        // Assert
        assert!(matches!(outcome, KeyOutcome::Recorded));
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].action, Action::key_press(HidKeyCode::Digit1));
    }

    #[tokio::test]
    async fn test_recording_can_be_disabled() {
        let uc = use_case(None, MockActionExecutor::new()).with_recording(false);
        assert!(!uc.start_recording());
        assert!(!uc.is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_running_cancels_in_flight_macro() {
        // Arrange
        let mut profile = DeviceProfile::new(pad());
        profile.map_key(KEY_1, Macro::sequence([Action::Delay { ms: 60_000 }, text("late")]));
        let uc = Arc::new(use_case(Some(profile), MockActionExecutor::new()));

        // Act
        let running = {
            let uc = Arc::clone(&uc);
            tokio::spawn(async move { uc.process_key_press(&pad(), KEY_1, 0).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        uc.stop_running();
        let outcome = running.await.unwrap();

        // Assert
        assert!(matches!(outcome, KeyOutcome::Executed(ref r) if r.cancelled));
    }
}
