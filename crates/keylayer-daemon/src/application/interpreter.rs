//! MacroInterpreter: runs a [`Macro`] against an [`ActionExecutor`].
//!
//! # Execution model (for beginners)
//!
//! A macro is a tree of actions stored in an arena.  The interpreter walks the
//! top-level sequence in order and handles the control-flow kinds itself:
//!
//! | Kind          | Handled by                                             |
//! |---------------|--------------------------------------------------------|
//! | `Delay`       | interpreter (Tokio timer, cut short by a stop request)  |
//! | `Conditional` | interpreter, via the [`Environment`] probe              |
//! | `Loop`        | interpreter, body runs strictly sequentially           |
//! | `Variable`    | interpreter, placeholders expanded at assignment time  |
//! | everything else | forwarded unchanged to the [`ActionExecutor`]        |
//!
//! Exactly one action is in flight at any time.  A failing action is logged
//! and recorded in the [`ExecutionReport`]; the rest of its list still runs.
//! A stop request takes effect before the next action starts.

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveTime;
use keylayer_core::{Action, Condition, LoopCount, Macro, NodeId, VariableStore};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

/// Variable holding the zero-based iteration of the innermost loop.
pub const LOOP_INDEX_VAR: &str = "LoopIndex";
/// Variable holding the iteration count of the innermost loop.
pub const LOOP_COUNT_VAR: &str = "LoopCount";

const DATETIME_PLACEHOLDER: &str = "DateTime";
const RANDOM_PLACEHOLDER: &str = "Random";

/// Error returned by an [`ActionExecutor`].  Always recoverable.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{kind} action failed: {reason}")]
    Failed { kind: &'static str, reason: String },

    #[error("{0} actions are not supported on this platform")]
    Unsupported(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Performs the OS-level effect of a single non-control-flow action.
///
/// Infrastructure implementations talk to the OS; test implementations record
/// calls.  An executor may return a value; for `WebRequest` actions with a
/// `store_into` variable, the value is stored there.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &Action) -> Result<Option<String>, ExecutionError>;
}

/// Read-only view of the machine used by conditions and placeholders.
///
/// The probes that touch the OS are async so a slow window or process
/// listing never stalls a runtime worker.
#[async_trait]
pub trait Environment: Send + Sync {
    /// `true` if a top-level window title contains `title`.
    async fn window_exists(&self, title: &str) -> bool;
    async fn process_running(&self, name: &str) -> bool;
    async fn file_exists(&self, path: &str) -> bool;
    /// Local wall-clock time of day.
    fn local_time(&self) -> NaiveTime;
    /// Text substituted for `{DateTime}`.
    fn timestamp(&self) -> String;
    /// Number substituted for `{Random}`, in `1000..=9999`.  Drawn once per
    /// assignment.
    fn random_token(&self) -> u32;
}

/// Cloneable stop request shared with a running execution.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

/// The sending half of a [`StopSignal`].
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopSignal {
    /// Creates a linked handle/signal pair.
    pub fn new() -> (StopHandle, StopSignal) {
        let (tx, rx) = watch::channel(false);
        (StopHandle { tx }, StopSignal { rx })
    }

    /// A signal that is never raised.
    pub fn never() -> StopSignal {
        Self::new().1
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop is requested.  Pends forever if the handle is
    /// dropped without stopping.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        loop {
            let stopped = *rx.borrow_and_update();
            if stopped {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl StopHandle {
    pub fn stop(&self) {
        // send_replace works even with no live receivers.
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// One action that failed during an execution.
#[derive(Debug)]
pub struct ActionFailure {
    pub node: NodeId,
    pub kind: &'static str,
    pub error: ExecutionError,
}

/// Outcome of one [`MacroInterpreter::execute`] call.
#[derive(Debug)]
pub struct ExecutionReport {
    pub execution_id: Uuid,
    /// Actions (including control-flow nodes) that completed without error.
    pub executed: usize,
    pub failures: Vec<ActionFailure>,
    /// `true` if a stop request cut the execution short.
    pub cancelled: bool,
}

impl ExecutionReport {
    fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            executed: 0,
            failures: Vec::new(),
            cancelled: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

#[derive(Debug, Clone, Copy)]
struct LoopFrame {
    index: u32,
    count: Option<u32>,
}

/// Per-execution state threaded through the recursion.
struct RunState {
    stop: StopSignal,
    loops: Vec<LoopFrame>,
    report: ExecutionReport,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs macros one action at a time.
///
/// The [`VariableStore`] belongs to the interpreter, so variables written by
/// one execution are visible to later executions.
pub struct MacroInterpreter {
    executor: Arc<dyn ActionExecutor>,
    environment: Arc<dyn Environment>,
    variables: Mutex<VariableStore>,
}

impl MacroInterpreter {
    pub fn new(executor: Arc<dyn ActionExecutor>, environment: Arc<dyn Environment>) -> Self {
        Self {
            executor,
            environment,
            variables: Mutex::new(VariableStore::new()),
        }
    }

    /// Executes `program` until it finishes or `stop` is raised.
    pub async fn execute(&self, program: &Macro, stop: StopSignal) -> ExecutionReport {
        let mut state = RunState {
            stop,
            loops: Vec::new(),
            report: ExecutionReport::new(),
        };
        let id = state.report.execution_id;
        debug!(execution = %id, roots = program.roots().len(), "macro started");

        self.run_nodes(program, program.roots(), &mut state).await;

        let report = state.report;
        debug!(
            execution = %id,
            executed = report.executed,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "macro finished"
        );
        report
    }

    /// Executes `program` to completion.
    pub async fn execute_to_end(&self, program: &Macro) -> ExecutionReport {
        self.execute(program, StopSignal::never()).await
    }

    /// Current value of a stored variable.
    pub fn variable(&self, name: &str) -> Option<String> {
        self.store().get(name).map(str::to_string)
    }

    pub fn set_variable(&self, name: &str, value: &str) {
        self.store().set(name, value);
    }

    pub fn clear_variables(&self) {
        self.store().clear();
    }

    fn store(&self) -> MutexGuard<'_, VariableStore> {
        self.variables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_nodes<'a>(
        &'a self,
        program: &'a Macro,
        ids: &'a [NodeId],
        state: &'a mut RunState,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            for &id in ids {
                if state.stop.is_stopped() {
                    state.report.cancelled = true;
                    return;
                }
                let Some(node) = program.node(id) else {
                    warn!(node = %id, "macro references a missing node");
                    continue;
                };
                if !node.enabled {
                    continue;
                }
                self.run_action(program, id, &node.action, state).await;
            }
        })
    }

    async fn run_action(
        &self,
        program: &Macro,
        id: NodeId,
        action: &Action,
        state: &mut RunState,
    ) {
        match action {
            Action::Delay { ms } => {
                let interrupted = tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(*ms)) => false,
                    _ = state.stop.stopped() => true,
                };
                if interrupted {
                    state.report.cancelled = true;
                }
                state.report.executed += 1;
            }
            Action::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let met = self.evaluate(condition, state).await;
                debug!(node = %id, met, "condition evaluated");
                state.report.executed += 1;
                let branch = if met { then_branch } else { else_branch };
                self.run_nodes(program, branch, state).await;
            }
            Action::Loop { count, body } => {
                state.report.executed += 1;
                self.run_loop(program, id, *count, body, state).await;
            }
            Action::Variable { name, value } => {
                let expanded = self.expand(value, state);
                debug!(node = %id, %name, "variable assigned");
                self.store().set(name.as_str(), expanded);
                state.report.executed += 1;
            }
            other => self.forward(id, other, state).await,
        }
    }

    async fn run_loop(
        &self,
        program: &Macro,
        id: NodeId,
        count: LoopCount,
        body: &[NodeId],
        state: &mut RunState,
    ) {
        let limit = count.iterations();
        if limit.is_none() && body.is_empty() {
            warn!(node = %id, "skipping infinite loop with an empty body");
            return;
        }

        let mut index = 0u32;
        while limit.map_or(true, |n| index < n) {
            if state.stop.is_stopped() {
                state.report.cancelled = true;
                break;
            }
            state.loops.push(LoopFrame {
                index,
                count: limit,
            });
            self.run_nodes(program, body, state).await;
            state.loops.pop();
            if limit.is_none() {
                tokio::task::yield_now().await;
            }
            index = index.saturating_add(1);
        }
    }

    async fn forward(&self, id: NodeId, action: &Action, state: &mut RunState) {
        match self.executor.execute(action).await {
            Ok(output) => {
                if let (Action::WebRequest { store_into: Some(name), .. }, Some(value)) =
                    (action, output)
                {
                    self.store().set(name.as_str(), value);
                }
                state.report.executed += 1;
            }
            Err(error) => {
                warn!(node = %id, kind = action.kind(), %error, "action failed, continuing");
                state.report.failures.push(ActionFailure {
                    node: id,
                    kind: action.kind(),
                    error,
                });
            }
        }
    }

    async fn evaluate(&self, condition: &Condition, state: &RunState) -> bool {
        let env = &self.environment;
        match condition {
            Condition::WindowExists(title) => env.window_exists(title).await,
            Condition::ProcessRunning(name) => env.process_running(name).await,
            Condition::FileExists(path) => env.file_exists(path).await,
            Condition::VariableEquals { name, value } => {
                self.lookup(name, state).as_deref() == Some(value.as_str())
            }
            Condition::TimeRange { .. } => condition
                .time_range_contains(env.local_time())
                .unwrap_or(false),
        }
    }

    /// Loop variables shadow stored ones.
    fn lookup(&self, name: &str, state: &RunState) -> Option<String> {
        loop_variable(name, state).or_else(|| self.variable(name))
    }

    fn expand(&self, text: &str, state: &RunState) -> String {
        let store = self.store();
        let mut random: Option<String> = None;
        VariableStore::substitute(text, |name| {
            let value = match name {
                DATETIME_PLACEHOLDER => Some(self.environment.timestamp()),
                RANDOM_PLACEHOLDER => Some(
                    random
                        .get_or_insert_with(|| self.environment.random_token().to_string())
                        .clone(),
                ),
                _ => loop_variable(name, state).or_else(|| store.get(name).map(str::to_string)),
            };
            value.map(Cow::Owned)
        })
    }
}

fn loop_variable(name: &str, state: &RunState) -> Option<String> {
    let frame = state.loops.last()?;
    match name {
        LOOP_INDEX_VAR => Some(frame.index.to_string()),
        LOOP_COUNT_VAR => Some(match frame.count {
            Some(n) => n.to_string(),
            None => "Infinite".to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylayer_core::{ActionNode, HidKeyCode};
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    // ── Test doubles ──────────────────────────────────────────────────────────

    struct FixedEnvironment {
        windows: Vec<&'static str>,
        time: NaiveTime,
        tokens: AtomicU32,
    }

    impl Default for FixedEnvironment {
        fn default() -> Self {
            Self {
                windows: vec!["Untitled - Notepad"],
                time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                tokens: AtomicU32::new(4242),
            }
        }
    }

    #[async_trait]
    impl Environment for FixedEnvironment {
        async fn window_exists(&self, title: &str) -> bool {
            self.windows.iter().any(|w| w.contains(title))
        }
        async fn process_running(&self, name: &str) -> bool {
            name == "explorer.exe"
        }
        async fn file_exists(&self, path: &str) -> bool {
            path == "/etc/hosts"
        }
        fn local_time(&self) -> NaiveTime {
            self.time
        }
        fn timestamp(&self) -> String {
            "2024-01-02 03:04:05".to_string()
        }
        /// 4242, 4243, ... so repeated draws are distinguishable.
        fn random_token(&self) -> u32 {
            self.tokens.fetch_add(1, Ordering::SeqCst)
        }
    }

    fn interpreter(executor: MockActionExecutor) -> MacroInterpreter {
        MacroInterpreter::new(Arc::new(executor), Arc::new(FixedEnvironment::default()))
    }

    fn text(s: &str) -> Action {
        Action::Text {
            text: s.to_string(),
        }
    }

    fn is_text(action: &Action, expected: &str) -> bool {
        matches!(action, Action::Text { text } if text == expected)
    }

    // ── Sequential execution ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_actions_run_in_order() {
        // Arrange
        let mut executor = MockActionExecutor::new();
        let mut seq = Sequence::new();
        for expected in ["a", "b", "c"] {
            executor
                .expect_execute()
                .withf(move |a| is_text(a, expected))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(None));
        }
        let program = Macro::sequence([text("a"), text("b"), text("c")]);

        // Act
        let report = interpreter(executor).execute_to_end(&program).await;

        // Assert
        assert_eq!(report.executed, 3);
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_execution_continues() {
        // Arrange
        let mut executor = MockActionExecutor::new();
        executor
            .expect_execute()
            .withf(|a| is_text(a, "A"))
            .times(1)
            .returning(|_| {
                Err(ExecutionError::Failed {
                    kind: "Text",
                    reason: "injected".to_string(),
                })
            });
        executor
            .expect_execute()
            .withf(|a| is_text(a, "B"))
            .times(1)
            .returning(|_| Ok(None));
        let program = Macro::sequence([text("A"), text("B")]);

        // Act
        let report = interpreter(executor).execute_to_end(&program).await;

        // Assert
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].node, NodeId(0));
        assert_eq!(report.failures[0].kind, "Text");
        assert_eq!(report.executed, 1);
    }

    #[tokio::test]
    async fn test_disabled_action_is_skipped() {
        let mut executor = MockActionExecutor::new();
        executor
            .expect_execute()
            .with(eq(Action::key_press(HidKeyCode::KeyB)))
            .times(1)
            .returning(|_| Ok(None));
        let mut program = Macro::new();
        let mut disabled = ActionNode::new(Action::key_press(HidKeyCode::KeyA));
        disabled.enabled = false;
        let a = program.add_node(disabled).unwrap();
        program.push_root(a).unwrap();
        program.append(Action::key_press(HidKeyCode::KeyB)).unwrap();

        let report = interpreter(executor).execute_to_end(&program).await;

        assert_eq!(report.executed, 1);
    }

    #[tokio::test]
    async fn test_disabled_loop_skips_its_body() {
        let executor = MockActionExecutor::new();
        let mut program = Macro::new();
        let body = program.add(text("never")).unwrap();
        let mut node = ActionNode::new(Action::Loop {
            count: LoopCount::Times(5),
            body: vec![body],
        });
        node.enabled = false;
        let lp = program.add_node(node).unwrap();
        program.push_root(lp).unwrap();

        let report = interpreter(executor).execute_to_end(&program).await;

        assert_eq!(report.executed, 0);
    }

    // ── Conditionals ──────────────────────────────────────────────────────────

    fn conditional(condition: Condition) -> Macro {
        let mut program = Macro::new();
        let yes = program.add(text("yes")).unwrap();
        let no = program.add(text("no")).unwrap();
        program
            .append(Action::Conditional {
                condition,
                then_branch: vec![yes],
                else_branch: vec![no],
            })
            .unwrap();
        program
    }

    fn expect_only(expected: &'static str) -> MockActionExecutor {
        let mut executor = MockActionExecutor::new();
        executor
            .expect_execute()
            .withf(move |a| is_text(a, expected))
            .times(1)
            .returning(|_| Ok(None));
        executor
    }

    #[tokio::test]
    async fn test_conditional_takes_then_branch_when_window_exists() {
        let program = conditional(Condition::WindowExists("Notepad".to_string()));
        interpreter(expect_only("yes")).execute_to_end(&program).await;
    }

    #[tokio::test]
    async fn test_conditional_takes_else_branch_when_process_missing() {
        let program = conditional(Condition::ProcessRunning("missing.exe".to_string()));
        interpreter(expect_only("no")).execute_to_end(&program).await;
    }

    #[tokio::test]
    async fn test_conditional_checks_file_existence() {
        let program = conditional(Condition::FileExists("/etc/hosts".to_string()));
        interpreter(expect_only("yes")).execute_to_end(&program).await;
    }

    #[tokio::test]
    async fn test_conditional_time_range_uses_local_time() {
        let program = conditional(Condition::TimeRange {
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        });
        // 12:00 is outside a range that wraps midnight.
        interpreter(expect_only("no")).execute_to_end(&program).await;
    }

    #[tokio::test]
    async fn test_conditional_reads_variable_set_earlier() {
        // Arrange
        let mut program = Macro::new();
        program
            .append(Action::Variable {
                name: "mode".to_string(),
                value: "edit".to_string(),
            })
            .unwrap();
        let yes = program.add(text("yes")).unwrap();
        program
            .append(Action::Conditional {
                condition: Condition::VariableEquals {
                    name: "mode".to_string(),
                    value: "edit".to_string(),
                },
                then_branch: vec![yes],
                else_branch: vec![],
            })
            .unwrap();

        // Act + Assert (mock verifies on drop)
        interpreter(expect_only("yes")).execute_to_end(&program).await;
    }

    // ── Loops ─────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_loop_runs_delay_body_three_times_sequentially() {
        // Arrange
        let mut program = Macro::new();
        let delay = program.add(Action::Delay { ms: 10 }).unwrap();
        program
            .append(Action::Loop {
                count: LoopCount::Times(3),
                body: vec![delay],
            })
            .unwrap();
        let start = tokio::time::Instant::now();

        // Act
        let report = interpreter(MockActionExecutor::new())
            .execute_to_end(&program)
            .await;

        // Assert: loop node + three delays, 30 ms of virtual time
        assert_eq!(report.executed, 4);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_loop_count_zero_runs_once() {
        let mut program = Macro::new();
        let body = program.add(text("x")).unwrap();
        program
            .append(Action::Loop {
                count: LoopCount::Times(0),
                body: vec![body],
            })
            .unwrap();

        interpreter(expect_only("x")).execute_to_end(&program).await;
    }

    #[tokio::test]
    async fn test_loop_variables_are_scoped_to_the_iteration() {
        // Arrange: Loop(3) { Variable(last = "{LoopIndex}/{LoopCount}") }
        let mut program = Macro::new();
        let assign = program
            .add(Action::Variable {
                name: "last".to_string(),
                value: "{LoopIndex}/{LoopCount}".to_string(),
            })
            .unwrap();
        program
            .append(Action::Loop {
                count: LoopCount::Times(3),
                body: vec![assign],
            })
            .unwrap();
        program
            .append(Action::Variable {
                name: "after".to_string(),
                value: "{LoopIndex}".to_string(),
            })
            .unwrap();
        let interp = interpreter(MockActionExecutor::new());

        // Act
        interp.execute_to_end(&program).await;

        // Assert
        assert_eq!(interp.variable("last").as_deref(), Some("2/3"));
        assert_eq!(interp.variable("after").as_deref(), Some("{LoopIndex}"));
    }

    #[tokio::test]
    async fn test_infinite_loop_with_empty_body_is_skipped() {
        let mut program = Macro::new();
        program
            .append(Action::Loop {
                count: LoopCount::Infinite,
                body: vec![],
            })
            .unwrap();

        let report = interpreter(MockActionExecutor::new())
            .execute_to_end(&program)
            .await;

        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_infinite_loop_ends_on_stop() {
        // Arrange
        let calls = Arc::new(AtomicUsize::new(0));
        let (handle, signal) = StopSignal::new();
        let handle = Arc::new(handle);
        let mut executor = MockActionExecutor::new();
        {
            let calls = Arc::clone(&calls);
            let handle = Arc::clone(&handle);
            executor.expect_execute().returning(move |_| {
                if calls.fetch_add(1, Ordering::SeqCst) + 1 == 5 {
                    handle.stop();
                }
                Ok(None)
            });
        }
        let mut program = Macro::new();
        let body = program.add(text("tick")).unwrap();
        program
            .append(Action::Loop {
                count: LoopCount::Infinite,
                body: vec![body],
            })
            .unwrap();

        // Act
        let report = interpreter(executor).execute(&program, signal).await;

        // Assert: the in-flight action completes, nothing after it starts
        assert!(report.cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    // ── Failures inside nested lists ──────────────────────────────────────────

    fn injected() -> Result<Option<String>, ExecutionError> {
        Err(ExecutionError::Failed {
            kind: "Text",
            reason: "injected".to_string(),
        })
    }

    #[tokio::test]
    async fn test_failure_inside_loop_body_continues_every_iteration() {
        // Arrange: Loop(3) { bad, good }
        let mut executor = MockActionExecutor::new();
        executor
            .expect_execute()
            .withf(|a| is_text(a, "bad"))
            .times(3)
            .returning(|_| injected());
        executor
            .expect_execute()
            .withf(|a| is_text(a, "good"))
            .times(3)
            .returning(|_| Ok(None));
        let mut program = Macro::new();
        let bad = program.add(text("bad")).unwrap();
        let good = program.add(text("good")).unwrap();
        program
            .append(Action::Loop {
                count: LoopCount::Times(3),
                body: vec![bad, good],
            })
            .unwrap();

        // Act
        let report = interpreter(executor).execute_to_end(&program).await;

        // Assert: loop node + three "good"
        assert_eq!(report.failures.len(), 3);
        assert!(report.failures.iter().all(|f| f.node == bad));
        assert_eq!(report.executed, 4);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_failure_in_branch_does_not_stop_the_outer_sequence() {
        // Arrange: If(window) { bad, good } ; after
        let mut executor = MockActionExecutor::new();
        let mut seq = Sequence::new();
        executor
            .expect_execute()
            .withf(|a| is_text(a, "bad"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| injected());
        for expected in ["good", "after"] {
            executor
                .expect_execute()
                .withf(move |a| is_text(a, expected))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(None));
        }
        let mut program = Macro::new();
        let bad = program.add(text("bad")).unwrap();
        let good = program.add(text("good")).unwrap();
        program
            .append(Action::Conditional {
                condition: Condition::WindowExists("Notepad".to_string()),
                then_branch: vec![bad, good],
                else_branch: vec![],
            })
            .unwrap();
        program.append(text("after")).unwrap();

        // Act
        let report = interpreter(executor).execute_to_end(&program).await;

        // Assert
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].node, bad);
        assert_eq!(report.executed, 3);
    }

    #[tokio::test]
    async fn test_conditional_inside_loop_sees_the_iteration_index() {
        // Arrange: Loop(3) { If(LoopIndex == "1") { hit } }
        let mut program = Macro::new();
        let hit = program.add(text("hit")).unwrap();
        let check = program
            .add(Action::Conditional {
                condition: Condition::VariableEquals {
                    name: LOOP_INDEX_VAR.to_string(),
                    value: "1".to_string(),
                },
                then_branch: vec![hit],
                else_branch: vec![],
            })
            .unwrap();
        program
            .append(Action::Loop {
                count: LoopCount::Times(3),
                body: vec![check],
            })
            .unwrap();

        // Act
        let report = interpreter(expect_only("hit")).execute_to_end(&program).await;

        // Assert: loop + three conditionals + one hit
        assert_eq!(report.executed, 5);
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_placeholders_expand_at_assignment_time() {
        let mut program = Macro::new();
        program
            .append(Action::Variable {
                name: "stamp".to_string(),
                value: "at {DateTime} #{Random} {Unknown}".to_string(),
            })
            .unwrap();
        let interp = interpreter(MockActionExecutor::new());

        interp.execute_to_end(&program).await;

        assert_eq!(
            interp.variable("stamp").as_deref(),
            Some("at 2024-01-02 03:04:05 #4242 {Unknown}")
        );
    }

    #[tokio::test]
    async fn test_random_is_drawn_once_per_assignment() {
        // Arrange
        let program = Macro::sequence([
            Action::Variable {
                name: "pair".to_string(),
                value: "{Random}-{Random}".to_string(),
            },
            Action::Variable {
                name: "next".to_string(),
                value: "{Random}".to_string(),
            },
        ]);
        let interp = interpreter(MockActionExecutor::new());

        // Act
        interp.execute_to_end(&program).await;

        // Assert: one draw shared within an assignment, a fresh one after
        assert_eq!(interp.variable("pair").as_deref(), Some("4242-4242"));
        assert_eq!(interp.variable("next").as_deref(), Some("4243"));
    }

    #[tokio::test]
    async fn test_variables_persist_across_executions() {
        let interp = interpreter(MockActionExecutor::new());
        let first = Macro::sequence([Action::Variable {
            name: "greeting".to_string(),
            value: "hi".to_string(),
        }]);
        let second = Macro::sequence([Action::Variable {
            name: "copy".to_string(),
            value: "{greeting} there".to_string(),
        }]);

        interp.execute_to_end(&first).await;
        interp.execute_to_end(&second).await;

        assert_eq!(interp.variable("copy").as_deref(), Some("hi there"));
    }

    #[tokio::test]
    async fn test_web_request_output_is_stored() {
        let mut executor = MockActionExecutor::new();
        executor
            .expect_execute()
            .returning(|_| Ok(Some("{\"ok\":true}".to_string())));
        let program = Macro::sequence([Action::WebRequest {
            url: "http://localhost/status".to_string(),
            method: "GET".to_string(),
            body: None,
            store_into: Some("status".to_string()),
        }]);
        let interp = interpreter(executor);

        interp.execute_to_end(&program).await;

        assert_eq!(interp.variable("status").as_deref(), Some("{\"ok\":true}"));
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_delay_and_skips_the_rest() {
        // Arrange
        let (handle, signal) = StopSignal::new();
        let program = Macro::sequence([Action::Delay { ms: 60_000 }, text("after")]);
        let interp = interpreter(MockActionExecutor::new());

        // Act
        let run = interp.execute(&program, signal);
        let stopper = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            handle.stop();
        };
        let (report, ()) = tokio::join!(run, stopper);

        // Assert: no executor call for "after"
        assert!(report.cancelled);
    }

    #[test]
    fn test_stop_signal_never_stays_clear() {
        let signal = StopSignal::never();
        assert!(!signal.is_stopped());
    }

    #[test]
    fn test_handle_signal_observes_stop() {
        let (handle, first) = StopSignal::new();
        let second = handle.signal();
        handle.stop();
        assert!(first.is_stopped());
        assert!(second.is_stopped());
    }
}
