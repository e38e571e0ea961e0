//! The action model: what a key can be mapped to.
//!
//! Every action kind carries exactly the data it needs.  Composite kinds
//! ([`Action::Conditional`], [`Action::Loop`]) do not own their children;
//! they list [`NodeId`]s into the surrounding [`crate::domain::program::Macro`]
//! arena.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::keymap::HidKeyCode;

/// Index of an action node inside a [`crate::domain::program::Macro`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowOperation {
    Minimize,
    Maximize,
    Restore,
    Close,
    Focus,
    Move { x: i32, y: i32 },
    Resize { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemCommand {
    Shutdown,
    Restart,
    Sleep,
    Lock,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileOperation {
    Copy,
    Move,
    Delete,
    Create,
    Open,
    Execute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipboardOperation {
    Copy,
    Cut,
    Paste,
    /// Replace the clipboard contents with the given text.
    Set(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioOperation {
    VolumeUp,
    VolumeDown,
    Mute,
    PlayPause,
    NextTrack,
    PreviousTrack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayOperation {
    Off,
    On,
    BrightnessUp,
    BrightnessDown,
}

/// How many times a loop body runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopCount {
    /// A fixed count.  Zero is treated as one.
    Times(u32),
    /// Until the execution is stopped from outside.
    Infinite,
}

impl LoopCount {
    /// Iterations to run, `None` for unbounded.
    pub fn iterations(self) -> Option<u32> {
        match self {
            LoopCount::Times(n) => Some(n.max(1)),
            LoopCount::Infinite => None,
        }
    }
}

/// A predicate evaluated by [`Action::Conditional`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    /// A top-level window whose title contains the text exists.
    WindowExists(String),
    /// A process with this executable name is running.
    ProcessRunning(String),
    FileExists(String),
    /// The stored variable equals `value` exactly.
    VariableEquals { name: String, value: String },
    /// Local time of day is within `[start, end]`.  When `start > end` the
    /// range wraps past midnight.
    TimeRange { start: NaiveTime, end: NaiveTime },
}

impl Condition {
    /// Evaluates a [`Condition::TimeRange`] against `now`; other kinds return `None`.
    pub fn time_range_contains(&self, now: NaiveTime) -> Option<bool> {
        match self {
            Condition::TimeRange { start, end } if start <= end => {
                Some(*start <= now && now <= *end)
            }
            Condition::TimeRange { start, end } => Some(now >= *start || now <= *end),
            _ => None,
        }
    }
}

/// One step of a macro.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Action {
    /// Press and release a key.  A non-zero `hold_ms` keeps it down that long.
    KeyPress { key: HidKeyCode, hold_ms: u64 },
    KeyRelease { key: HidKeyCode },
    /// Press a key and keep it down for `duration_ms`.
    KeyHold { key: HidKeyCode, duration_ms: u64 },
    MouseClick { button: MouseButton },
    MouseMove { x: i32, y: i32 },
    MouseScroll { delta: i32 },
    Delay { ms: u64 },
    Text { text: String },
    /// Launch a program, document or URL.
    Application { target: String, arguments: Vec<String> },
    WindowControl {
        /// Title (substring) of the window to act on.
        title: String,
        operation: WindowOperation,
    },
    SystemCommand { command: SystemCommand },
    FileOperation {
        operation: FileOperation,
        source: String,
        destination: Option<String>,
    },
    WebRequest {
        url: String,
        method: String,
        body: Option<String>,
        /// Variable that receives the response body.
        store_into: Option<String>,
    },
    Conditional {
        condition: Condition,
        then_branch: Vec<NodeId>,
        else_branch: Vec<NodeId>,
    },
    Loop { count: LoopCount, body: Vec<NodeId> },
    /// Assign `value` to `name`.  `{DateTime}` and `{Random}` are expanded
    /// at assignment time.
    Variable { name: String, value: String },
    Clipboard { operation: ClipboardOperation },
    Screenshot { path: Option<String> },
    AudioControl { operation: AudioOperation },
    DisplayControl { operation: DisplayOperation },
}

impl Action {
    /// Short kind name used in logs and failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::KeyPress { .. } => "KeyPress",
            Action::KeyRelease { .. } => "KeyRelease",
            Action::KeyHold { .. } => "KeyHold",
            Action::MouseClick { .. } => "MouseClick",
            Action::MouseMove { .. } => "MouseMove",
            Action::MouseScroll { .. } => "MouseScroll",
            Action::Delay { .. } => "Delay",
            Action::Text { .. } => "Text",
            Action::Application { .. } => "Application",
            Action::WindowControl { .. } => "WindowControl",
            Action::SystemCommand { .. } => "SystemCommand",
            Action::FileOperation { .. } => "FileOperation",
            Action::WebRequest { .. } => "WebRequest",
            Action::Conditional { .. } => "Conditional",
            Action::Loop { .. } => "Loop",
            Action::Variable { .. } => "Variable",
            Action::Clipboard { .. } => "Clipboard",
            Action::Screenshot { .. } => "Screenshot",
            Action::AudioControl { .. } => "AudioControl",
            Action::DisplayControl { .. } => "DisplayControl",
        }
    }

    /// Child node ids referenced by a composite action, in execution order
    /// of declaration (then-branch before else-branch).
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        let (first, second): (&[NodeId], &[NodeId]) = match self {
            Action::Conditional {
                then_branch,
                else_branch,
                ..
            } => (then_branch, else_branch),
            Action::Loop { body, .. } => (body, &[]),
            _ => (&[], &[]),
        };
        first.iter().chain(second.iter()).copied()
    }

    /// `true` for kinds the interpreter handles itself instead of forwarding.
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Action::Delay { .. }
                | Action::Conditional { .. }
                | Action::Loop { .. }
                | Action::Variable { .. }
        )
    }

    pub fn application(target: impl Into<String>) -> Self {
        Action::Application {
            target: target.into(),
            arguments: Vec::new(),
        }
    }

    pub fn key_press(key: HidKeyCode) -> Self {
        Action::KeyPress { key, hold_ms: 0 }
    }
}
