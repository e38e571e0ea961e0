//! # keylayer-core
//!
//! Domain model for KeyLayer: raw HID report decoding, the layer state
//! machine, the macro action tree and per-device profiles.
//!
//! This crate is shared by the daemon and any front end.  It has zero
//! dependencies on OS APIs, USB libraries or async runtimes.
//!
//! # Architecture overview (for beginners)
//!
//! KeyLayer turns a cheap USB keyboard or macro pad into a programmable
//! device.  The daemon takes the keyboard away from the operating system
//! ("isolates" it), reads its raw reports, and runs a *macro* for each key:
//! launch a program, type text, press shortcuts, and so on.
//!
//! - **`keymap`** – The HID key table and the report decoder that turns raw
//!   bytes into a [`KeyIdentifier`].
//!
//! - **`domain`** – Devices, layers, actions, macros and profiles.  The most
//!   important pieces are [`LayerStateMachine`], which decides which layer a
//!   key press lands on, and [`Macro`], the tree of actions a key runs.

pub mod domain;
pub mod keymap;

// Re-export the most-used types at the crate root so callers can write
// `keylayer_core::Macro` instead of `keylayer_core::domain::program::Macro`.
pub use domain::action::{
    Action, AudioOperation, ClipboardOperation, Condition, DisplayOperation, FileOperation,
    LoopCount, MouseButton, NodeId, SystemCommand, WindowOperation,
};
pub use domain::device::{DeviceId, InterfacePath, KeyEvent, PhysicalDevice};
pub use domain::events::KeyLayerEvent;
pub use domain::layer::{LayerChange, LayerStateMachine, MomentaryTimer};
pub use domain::profile::{Activation, DeviceProfile, KeyMapping, LayerId, LayerKey, BASE_LAYER};
pub use domain::program::{ActionNode, Macro, MacroError};
pub use domain::variables::VariableStore;
pub use keymap::hid::HidKeyCode;
pub use keymap::{decode, KeyIdentifier};
