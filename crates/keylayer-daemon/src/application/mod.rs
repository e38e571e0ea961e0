//! Application layer use cases for the KeyLayer daemon.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `keylayer-core`) and the infrastructure (HID, processes,
//! files).  Use cases here orchestrate domain objects and talk to the outside
//! world only through traits (`HidBackend`, `ActionExecutor`, `Environment`,
//! `ProfileStore`), so tests can substitute fakes.
//!
//! # Sub-modules
//!
//! Device side:
//!
//! - **`enumerate_devices`** – Groups HID interfaces into physical keyboards.
//! - **`manage_devices`**    – Registry of attached devices and scan diffing.
//! - **`hotplug`**           – Periodic rescans, release on unplug, auto-isolation.
//! - **`capture_session`**   – Exclusive reading of every sibling interface of
//!   one device, with inactivity-driven restarts.
//! - **`watchdog`**          – The pure restart decision and its guard.
//! - **`isolation`**         – One capture session per isolated device.
//!
//! Macro side:
//!
//! - **`interpreter`**  – Runs macro trees with catch-and-continue semantics.
//! - **`recording`**    – Captures observed actions into a new macro.
//! - **`profiles`**     – The profile store port.
//! - **`process_keys`** – Turns key events into layer changes and macro runs.
//! - **`dispatch`**     – One ordered worker per device.

pub mod capture_session;
pub mod dispatch;
pub mod enumerate_devices;
pub mod hotplug;
pub mod interpreter;
pub mod isolation;
pub mod manage_devices;
pub mod process_keys;
pub mod profiles;
pub mod recording;
pub mod watchdog;
