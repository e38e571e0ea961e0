//! Domain entities for KeyLayer.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code has **no** imports from OS
//! APIs, USB libraries, async runtimes or UI frameworks, so it compiles and
//! tests anywhere without a keyboard plugged in.
//!
//! Here the domain is the vocabulary of a macro keyboard: which physical
//! device a key came from, which layer it is on, and what the key should do.

/// Physical devices, interface paths and key events.
pub mod device;

/// Notifications published by the capture subsystem.
pub mod events;

/// The action sum type and its parameter enums.
pub mod action;

/// Macros as validated arenas of action nodes.
pub mod program;

/// Per-device active-layer tracking.
pub mod layer;

/// Key mappings and layer keys for one device.
pub mod profile;

/// Named variables shared across macro runs.
pub mod variables;
