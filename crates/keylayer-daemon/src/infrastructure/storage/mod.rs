//! Storage infrastructure: configuration and profile persistence.
//!
//! - `config`   – the TOML daemon configuration in the platform config
//!   directory, with defaults for anything missing (first run).
//! - `profiles` – the JSON file holding every device profile.

pub mod config;
pub mod profiles;
