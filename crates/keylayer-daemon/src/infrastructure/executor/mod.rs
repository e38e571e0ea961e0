//! Action executors: the OS-facing half of the macro interpreter.
//!
//! - **`system`** – Launches programs, performs file operations and sends
//!   web requests.  Kinds that need a desktop automation layer report
//!   [`ExecutionError::Unsupported`].
//! - **`mock`** – Records every action for tests.
//!
//! [`ExecutionError::Unsupported`]: crate::application::interpreter::ExecutionError::Unsupported

pub mod mock;
pub mod system;

pub use mock::RecordingExecutor;
pub use system::SystemExecutor;
