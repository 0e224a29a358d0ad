//! Launcher implementations for different execution contexts
//!
//! Only local execution is built in. Other contexts implement the
//! [`Launcher`](crate::launcher::Launcher) trait.

pub mod local;
pub use local::{LocalLauncher, LocalProcessHandle, ProcessEventStream};
