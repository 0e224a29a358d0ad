//! Runtime-agnostic command execution library
//!
//! This crate provides a typed command builder and a local launcher that runs
//! commands as child processes, streams their output as events and kills them
//! when their handle is dropped.

#![warn(missing_docs)]

pub mod backends;
pub mod command;
pub mod error;
pub mod event;
pub mod executor;
pub mod launcher;
pub mod process;

pub use command::Command;
pub use error::{Error, Result};
pub use event::{LogSource, ProcessEvent, ProcessEventType};
pub use executor::Executor;
pub use launcher::Launcher;
pub use process::{ExitResult, ExitStatus, ProcessHandle};
