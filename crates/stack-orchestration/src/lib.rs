//! # Stack Orchestration
//!
//! Runs named operations from a [`Topology`](stack_config::Topology) against an
//! external compose engine.
//!
//! The [`Dispatcher`] maps an operation name to an ordered list of typed steps
//! and executes them one at a time, stopping at the first failure. The
//! [`HealthGate`] polls a service at a fixed interval until it reports healthy
//! or a deadline passes. Both talk to the engine through the [`Engine`] trait;
//! [`ComposeEngine`] is the `docker compose` implementation.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stack_config::{ResolutionContext, Topology};
//! use stack_orchestration::{ComposeEngine, Dispatcher};
//! use std::sync::Arc;
//!
//! # fn example() -> stack_orchestration::Result<()> {
//! let topology = Arc::new(Topology::load("stack.yaml")?);
//! let engine = ComposeEngine::new(&topology)?;
//! let dispatcher = Dispatcher::new(topology, engine);
//!
//! smol::block_on(dispatcher.run("migrate", &[], &ResolutionContext::new()))?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod dispatcher;
mod engine;
mod health;

pub use dispatcher::{BUILTIN_OPERATIONS, Dispatcher, Plan};
pub use engine::{ComposeEngine, Engine, PsEntry, parse_ps_output};
pub use health::{HealthGate, HealthProbe, HealthReport, HealthStatus};

use std::time::Duration;

/// Error types for orchestration operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration or placeholder resolution errors
    #[error("Configuration error: {0}")]
    Config(#[from] stack_config::ConfigError),

    /// Neither a configured nor a built-in operation
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Service not declared in the topology
    #[error("Service not found: {0}")]
    UnknownService(String),

    /// A step exited non-zero; later steps were not run
    #[error(
        "Operation '{operation}' failed at step {} with exit code {exit_code}",
        .step_index + 1
    )]
    StepFailure {
        /// Operation name
        operation: String,
        /// Zero-based index of the failing step
        step_index: usize,
        /// Exit code of the step's process
        exit_code: i32,
    },

    /// A step ran past its timeout and was killed
    #[error("Operation '{operation}' step {} timed out after {timeout:?}", .step_index + 1)]
    StepTimeout {
        /// Operation name
        operation: String,
        /// Zero-based index of the step
        step_index: usize,
        /// Configured timeout
        timeout: Duration,
    },

    /// The health gate deadline passed
    #[error(
        "Service '{service}' not healthy after {timeout:?} ({polls} polls, last status: {last_status})"
    )]
    HealthTimeout {
        /// Service that was polled
        service: String,
        /// Gate timeout
        timeout: Duration,
        /// Number of probes made
        polls: u32,
        /// Status seen on the final probe
        last_status: HealthStatus,
    },

    /// An engine query exited non-zero
    #[error("Engine command failed with exit code {exit_code}: {command}")]
    EngineFailure {
        /// Command line that was run
        command: String,
        /// Its exit code
        exit_code: i32,
    },

    /// The step has no engine command
    #[error("Step cannot be run by the engine: {0}")]
    UnsupportedStep(String),

    /// Command executor errors
    #[error("Command execution error: {0}")]
    CommandExecutor(#[from] command_executor::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Exit code to report for this error from a CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::StepFailure { exit_code, .. } => *exit_code,
            _ => 1,
        }
    }
}

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, Error>;

/// Map a missing-service lookup onto [`Error::UnknownService`]
pub(crate) fn service_error(err: stack_config::ConfigError) -> Error {
    match err {
        stack_config::ConfigError::ServiceNotFound(name) => Error::UnknownService(name),
        other => Error::Config(other),
    }
}
