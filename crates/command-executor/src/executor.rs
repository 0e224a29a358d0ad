//! Main executor type that wraps a launcher

use crate::backends::LocalLauncher;
use crate::command::Command;
use crate::error::Result;
use crate::event::LogSource;
use crate::launcher::Launcher;
use crate::process::{ExitResult, ExitStatus, ProcessHandle};
use futures::StreamExt;
use tracing::debug;

/// An executor that runs commands via a specific launcher
pub struct Executor<L: Launcher> {
    /// Name used to identify this executor in logs
    name: String,
    launcher: L,
}

impl<L: Launcher> Executor<L> {
    /// Create a new executor with the given launcher
    pub fn new(name: impl Into<String>, launcher: L) -> Self {
        Self {
            name: name.into(),
            launcher,
        }
    }

    /// Launch a command and return event stream and process handle
    pub async fn launch(&self, command: Command) -> Result<(L::EventStream, L::Handle)> {
        debug!(executor = %self.name, "launching: {}", command);
        self.launcher.launch(command).await
    }

    /// Execute a command, capturing its output
    pub async fn execute(&self, command: Command) -> Result<ExitResult> {
        debug!(executor = %self.name, "executing: {}", command);
        self.launcher.execute(command).await
    }

    /// Execute a command, handing every output line to `sink` as it arrives
    pub async fn stream<F>(&self, command: Command, mut sink: F) -> Result<ExitStatus>
    where
        F: FnMut(LogSource, &str) + Send,
    {
        let (mut events, mut handle) = self.launch(command).await?;

        while let Some(event) = events.next().await {
            if let (Some(source), Some(line)) = (event.source(), event.data.as_deref()) {
                sink(source, line);
            }
        }

        handle.wait().await
    }
}

impl Executor<LocalLauncher> {
    /// Create an executor for local process execution
    pub fn local(name: impl Into<String>) -> Self {
        Self::new(name, LocalLauncher)
    }
}
