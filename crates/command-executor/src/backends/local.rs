//! Local process execution backend

use async_process::{Child, Stdio};
use async_trait::async_trait;
use futures::stream::Stream;
use futures_lite::io::{AsyncBufReadExt, BufReader, Split};
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::event::{LogSource, ProcessEvent, ProcessEventType};
use crate::launcher::Launcher;
use crate::process::{ExitStatus, ProcessHandle};

/// Launcher for executing processes locally
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLauncher;

/// A handle to control a local process
///
/// The process is killed when the handle is dropped before it exits.
pub struct LocalProcessHandle {
    child: Child,
    kill_on_drop: bool,
    stdout_spool: Option<StdoutSpool>,
}

/// Stdout redirected to a temporary file next to its target.
///
/// The target is only replaced once the process has exited successfully;
/// otherwise the temporary file is removed and the target left untouched.
struct StdoutSpool {
    file: NamedTempFile,
    target: PathBuf,
}

impl StdoutSpool {
    fn create(target: &Path) -> Result<Self> {
        let dir = match target.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let file = NamedTempFile::new_in(dir).map_err(|source| Error::RedirectFailed {
            path: target.to_owned(),
            stream: "stdout",
            source,
        })?;
        Ok(Self {
            file,
            target: target.to_owned(),
        })
    }

    fn stdio(&self) -> Result<Stdio> {
        let file = self
            .file
            .as_file()
            .try_clone()
            .map_err(|source| Error::RedirectFailed {
                path: self.target.clone(),
                stream: "stdout",
                source,
            })?;
        Ok(Stdio::from(file))
    }

    fn persist(self) -> Result<()> {
        let target = self.target;
        self.file
            .persist(&target)
            .map_err(|e| Error::RedirectFailed {
                path: target.clone(),
                stream: "stdout",
                source: e.error,
            })?;
        Ok(())
    }
}

/// Output lines of one pipe, split on `\n` and decoded lossily
type LineReader<R> = Split<BufReader<R>>;

/// Stream of process events
pub struct ProcessEventStream {
    stdout: Option<LineReader<async_process::ChildStdout>>,
    stderr: Option<LineReader<async_process::ChildStderr>>,
    started_sent: bool,
    child_id: u32,
}

#[async_trait]
impl Launcher for LocalLauncher {
    type EventStream = ProcessEventStream;
    type Handle = LocalProcessHandle;

    async fn launch(&self, command: Command) -> Result<(Self::EventStream, Self::Handle)> {
        let mut async_cmd = command.prepare();

        match command.get_stdin_file() {
            Some(path) => {
                let file = File::open(path).map_err(|source| Error::RedirectFailed {
                    path: path.to_owned(),
                    stream: "stdin",
                    source,
                })?;
                async_cmd.stdin(Stdio::from(file));
            }
            None => {
                async_cmd.stdin(Stdio::null());
            }
        }

        let stdout_spool = match command.get_stdout_file() {
            Some(path) => {
                let spool = StdoutSpool::create(path)?;
                async_cmd.stdout(spool.stdio()?);
                Some(spool)
            }
            None => {
                async_cmd.stdout(Stdio::piped());
                None
            }
        };
        async_cmd.stderr(Stdio::piped());

        let mut child = async_cmd.spawn().map_err(|e| {
            Error::spawn_failed(format!(
                "Failed to spawn {}: {}",
                command.get_program().to_string_lossy(),
                e
            ))
        })?;

        let child_id = child.id();
        let stdout = child.stdout.take().map(|s| BufReader::new(s).split(b'\n'));
        let stderr = child.stderr.take().map(|s| BufReader::new(s).split(b'\n'));

        let events = ProcessEventStream {
            stdout,
            stderr,
            started_sent: false,
            child_id,
        };

        let handle = LocalProcessHandle {
            child,
            kill_on_drop: true,
            stdout_spool,
        };

        Ok((events, handle))
    }
}

#[async_trait]
impl ProcessHandle for LocalProcessHandle {
    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    async fn wait(&mut self) -> Result<ExitStatus> {
        let status = self
            .child
            .status()
            .await
            .map_err(|e| Error::spawn_failed(format!("Failed to wait for process: {}", e)))?;

        // Exited processes must not be signalled on drop; the pid may be reused.
        self.kill_on_drop = false;

        let status = ExitStatus {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
        };

        if let Some(spool) = self.stdout_spool.take() {
            if status.success() {
                spool.persist()?;
            }
        }

        Ok(status)
    }

    async fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .map_err(|e| Error::signal_failed(9, e.to_string()))
    }
}

impl Drop for LocalProcessHandle {
    fn drop(&mut self) {
        if self.kill_on_drop {
            let _ = self.child.kill();
        }
    }
}

impl ProcessEventStream {
    fn poll_lines<R>(
        lines: &mut Option<LineReader<R>>,
        source: LogSource,
        cx: &mut Context<'_>,
    ) -> Option<ProcessEvent>
    where
        R: futures_lite::io::AsyncRead + Unpin,
    {
        loop {
            let reader = lines.as_mut()?;
            match Pin::new(reader).poll_next(cx) {
                Poll::Ready(Some(Ok(mut bytes))) => {
                    if bytes.last() == Some(&b'\r') {
                        bytes.pop();
                    }
                    let line = String::from_utf8_lossy(&bytes).into_owned();
                    return Some(ProcessEvent::line(source, line));
                }
                Poll::Ready(Some(Err(e))) if e.kind() == ErrorKind::Interrupted => continue,
                Poll::Ready(Some(Err(e))) => {
                    warn!("Stopped reading {:?} of the child process: {}", source, e);
                    *lines = None;
                    return None;
                }
                Poll::Ready(None) => {
                    *lines = None;
                    return None;
                }
                Poll::Pending => return None,
            }
        }
    }
}

impl Stream for ProcessEventStream {
    type Item = ProcessEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if !this.started_sent {
            this.started_sent = true;
            let event = ProcessEvent::new(ProcessEventType::Started { pid: this.child_id });
            return Poll::Ready(Some(event));
        }

        if let Some(event) = Self::poll_lines(&mut this.stdout, LogSource::Stdout, cx) {
            return Poll::Ready(Some(event));
        }

        if let Some(event) = Self::poll_lines(&mut this.stderr, LogSource::Stderr, cx) {
            return Poll::Ready(Some(event));
        }

        if this.stdout.is_none() && this.stderr.is_none() {
            return Poll::Ready(None);
        }

        Poll::Pending
    }
}
