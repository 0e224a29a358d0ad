//! Compose engine adapter.
//!
//! Typed steps become `docker compose` invocations here; nothing is passed
//! through a shell.

use crate::{Error, HealthStatus, Result};
use async_trait::async_trait;
use command_executor::{Command, Executor, ExitStatus, LogSource, backends::LocalLauncher};
use serde::Deserialize;
use smol::Timer;
use stack_config::{HealthCheck, Step, StepAction, Topology};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// The external container engine, as seen by the dispatcher and health gate
#[async_trait]
pub trait Engine: Send + Sync {
    /// Run one resolved step to completion
    async fn execute(&self, step: &Step) -> Result<ExitStatus>;

    /// Report the current health of a service
    async fn probe(&self, service: &str, check: Option<&HealthCheck>) -> Result<HealthStatus>;
}

/// `docker compose` (or a compatible program) driven as a child process
pub struct ComposeEngine {
    executor: Executor<LocalLauncher>,
    program: String,
    base_args: Vec<String>,
    working_dir: PathBuf,
}

impl ComposeEngine {
    /// Build an engine from the topology settings
    pub fn new(topology: &Topology) -> Result<Self> {
        let settings = topology.settings();
        let (program, engine_args) = settings.engine.split_first().ok_or_else(|| {
            stack_config::ConfigError::ValidationError(
                "settings.engine must name a program".to_string(),
            )
        })?;

        let mut base_args = engine_args.to_vec();
        if let Some(project) = &settings.project_name {
            base_args.push("-p".to_string());
            base_args.push(project.clone());
        }
        for file in &settings.compose_files {
            base_args.push("-f".to_string());
            base_args.push(file.clone());
        }

        Ok(Self {
            executor: Executor::local("compose"),
            program: program.clone(),
            base_args,
            working_dir: topology.base_dir().to_path_buf(),
        })
    }

    /// A compose invocation with the project arguments applied
    fn compose(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args).current_dir(&self.working_dir);
        cmd
    }

    /// The command a step translates to, or `None` for steps the engine does not run
    pub fn command_for(&self, step: &Step) -> Option<Command> {
        let service = step.service.as_deref();

        let mut cmd = match &step.action {
            StepAction::Up { build } => {
                let mut cmd = self.compose();
                cmd.args(["up", "-d"]);
                if service.is_some() {
                    cmd.arg("--no-deps");
                }
                if *build {
                    cmd.arg("--build");
                }
                cmd.args(service);
                cmd
            }
            StepAction::Down { volumes } => {
                let mut cmd = self.compose();
                cmd.arg("down");
                if *volumes {
                    cmd.arg("-v");
                }
                cmd
            }
            StepAction::Stop => self.simple("stop", service),
            StepAction::Restart => self.simple("restart", service),
            StepAction::Pull => self.simple("pull", service),
            StepAction::Build { no_cache } => {
                let mut cmd = self.compose();
                cmd.arg("build");
                if *no_cache {
                    cmd.arg("--no-cache");
                }
                cmd.args(service);
                cmd
            }
            StepAction::Exec {
                args,
                user,
                workdir,
                env,
            } => {
                let mut cmd = self.compose();
                cmd.args(["exec", "-T"]);
                if let Some(user) = user {
                    cmd.args(["-u", user.as_str()]);
                }
                if let Some(workdir) = workdir {
                    cmd.args(["-w", workdir.as_str()]);
                }
                // Values travel in the client environment; compose forwards them by name
                for (key, value) in env {
                    cmd.arg("-e").arg(key).env(key, value);
                }
                cmd.args(service).args(args);
                cmd
            }
            StepAction::Run { args } => {
                let mut cmd = self.compose();
                cmd.args(["run", "--rm", "-T"]).args(service).args(args);
                cmd
            }
            StepAction::Logs { follow, tail } => {
                let mut cmd = self.compose();
                cmd.arg("logs");
                if *follow {
                    cmd.arg("-f");
                }
                if let Some(tail) = tail {
                    cmd.arg("--tail").arg(tail.to_string());
                }
                cmd.args(service);
                cmd
            }
            StepAction::Host { args } => {
                let (program, rest) = args.split_first()?;
                let mut cmd = Command::new(program);
                cmd.args(rest).current_dir(&self.working_dir);
                cmd
            }
            StepAction::WaitHealthy => return None,
        };

        if let Some(path) = &step.stdin {
            cmd.stdin_file(path);
        }
        if let Some(path) = &step.stdout {
            cmd.stdout_file(path);
        }
        Some(cmd)
    }

    fn simple(&self, verb: &str, service: Option<&str>) -> Command {
        let mut cmd = self.compose();
        cmd.arg(verb).args(service);
        cmd
    }

    /// Query the container state of one service
    async fn ps(&self, service: &str) -> Result<Option<PsEntry>> {
        let mut cmd = self.compose();
        cmd.args(["ps", "--all", "--format", "json", service]);
        let line = cmd.to_string();

        let result = self.executor.execute(cmd).await?;
        if !result.success() {
            return Err(Error::EngineFailure {
                command: line,
                exit_code: result.status.exit_code(),
            });
        }

        Ok(parse_ps_output(&result.output)
            .into_iter()
            .find(|entry| entry.service == service))
    }

    /// Run a declared health check inside the service container
    async fn run_check(&self, service: &str, check: &HealthCheck) -> Result<HealthStatus> {
        let mut cmd = self.compose();
        cmd.args(["exec", "-T", service]).args(check.probe_command());

        let timeout = Duration::from_secs(check.timeout);
        let outcome = smol::future::or(async { Some(self.executor.execute(cmd).await) }, async {
            Timer::after(timeout).await;
            None
        })
        .await;

        match outcome {
            Some(result) => Ok(if result?.success() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            }),
            None => {
                debug!("Health check for {} timed out after {:?}", service, timeout);
                Ok(HealthStatus::Unhealthy)
            }
        }
    }
}

#[async_trait]
impl Engine for ComposeEngine {
    async fn execute(&self, step: &Step) -> Result<ExitStatus> {
        let cmd = self
            .command_for(step)
            .ok_or_else(|| Error::UnsupportedStep(step.to_string()))?;
        info!("$ {}", cmd);

        let status = self
            .executor
            .stream(cmd, |source, line| match source {
                LogSource::Stdout => println!("{}", line),
                LogSource::Stderr => eprintln!("{}", line),
            })
            .await?;
        Ok(status)
    }

    async fn probe(&self, service: &str, check: Option<&HealthCheck>) -> Result<HealthStatus> {
        let Some(entry) = self.ps(service).await? else {
            return Ok(HealthStatus::Stopped);
        };

        let status = HealthStatus::from_ps(&entry.state, &entry.health);
        match check {
            Some(check) if entry.state == "running" => self.run_check(service, check).await,
            _ => Ok(status),
        }
    }
}

/// One row of `compose ps --format json`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PsEntry {
    /// Compose service name
    #[serde(rename = "Service")]
    pub service: String,
    /// Container state, e.g. `running` or `exited`
    #[serde(rename = "State")]
    pub state: String,
    /// Engine health status; empty without an engine-level check
    #[serde(rename = "Health", default)]
    pub health: String,
}

/// Parse `compose ps --format json` output.
///
/// Older compose releases print one JSON array, newer ones one object per line.
/// Lines that are not JSON (engine warnings on stderr) are skipped.
pub fn parse_ps_output(output: &str) -> Vec<PsEntry> {
    let mut entries = Vec::new();
    for line in output.lines().map(str::trim) {
        if line.starts_with('[') {
            if let Ok(rows) = serde_json::from_str::<Vec<PsEntry>>(line) {
                entries.extend(rows);
            }
        } else if line.starts_with('{') {
            if let Ok(row) = serde_json::from_str::<PsEntry>(line) {
                entries.push(row);
            }
        }
    }
    entries
}
