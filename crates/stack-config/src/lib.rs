//! # Stack Configuration
//!
//! YAML topology loader for stackctl.
//!
//! This crate parses `stack.yaml` files describing services, their dependencies
//! and health checks, and the named operations that can be run against them.
//! A parsed file is validated and turned into an immutable [`Topology`].

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub mod parser;
pub mod resolver;
pub mod topology;

pub use resolver::ResolutionContext;
pub use topology::Topology;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Failed to read an env file
    #[error("Failed to read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Dependency graph contains a cycle
    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// Variable not found
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    /// Positional operation argument not supplied
    #[error("Argument ${{{index}}} not provided ({provided} argument(s) given)")]
    ArgumentNotFound {
        /// 1-based position that was referenced
        index: usize,
        /// Number of arguments available
        provided: usize,
    },

    /// Service reference not found
    #[error("Service '{0}' not found")]
    ServiceNotFound(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Optional stack name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Global settings
    #[serde(default)]
    pub settings: Settings,

    /// Service definitions
    pub services: BTreeMap<String, Service>,

    /// Named operations
    #[serde(default)]
    pub operations: BTreeMap<String, Operation>,
}

/// Global settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Compose project name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    /// Compose files, relative to the config file
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compose_files: Vec<String>,

    /// Engine program and leading arguments
    #[serde(default = "default_engine")]
    pub engine: Vec<String>,

    /// Dotenv file feeding `${VAR}` resolution, relative to the config file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,

    /// Default poll interval in seconds for services without a health check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_interval: Option<u64>,

    /// Default health gate timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_timeout: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_name: None,
            compose_files: Vec::new(),
            engine: default_engine(),
            env_file: None,
            health_check_interval: None,
            startup_timeout: None,
        }
    }
}

/// Service definition
///
/// `image`, `ports` and `env` describe the service as the compose files set
/// it up; `image` and `ports` are shown by `status`; none of them is passed to
/// the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    /// Container image reference
    pub image: String,

    /// Published ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortMapping>,

    /// Environment of the container, for reference only. Values are not
    /// resolved; per-command variables belong on `exec` steps.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Services that must be up before this one
    #[serde(default, alias = "dependencies", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Optional health check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,

    /// Health gate timeout in seconds, overriding the global default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_timeout: Option<u64>,
}

/// Port mapping for a service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PortMapping {
    /// Simple port number (container port only)
    Simple(u16),
    /// Full mapping "host:container"
    Full(String),
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortMapping::Simple(port) => write!(f, "{}", port),
            PortMapping::Full(mapping) => f.write_str(mapping),
        }
    }
}

/// Health check configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheck {
    /// Health check method
    #[serde(flatten)]
    pub check_type: HealthCheckType,

    /// Check interval in seconds
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Consecutive failures before the engine marks the service unhealthy.
    /// Informational: the health gate is bounded by time, not retries.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Timeout per check in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Engine-side grace period in seconds, informational like `retries`.
    /// Gate timeouts should leave room for it.
    #[serde(default)]
    pub start_period: u64,
}

impl HealthCheck {
    /// The argument vector to run inside the service container
    pub fn probe_command(&self) -> Vec<String> {
        match &self.check_type {
            HealthCheckType::Command { command, args } => {
                let mut argv = vec![command.clone()];
                argv.extend(args.iter().cloned());
                argv
            }
            HealthCheckType::Http { http } => {
                vec!["curl".to_string(), "-fsS".to_string(), http.clone()]
            }
            HealthCheckType::Tcp { tcp } => vec![
                "nc".to_string(),
                "-z".to_string(),
                "localhost".to_string(),
                tcp.port.to_string(),
            ],
        }
    }
}

/// Health check type variants
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum HealthCheckType {
    /// Command-based health check
    Command {
        /// Command to run
        command: String,
        /// Command arguments
        #[serde(default)]
        args: Vec<String>,
    },

    /// HTTP health check
    Http {
        /// HTTP endpoint URL, as seen from inside the container
        http: String,
    },

    /// TCP port check
    Tcp {
        /// TCP port to check
        tcp: TcpCheck,
    },
}

/// TCP health check configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TcpCheck {
    /// Port number
    pub port: u16,
}

/// A named, ordered sequence of steps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    /// Human readable summary shown by `stackctl ops`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Steps, executed in order
    pub steps: Vec<Step>,
}

/// One typed action of an operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Target service; `None` addresses the whole stack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// What to do
    #[serde(flatten)]
    pub action: StepAction,

    /// File fed to the step's stdin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,

    /// File receiving the step's stdout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,

    /// Seconds after which the step is cancelled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Step {
    /// A step with no redirections or timeout
    pub fn new(service: Option<String>, action: StepAction) -> Self {
        Self {
            service,
            action,
            stdin: None,
            stdout: None,
            timeout: None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action.name())?;
        if let Some(service) = &self.service {
            write!(f, " {}", service)?;
        }
        match &self.action {
            StepAction::Exec { args, .. }
            | StepAction::Run { args }
            | StepAction::Host { args } => write!(f, ": {}", args.join(" ")),
            _ => Ok(()),
        }
    }
}

/// Step actions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    /// Create and start containers in the background
    Up {
        /// Build images before starting
        #[serde(default)]
        build: bool,
    },
    /// Stop and remove the whole stack
    Down {
        /// Also remove named volumes
        #[serde(default)]
        volumes: bool,
    },
    /// Stop containers
    Stop,
    /// Restart containers
    Restart,
    /// Build images
    Build {
        /// Do not use the build cache
        #[serde(default)]
        no_cache: bool,
    },
    /// Pull images
    Pull,
    /// Run a command inside a running service container
    Exec {
        /// Argument vector
        args: Vec<String>,
        /// User to run as
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        /// Working directory inside the container
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workdir: Option<String>,
        /// Extra environment variables
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
    /// Run a command in a fresh, removed-on-exit service container
    Run {
        /// Argument vector
        args: Vec<String>,
    },
    /// Show service logs
    Logs {
        /// Follow log output
        #[serde(default)]
        follow: bool,
        /// Number of lines from the end
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tail: Option<u32>,
    },
    /// Block until the service reports healthy; the step timeout bounds the wait
    WaitHealthy,
    /// Run a command on the host, outside any container
    Host {
        /// Argument vector
        args: Vec<String>,
    },
}

impl StepAction {
    /// The action keyword as written in configuration
    pub fn name(&self) -> &'static str {
        match self {
            StepAction::Up { .. } => "up",
            StepAction::Down { .. } => "down",
            StepAction::Stop => "stop",
            StepAction::Restart => "restart",
            StepAction::Build { .. } => "build",
            StepAction::Pull => "pull",
            StepAction::Exec { .. } => "exec",
            StepAction::Run { .. } => "run",
            StepAction::Logs { .. } => "logs",
            StepAction::WaitHealthy => "wait_healthy",
            StepAction::Host { .. } => "host",
        }
    }

    /// Whether the action needs a target service
    pub fn requires_service(&self) -> bool {
        matches!(
            self,
            StepAction::Exec { .. } | StepAction::Run { .. } | StepAction::WaitHealthy
        )
    }

    /// Whether the action must not name a service
    pub fn forbids_service(&self) -> bool {
        matches!(self, StepAction::Down { .. } | StepAction::Host { .. })
    }
}

fn default_engine() -> Vec<String> {
    vec!["docker".to_string(), "compose".to_string()]
}

// Default values for health checks
fn default_interval() -> u64 {
    30
}
fn default_retries() -> u32 {
    3
}
fn default_timeout() -> u64 {
    10
}
