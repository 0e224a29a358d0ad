pub mod graph;
pub mod lifecycle;
pub mod logs;
pub mod ops;
pub mod run;
pub mod status;
pub mod validate;
pub mod wait;

use anyhow::{Context, Result};
use stack_config::{ResolutionContext, Topology};
use stack_orchestration::{ComposeEngine, Dispatcher};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// A loaded topology with its dispatcher and resolution context
pub struct Session {
    pub dispatcher: Dispatcher<ComposeEngine>,
    pub context: ResolutionContext,
}

impl Session {
    pub fn open(config: &Path, sets: &[(String, String)]) -> Result<Self> {
        let topology = load_topology(config)?;
        let context = resolution_context(&topology, sets)?;
        let engine = ComposeEngine::new(&topology)?;

        Ok(Self {
            dispatcher: Dispatcher::new(Arc::new(topology), engine),
            context,
        })
    }

    pub fn topology(&self) -> &Topology {
        self.dispatcher.topology()
    }
}

pub fn load_topology(config: &Path) -> Result<Topology> {
    debug!("Loading {}", config.display());
    Topology::load(config)
        .with_context(|| format!("Failed to load configuration from {}", config.display()))
}

/// Variables from the env file, then the process environment, then `--set`
pub fn resolution_context(
    topology: &Topology,
    sets: &[(String, String)],
) -> Result<ResolutionContext> {
    let mut context = ResolutionContext::new();

    if let Some(path) = topology.env_file() {
        if path.exists() {
            context
                .load_env_file(&path)
                .with_context(|| format!("Failed to read env file {}", path.display()))?;
        } else {
            warn!("Env file {} not found, skipping", path.display());
        }
    }

    context.extend_vars(std::env::vars());
    context.extend_vars(sets.iter().cloned());
    Ok(context)
}
