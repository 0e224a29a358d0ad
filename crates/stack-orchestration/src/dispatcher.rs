//! Operation dispatch.
//!
//! An operation name resolves to a [`Plan`]: configured operations first,
//! then the built-ins `up` and `down`. Every step of a plan is resolved
//! before the first one runs, then steps execute strictly in order and the
//! first failure aborts the rest.

use crate::{
    Error, HealthGate, HealthProbe, HealthReport, HealthStatus, Result, engine::Engine,
    service_error,
};
use async_trait::async_trait;
use smol::Timer;
use stack_config::{ResolutionContext, Step, StepAction, Topology, resolver};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Operations available without configuration
pub const BUILTIN_OPERATIONS: [&str; 2] = ["up", "down"];

const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// The ordered steps of one operation
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Operation name
    pub operation: String,
    /// Steps in execution order
    pub steps: Vec<Step>,
}

/// Runs operations against an engine
pub struct Dispatcher<E> {
    topology: Arc<Topology>,
    engine: E,
}

impl<E: Engine> Dispatcher<E> {
    /// Create a dispatcher
    pub fn new(topology: Arc<Topology>, engine: E) -> Self {
        Self { topology, engine }
    }

    /// The topology operations are looked up in
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// The engine steps are executed by
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Look up the unresolved plan for an operation.
    ///
    /// For the built-ins, `args` name the services to act on.
    pub fn plan(&self, name: &str, args: &[String]) -> Result<Plan> {
        if let Some(operation) = self.topology.operation(name) {
            return Ok(Plan {
                operation: name.to_string(),
                steps: operation.steps.clone(),
            });
        }

        match name {
            "up" => self.plan_up(args),
            "down" => self.plan_down(args, false),
            _ => Err(Error::UnknownOperation(name.to_string())),
        }
    }

    /// Start services in dependency order.
    ///
    /// Before a service is started, every dependency with a health check is
    /// gated on. No services means the whole stack.
    pub fn plan_up(&self, services: &[String]) -> Result<Plan> {
        let order = self.topology.start_order(services).map_err(service_error)?;
        let mut gated = BTreeSet::new();
        let mut steps = Vec::new();

        for name in &order {
            let service = self.topology.service(name).map_err(service_error)?;
            for dep in &service.depends_on {
                let has_check = self
                    .topology
                    .service(dep)
                    .map_err(service_error)?
                    .health_check
                    .is_some();
                if has_check && gated.insert(dep.as_str()) {
                    steps.push(Step::new(Some(dep.clone()), StepAction::WaitHealthy));
                }
            }
            steps.push(Step::new(
                Some(name.clone()),
                StepAction::Up { build: false },
            ));
        }

        Ok(Plan {
            operation: "up".to_string(),
            steps,
        })
    }

    /// Tear down the stack, or stop services and everything depending on them
    pub fn plan_down(&self, services: &[String], volumes: bool) -> Result<Plan> {
        let steps = if services.is_empty() {
            vec![Step::new(None, StepAction::Down { volumes })]
        } else {
            self.topology
                .stop_order(services)
                .map_err(service_error)?
                .into_iter()
                .map(|name| Step::new(Some(name), StepAction::Stop))
                .collect()
        };

        Ok(Plan {
            operation: "down".to_string(),
            steps,
        })
    }

    /// Resolve every placeholder in a plan and check the services it targets
    pub fn resolve(&self, plan: &Plan, context: &ResolutionContext) -> Result<Plan> {
        let steps = plan
            .steps
            .iter()
            .map(|step| -> Result<Step> {
                let step = resolver::resolve_step(step, context)?;
                if let Some(service) = &step.service {
                    self.topology.service(service).map_err(service_error)?;
                }
                Ok(step)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Plan {
            operation: plan.operation.clone(),
            steps,
        })
    }

    /// The resolved plan an operation would run, without running it
    pub fn dry_run(
        &self,
        name: &str,
        args: &[String],
        context: &ResolutionContext,
    ) -> Result<Plan> {
        let plan = self.plan(name, args)?;
        self.resolve(&plan, &context.clone().with_args(args.to_vec()))
    }

    /// Run an operation by name with its positional arguments
    pub async fn run(&self, name: &str, args: &[String], context: &ResolutionContext) -> Result<()> {
        let plan = self.plan(name, args)?;
        self.run_plan(&plan, &context.clone().with_args(args.to_vec()))
            .await
    }

    /// Resolve and run a plan
    pub async fn run_plan(&self, plan: &Plan, context: &ResolutionContext) -> Result<()> {
        let plan = self.resolve(plan, context)?;
        let total = plan.steps.len();
        info!("Running operation '{}' ({} steps)", plan.operation, total);

        for (index, step) in plan.steps.iter().enumerate() {
            info!("[{}/{}] {}", index + 1, total, step);
            self.run_step(&plan.operation, index, step).await?;
        }

        info!("Operation '{}' completed", plan.operation);
        Ok(())
    }

    async fn run_step(&self, operation: &str, index: usize, step: &Step) -> Result<()> {
        if step.action == StepAction::WaitHealthy {
            let service = step
                .service
                .as_deref()
                .ok_or_else(|| Error::UnsupportedStep(step.to_string()))?;
            self.wait_healthy(service, step.timeout.map(Duration::from_secs))
                .await?;
            return Ok(());
        }

        let status = match step.timeout {
            Some(secs) => {
                let timeout = Duration::from_secs(secs);
                // Losing the race drops the step future, which kills its process
                smol::future::or(async { Some(self.engine.execute(step).await) }, async {
                    Timer::after(timeout).await;
                    None
                })
                .await
                .ok_or_else(|| Error::StepTimeout {
                    operation: operation.to_string(),
                    step_index: index,
                    timeout,
                })??
            }
            None => self.engine.execute(step).await?,
        };

        if !status.success() {
            warn!("Step {} ({}) exited with {:?}", index + 1, step, status);
            return Err(Error::StepFailure {
                operation: operation.to_string(),
                step_index: index,
                exit_code: status.exit_code(),
            });
        }

        debug!("Step {} succeeded", index + 1);
        Ok(())
    }

    /// Gate on a service becoming healthy.
    ///
    /// Without an explicit timeout the service's `startup_timeout` applies,
    /// then the global one, then 60 seconds. The poll interval is the health
    /// check's own, else the global default, else 2 seconds.
    pub async fn wait_healthy(
        &self,
        service: &str,
        timeout: Option<Duration>,
    ) -> Result<HealthReport> {
        let config = self.topology.service(service).map_err(service_error)?;
        let settings = self.topology.settings();

        let timeout = timeout
            .or(config.startup_timeout.map(Duration::from_secs))
            .or(settings.startup_timeout.map(Duration::from_secs))
            .unwrap_or(DEFAULT_STARTUP_TIMEOUT);
        let interval = config
            .health_check
            .as_ref()
            .map(|check| check.interval)
            .or(settings.health_check_interval)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HEALTH_CHECK_INTERVAL);

        let gate = HealthGate::new(EngineProbe {
            engine: &self.engine,
            topology: &self.topology,
        });
        let report = gate.wait_healthy(service, interval, timeout).await?;
        info!(
            "{} is healthy after {} poll(s) in {:?}",
            service, report.polls, report.elapsed
        );
        Ok(report)
    }

    /// Probe every service once
    pub async fn status(&self) -> Result<BTreeMap<String, HealthStatus>> {
        let mut statuses = BTreeMap::new();
        for (name, service) in self.topology.services() {
            let status = self
                .engine
                .probe(name, service.health_check.as_ref())
                .await?;
            statuses.insert(name.clone(), status);
        }
        Ok(statuses)
    }
}

/// Adapts an [`Engine`] to the health gate, supplying each service's check
struct EngineProbe<'a, E> {
    engine: &'a E,
    topology: &'a Topology,
}

#[async_trait]
impl<'a, E: Engine> HealthProbe for EngineProbe<'a, E> {
    async fn probe(&self, service: &str) -> Result<HealthStatus> {
        let check = self
            .topology
            .service(service)
            .map_err(service_error)?
            .health_check
            .as_ref();
        self.engine.probe(service, check).await
    }
}
