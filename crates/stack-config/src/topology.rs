//! Validated service topology and dependency traversal

use crate::{Config, ConfigError, Operation, Result, Service, Settings, parser};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// The immutable, validated view of a configuration file
///
/// All maps are ordered, so two loads of the same file serialize identically.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Topology {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    settings: Settings,
    services: BTreeMap<String, Service>,
    operations: BTreeMap<String, Operation>,
    /// Directory relative paths in the configuration are resolved against
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Topology {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = parser::parse_file(path)?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_config(config, base_dir)
    }

    /// Build a topology from an already parsed configuration
    pub fn from_config(config: Config, base_dir: impl Into<PathBuf>) -> Result<Self> {
        parser::validate_config(&config)?;
        Ok(Self {
            name: config.name,
            settings: config.settings,
            services: config.services,
            operations: config.operations,
            base_dir: base_dir.into(),
        })
    }

    /// Stack name, if configured
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Global settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// All services by name
    pub fn services(&self) -> &BTreeMap<String, Service> {
        &self.services
    }

    /// All configured operations by name
    pub fn operations(&self) -> &BTreeMap<String, Operation> {
        &self.operations
    }

    /// Look up a service
    pub fn service(&self, name: &str) -> Result<&Service> {
        self.services
            .get(name)
            .ok_or_else(|| ConfigError::ServiceNotFound(name.to_string()))
    }

    /// Look up a configured operation
    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    /// Directory the configuration file lives in
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The env file path, resolved against the configuration directory
    pub fn env_file(&self) -> Option<PathBuf> {
        self.settings
            .env_file
            .as_ref()
            .map(|file| self.base_dir.join(file))
    }

    /// Services in start order: dependencies before dependents.
    ///
    /// An empty request means every service; otherwise the requested services
    /// plus everything they transitively depend on.
    pub fn start_order(&self, requested: &[String]) -> Result<Vec<String>> {
        let roots = self.roots(requested)?;
        let mut visited = BTreeSet::new();
        let mut result = Vec::new();

        for root in &roots {
            self.visit_dependencies(root, &mut visited, &mut result);
        }

        Ok(result)
    }

    /// Services in stop order: dependents before their dependencies.
    ///
    /// An empty request means every service; otherwise the requested services
    /// plus everything that transitively depends on them.
    pub fn stop_order(&self, requested: &[String]) -> Result<Vec<String>> {
        let roots = self.roots(requested)?;
        let graph = self.dependents_graph();
        let mut visited = BTreeSet::new();
        let mut result = Vec::new();

        for root in &roots {
            visit_dependents(root, &graph, &mut visited, &mut result);
        }

        Ok(result)
    }

    /// Services that transitively depend on `service`, sorted by name
    pub fn dependents(&self, service: &str) -> Result<Vec<String>> {
        self.service(service)?;
        let graph = self.dependents_graph();
        let mut collected = BTreeSet::new();
        collect_dependents(&graph, service, &mut collected);
        collected.remove(service);
        Ok(collected.into_iter().collect())
    }

    fn roots(&self, requested: &[String]) -> Result<BTreeSet<String>> {
        if requested.is_empty() {
            return Ok(self.services.keys().cloned().collect());
        }
        requested
            .iter()
            .map(|name| self.service(name).map(|_| name.clone()))
            .collect()
    }

    /// Map from service to the services that directly depend on it
    fn dependents_graph(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        let mut graph: BTreeMap<&str, BTreeSet<&str>> = self
            .services
            .keys()
            .map(|name| (name.as_str(), BTreeSet::new()))
            .collect();

        for (name, service) in &self.services {
            for dep in &service.depends_on {
                if let Some(dependents) = graph.get_mut(dep.as_str()) {
                    dependents.insert(name.as_str());
                }
            }
        }

        graph
    }

    /// Post-order DFS over dependencies. The graph is acyclic once validated.
    fn visit_dependencies(
        &self,
        service: &str,
        visited: &mut BTreeSet<String>,
        result: &mut Vec<String>,
    ) {
        if !visited.insert(service.to_string()) {
            return;
        }
        if let Some(config) = self.services.get(service) {
            for dep in &config.depends_on {
                self.visit_dependencies(dep, visited, result);
            }
        }
        result.push(service.to_string());
    }
}

fn visit_dependents(
    service: &str,
    graph: &BTreeMap<&str, BTreeSet<&str>>,
    visited: &mut BTreeSet<String>,
    result: &mut Vec<String>,
) {
    if !visited.insert(service.to_string()) {
        return;
    }
    if let Some(dependents) = graph.get(service) {
        for dependent in dependents {
            visit_dependents(dependent, graph, visited, result);
        }
    }
    result.push(service.to_string());
}

fn collect_dependents(
    graph: &BTreeMap<&str, BTreeSet<&str>>,
    service: &str,
    collected: &mut BTreeSet<String>,
) {
    if let Some(dependents) = graph.get(service) {
        for dependent in dependents {
            if collected.insert(dependent.to_string()) {
                collect_dependents(graph, dependent, collected);
            }
        }
    }
}

/// Marker state for the cycle check
#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

/// Fail with [`ConfigError::DependencyCycle`] if the dependency graph has a cycle.
///
/// Every dependency must already be known to name a declared service.
pub fn check_acyclic(services: &BTreeMap<String, Service>) -> Result<()> {
    let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
    let mut path: Vec<&str> = Vec::new();

    for name in services.keys() {
        visit_for_cycles(name, services, &mut marks, &mut path)?;
    }

    Ok(())
}

fn visit_for_cycles<'a>(
    service: &'a str,
    services: &'a BTreeMap<String, Service>,
    marks: &mut BTreeMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
) -> Result<()> {
    match marks.get(service) {
        Some(Mark::Visited) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|s| *s == service).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(service.to_string());
            return Err(ConfigError::DependencyCycle(cycle));
        }
        None => {}
    }

    marks.insert(service, Mark::Visiting);
    path.push(service);

    if let Some(config) = services.get(service) {
        for dep in &config.depends_on {
            visit_for_cycles(dep, services, marks, path)?;
        }
    }

    path.pop();
    marks.insert(service, Mark::Visited);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(deps: &[&str]) -> Service {
        Service {
            image: "alpine".to_string(),
            ports: vec![],
            env: BTreeMap::new(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            health_check: None,
            startup_timeout: None,
        }
    }

    fn create_test_topology() -> Topology {
        // Chain app -> api -> db, plus an unrelated cache
        let mut services = BTreeMap::new();
        services.insert("db".to_string(), service(&[]));
        services.insert("api".to_string(), service(&["db"]));
        services.insert("app".to_string(), service(&["api"]));
        services.insert("cache".to_string(), service(&[]));

        let config = Config {
            version: "1.0".to_string(),
            name: Some("test".to_string()),
            description: None,
            settings: Settings::default(),
            services,
            operations: BTreeMap::new(),
        };
        Topology::from_config(config, ".").unwrap()
    }

    #[test]
    fn test_start_order() {
        let topology = create_test_topology();

        let order = topology.start_order(&[]).unwrap();
        assert_eq!(order, vec!["db", "api", "app", "cache"]);

        let order = topology.start_order(&["app".to_string()]).unwrap();
        assert_eq!(order, vec!["db", "api", "app"]);
    }

    #[test]
    fn test_stop_order() {
        let topology = create_test_topology();

        let order = topology.stop_order(&[]).unwrap();
        assert_eq!(order, vec!["app", "api", "cache", "db"]);

        // Stopping db takes its dependents down first
        let order = topology.stop_order(&["db".to_string()]).unwrap();
        assert_eq!(order, vec!["app", "api", "db"]);
    }

    #[test]
    fn test_dependents() {
        let topology = create_test_topology();

        assert_eq!(topology.dependents("db").unwrap(), vec!["api", "app"]);
        assert_eq!(topology.dependents("api").unwrap(), vec!["app"]);
        assert!(topology.dependents("app").unwrap().is_empty());
        assert!(topology.dependents("missing").is_err());
    }

    #[test]
    fn test_unknown_service_in_request() {
        let topology = create_test_topology();
        let err = topology.start_order(&["nope".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::ServiceNotFound(name) if name == "nope"));
    }

    #[test]
    fn test_cycle_reports_path() {
        let mut services = BTreeMap::new();
        services.insert("a".to_string(), service(&["b"]));
        services.insert("b".to_string(), service(&["c"]));
        services.insert("c".to_string(), service(&["a"]));

        let err = check_acyclic(&services).unwrap_err();
        match err {
            ConfigError::DependencyCycle(path) => assert_eq!(path, vec!["a", "b", "c", "a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut services = BTreeMap::new();
        services.insert("a".to_string(), service(&["a"]));

        assert!(matches!(
            check_acyclic(&services),
            Err(ConfigError::DependencyCycle(_))
        ));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let mut services = BTreeMap::new();
        services.insert("db".to_string(), service(&[]));
        services.insert("php".to_string(), service(&["db"]));
        services.insert("worker".to_string(), service(&["db"]));
        services.insert("nginx".to_string(), service(&["php", "worker"]));

        assert!(check_acyclic(&services).is_ok());
    }
}
