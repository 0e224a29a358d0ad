//! Configuration parser and validation

use crate::{Config, ConfigError, Result, topology::check_acyclic};
use std::path::Path;
use tracing::debug;

/// Supported configuration version
pub const CONFIG_VERSION: &str = "1.0";

/// Parse a YAML configuration file
pub fn parse_file(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    debug!("Reading configuration from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parse YAML configuration from a string
pub fn parse_str(content: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::ValidationError(format!(
            "Unsupported version: {}, expected {}",
            config.version, CONFIG_VERSION
        )));
    }

    if config.settings.engine.is_empty() {
        return Err(ConfigError::ValidationError(
            "settings.engine must name a program".to_string(),
        ));
    }

    if config.settings.health_check_interval == Some(0) {
        return Err(ConfigError::ValidationError(
            "settings.health_check_interval must be greater than 0".to_string(),
        ));
    }

    for (name, service) in &config.services {
        for dep in &service.depends_on {
            if !config.services.contains_key(dep) {
                return Err(ConfigError::ValidationError(format!(
                    "Service '{}' depends on unknown service '{}'",
                    name, dep
                )));
            }
        }

        if let Some(check) = &service.health_check {
            if check.interval == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "Service '{}' has a health check interval of 0",
                    name
                )));
            }
        }
    }

    check_acyclic(&config.services)?;

    for (name, operation) in &config.operations {
        validate_operation(config, name, operation)?;
    }

    Ok(())
}

fn validate_operation(config: &Config, name: &str, operation: &crate::Operation) -> Result<()> {
    if operation.steps.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Operation '{}' has no steps",
            name
        )));
    }

    for (index, step) in operation.steps.iter().enumerate() {
        let invalid = |reason: String| {
            ConfigError::ValidationError(format!(
                "Operation '{}' step {} ({}): {}",
                name,
                index,
                step.action.name(),
                reason
            ))
        };

        match &step.service {
            Some(service) if step.action.forbids_service() => {
                return Err(invalid(format!("must not target a service (got '{}')", service)));
            }
            // Placeholders are resolved at run time
            Some(service) if !service.contains("${") && !config.services.contains_key(service) => {
                return Err(invalid(format!("unknown service '{}'", service)));
            }
            None if step.action.requires_service() => {
                return Err(invalid("requires a service".to_string()));
            }
            _ => {}
        }

        let args = match &step.action {
            crate::StepAction::Exec { args, .. }
            | crate::StepAction::Run { args }
            | crate::StepAction::Host { args } => Some(args),
            _ => None,
        };
        if args.is_some_and(|args| args.is_empty()) {
            return Err(invalid("needs at least one argument".to_string()));
        }

        if step.timeout == Some(0) {
            return Err(invalid("timeout must be greater than 0".to_string()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StepAction;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
version: "1.0"
services:
  redis:
    image: "redis:7-alpine"
"#;

        let config = parse_str(yaml).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.settings.engine, vec!["docker", "compose"]);
        assert!(config.operations.is_empty());
    }

    #[test]
    fn test_parse_steps() {
        let yaml = r#"
version: "1.0"
services:
  mysql:
    image: "mysql:8"
  php:
    image: "php:8.3-fpm"
    depends_on: [mysql]
operations:
  restore:
    description: "Load a dump into the database"
    steps:
      - action: wait_healthy
        service: mysql
        timeout: 90
      - action: exec
        service: mysql
        args: ["mysql", "-uroot", "app"]
        stdin: "${1}"
      - action: stop
        service: php
"#;

        let config = parse_str(yaml).unwrap();
        let restore = &config.operations["restore"];
        assert_eq!(restore.steps.len(), 3);
        assert_eq!(restore.steps[0].action, StepAction::WaitHealthy);
        assert_eq!(restore.steps[0].timeout, Some(90));
        assert_eq!(restore.steps[1].stdin.as_deref(), Some("${1}"));
        assert_eq!(restore.steps[2].action, StepAction::Stop);
        assert_eq!(restore.steps[2].service.as_deref(), Some("php"));
    }

    #[test]
    fn test_unsupported_version() {
        let yaml = r#"
version: "2.0"
services: {}
"#;
        let err = parse_str(yaml).unwrap_err();
        assert!(err.to_string().contains("Unsupported version"));
    }

    #[test]
    fn test_zero_poll_intervals_rejected() {
        let global = r#"
version: "1.0"
settings:
  health_check_interval: 0
services:
  redis:
    image: redis
"#;
        let err = parse_str(global).unwrap_err();
        assert!(err.to_string().contains("health_check_interval must be greater than 0"));

        let service = r#"
version: "1.0"
services:
  redis:
    image: redis
    health_check:
      command: redis-cli
      interval: 0
"#;
        let err = parse_str(service).unwrap_err();
        assert!(err.to_string().contains("health check interval of 0"));
    }

    #[test]
    fn test_unknown_dependency() {
        let yaml = r#"
version: "1.0"
services:
  php:
    image: php
    depends_on: [mysql]
"#;
        let err = parse_str(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown service 'mysql'"));
    }

    #[test]
    fn test_exec_requires_service() {
        let yaml = r#"
version: "1.0"
services:
  php:
    image: php
operations:
  migrate:
    steps:
      - action: exec
        args: ["php", "artisan", "migrate"]
"#;
        let err = parse_str(yaml).unwrap_err();
        assert!(err.to_string().contains("requires a service"));
    }

    #[test]
    fn test_host_step_cannot_target_service() {
        let yaml = r#"
version: "1.0"
services:
  php:
    image: php
operations:
  init:
    steps:
      - action: host
        service: php
        args: ["cp", ".env.example", ".env"]
"#;
        let err = parse_str(yaml).unwrap_err();
        assert!(err.to_string().contains("must not target a service"));
    }

    #[test]
    fn test_step_with_unknown_service() {
        let yaml = r#"
version: "1.0"
services:
  php:
    image: php
operations:
  shell:
    steps:
      - action: exec
        service: node
        args: ["sh"]
"#;
        let err = parse_str(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown service 'node'"));
    }

    #[test]
    fn test_empty_operation_rejected() {
        let yaml = r#"
version: "1.0"
services: {}
operations:
  nothing:
    steps: []
"#;
        assert!(parse_str(yaml).is_err());
    }
}
