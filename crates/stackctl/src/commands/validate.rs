use super::{load_topology, resolution_context};
use anyhow::Result;
use stack_config::{ConfigError, resolver};
use std::path::Path;

pub fn run(config_path: &Path, sets: &[(String, String)]) -> Result<()> {
    println!("Validating {}...", config_path.display());

    let topology = load_topology(config_path)?;

    println!("✓ Configuration valid");
    if let Some(name) = topology.name() {
        println!("  Name: {}", name);
    }
    println!("  Services: {}", topology.services().len());
    println!("  Operations: {}", topology.operations().len());

    // Arguments are only known at run time; variables should resolve now
    let context = resolution_context(&topology, sets)?;
    for (name, operation) in topology.operations() {
        let mut missing = Vec::new();
        for step in &operation.steps {
            if let Err(ConfigError::EnvVarNotFound(vars)) = resolver::resolve_step(step, &context) {
                missing.push(vars);
            }
        }

        if !missing.is_empty() {
            println!(
                "  ⚠ Operation '{}' references undefined variables: {}",
                name,
                missing.join(", ")
            );
        }
    }

    Ok(())
}
