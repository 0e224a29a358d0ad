use super::Session;
use crate::OutputFormat;
use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table};
use stack_orchestration::HealthStatus;

pub async fn run(session: &Session, format: OutputFormat) -> Result<()> {
    let statuses = session
        .dispatcher
        .status()
        .await
        .context("Failed to query service status")?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["SERVICE", "IMAGE", "PORTS", "STATUS", "DEPENDS ON"]);

    for (name, service) in session.topology().services() {
        let status = statuses.get(name).copied().unwrap_or(HealthStatus::Stopped);
        let color = match status {
            HealthStatus::Healthy => Color::Green,
            HealthStatus::Starting => Color::Yellow,
            HealthStatus::Unhealthy => Color::Red,
            HealthStatus::Stopped => Color::DarkGrey,
        };
        let ports = if service.ports.is_empty() {
            "-".to_string()
        } else {
            service
                .ports
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        let depends_on = if service.depends_on.is_empty() {
            "-".to_string()
        } else {
            service.depends_on.join(", ")
        };

        table.add_row(vec![
            Cell::new(name),
            Cell::new(&service.image),
            Cell::new(ports),
            Cell::new(status).fg(color),
            Cell::new(depends_on),
        ]);
    }

    println!("{}", table);
    Ok(())
}
