use super::Session;
use anyhow::Result;

pub fn run(session: &Session) -> Result<()> {
    let topology = session.topology();

    for name in topology.start_order(&[])? {
        let service = topology.service(&name)?;
        let marker = if service.health_check.is_some() {
            " [health check]"
        } else {
            ""
        };

        if service.depends_on.is_empty() {
            println!("{}{}", name, marker);
        } else {
            println!("{}{} -> {}", name, marker, service.depends_on.join(", "));
        }
    }

    Ok(())
}
