use super::Session;
use anyhow::Result;
use tracing::warn;

pub async fn up(session: &Session, services: Vec<String>) -> Result<()> {
    session
        .dispatcher
        .run("up", &services, &session.context)
        .await?;
    println!("✓ Stack is up");
    Ok(())
}

pub async fn down(session: &Session, services: Vec<String>, volumes: bool) -> Result<()> {
    let dispatcher = &session.dispatcher;

    // A configured `down` operation takes precedence over the built-in
    let plan = if dispatcher.topology().operation("down").is_some() {
        dispatcher.plan("down", &services)?
    } else {
        if volumes && !services.is_empty() {
            warn!("--volumes only applies when tearing down the whole stack");
        }
        dispatcher.plan_down(&services, volumes)?
    };

    dispatcher
        .run_plan(&plan, &session.context.clone().with_args(services))
        .await?;
    println!("✓ Stack is down");
    Ok(())
}
