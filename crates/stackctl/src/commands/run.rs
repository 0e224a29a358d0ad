use super::Session;
use anyhow::Result;
use stack_config::StepAction;

pub async fn run(
    session: &Session,
    operation: &str,
    args: Vec<String>,
    dry_run: bool,
) -> Result<()> {
    let dispatcher = &session.dispatcher;

    if dry_run {
        let plan = dispatcher.dry_run(operation, &args, &session.context)?;
        println!("Operation '{}' ({} steps):", plan.operation, plan.steps.len());
        for (index, step) in plan.steps.iter().enumerate() {
            println!("  {}. {}", index + 1, step);
            match dispatcher.engine().command_for(step) {
                Some(command) => println!("     $ {}", command),
                None if step.action == StepAction::WaitHealthy => {
                    println!("     (health gate)")
                }
                None => {}
            }
        }
        return Ok(());
    }

    dispatcher.run(operation, &args, &session.context).await?;
    Ok(())
}
