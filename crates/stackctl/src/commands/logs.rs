use super::Session;
use anyhow::Result;
use stack_config::{Step, StepAction};
use stack_orchestration::Plan;

pub async fn run(
    session: &Session,
    service: Option<String>,
    follow: bool,
    tail: Option<u32>,
) -> Result<()> {
    let plan = Plan {
        operation: "logs".to_string(),
        steps: vec![Step::new(service, StepAction::Logs { follow, tail })],
    };

    session.dispatcher.run_plan(&plan, &session.context).await?;
    Ok(())
}
