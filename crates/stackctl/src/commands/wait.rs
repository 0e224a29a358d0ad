use super::Session;
use anyhow::Result;
use std::time::Duration;

pub async fn run(session: &Session, service: &str, timeout: Option<u64>) -> Result<()> {
    let report = session
        .dispatcher
        .wait_healthy(service, timeout.map(Duration::from_secs))
        .await?;

    println!(
        "✓ {} is healthy ({} poll(s), {:.1}s)",
        service,
        report.polls,
        report.elapsed.as_secs_f64()
    );
    Ok(())
}
