use super::Session;
use anyhow::Result;
use stack_orchestration::BUILTIN_OPERATIONS;

pub fn run(session: &Session) -> Result<()> {
    let operations = session.topology().operations();
    let builtins: Vec<&str> = BUILTIN_OPERATIONS
        .into_iter()
        .filter(|name| !operations.contains_key(*name))
        .collect();

    let width = operations
        .keys()
        .map(String::len)
        .chain(builtins.iter().map(|name| name.len()))
        .max()
        .unwrap_or(0);

    println!("Operations:");
    for (name, operation) in operations {
        println!(
            "  {:<width$}  {}",
            name,
            operation.description.as_deref().unwrap_or(""),
            width = width
        );
    }
    for name in builtins {
        println!("  {:<width$}  (built-in)", name, width = width);
    }

    Ok(())
}
