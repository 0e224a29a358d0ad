//! stackctl - run named operations against a compose-managed service stack

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "stackctl")]
#[command(about = "Declarative multi-service lifecycle runner")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "stack.yaml")]
    config: PathBuf,

    /// Set a variable for placeholder resolution (KEY=VALUE, repeatable)
    #[arg(long = "set", global = true, value_name = "KEY=VALUE", value_parser = parse_key_val)]
    set: Vec<(String, String)>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    Validate,

    /// Start services in dependency order
    Up {
        /// Services to start (empty means all)
        services: Vec<String>,
    },

    /// Stop services, or tear down the whole stack
    Down {
        /// Services to stop along with their dependents (empty means the whole stack)
        services: Vec<String>,

        /// Also remove named volumes when tearing down the stack
        #[arg(long)]
        volumes: bool,
    },

    /// Show service health
    Status {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Wait until a service is healthy
    Wait {
        /// Service to wait for
        service: String,

        /// Timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Show service logs
    Logs {
        /// Service to show (empty means all)
        service: Option<String>,

        /// Follow log output
        #[arg(short, long)]
        follow: bool,

        /// Number of lines to show from the end
        #[arg(long)]
        tail: Option<u32>,
    },

    /// List available operations
    Ops,

    /// Show the service dependency graph in start order
    Graph,

    /// Run a named operation
    Run {
        /// Print the resolved steps without running them
        #[arg(long)]
        dry_run: bool,

        /// Operation name
        operation: String,

        /// Operation arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Any other subcommand runs the operation of that name
    #[command(external_subcommand)]
    External(Vec<String>),
}

/// Output format for status
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable table
    Table,
    /// JSON object of service to status
    Json,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

async fn dispatch(cli: Cli) -> Result<()> {
    let session = || commands::Session::open(&cli.config, &cli.set);

    match cli.command {
        Commands::Validate => commands::validate::run(&cli.config, &cli.set),
        Commands::Up { services } => commands::lifecycle::up(&session()?, services).await,
        Commands::Down { services, volumes } => {
            commands::lifecycle::down(&session()?, services, volumes).await
        }
        Commands::Status { format } => commands::status::run(&session()?, format).await,
        Commands::Wait { service, timeout } => {
            commands::wait::run(&session()?, &service, timeout).await
        }
        Commands::Logs {
            service,
            follow,
            tail,
        } => commands::logs::run(&session()?, service, follow, tail).await,
        Commands::Ops => commands::ops::run(&session()?),
        Commands::Graph => commands::graph::run(&session()?),
        Commands::Run {
            dry_run,
            operation,
            args,
        } => commands::run::run(&session()?, &operation, args, dry_run).await,
        Commands::External(mut argv) => {
            let operation = argv.remove(0);
            commands::run::run(&session()?, &operation, argv, false).await
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match smol::block_on(dispatch(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<stack_orchestration::Error>()
                .map(stack_orchestration::Error::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1).max(1))
        }
    }
}
