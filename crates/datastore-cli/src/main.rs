// Datastore CLI entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr, filtered by RUST_LOG)
// 2. Parse arguments
// 3. Load config (bootstrapping config/ from defaults/ if needed)
// 4. Build the submitter
// 5. Run the subcommand and report its outcome

mod cli;
mod commands;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use datastore_client::{config, SubmissionOutcome, ValueSubmitter};
use tracing::info;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // 1. Initialize tracing
    init_tracing()?;

    // 2. Parse arguments
    let cli = Cli::parse();

    // 3. Load config
    let config = config::load_config(&cli.base_dir).with_context(|| {
        format!(
            "failed to load configuration from {}",
            cli.base_dir.display()
        )
    })?;
    info!(
        "Config loaded: host={}, hub={}, method={}",
        config.host, config.hub, config.method
    );

    // 4. Build the submitter
    let submitter = ValueSubmitter::new(config);

    // 5. Run the subcommand
    let (name, outcome) = match cli.command {
        Commands::Set {
            name,
            value,
            format,
        } => {
            let outcome = commands::set(&submitter, &name, &value, &format).await?;
            (name, outcome)
        }
        Commands::Delete { name, yes } => {
            let stdin = std::io::stdin();
            let mut input = stdin.lock();
            let mut output = std::io::stderr();
            match commands::delete(&submitter, &name, yes, &mut input, &mut output).await? {
                Some(outcome) => (name, outcome),
                None => {
                    eprintln!("Cancelled.");
                    return Ok(ExitCode::SUCCESS);
                }
            }
        }
    };

    Ok(report(&name, &outcome))
}

/// Print the outcome for the user and map it to an exit code.
fn report(name: &str, outcome: &SubmissionOutcome) -> ExitCode {
    if outcome.is_accepted() {
        println!("{name}: {outcome}");
        ExitCode::SUCCESS
    } else {
        eprintln!("{name}: {outcome}");
        ExitCode::FAILURE
    }
}

/// Initialize tracing on stderr so stdout stays clean for results.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
