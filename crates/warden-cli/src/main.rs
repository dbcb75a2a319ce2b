mod cli;
mod commands;
mod completions;
mod error;
mod output;
mod setup;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so `--format json` output stays parseable.
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(true)
        .init();

    if let Err(err) = run(cli).await {
        error::handle_error(err);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let core = || setup::prepare_core(cli.config.as_deref(), cli.db.clone());

    match cli.command {
        Commands::Completions { shell } => {
            completions::generate_completions(shell);
            Ok(())
        }
        Commands::Check(args) => commands::check::run(args, format),
        Commands::Evaluate(args) => commands::evaluate::run(&core()?, args, format).await,
        Commands::Approvals { command } => commands::approvals::run(&core()?, command, format).await,
        Commands::Recording { command } => commands::recording::run(&core()?, command, format).await,
        Commands::Sweep { once } => commands::sweep::run(&core()?, once, format).await,
        Commands::Server { command } => commands::directory::server(&core()?, command, format),
        Commands::User { command } => commands::directory::user(&core()?, command, format),
        Commands::Policy { command } => commands::directory::policy(&core()?, command, format),
    }
}
