mod cli;
mod commands;
mod logging;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing_with_level(&cli.log_level);

    match &cli.command {
        Commands::Check(args) => {
            let assertion = commands::read_assertion(args.assertion.as_deref())?;
            commands::check::check(args, &assertion).await?;
        }
        Commands::Inspect(args) => {
            let assertion = commands::read_assertion(args.assertion.as_deref())?;
            commands::inspect::inspect(&assertion)?;
        }
    }

    Ok(())
}
