//! fleetcore CLI entry point.

use anyhow::Result;
use clap::Parser;

use fleetcore::cli::{commands, Cli, Commands};
use fleetcore::infrastructure::config::ConfigLoader;
use fleetcore::infrastructure::logging::LoggerImpl;
use fleetcore::Config;

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    // Command output owns stdout unless logs were asked for.
    let mut logging = config.logging.clone();
    logging.enable_stdout = cli.verbose;
    let _logger = LoggerImpl::init(&logging)?;

    match &cli.command {
        Commands::Init(args) => commands::init::execute(args, cli.json),
        Commands::Config(args) => commands::config::execute(args, &config, cli.json),
        Commands::Plan(args) => commands::plan::execute(args, &config, cli.json).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        fleetcore::cli::handle_error(err, json);
    }
}
