use clap::Parser;
use colored::*;
use std::process;

use emu_cli::{Cli, CliError, CommandHandler, Commands, ConfigManager};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config_manager = match ConfigManager::new(cli.config.clone()) {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            process::exit(1);
        }
    };

    let mut handler = CommandHandler::new(config_manager);
    handler.set_output_format(cli.format);

    if let Err(e) = execute_command(&handler, cli.command).await {
        eprintln!("{} {}", "Error:".red(), e);
        process::exit(1);
    }
}

async fn execute_command(handler: &CommandHandler, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Up { devices, detach } => handler.up(&devices, detach).await,
        Commands::Devices { devices } => handler.devices(&devices),
        Commands::Ports { url } => handler.ports(&url),
        Commands::Create { image, name, cmd } => handler.create(&image, &name, cmd).await,
        Commands::Start { id } => handler.start(&id).await,
        Commands::Stop { id, timeout } => handler.stop(&id, timeout).await,
        Commands::Rm { id, force } => handler.remove(&id, force).await,
        Commands::Stats { id } => handler.stats(&id).await,
    }
}

fn setup_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    if quiet {
        return;
    }

    let level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
