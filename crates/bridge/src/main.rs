use clap::Parser;
use tracing_subscriber::EnvFilter;

use sb_bridge::cli::{Cli, Command, ConfigCommand};
use sb_bridge::config::LoggingConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = sb_bridge::cli::load_config()?;

    match cli.command {
        // Default to listen when no subcommand is given.
        None | Some(Command::Listen) => {
            init_tracing(&config.logging, cli.json);
            sb_bridge::cli::listen::listen(&config).await
        }
        Some(Command::Send { number, content }) => {
            init_tracing(&config.logging, cli.json);
            sb_bridge::cli::send::send(&config, &number, &content).await
        }
        Some(Command::Ports { probe }) => {
            init_cli_tracing();
            sb_bridge::cli::ports::ports(&config, probe).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            if !sb_bridge::cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => sb_bridge::cli::config::show(&config),
    }
}

fn init_tracing(logging: &LoggingConfig, json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    if json || logging.json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

/// Quiet logging for one-shot utility commands.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
