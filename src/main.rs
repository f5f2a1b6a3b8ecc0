mod cli;
mod commands;

use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use queuewarden::{Error as QwError, Parser as ConfigParser};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(qw_error) = e.downcast_ref::<QwError>() {
            eprintln!("Error: {}", qw_error);
            if let Some(suggestion) = qw_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing()?;

    // Completions need no config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        let bin_name = cmd.get_name().to_string();
        clap_complete::generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(());
    }

    let parser = ConfigParser::new();
    let config_path = if let Some(path) = cli.config.clone() {
        path
    } else {
        parser.find_config_file()?
    };
    let config = parser.load_config(&config_path)?;

    match cli.command {
        Commands::Run => {
            config.validate()?;
            commands::run_bridge(config).await?;
        }
        Commands::Status { json } => {
            config.validate()?;
            commands::run_status(&config, json).await?;
        }
        Commands::Validate => {
            commands::run_validate(&config)?;
        }
        Commands::Completions { .. } => {
            unreachable!("handled above");
        }
    }

    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
