use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "qward")]
#[command(about = "Queuewarden - wake backend servers when clients queue, idle them down when they leave")]
pub struct Cli {
    /// Config file path (defaults to queuewarden.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bridge, reading queue events as NDJSON on stdin
    Run,
    /// Query the panel for each configured server's power state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration file
    Validate,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}
