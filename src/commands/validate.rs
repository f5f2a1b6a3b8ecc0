//! The `validate` command: load the config and report problems.

use queuewarden::{Config, Result};

pub fn run_validate(config: &Config) -> Result<()> {
    config.validate()?;

    println!("Configuration is valid");
    println!("  panel: {}", config.panel.base_url);
    println!("  managed servers: {}", config.servers.len());
    for (name, entry) in &config.servers {
        println!("    {} -> {}", name, entry.panel_id);
    }
    Ok(())
}
