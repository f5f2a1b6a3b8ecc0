//! The `status` command: one-shot power-state query for every configured
//! server.

use queuewarden::panel::{HttpPanelClient, PanelApi};
use queuewarden::{Config, ServerId};
use std::collections::BTreeMap;

pub async fn run_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let client = HttpPanelClient::from_config(config)?;

    // BTreeMap for stable output order
    let mut states: BTreeMap<String, String> = BTreeMap::new();
    for name in config.servers.keys() {
        let server = ServerId::from(name.as_str());
        let state = match client.power_state(&server).await {
            Ok(state) => state.to_string(),
            Err(e) => {
                tracing::warn!("Status query failed for '{}': {}", server, e);
                format!("error: {}", e)
            }
        };
        states.insert(name.clone(), state);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&states)?);
    } else {
        let width = states.keys().map(|n| n.len()).max().unwrap_or(6).max(6);
        println!("{:<width$}  STATE", "SERVER", width = width);
        for (name, state) in &states {
            println!("{:<width$}  {}", name, state, width = width);
        }
    }

    Ok(())
}
