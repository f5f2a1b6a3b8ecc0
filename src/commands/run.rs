//! The `run` command: start the bridge and feed it queue events.
//!
//! The queue subsystem delivers events as newline-delimited JSON on stdin:
//!
//! ```json
//! {"server": "survival", "kind": "enqueued"}
//! {"server": "survival", "kind": "dequeued", "playing": 12}
//! ```
//!
//! The bridge keeps running after the event stream closes (sweeps and
//! status probes continue) until Ctrl-C.

use queuewarden::ingest::QueueEvent;
use queuewarden::{Bridge, Config};
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run_bridge(config: Config) -> anyhow::Result<()> {
    let mut bridge = Bridge::new(config)?;
    let events = bridge.event_sender();
    let cancel = bridge.cancellation_token();

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C");
                break;
            }
            _ = cancel.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<QueueEvent>(line) {
                        Ok(event) => {
                            if events.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Skipping malformed queue event: {}", e);
                        }
                    }
                }
                Ok(None) => {
                    // EOF on the event stream; servers still cool down and
                    // probes still reconcile until we're told to stop.
                    tracing::info!("Event stream closed; continuing on sweeps and probes");
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = cancel.cancelled() => {}
                    }
                    break;
                }
                Err(e) => {
                    tracing::warn!("Failed to read event stream: {}", e);
                    break;
                }
            }
        }
    }

    bridge.shutdown().await;
    Ok(())
}
