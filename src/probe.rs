//! Periodic power-state probing.
//!
//! Polls the panel for every managed server on a fixed interval and feeds
//! the observations back into the per-server controllers, reconciling drift
//! between the bridge's view and reality (servers started or stopped outside
//! the bridge, restarts of the bridge itself).
//!
//! A probe for a server is skipped while the previous one is still running,
//! so a slow panel never stacks probes for the same server. Failed probes
//! are reported to the controller, which pauses the server's queue after
//! enough consecutive failures.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::panel::PanelApi;
use crate::state::ServerId;

pub struct StatusPoller {
    dispatcher: Arc<Dispatcher>,
    panel: Arc<dyn PanelApi>,
    cancel: CancellationToken,
    /// Servers with a probe currently outstanding
    in_flight: Arc<Mutex<HashSet<ServerId>>>,
}

impl StatusPoller {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        panel: Arc<dyn PanelApi>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            panel,
            cancel,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Spawn the poll loop.
    pub fn spawn(self, interval_duration: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_duration);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; consume it so probing
            // starts one full interval after startup.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        tracing::debug!("Status poller shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        self.poll_once().await;
                    }
                }
            }
        })
    }

    async fn poll_once(&self) {
        for server in self.dispatcher.managed_servers() {
            // Skip servers whose previous probe hasn't resolved yet
            if !self.in_flight.lock().insert(server.clone()) {
                continue;
            }

            let panel = Arc::clone(&self.panel);
            let dispatcher = Arc::clone(&self.dispatcher);
            let in_flight = Arc::clone(&self.in_flight);
            tokio::spawn(async move {
                match panel.power_state(&server).await {
                    Ok(state) => {
                        dispatcher.observe(&server, state).await;
                    }
                    Err(e) => {
                        tracing::warn!("Status probe failed for '{}': {}", server, e);
                        dispatcher.probe_failed(&server).await;
                    }
                }
                in_flight.lock().remove(&server);
            });
        }
    }
}
