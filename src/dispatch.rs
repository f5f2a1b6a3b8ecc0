//! Fan-out/fan-in layer: routes work to per-server controllers.
//!
//! The dispatcher owns the only registry of controller mailboxes. Every
//! message for a server goes through that server's bounded mpsc channel, so
//! delivery is FIFO per key while different servers proceed independently.
//! Controllers are created lazily on first reference and live for the
//! process lifetime.
//!
//! A periodic sweep delivers `SweepTick` to every known controller; that is
//! how a Cooling server shuts down even when no further queue events arrive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::controller::{
    ControllerMsg, ControllerParams, LifecycleController, Snapshot, MAILBOX_CAPACITY,
};
use crate::ingest::{self, OccupancyDelta, QueueEvent};
use crate::observe::Notifier;
use crate::panel::{PanelApi, RetryPolicy};
use crate::queue::QueueControl;
use crate::state::{PowerState, ServerId};

struct ControllerHandle {
    tx: mpsc::Sender<ControllerMsg>,
    join: JoinHandle<()>,
}

/// Registry type for per-server controller mailboxes
type ControllerRegistry = HashMap<ServerId, ControllerHandle>;

pub struct Dispatcher {
    config: Config,
    panel: Arc<dyn PanelApi>,
    queue: Arc<dyn QueueControl>,
    notifier: Notifier,
    cancel: CancellationToken,
    controllers: RwLock<ControllerRegistry>,
}

impl Dispatcher {
    pub fn new(
        config: Config,
        panel: Arc<dyn PanelApi>,
        queue: Arc<dyn QueueControl>,
        notifier: Notifier,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            panel,
            queue,
            notifier,
            cancel,
            controllers: RwLock::new(HashMap::new()),
        }
    }

    /// Route a raw queue event to its server's controller.
    pub async fn deliver_event(&self, event: QueueEvent) {
        self.deliver(ingest::normalize(event)).await;
    }

    /// Route a normalized occupancy delta to its server's controller.
    pub async fn deliver(&self, delta: OccupancyDelta) {
        let tx = self.mailbox(&delta.server).await;
        if tx.send(ControllerMsg::Delta(delta)).await.is_err() {
            tracing::debug!("Dropping delta; controller mailbox closed");
        }
    }

    /// Feed a power observation into a server's controller.
    pub async fn observe(&self, server: &ServerId, state: PowerState) {
        let tx = self.mailbox(server).await;
        let _ = tx.send(ControllerMsg::PowerObserved(state)).await;
    }

    /// Report a failed status probe for a server.
    pub async fn probe_failed(&self, server: &ServerId) {
        let tx = self.mailbox(server).await;
        let _ = tx.send(ControllerMsg::ProbeFailed).await;
    }

    /// Read-only view of one server's controller state.
    pub async fn snapshot(&self, server: &ServerId) -> Option<Snapshot> {
        let tx = {
            let controllers = self.controllers.read().await;
            controllers.get(server).map(|h| h.tx.clone())?
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(ControllerMsg::Inspect(reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }

    /// Read-only view of every known controller.
    pub async fn snapshots(&self) -> Vec<Snapshot> {
        let txs: Vec<_> = {
            let controllers = self.controllers.read().await;
            controllers.values().map(|h| h.tx.clone()).collect()
        };

        let mut out = Vec::with_capacity(txs.len());
        for tx in txs {
            let (reply_tx, reply_rx) = oneshot::channel();
            if tx.send(ControllerMsg::Inspect(reply_tx)).await.is_ok() {
                if let Ok(snapshot) = reply_rx.await {
                    out.push(snapshot);
                }
            }
        }
        out
    }

    /// Get the mailbox for a server, creating its controller on first
    /// reference.
    async fn mailbox(&self, server: &ServerId) -> mpsc::Sender<ControllerMsg> {
        {
            let controllers = self.controllers.read().await;
            if let Some(handle) = controllers.get(server) {
                return handle.tx.clone();
            }
        }

        let mut controllers = self.controllers.write().await;
        // Double-check: another task may have created it while we waited
        if let Some(handle) = controllers.get(server) {
            return handle.tx.clone();
        }

        let handle = self.spawn_controller(server);
        let tx = handle.tx.clone();
        controllers.insert(server.clone(), handle);
        tx
    }

    fn spawn_controller(&self, server: &ServerId) -> ControllerHandle {
        let lifecycle = &self.config.lifecycle;
        let entry = self.config.servers.get(server.as_str());
        let managed = entry.is_some();

        if !managed {
            // Known to the queue subsystem but not to us: occupancy is
            // tracked, power is never touched.
            tracing::warn!(
                "Ignoring unknown server '{}': no panel mapping in configuration",
                server
            );
        }

        let params = ControllerParams {
            cooldown: entry
                .map(|e| e.effective_cooldown(lifecycle))
                .unwrap_or_else(|| lifecycle.cooldown()),
            confirm_timeout: lifecycle.confirm_timeout(),
            idle_policy: lifecycle.idle_policy,
            retry: RetryPolicy::with_base(lifecycle.retry_cap(), lifecycle.backoff_base()),
            probe_failure_threshold: lifecycle.probe_failure_threshold(),
        };

        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let controller = LifecycleController::new(
            server.clone(),
            managed,
            params,
            Arc::clone(&self.panel),
            Arc::clone(&self.queue),
            self.notifier.clone(),
            tx.clone(),
        );

        let cancel = self.cancel.child_token();
        let join = tokio::spawn(controller.run(rx, cancel));

        tracing::debug!("Created controller for '{}' (managed: {})", server, managed);
        ControllerHandle { tx, join }
    }

    /// Spawn the periodic sweep task. Ticks are jittered slightly so
    /// multiple bridge instances don't synchronize against the panel.
    pub fn spawn_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        let cancel = self.cancel.child_token();
        let interval_duration = self.config.lifecycle.sweep_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_duration);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Sweep loop shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        apply_sweep_jitter().await;
                        dispatcher.sweep_once().await;
                    }
                }
            }
        })
    }

    async fn sweep_once(&self) {
        let txs: Vec<_> = {
            let controllers = self.controllers.read().await;
            controllers.values().map(|h| h.tx.clone()).collect()
        };

        for tx in txs {
            // A full mailbox means the controller is busy; it will see the
            // next tick.
            let _ = tx.try_send(ControllerMsg::SweepTick);
        }
    }

    /// Cancel the sweep, close every mailbox, and wait for the controllers
    /// to finish. In-flight panel calls are abandoned; nothing is assumed
    /// successful without a confirmed result.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let handles: Vec<_> = {
            let mut controllers = self.controllers.write().await;
            controllers.drain().map(|(_, h)| h).collect()
        };

        let joins: Vec<_> = handles
            .into_iter()
            .map(|h| {
                drop(h.tx);
                h.join
            })
            .collect();
        for result in futures::future::join_all(joins).await {
            if let Err(e) = result {
                if e.is_panic() {
                    tracing::error!("Controller task panicked during shutdown: {}", e);
                }
            }
        }
    }

    /// Servers with a panel mapping, i.e. the ones worth probing.
    pub fn managed_servers(&self) -> Vec<ServerId> {
        self.config
            .servers
            .keys()
            .map(|name| ServerId::from(name.as_str()))
            .collect()
    }
}

/// Small random delay so sweeps from multiple instances never line up.
async fn apply_sweep_jitter() {
    use rand::Rng;
    let jitter_ms = {
        let mut rng = rand::thread_rng();
        rng.gen_range(0..=250)
    };
    tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
}
