//! The bridge: top-level owner of the queue-to-panel lifecycle machinery.
//!
//! Owns the panel client, the dispatcher with its per-server controllers,
//! the status poller, and the observability notifier. The per-server state
//! store lives inside the dispatcher and is only reachable through its
//! per-key mailboxes; there is no global registry.
//!
//! # Concurrency Model
//!
//! - Read-side methods take `&self`; interior state is behind the
//!   dispatcher's locks
//! - A `CancellationToken` cancels the sweep, the poller, and every
//!   controller
//! - Shutdown runs exactly once even with concurrent calls; in-flight panel
//!   calls are abandoned without corrupting per-server state

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::controller::Snapshot;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::ingest::QueueEvent;
use crate::observe::{BridgeEvent, Notifier};
use crate::panel::{HttpPanelClient, PanelApi};
use crate::probe::StatusPoller;
use crate::queue::{NoopQueueControl, QueueControl};
use crate::state::ServerId;

/// Capacity of the inbound event channel; bursts beyond it backpressure the
/// feeder, never the controllers.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub struct Bridge {
    dispatcher: Arc<Dispatcher>,
    notifier: Notifier,
    cancel: CancellationToken,
    event_tx: mpsc::Sender<QueueEvent>,
    tasks: Vec<JoinHandle<()>>,
    shutdown_done: AtomicBool,
}

impl Bridge {
    /// Build a bridge over an HTTP panel client from configuration.
    pub fn new(config: Config) -> Result<Self> {
        let panel: Arc<dyn PanelApi> = Arc::new(HttpPanelClient::from_config(&config)?);
        Ok(Self::builder(config).panel(panel).build())
    }

    pub fn builder(config: Config) -> BridgeBuilder {
        BridgeBuilder {
            config,
            panel: None,
            queue: None,
        }
    }

    /// Sender for queue events; clone freely. Events are routed FIFO per
    /// server to that server's controller.
    pub fn event_sender(&self) -> mpsc::Sender<QueueEvent> {
        self.event_tx.clone()
    }

    /// Subscribe to state-transition and action-outcome events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<BridgeEvent> {
        self.notifier.subscribe()
    }

    pub async fn snapshot(&self, server: &ServerId) -> Option<Snapshot> {
        self.dispatcher.snapshot(server).await
    }

    pub async fn snapshots(&self) -> Vec<Snapshot> {
        self.dispatcher.snapshots().await
    }

    /// Cancelled when shutdown begins; useful for callers driving the event
    /// feed.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the sweep and poller, close every controller mailbox, and wait
    /// for them to finish. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if self.shutdown_done.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Shutting down bridge");
        self.cancel.cancel();
        self.dispatcher.shutdown().await;
        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
    }
}

pub struct BridgeBuilder {
    config: Config,
    panel: Option<Arc<dyn PanelApi>>,
    queue: Option<Arc<dyn QueueControl>>,
}

impl BridgeBuilder {
    pub fn panel(mut self, panel: Arc<dyn PanelApi>) -> Self {
        self.panel = Some(panel);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn QueueControl>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn build(self) -> Bridge {
        let panel = self
            .panel
            .expect("BridgeBuilder requires a panel implementation");
        let queue = self.queue.unwrap_or_else(|| Arc::new(NoopQueueControl));
        let notifier = Notifier::new();
        let cancel = CancellationToken::new();

        let dispatcher = Arc::new(Dispatcher::new(
            self.config.clone(),
            Arc::clone(&panel),
            queue,
            notifier.clone(),
            cancel.clone(),
        ));

        let mut tasks = Vec::new();

        // Inbound event pump: one task funnels the event channel into the
        // dispatcher, which fans out per server.
        let (event_tx, mut event_rx) = mpsc::channel::<QueueEvent>(EVENT_CHANNEL_CAPACITY);
        {
            let dispatcher = Arc::clone(&dispatcher);
            let cancel = cancel.child_token();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        event = event_rx.recv() => match event {
                            Some(event) => dispatcher.deliver_event(event).await,
                            None => break,
                        },
                    }
                }
            }));
        }

        tasks.push(dispatcher.spawn_sweep());

        let poller = StatusPoller::new(
            Arc::clone(&dispatcher),
            Arc::clone(&panel),
            cancel.child_token(),
        );
        tasks.push(poller.spawn(self.config.lifecycle.poll_interval()));

        tracing::info!(
            "Bridge started: {} managed server(s), cooldown {:?}, sweep {:?}",
            self.config.servers.len(),
            self.config.lifecycle.cooldown(),
            self.config.lifecycle.sweep_interval()
        );

        Bridge {
            dispatcher,
            notifier,
            cancel,
            event_tx,
            tasks,
            shutdown_done: AtomicBool::new(false),
        }
    }
}
