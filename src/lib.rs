//! # Queuewarden
//!
//! Bridges a proxy-side connection-queueing service and a remote
//! server-orchestration panel: backend servers are powered on when clients
//! start queueing for them and allowed to idle down once queueing and
//! activity stop.
//!
//! ## Features
//!
//! - **Per-server lifecycle control**: independent state machine per backend
//!   server, serialized through an actor mailbox
//! - **Debounced idle shutdown**: a configurable cooldown must fully elapse
//!   before any power-off is issued; a returning client cancels it for free
//! - **At most one in-flight action**: duplicate concurrent panel calls for
//!   a server are impossible by construction
//! - **Bounded retries**: transient panel failures re-attempt with strictly
//!   increasing backoff, scheduled as timer messages, up to a configured cap
//! - **Rate limiting**: one global gate spaces all outbound panel calls
//! - **Drift reconciliation**: periodic power-state probes fold external
//!   starts/stops back into the controllers, and pause a server's queue
//!   after repeated probe failures
//!
//! ## Quick Start
//!
//! ```no_run
//! use queuewarden::{Bridge, Parser};
//! use queuewarden::ingest::{EventKind, QueueEvent};
//!
//! # async fn example() -> Result<(), queuewarden::Error> {
//! let parser = Parser::new();
//! let config = parser.load_config("queuewarden.yaml")?;
//! config.validate()?;
//!
//! let mut bridge = Bridge::new(config)?;
//! let events = bridge.event_sender();
//!
//! // Feed events from the queue subsystem
//! events
//!     .send(QueueEvent {
//!         server: "survival".into(),
//!         kind: EventKind::Enqueued,
//!         timestamp: chrono::Utc::now(),
//!         playing: None,
//!     })
//!     .await
//!     .ok();
//!
//! // Cleanup when done
//! bridge.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! All work for a single server (event handling, sweep re-evaluation, and
//! action-result callbacks) flows through that server's mailbox and is
//! handled by one task, so per-server state is never mutated concurrently.
//! Panel calls run in spawned tasks and post their results back into the
//! same mailbox; different servers proceed fully in parallel.

pub mod bridge;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod observe;
pub mod panel;
pub mod probe;
pub mod queue;
pub mod state;

// Re-export commonly used types
pub use bridge::Bridge;
pub use config::{Config, IdlePolicy, Parser};
pub use error::{Error, Result};
pub use observe::{BridgeEvent, Notifier};
pub use panel::{HttpPanelClient, PanelApi};
pub use queue::{NoopQueueControl, QueueControl};
pub use state::{ActionKind, Lifecycle, PowerState, ServerId};
