//! Observability output: state-transition and action-outcome events.
//!
//! Every transition and action outcome is published on a broadcast channel
//! for external collection and mirrored to structured logs. Lagging or
//! absent subscribers never block the controllers.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::state::{ActionKind, Lifecycle, PowerState, ServerId};

/// Capacity of the broadcast buffer; slow subscribers lose oldest events.
const EVENT_BUFFER: usize = 256;

/// An observable event from the bridge.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A controller moved between lifecycle states
    Transition {
        server: ServerId,
        from: Lifecycle,
        to: Lifecycle,
        at: DateTime<Utc>,
    },
    /// A panel action was issued
    ActionIssued {
        server: ServerId,
        kind: ActionKind,
        attempt: u32,
    },
    /// A panel action completed successfully
    ActionSucceeded {
        server: ServerId,
        kind: ActionKind,
        observed: PowerState,
    },
    /// A panel action failed; a re-attempt may be scheduled
    ActionFailed {
        server: ServerId,
        kind: ActionKind,
        attempt: u32,
        transient: bool,
        reason: String,
    },
    /// A panel action was given up on after exhausting its attempts
    ActionAbandoned {
        server: ServerId,
        kind: ActionKind,
        attempts: u32,
    },
    /// An occupancy decrement underflowed and was clamped to zero
    OccupancyInconsistency { server: ServerId },
    /// A server's queue was paused after repeated failed probes
    QueuePaused { server: ServerId, failures: u32 },
    /// A server's queue was unpaused after a successful probe
    QueueUnpaused { server: ServerId },
}

/// Broadcast publisher for bridge events.
///
/// Cloneable; all clones share one channel. Dropping every subscriber is
/// fine -- `emit` ignores the no-receiver case.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<BridgeEvent>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: BridgeEvent) {
        match &event {
            BridgeEvent::Transition {
                server, from, to, ..
            } => {
                tracing::info!("Server '{}' transitioned {} -> {}", server, from, to);
            }
            BridgeEvent::ActionIssued {
                server,
                kind,
                attempt,
            } => {
                tracing::info!("Issuing {} for '{}' (attempt {})", kind, server, attempt);
            }
            BridgeEvent::ActionSucceeded {
                server,
                kind,
                observed,
            } => {
                tracing::info!("{} for '{}' succeeded, observed {}", kind, server, observed);
            }
            BridgeEvent::ActionFailed {
                server,
                kind,
                attempt,
                transient,
                reason,
            } => {
                if *transient {
                    tracing::warn!(
                        "{} for '{}' failed (attempt {}): {}",
                        kind,
                        server,
                        attempt,
                        reason
                    );
                } else {
                    tracing::error!("{} for '{}' failed terminally: {}", kind, server, reason);
                }
            }
            BridgeEvent::ActionAbandoned {
                server,
                kind,
                attempts,
            } => {
                tracing::error!(
                    "Giving up on {} for '{}' after {} attempts",
                    kind,
                    server,
                    attempts
                );
            }
            BridgeEvent::OccupancyInconsistency { server } => {
                tracing::warn!(
                    "Occupancy for '{}' would have gone negative; clamped to zero",
                    server
                );
            }
            BridgeEvent::QueuePaused { server, failures } => {
                tracing::warn!(
                    "Pausing queue for '{}' after {} consecutive failed probes",
                    server,
                    failures
                );
            }
            BridgeEvent::QueueUnpaused { server } => {
                tracing::info!("Unpausing queue for '{}'", server);
            }
        }

        // No receivers is not an error
        let _ = self.tx.send(event);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        notifier.emit(BridgeEvent::Transition {
            server: "survival".into(),
            from: Lifecycle::IdleOff,
            to: Lifecycle::Waking,
            at: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            BridgeEvent::Transition { server, from, to, .. } => {
                assert_eq!(server.as_str(), "survival");
                assert_eq!(from, Lifecycle::IdleOff);
                assert_eq!(to, Lifecycle::Waking);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        let notifier = Notifier::new();
        notifier.emit(BridgeEvent::QueueUnpaused {
            server: "survival".into(),
        });
    }
}
