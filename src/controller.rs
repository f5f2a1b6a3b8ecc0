//! Per-server lifecycle controller.
//!
//! One controller instance exists per server id, driven entirely by messages
//! from its mailbox: occupancy deltas, sweep ticks, panel action results,
//! power observations, and its own scheduled timers. The mailbox is the
//! serialization point: all mutation of a server's record happens on this
//! single message stream, so no locking is needed and per-server ordering is
//! guaranteed by construction.
//!
//! Panel calls never run on the mailbox task. Issuing an action spawns a
//! task that performs the (rate-limited, deadline-bounded) call and posts an
//! `ActionResult` back into the mailbox; backoff windows are likewise
//! scheduled as timer messages rather than slept out inline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::IdlePolicy;
use crate::error::Result;
use crate::ingest::{OccupancyChange, OccupancyDelta};
use crate::observe::{BridgeEvent, Notifier};
use crate::panel::{PanelApi, RetryPolicy};
use crate::queue::QueueControl;
use crate::state::{ActionKind, Lifecycle, PendingAction, PowerState, ServerId, ServerRecord};

/// Mailbox capacity per controller; senders experience backpressure beyond it.
pub const MAILBOX_CAPACITY: usize = 64;

/// Everything a controller can be told.
#[derive(Debug)]
pub enum ControllerMsg {
    /// A normalized occupancy change from the queue subsystem
    Delta(OccupancyDelta),
    /// Periodic re-evaluation from the dispatcher sweep
    SweepTick,
    /// Outcome of a previously issued panel action
    ActionResult {
        kind: ActionKind,
        attempt: u32,
        outcome: Result<PowerState>,
    },
    /// A scheduled backoff window elapsed; the pending action may re-issue
    BackoffElapsed { kind: ActionKind },
    /// The optimistic wake confirmation window elapsed
    ConfirmTimeout,
    /// A power state observed by the status poller (or an explicit query)
    PowerObserved(PowerState),
    /// A status probe failed
    ProbeFailed,
    /// Read-only view of the controller's record
    Inspect(oneshot::Sender<Snapshot>),
}

/// Point-in-time view of a controller's state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub server: ServerId,
    pub lifecycle: Lifecycle,
    pub power: PowerState,
    pub queued: u32,
    pub playing: Option<u32>,
    pub pending: Option<(ActionKind, u32)>,
    pub queue_paused: bool,
}

/// Per-server tuning derived from configuration.
#[derive(Debug, Clone)]
pub struct ControllerParams {
    pub cooldown: Duration,
    pub confirm_timeout: Duration,
    pub idle_policy: IdlePolicy,
    pub retry: RetryPolicy,
    pub probe_failure_threshold: u32,
}

pub struct LifecycleController {
    record: ServerRecord,
    params: ControllerParams,
    panel: Arc<dyn PanelApi>,
    queue: Arc<dyn QueueControl>,
    notifier: Notifier,
    /// Self-sender for action results and scheduled timers
    tx: mpsc::Sender<ControllerMsg>,
    /// True while a panel call is actually outstanding. `record.pending` can
    /// outlive this (retained across a backoff window); a new action may
    /// only be issued when both are clear.
    in_flight: bool,
}

impl LifecycleController {
    pub fn new(
        id: ServerId,
        managed: bool,
        params: ControllerParams,
        panel: Arc<dyn PanelApi>,
        queue: Arc<dyn QueueControl>,
        notifier: Notifier,
        tx: mpsc::Sender<ControllerMsg>,
    ) -> Self {
        Self {
            record: ServerRecord::new(id, managed),
            params,
            panel,
            queue,
            notifier,
            tx,
            in_flight: false,
        }
    }

    /// Consume the mailbox until cancellation or until every sender is
    /// dropped. The controller itself holds a sender for timers and action
    /// results, so cancellation is the normal way down.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ControllerMsg>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle(msg).await,
                    None => break,
                },
            }
        }
        tracing::debug!("Controller for '{}' stopped", self.record.id);
    }

    pub async fn handle(&mut self, msg: ControllerMsg) {
        match msg {
            ControllerMsg::Delta(delta) => self.handle_delta(delta),
            ControllerMsg::SweepTick => self.handle_sweep(),
            ControllerMsg::ActionResult {
                kind,
                attempt,
                outcome,
            } => self.handle_action_result(kind, attempt, outcome),
            ControllerMsg::BackoffElapsed { kind } => self.handle_backoff_elapsed(kind),
            ControllerMsg::ConfirmTimeout => self.handle_confirm_timeout(),
            ControllerMsg::PowerObserved(state) => self.handle_power_observed(state).await,
            ControllerMsg::ProbeFailed => self.handle_probe_failed().await,
            ControllerMsg::Inspect(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            server: self.record.id.clone(),
            lifecycle: self.record.lifecycle,
            power: self.record.power,
            queued: self.record.occupancy.queued,
            playing: self.record.occupancy.playing,
            pending: self
                .record
                .pending
                .as_ref()
                .map(|p| (p.kind, p.attempt)),
            queue_paused: self.record.queue_paused,
        }
    }

    // ── occupancy ───────────────────────────────────────────────────────

    fn handle_delta(&mut self, delta: OccupancyDelta) {
        let queued_was_zero = self.record.occupancy.queued == 0;

        match delta.change {
            OccupancyChange::Increment => self.record.occupancy.increment(),
            OccupancyChange::Decrement => {
                if self.record.occupancy.decrement() {
                    self.notifier.emit(BridgeEvent::OccupancyInconsistency {
                        server: self.record.id.clone(),
                    });
                }
            }
            OccupancyChange::Reset => self.record.occupancy.clear(),
        }
        if let Some(playing) = delta.playing {
            self.record.occupancy.playing = Some(playing);
        }

        if !self.record.managed {
            // Occupancy is tracked for unmanaged servers but no power
            // decisions are ever made for them.
            return;
        }

        let edge = queued_was_zero && self.record.occupancy.queued > 0;
        if self.record.occupancy.is_idle(self.params.idle_policy) {
            self.on_occupancy_idle();
        } else {
            self.on_occupancy_present(edge);
        }
    }

    /// Occupancy is non-idle. `edge` marks a fresh 0 -> >0 queued transition,
    /// which is what arms a wake; drift repair paths don't need it.
    fn on_occupancy_present(&mut self, edge: bool) {
        match self.record.lifecycle {
            Lifecycle::IdleOff => match self.record.power {
                PowerState::Off | PowerState::Unknown if edge => {
                    if self.transition(Lifecycle::Waking) {
                        self.issue_action(ActionKind::PowerOn);
                    }
                }
                PowerState::On => {
                    // Panel drift: the server is already running
                    self.transition(Lifecycle::Active);
                }
                PowerState::Starting => {
                    // Someone else is starting it; wait for confirmation
                    self.transition(Lifecycle::Waking);
                    self.schedule(
                        ControllerMsg::ConfirmTimeout,
                        self.params.confirm_timeout,
                    );
                }
                _ => {}
            },
            Lifecycle::Cooling => {
                // A client arrived before the cooldown elapsed; the shutdown
                // intent is cancelled without any panel call having been made.
                self.record.cooldown_until = None;
                self.transition(Lifecycle::Active);
            }
            Lifecycle::ErrorBackoff => {
                if let Some(pending) = &self.record.pending {
                    if pending.kind == ActionKind::PowerOff && !self.in_flight {
                        // Clients are back; stop retrying the shutdown. The
                        // server is still up since the off action failed.
                        self.record.pending = None;
                        self.transition(Lifecycle::Active);
                    }
                }
            }
            Lifecycle::Waking | Lifecycle::Active | Lifecycle::Stopping => {}
        }
    }

    fn on_occupancy_idle(&mut self) {
        if self.record.lifecycle == Lifecycle::Active {
            self.start_cooldown();
        }
    }

    fn start_cooldown(&mut self) {
        self.record.cooldown_until = Some(Instant::now() + self.params.cooldown);
        self.transition(Lifecycle::Cooling);
    }

    // ── sweep ───────────────────────────────────────────────────────────

    fn handle_sweep(&mut self) {
        if self.record.lifecycle != Lifecycle::Cooling {
            return;
        }
        if !self.record.occupancy.is_idle(self.params.idle_policy) {
            // Shouldn't happen (deltas cancel cooling), but never power off
            // a server someone is waiting for.
            self.record.cooldown_until = None;
            self.transition(Lifecycle::Active);
            return;
        }
        let elapsed = self
            .record
            .cooldown_until
            .map(|t| Instant::now() >= t)
            .unwrap_or(false);
        if elapsed {
            self.record.cooldown_until = None;
            if self.transition(Lifecycle::Stopping) {
                self.issue_action(ActionKind::PowerOff);
            }
        }
    }

    // ── panel actions ───────────────────────────────────────────────────

    /// Issue a fresh action (attempt 1). The at-most-one-in-flight invariant
    /// is enforced here: an outstanding call or retained pending action
    /// blocks a new one.
    fn issue_action(&mut self, kind: ActionKind) {
        if self.in_flight || self.record.pending.is_some() {
            tracing::error!(
                "Refusing to issue {} for '{}': an action is already pending",
                kind,
                self.record.id
            );
            return;
        }
        self.record.pending = Some(PendingAction::new(kind));
        self.dispatch_pending();
    }

    /// Spawn the panel call for the current pending action.
    fn dispatch_pending(&mut self) {
        let pending = match &self.record.pending {
            Some(p) => p,
            None => return,
        };
        let kind = pending.kind;
        let attempt = pending.attempt;
        self.in_flight = true;

        self.notifier.emit(BridgeEvent::ActionIssued {
            server: self.record.id.clone(),
            kind,
            attempt,
        });

        let panel = Arc::clone(&self.panel);
        let server = self.record.id.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = match kind {
                ActionKind::PowerOn => panel.power_on(&server).await,
                ActionKind::PowerOff => panel.power_off(&server).await,
            };
            // Mailbox gone means the bridge is shutting down
            let _ = tx
                .send(ControllerMsg::ActionResult {
                    kind,
                    attempt,
                    outcome,
                })
                .await;
        });
    }

    fn handle_action_result(&mut self, kind: ActionKind, attempt: u32, outcome: Result<PowerState>) {
        self.in_flight = false;

        let matches_pending = self
            .record
            .pending
            .as_ref()
            .map(|p| p.kind == kind && p.attempt == attempt)
            .unwrap_or(false);
        if !matches_pending {
            // A stale result (e.g. a power-off retry that was abandoned when
            // clients returned). The call itself was idempotent; ignore it.
            tracing::debug!(
                "Ignoring stale {} result for '{}' (attempt {})",
                kind,
                self.record.id,
                attempt
            );
            return;
        }

        match outcome {
            Ok(observed) => {
                self.record.pending = None;
                self.record.power = observed;
                self.notifier.emit(BridgeEvent::ActionSucceeded {
                    server: self.record.id.clone(),
                    kind,
                    observed,
                });
                match kind {
                    ActionKind::PowerOn => self.after_power_on(observed),
                    ActionKind::PowerOff => self.after_power_off(),
                }
            }
            Err(e) => {
                let transient = e.is_transient();
                self.notifier.emit(BridgeEvent::ActionFailed {
                    server: self.record.id.clone(),
                    kind,
                    attempt,
                    transient,
                    reason: e.to_string(),
                });

                if transient && self.params.retry.allows_retry(attempt) {
                    self.transition(Lifecycle::ErrorBackoff);
                    let delay = self.params.retry.delay_for(attempt);
                    self.schedule(ControllerMsg::BackoffElapsed { kind }, delay);
                } else {
                    if transient {
                        self.notifier.emit(BridgeEvent::ActionAbandoned {
                            server: self.record.id.clone(),
                            kind,
                            attempts: attempt,
                        });
                    }
                    // Terminal failure or attempts exhausted: surface and
                    // fall back rather than stall forever. The next queued
                    // client or probe observation starts a fresh cycle.
                    self.record.pending = None;
                    self.record.power = PowerState::Unknown;
                    self.transition(Lifecycle::IdleOff);
                }
            }
        }
    }

    fn after_power_on(&mut self, observed: PowerState) {
        if observed == PowerState::On {
            if self.record.occupancy.is_idle(self.params.idle_policy) {
                // Everyone left while the server booted
                self.start_cooldown();
            } else {
                self.transition(Lifecycle::Active);
            }
        } else {
            // Acknowledged but still booting; stay Waking until the poller
            // confirms, with an explicit query as a fallback.
            self.schedule(ControllerMsg::ConfirmTimeout, self.params.confirm_timeout);
        }
    }

    fn after_power_off(&mut self) {
        self.transition(Lifecycle::IdleOff);
        self.record.power = PowerState::Off;
        // Clients may have queued while the shutdown was in flight
        if !self.record.occupancy.is_idle(self.params.idle_policy) {
            self.on_occupancy_present(true);
        }
    }

    fn handle_backoff_elapsed(&mut self, kind: ActionKind) {
        if self.record.lifecycle != Lifecycle::ErrorBackoff || self.in_flight {
            return;
        }
        if self.record.pending.as_ref().map(|p| p.kind) != Some(kind) {
            return;
        }

        // Clients may have queued while the failed power-off was in flight;
        // the server is still up, so drop the retry and serve them.
        if kind == ActionKind::PowerOff
            && !self.record.occupancy.is_idle(self.params.idle_policy)
        {
            self.record.pending = None;
            self.transition(Lifecycle::Active);
            return;
        }

        let pending = match &mut self.record.pending {
            Some(p) => p,
            None => return,
        };
        pending.attempt += 1;
        pending.issued_at = Utc::now();

        let next = match kind {
            ActionKind::PowerOn => Lifecycle::Waking,
            ActionKind::PowerOff => Lifecycle::Stopping,
        };
        if self.transition(next) {
            self.dispatch_pending();
        }
    }

    fn handle_confirm_timeout(&mut self) {
        if self.record.lifecycle != Lifecycle::Waking || self.in_flight {
            return;
        }
        // Confirmation is slow; ask the panel directly. The answer arrives
        // as a PowerObserved message.
        let panel = Arc::clone(&self.panel);
        let server = self.record.id.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if let Ok(state) = panel.power_state(&server).await {
                let _ = tx.send(ControllerMsg::PowerObserved(state)).await;
            }
        });
    }

    // ── observations ────────────────────────────────────────────────────

    async fn handle_power_observed(&mut self, state: PowerState) {
        self.record.probe_failures = 0;
        if self.record.queue_paused {
            self.record.queue_paused = false;
            self.notifier.emit(BridgeEvent::QueueUnpaused {
                server: self.record.id.clone(),
            });
            if let Err(e) = self.queue.unpause(&self.record.id).await {
                tracing::warn!("Failed to unpause queue for '{}': {}", self.record.id, e);
            }
        }

        self.record.power = state;

        // While an action is outstanding or awaiting re-attempt, its result
        // handler owns the lifecycle; observations only refresh the power
        // field.
        if self.record.pending.is_some() {
            return;
        }

        match (state, self.record.lifecycle) {
            (PowerState::On, Lifecycle::Waking) => {
                if self.record.occupancy.is_idle(self.params.idle_policy) {
                    self.start_cooldown();
                } else {
                    self.transition(Lifecycle::Active);
                }
            }
            (PowerState::On, Lifecycle::IdleOff) => {
                // Started outside the bridge. With occupancy it is simply
                // active; idle, it gets a cooldown so it still idles down.
                if self.record.occupancy.is_idle(self.params.idle_policy) {
                    self.start_cooldown();
                } else {
                    self.transition(Lifecycle::Active);
                }
            }
            (PowerState::Off, Lifecycle::Waking) => {
                if self.record.occupancy.is_idle(self.params.idle_policy) {
                    // Demand vanished while the wake hung; let it rest
                    self.transition(Lifecycle::IdleOff);
                } else {
                    // The acknowledged start never took; try again
                    self.issue_action(ActionKind::PowerOn);
                }
            }
            (PowerState::Off, Lifecycle::Active | Lifecycle::Cooling) => {
                // Stopped outside the bridge; re-wake on the next queued
                // client.
                self.record.cooldown_until = None;
                self.transition(Lifecycle::IdleOff);
            }
            _ => {}
        }
    }

    async fn handle_probe_failed(&mut self) {
        self.record.probe_failures = self.record.probe_failures.saturating_add(1);

        if self.record.probe_failures >= self.params.probe_failure_threshold
            && !self.record.queue_paused
        {
            self.record.queue_paused = true;
            self.notifier.emit(BridgeEvent::QueuePaused {
                server: self.record.id.clone(),
                failures: self.record.probe_failures,
            });
            if let Err(e) = self.queue.pause(&self.record.id).await {
                tracing::warn!("Failed to pause queue for '{}': {}", self.record.id, e);
            }
        }
    }

    // ── plumbing ────────────────────────────────────────────────────────

    /// Apply a lifecycle transition, rejecting illegal ones.
    fn transition(&mut self, to: Lifecycle) -> bool {
        let from = self.record.lifecycle;
        if from == to {
            return true;
        }
        if !from.is_valid_transition(to) {
            tracing::error!(
                "Rejecting illegal transition {} -> {} for '{}'",
                from,
                to,
                self.record.id
            );
            return false;
        }
        self.record.lifecycle = to;
        self.record.last_transition_at = Utc::now();
        self.notifier.emit(BridgeEvent::Transition {
            server: self.record.id.clone(),
            from,
            to,
            at: self.record.last_transition_at,
        });
        true
    }

    /// Deliver `msg` to our own mailbox after `delay`.
    fn schedule(&self, msg: ControllerMsg, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(msg).await;
        });
    }
}
