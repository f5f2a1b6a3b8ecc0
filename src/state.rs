//! Per-server state: identifiers, occupancy, power, and the lifecycle
//! state machine's legal transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::config::IdlePolicy;

/// Opaque identifier for a backend server, as the queue subsystem names it.
///
/// Stable for the server's lifetime. The panel uses a separate identifier,
/// joined to this one through configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ServerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Last power state observed from the panel.
///
/// Owned exclusively by the server's lifecycle controller; the panel client
/// only reports observations that the controller folds in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    /// No observation yet, or the last action failed terminally
    Unknown,
    /// Server is powered off
    Off,
    /// Server is booting
    Starting,
    /// Server is running
    On,
    /// Server is shutting down
    Stopping,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::Unknown => write!(f, "unknown"),
            PowerState::Off => write!(f, "off"),
            PowerState::Starting => write!(f, "starting"),
            PowerState::On => write!(f, "on"),
            PowerState::Stopping => write!(f, "stopping"),
        }
    }
}

/// The two power actions the bridge can request from the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    PowerOn,
    PowerOff,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::PowerOn => "power-on",
            ActionKind::PowerOff => "power-off",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single outstanding panel action for a server.
///
/// At most one exists per server at any instant; completion or terminal
/// failure clears it. While the controller waits out a backoff window the
/// record is retained (nothing is in flight) so a re-attempt reuses the kind
/// and attempt count.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub kind: ActionKind,
    pub issued_at: DateTime<Utc>,
    pub attempt: u32,
}

impl PendingAction {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            issued_at: Utc::now(),
            attempt: 1,
        }
    }
}

/// Queue occupancy for a server: clients waiting, and clients playing where
/// the queue subsystem reports them.
///
/// Counts never go negative; an underflowing decrement clamps to zero and is
/// reported as an inconsistency by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOccupancy {
    pub queued: u32,
    pub playing: Option<u32>,
}

impl QueueOccupancy {
    pub fn increment(&mut self) {
        self.queued = self.queued.saturating_add(1);
    }

    /// Returns `true` if the decrement underflowed and was clamped.
    #[must_use]
    pub fn decrement(&mut self) -> bool {
        if self.queued == 0 {
            return true;
        }
        self.queued -= 1;
        false
    }

    pub fn clear(&mut self) {
        self.queued = 0;
    }

    /// Whether this occupancy counts as idle under the configured policy.
    pub fn is_idle(&self, policy: IdlePolicy) -> bool {
        match policy {
            IdlePolicy::QueuedOnly => self.queued == 0,
            IdlePolicy::QueuedAndPlaying => self.queued == 0 && self.playing.unwrap_or(0) == 0,
        }
    }
}

/// Lifecycle state of a server's controller.
///
/// The typical wake cycle is `IdleOff` → `Waking` → `Active` → `Cooling` →
/// `Stopping` → `IdleOff`.
///
/// # State Transitions
///
/// ```text
/// IdleOff ──► Waking ──► Active ◄──► Cooling
///    ▲           │          ▲           │
///    │           ▼          │           ▼
///    └─── ErrorBackoff ◄────┴────── Stopping
/// ```
///
/// `Cooling` is separate from `Active` so the idle-shutdown decision stays
/// debounced and reversible: no panel call is made until the cooldown fully
/// elapses, and a client arriving during `Cooling` cancels the shutdown
/// without a panel round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lifecycle {
    /// Powered off (or assumed so), nobody waiting
    IdleOff,
    /// Power-on requested, awaiting confirmation
    Waking,
    /// Powered on with occupancy
    Active,
    /// Powered on, occupancy reached zero, cooldown running
    Cooling,
    /// Power-off requested, awaiting confirmation
    Stopping,
    /// Last action failed; a re-attempt is scheduled
    ErrorBackoff,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::IdleOff => write!(f, "idle-off"),
            Lifecycle::Waking => write!(f, "waking"),
            Lifecycle::Active => write!(f, "active"),
            Lifecycle::Cooling => write!(f, "cooling"),
            Lifecycle::Stopping => write!(f, "stopping"),
            Lifecycle::ErrorBackoff => write!(f, "error-backoff"),
        }
    }
}

impl Lifecycle {
    /// Check if a lifecycle transition is legal.
    ///
    /// Illegal transitions indicate a controller bug; the controller rejects
    /// them rather than applying them.
    pub fn is_valid_transition(&self, to: Lifecycle) -> bool {
        use Lifecycle::*;
        match (self, to) {
            // Occupancy appears while off
            (IdleOff, Waking) => true,
            // Externally powered on: with occupancy, or idle (cooldown starts)
            (IdleOff, Active) => true,
            (IdleOff, Cooling) => true,

            // Wake confirmed
            (Waking, Active) => true,
            // Wake confirmed but occupancy already drained
            (Waking, Cooling) => true,
            // Power-on failed
            (Waking, ErrorBackoff) => true,
            // Wake failed terminally, or demand vanished before it took
            (Waking, IdleOff) => true,

            // Occupancy drained
            (Active, Cooling) => true,
            // Externally powered off
            (Active, IdleOff) => true,

            // Occupancy returned before the cooldown elapsed
            (Cooling, Active) => true,
            // Cooldown elapsed
            (Cooling, Stopping) => true,
            // Externally powered off
            (Cooling, IdleOff) => true,

            // Power-off confirmed
            (Stopping, IdleOff) => true,
            // Power-off failed
            (Stopping, ErrorBackoff) => true,

            // Re-attempts
            (ErrorBackoff, Waking) => true,
            (ErrorBackoff, Stopping) => true,
            // Gave up, or a power-off retry was preempted by new occupancy
            (ErrorBackoff, IdleOff) => true,
            (ErrorBackoff, Active) => true,

            _ => false,
        }
    }
}

/// Everything the controller tracks for one server.
///
/// Created lazily on the first event or observation for a previously-unseen
/// server and retained for the process lifetime.
#[derive(Debug)]
pub struct ServerRecord {
    pub id: ServerId,
    pub lifecycle: Lifecycle,
    pub power: PowerState,
    pub occupancy: QueueOccupancy,
    pub pending: Option<PendingAction>,
    /// Earliest instant the power-off decision may fire
    pub cooldown_until: Option<Instant>,
    pub last_transition_at: DateTime<Utc>,
    /// Consecutive failed power-state probes
    pub probe_failures: u32,
    /// Whether we paused this server's queue after repeated probe failures
    pub queue_paused: bool,
    /// False when the server has no panel mapping; occupancy is still
    /// tracked but no panel action is ever issued
    pub managed: bool,
}

impl ServerRecord {
    pub fn new(id: ServerId, managed: bool) -> Self {
        Self {
            id,
            lifecycle: Lifecycle::IdleOff,
            power: PowerState::Unknown,
            occupancy: QueueOccupancy::default(),
            pending: None,
            cooldown_until: None,
            last_transition_at: Utc::now(),
            probe_failures: 0,
            queue_paused: false,
            managed,
        }
    }
}
