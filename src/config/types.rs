//! Core configuration structure.

use super::parse_duration_string;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default idle cooldown before a powered-on server with an empty queue is
/// shut down (120 seconds).
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(120);

/// Default timeout for a single panel API call (30 seconds).
const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default optimistic confirmation window after a power-on is acknowledged
/// before the power state is polled explicitly (30 seconds).
const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

/// Default minimum spacing between outbound panel calls (500 milliseconds).
const DEFAULT_RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(500);

/// Default interval between dispatcher sweep ticks (2 seconds).
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(2);

/// Default interval between power-state probes per server (10 seconds).
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of action re-attempts before giving up.
const DEFAULT_RETRY_CAP: u32 = 5;

/// Default consecutive failed probes before a server's queue is paused.
const DEFAULT_PROBE_FAILURE_THRESHOLD: u32 = 3;

/// Default delay before the first action re-attempt (1 second; doubles).
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Top-level configuration, loaded from `queuewarden.yaml`.
///
/// ```yaml
/// panel:
///   base_url: "https://panel.example.net"
///   api_key: "ptlc_..."
///
/// servers:
///   survival:
///     panel_id: "8f3c2a1b"
///   creative:
///     panel_id: "d41e9c77"
///     cooldown: "5m"
///
/// lifecycle:
///   cooldown: "120s"
///   retry_cap: 5
///   idle_policy: queued-and-playing
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Orchestration panel endpoint and credential
    pub panel: PanelConfig,

    /// Managed servers, keyed by the queue subsystem's server name
    #[serde(default)]
    pub servers: HashMap<String, ServerEntry>,

    /// Lifecycle tuning knobs (all optional, sensible defaults)
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// Panel endpoint and credential supplied at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Base URL of the panel API, e.g. "https://panel.example.net"
    pub base_url: String,

    /// Client API key used as a bearer token
    pub api_key: String,
}

/// A single managed backend server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEntry {
    /// The panel's identifier for this server
    pub panel_id: String,

    /// Per-server idle cooldown override (e.g. "5m"); falls back to
    /// `lifecycle.cooldown` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<String>,
}

impl ServerEntry {
    /// Effective cooldown for this server, given the global lifecycle config.
    pub fn effective_cooldown(&self, lifecycle: &LifecycleConfig) -> Duration {
        self.cooldown
            .as_deref()
            .and_then(parse_duration_string)
            .unwrap_or_else(|| lifecycle.cooldown())
    }
}

/// Which occupancy counts must be zero before idle shutdown is considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IdlePolicy {
    /// Only the queued count matters; connected players are ignored
    QueuedOnly,
    /// Both queued and connected/playing counts must be zero
    #[default]
    QueuedAndPlaying,
}

/// Lifecycle tuning knobs.
///
/// Durations are human-readable strings ("120s", "500ms", "2m"); unparseable
/// values fall back to the defaults at read time, and `Config::validate`
/// rejects them up front.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LifecycleConfig {
    /// Idle cooldown before power-off ("120s" default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<String>,

    /// Per-call panel timeout ("30s" default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_timeout: Option<String>,

    /// Optimistic wake confirmation window ("30s" default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_timeout: Option<String>,

    /// Action re-attempt cap (5 default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_cap: Option<u32>,

    /// Delay before the first re-attempt, doubling per failure ("1s" default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_base: Option<String>,

    /// Minimum spacing between outbound panel calls ("500ms" default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_interval: Option<String>,

    /// Dispatcher sweep interval ("2s" default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_interval: Option<String>,

    /// Power-state probe interval ("10s" default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,

    /// Consecutive failed probes before the queue is paused (3 default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_failure_threshold: Option<u32>,

    /// Idle shutdown policy (queued-and-playing default)
    #[serde(default)]
    pub idle_policy: IdlePolicy,
}

impl LifecycleConfig {
    fn duration_or(&self, field: &Option<String>, default: Duration) -> Duration {
        field
            .as_deref()
            .and_then(parse_duration_string)
            .unwrap_or(default)
    }

    pub fn cooldown(&self) -> Duration {
        self.duration_or(&self.cooldown, DEFAULT_COOLDOWN)
    }

    pub fn action_timeout(&self) -> Duration {
        self.duration_or(&self.action_timeout, DEFAULT_ACTION_TIMEOUT)
    }

    pub fn confirm_timeout(&self) -> Duration {
        self.duration_or(&self.confirm_timeout, DEFAULT_CONFIRM_TIMEOUT)
    }

    pub fn rate_limit_interval(&self) -> Duration {
        self.duration_or(&self.rate_limit_interval, DEFAULT_RATE_LIMIT_INTERVAL)
    }

    pub fn sweep_interval(&self) -> Duration {
        self.duration_or(&self.sweep_interval, DEFAULT_SWEEP_INTERVAL)
    }

    pub fn poll_interval(&self) -> Duration {
        self.duration_or(&self.poll_interval, DEFAULT_POLL_INTERVAL)
    }

    pub fn retry_cap(&self) -> u32 {
        self.retry_cap.unwrap_or(DEFAULT_RETRY_CAP)
    }

    pub fn backoff_base(&self) -> Duration {
        self.duration_or(&self.backoff_base, DEFAULT_BACKOFF_BASE)
    }

    pub fn probe_failure_threshold(&self) -> u32 {
        self.probe_failure_threshold
            .unwrap_or(DEFAULT_PROBE_FAILURE_THRESHOLD)
    }
}
