//! Shared test scaffolding: a scripted panel and config/timing helpers.

use async_trait::async_trait;
use parking_lot::Mutex;
use queuewarden::panel::PanelApi;
use queuewarden::{Config, Error, PowerState, Result, ServerId};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Scripted outcome for a power action.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Succeed,
    Transient(&'static str),
    Terminal(&'static str),
}

#[derive(Default)]
struct MockState {
    /// Simulated panel-side power state per server
    power: HashMap<ServerId, PowerState>,
    /// Scripted outcomes per server, consumed front to back; empty = succeed
    scripts: HashMap<ServerId, VecDeque<ScriptedOutcome>>,
    /// Power actions currently in flight per server
    in_flight: HashMap<ServerId, u32>,
    /// High-water mark of concurrent power actions per server
    max_in_flight: HashMap<ServerId, u32>,
    /// Total power actions attempted per server
    action_calls: HashMap<ServerId, u32>,
    /// Instant of each power-on attempt per server
    power_on_times: HashMap<ServerId, Vec<Instant>>,
    /// Servers whose status probes currently fail
    probe_failing: std::collections::HashSet<ServerId>,
}

/// A panel that runs from a script and records what was asked of it.
///
/// The at-most-one-in-flight invariant is observed from the outside: every
/// power action bumps a per-server in-flight counter on entry and drops it
/// on exit, and the high-water mark is kept for assertions.
pub struct MockPanel {
    state: Mutex<MockState>,
    /// Artificial latency per action, to widen race windows
    latency: Duration,
}

#[allow(dead_code)]
impl MockPanel {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            latency,
        }
    }

    /// Set the simulated panel-side power state.
    pub fn set_power(&self, server: &ServerId, state: PowerState) {
        self.state.lock().power.insert(server.clone(), state);
    }

    /// Make status probes for `server` fail (or succeed again).
    pub fn set_probe_failing(&self, server: &ServerId, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.probe_failing.insert(server.clone());
        } else {
            state.probe_failing.remove(server);
        }
    }

    /// Script the next outcomes for power actions on `server`.
    pub fn script(&self, server: &ServerId, outcomes: Vec<ScriptedOutcome>) {
        self.state
            .lock()
            .scripts
            .entry(server.clone())
            .or_default()
            .extend(outcomes);
    }

    pub fn max_in_flight(&self, server: &ServerId) -> u32 {
        self.state
            .lock()
            .max_in_flight
            .get(server)
            .copied()
            .unwrap_or(0)
    }

    pub fn action_calls(&self, server: &ServerId) -> u32 {
        self.state
            .lock()
            .action_calls
            .get(server)
            .copied()
            .unwrap_or(0)
    }

    pub fn power_on_times(&self, server: &ServerId) -> Vec<Instant> {
        self.state
            .lock()
            .power_on_times
            .get(server)
            .cloned()
            .unwrap_or_default()
    }

    fn enter_action(&self, server: &ServerId) {
        let mut state = self.state.lock();
        let entry = state.in_flight.entry(server.clone()).or_insert(0);
        *entry += 1;
        let current = *entry;
        let max = state.max_in_flight.entry(server.clone()).or_insert(0);
        *max = (*max).max(current);
        *state.action_calls.entry(server.clone()).or_insert(0) += 1;
    }

    fn exit_action(&self, server: &ServerId) {
        let mut state = self.state.lock();
        if let Some(count) = state.in_flight.get_mut(server) {
            *count = count.saturating_sub(1);
        }
    }

    fn next_outcome(&self, server: &ServerId) -> ScriptedOutcome {
        self.state
            .lock()
            .scripts
            .get_mut(server)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ScriptedOutcome::Succeed)
    }

    fn run_action(&self, server: &ServerId, target: PowerState) -> Result<PowerState> {
        match self.next_outcome(server) {
            ScriptedOutcome::Succeed => {
                self.state.lock().power.insert(server.clone(), target);
                Ok(target)
            }
            ScriptedOutcome::Transient(reason) => Err(Error::PanelTransient {
                server: server.to_string(),
                reason: reason.to_string(),
            }),
            ScriptedOutcome::Terminal(reason) => Err(Error::PanelTerminal {
                server: server.to_string(),
                reason: reason.to_string(),
            }),
        }
    }
}

#[async_trait]
impl PanelApi for MockPanel {
    async fn power_on(&self, server: &ServerId) -> Result<PowerState> {
        self.enter_action(server);
        self.state
            .lock()
            .power_on_times
            .entry(server.clone())
            .or_default()
            .push(Instant::now());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = self.run_action(server, PowerState::On);
        self.exit_action(server);
        result
    }

    async fn power_off(&self, server: &ServerId) -> Result<PowerState> {
        self.enter_action(server);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = self.run_action(server, PowerState::Off);
        self.exit_action(server);
        result
    }

    async fn power_state(&self, server: &ServerId) -> Result<PowerState> {
        let state = self.state.lock();
        if state.probe_failing.contains(server) {
            return Err(Error::PanelTransient {
                server: server.to_string(),
                reason: "probe timeout".to_string(),
            });
        }
        Ok(state
            .power
            .get(server)
            .copied()
            .unwrap_or(PowerState::Off))
    }
}

/// Config tuned for fast tests: short cooldown and sweep, probing
/// effectively disabled so tests control every observation.
#[allow(dead_code)]
pub fn test_config(servers: &[&str]) -> Config {
    test_config_with_poll(servers, "1h")
}

/// Like [`test_config`] but with a caller-chosen probe interval.
#[allow(dead_code)]
pub fn test_config_with_poll(servers: &[&str], poll_interval: &str) -> Config {
    let server_entries = servers
        .iter()
        .map(|name| format!("  {}:\n    panel_id: \"panel-{}\"", name, name))
        .collect::<Vec<_>>()
        .join("\n");

    let yaml = format!(
        r#"
panel:
  base_url: "https://panel.example.net"
  api_key: "ptlc_test"
servers:
{}
lifecycle:
  cooldown: "150ms"
  sweep_interval: "25ms"
  poll_interval: "{}"
  rate_limit_interval: "0ms"
  backoff_base: "20ms"
  retry_cap: 3
  confirm_timeout: "50ms"
"#,
        server_entries, poll_interval
    );

    queuewarden::Parser::new().parse_config(&yaml).unwrap()
}

/// A queue-control stub that records pause/unpause calls in order.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingQueue {
    calls: Mutex<Vec<(ServerId, &'static str)>>,
}

#[allow(dead_code)]
impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(ServerId, &'static str)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl queuewarden::QueueControl for RecordingQueue {
    async fn pause(&self, server: &ServerId) -> Result<()> {
        self.calls.lock().push((server.clone(), "pause"));
        Ok(())
    }

    async fn unpause(&self, server: &ServerId) -> Result<()> {
        self.calls.lock().push((server.clone(), "unpause"));
        Ok(())
    }
}

#[allow(dead_code)]
pub fn event(server: &str, kind: queuewarden::ingest::EventKind) -> queuewarden::ingest::QueueEvent {
    queuewarden::ingest::QueueEvent {
        server: server.into(),
        kind,
        timestamp: chrono::Utc::now(),
        playing: None,
    }
}

/// Poll a server's controller until it reaches `want`, or `timeout` expires.
#[allow(dead_code)]
pub async fn wait_for_lifecycle(
    bridge: &queuewarden::Bridge,
    server: &ServerId,
    want: queuewarden::Lifecycle,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(snapshot) = bridge.snapshot(server).await {
            if snapshot.lifecycle == want {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
