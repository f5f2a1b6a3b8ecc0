//! HTTP panel client against a Pterodactyl-style client API.
//!
//! Power actions are `POST /api/client/servers/{id}/power` with a
//! `{"signal": "start"|"stop"}` body; the power state is read from
//! `GET /api/client/servers/{id}/resources` (`attributes.current_state`).

use super::{PanelApi, RateGate};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::state::{PowerState, ServerId};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Global shared HTTP client for panel calls.
///
/// A shared client keeps one connection pool across all calls; the long
/// client-level timeout is a fallback, individual requests carry their own.
static SHARED_HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

fn get_shared_client() -> &'static Client {
    SHARED_HTTP_CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()
            .expect("Failed to create shared HTTP client")
    })
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    attributes: StatsAttributes,
}

#[derive(Debug, Deserialize)]
struct StatsAttributes {
    current_state: String,
}

fn map_state(raw: &str) -> PowerState {
    match raw {
        "running" => PowerState::On,
        "starting" => PowerState::Starting,
        "stopping" => PowerState::Stopping,
        "offline" => PowerState::Off,
        _ => PowerState::Unknown,
    }
}

/// Classify a non-success response: auth and identity problems are terminal,
/// overload and server-side failures are transient.
fn classify_status(status: StatusCode, server: &ServerId) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Error::PanelTransient {
            server: server.to_string(),
            reason: status.to_string(),
        }
    } else {
        Error::PanelTerminal {
            server: server.to_string(),
            reason: status.to_string(),
        }
    }
}

/// Panel client over HTTP with bearer-token auth, per-call deadlines, and a
/// global rate gate.
pub struct HttpPanelClient {
    base_url: url::Url,
    api_key: String,
    client: Client,
    gate: RateGate,
    timeout: Duration,
    /// Queue-side server id → panel identifier
    servers: HashMap<ServerId, String>,
}

impl HttpPanelClient {
    /// Build a client from the loaded configuration, using the shared
    /// HTTP connection pool.
    pub fn from_config(config: &Config) -> Result<Self> {
        let base_url = url::Url::parse(&config.panel.base_url)
            .map_err(|e| Error::Config(format!("panel.base_url: {}", e)))?;
        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            return Err(Error::Config(format!(
                "panel.base_url '{}': scheme must be http or https",
                config.panel.base_url
            )));
        }

        let servers = config
            .servers
            .iter()
            .map(|(name, entry)| (ServerId::from(name.as_str()), entry.panel_id.clone()))
            .collect();

        Ok(Self {
            base_url,
            api_key: config.panel.api_key.clone(),
            client: get_shared_client().clone(),
            gate: RateGate::new(config.lifecycle.rate_limit_interval()),
            timeout: config.lifecycle.action_timeout(),
            servers,
        })
    }

    fn panel_id(&self, server: &ServerId) -> Result<&str> {
        self.servers
            .get(server)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownServer(server.to_string()))
    }

    fn endpoint(&self, panel_id: &str, tail: &str) -> Result<url::Url> {
        self.base_url
            .join(&format!("api/client/servers/{}/{}", panel_id, tail))
            .map_err(|e| Error::Config(format!("panel URL: {}", e)))
    }

    fn wire_error(&self, e: reqwest::Error, server: &ServerId) -> Error {
        if e.is_timeout() {
            Error::PanelTimeout {
                server: server.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            Error::PanelTransient {
                server: server.to_string(),
                reason: e.to_string(),
            }
        }
    }

    /// Time left until `deadline`, as a request timeout.
    fn remaining(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(Instant::now())
    }

    async fn send_power_signal(&self, server: &ServerId, signal: &str) -> Result<()> {
        let panel_id = self.panel_id(server)?;
        let url = self.endpoint(panel_id, "power")?;
        let deadline = Instant::now() + self.timeout;

        self.gate.acquire_before(deadline).await?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&serde_json::json!({ "signal": signal }))
            .timeout(self.remaining(deadline))
            .send()
            .await
            .map_err(|e| self.wire_error(e, server))?;

        if !response.status().is_success() {
            return Err(classify_status(response.status(), server));
        }

        Ok(())
    }

    async fn fetch_power_state(&self, server: &ServerId) -> Result<PowerState> {
        let panel_id = self.panel_id(server)?;
        let url = self.endpoint(panel_id, "resources")?;
        let deadline = Instant::now() + self.timeout;

        self.gate.acquire_before(deadline).await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.remaining(deadline))
            .send()
            .await
            .map_err(|e| self.wire_error(e, server))?;

        if !response.status().is_success() {
            return Err(classify_status(response.status(), server));
        }

        let stats: StatsResponse = response
            .json()
            .await
            .map_err(|e| self.wire_error(e, server))?;

        Ok(map_state(&stats.attributes.current_state))
    }
}

#[async_trait]
impl PanelApi for HttpPanelClient {
    async fn power_on(&self, server: &ServerId) -> Result<PowerState> {
        self.send_power_signal(server, "start").await?;

        // The signal was acknowledged; a follow-up observation is best
        // effort. If it fails, report Starting and let the poller confirm.
        match self.fetch_power_state(server).await {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::debug!(
                    "Power-on for '{}' acknowledged but state fetch failed: {}",
                    server,
                    e
                );
                Ok(PowerState::Starting)
            }
        }
    }

    async fn power_off(&self, server: &ServerId) -> Result<PowerState> {
        self.send_power_signal(server, "stop").await?;

        match self.fetch_power_state(server).await {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::debug!(
                    "Power-off for '{}' acknowledged but state fetch failed: {}",
                    server,
                    e
                );
                Ok(PowerState::Stopping)
            }
        }
    }

    async fn power_state(&self, server: &ServerId) -> Result<PowerState> {
        self.fetch_power_state(server).await
    }
}
