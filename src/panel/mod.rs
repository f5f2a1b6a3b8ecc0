//! Panel client: the capability-scoped wrapper around the remote
//! server-orchestration panel.
//!
//! - `http` - HTTP implementation against a Pterodactyl-style client API
//! - `ratelimit` - global fixed-interval gate on outbound calls
//! - `retry` - backoff policy for action re-attempts
//!
//! All three power operations are idempotent at the intent level: requesting
//! power-on for a server that is already running is an acknowledged success.
//! The lifecycle controller relies on this to resolve drift after a restart.

mod http;
mod ratelimit;
mod retry;

pub use http::HttpPanelClient;
pub use ratelimit::RateGate;
pub use retry::RetryPolicy;

use crate::error::Result;
use crate::state::{PowerState, ServerId};
use async_trait::async_trait;

/// The narrow interface the lifecycle controller calls through.
///
/// Implementations own their transport, authentication, timeout, and rate
/// limiting. Each method is a network call with a bounded deadline; failures
/// are classified transient or terminal via [`crate::Error::is_transient`].
#[async_trait]
pub trait PanelApi: Send + Sync {
    /// Request the server be powered on. Returns the power state observed
    /// after the request was acknowledged (may still be `Starting`).
    async fn power_on(&self, server: &ServerId) -> Result<PowerState>;

    /// Request the server be powered off. Returns the observed power state.
    async fn power_off(&self, server: &ServerId) -> Result<PowerState>;

    /// Query the server's current power state.
    async fn power_state(&self, server: &ServerId) -> Result<PowerState>;
}
