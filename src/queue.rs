//! Outbound capability on the queue subsystem.
//!
//! The queue subsystem is mostly an event source, but it also exposes one
//! narrow control surface: pausing a server's queue so clients stop being
//! dispatched to a backend that is failing its status probes, and unpausing
//! it once probes succeed again.

use crate::error::Result;
use crate::state::ServerId;
use async_trait::async_trait;

/// Pause/unpause capability on a server's queue.
#[async_trait]
pub trait QueueControl: Send + Sync {
    /// Stop dispatching queued clients to this server.
    async fn pause(&self, server: &ServerId) -> Result<()>;

    /// Resume dispatching queued clients to this server.
    async fn unpause(&self, server: &ServerId) -> Result<()>;
}

/// No-op implementation for deployments where the queue subsystem offers no
/// pause capability.
pub struct NoopQueueControl;

#[async_trait]
impl QueueControl for NoopQueueControl {
    async fn pause(&self, server: &ServerId) -> Result<()> {
        tracing::debug!("No queue control configured; not pausing '{}'", server);
        Ok(())
    }

    async fn unpause(&self, server: &ServerId) -> Result<()> {
        tracing::debug!("No queue control configured; not unpausing '{}'", server);
        Ok(())
    }
}
