//! Global rate gate for outbound panel calls.
//!
//! The panel enforces fair-use limits; every outbound call passes through one
//! shared gate that spaces calls at a fixed minimum interval. Callers queue
//! on the gate rather than being rejected, unless they carry a deadline the
//! wait would already blow.

use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Fixed-interval gate: hands out send slots spaced `interval` apart.
///
/// Slot assignment happens under a short async mutex; the wait for the
/// assigned slot happens outside it, so a slow caller never blocks slot
/// assignment for others. Slots are granted in lock-acquisition order.
pub struct RateGate {
    interval: Duration,
    next_slot: tokio::sync::Mutex<Instant>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: tokio::sync::Mutex::new(Instant::now()),
        }
    }

    /// Wait for the next free slot.
    pub async fn acquire(&self) {
        let slot = self.claim_slot().await;
        tokio::time::sleep_until(slot.into()).await;
    }

    /// Wait for the next free slot, failing without consuming one if the
    /// slot would land past `deadline`.
    pub async fn acquire_before(&self, deadline: Instant) -> Result<()> {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let slot = (*next).max(Instant::now());
            if slot > deadline {
                return Err(Error::RateDeadline);
            }
            *next = slot + self.interval;
            slot
        };
        tokio::time::sleep_until(slot.into()).await;
        Ok(())
    }

    async fn claim_slot(&self) -> Instant {
        let mut next = self.next_slot.lock().await;
        let slot = (*next).max(Instant::now());
        *next = slot + self.interval;
        slot
    }
}
