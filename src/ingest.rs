//! Queue event ingestion.
//!
//! Consumes events from the queue subsystem and normalizes them into
//! occupancy deltas keyed by server id. Holds no state of its own; the
//! upstream queue is trusted not to duplicate deliveries, and per-server
//! ordering is preserved by the dispatcher downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::ServerId;

/// What happened in the queue subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A client entered the queue for a server
    Enqueued,
    /// A client left the queue or was dispatched to the server
    Dequeued,
    /// The queue for a server was emptied wholesale
    QueueCleared,
}

/// One event as delivered by the queue subsystem.
///
/// The binary's `run` command reads these as newline-delimited JSON:
///
/// ```json
/// {"server": "survival", "kind": "enqueued", "timestamp": "2024-07-01T12:00:00Z"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    pub server: ServerId,
    pub kind: EventKind,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Connected/playing count for the server, where the queue subsystem
    /// knows it; carried opportunistically on any event kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playing: Option<u32>,
}

/// Normalized occupancy change for one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyChange {
    /// +1 queued
    Increment,
    /// -1 queued (clamped at zero by the controller)
    Decrement,
    /// reset queued to zero
    Reset,
}

/// An occupancy delta routed to a single server's controller.
#[derive(Debug, Clone)]
pub struct OccupancyDelta {
    pub server: ServerId,
    pub change: OccupancyChange,
    pub playing: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

/// Normalize a queue event into the delta the controller consumes.
pub fn normalize(event: QueueEvent) -> OccupancyDelta {
    let change = match event.kind {
        EventKind::Enqueued => OccupancyChange::Increment,
        EventKind::Dequeued => OccupancyChange::Decrement,
        EventKind::QueueCleared => OccupancyChange::Reset,
    };
    OccupancyDelta {
        server: event.server,
        change,
        playing: event.playing,
        timestamp: event.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_each_kind() {
        let mk = |kind| QueueEvent {
            server: "survival".into(),
            kind,
            timestamp: Utc::now(),
            playing: None,
        };

        assert_eq!(
            normalize(mk(EventKind::Enqueued)).change,
            OccupancyChange::Increment
        );
        assert_eq!(
            normalize(mk(EventKind::Dequeued)).change,
            OccupancyChange::Decrement
        );
        assert_eq!(
            normalize(mk(EventKind::QueueCleared)).change,
            OccupancyChange::Reset
        );
    }

    #[test]
    fn deserializes_wire_format() {
        let event: QueueEvent = serde_json::from_str(
            r#"{"server": "survival", "kind": "enqueued", "timestamp": "2024-07-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(event.server.as_str(), "survival");
        assert_eq!(event.kind, EventKind::Enqueued);
        assert_eq!(event.playing, None);

        // Timestamp is optional on the wire
        let event: QueueEvent =
            serde_json::from_str(r#"{"server": "creative", "kind": "queue-cleared"}"#).unwrap();
        assert_eq!(event.kind, EventKind::QueueCleared);
    }
}
