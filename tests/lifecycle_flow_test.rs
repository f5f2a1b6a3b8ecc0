//! End-to-end lifecycle scenarios through the full bridge: event channel,
//! dispatcher, controller, panel.

mod common;

use common::{event, test_config, wait_for_lifecycle, MockPanel};
use queuewarden::ingest::EventKind;
use queuewarden::{Bridge, Lifecycle, PowerState, ServerId};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn full_wake_and_idle_shutdown_cycle() {
    let config = test_config(&["survival"]);
    let panel = Arc::new(MockPanel::new());
    let mut bridge = Bridge::builder(config).panel(panel.clone()).build();
    let events = bridge.event_sender();
    let server = ServerId::from("survival");

    // A client queues: the server wakes and becomes active
    events.send(event("survival", EventKind::Enqueued)).await.unwrap();
    assert!(
        wait_for_lifecycle(&bridge, &server, Lifecycle::Active, Duration::from_secs(2)).await,
        "server should wake and become active"
    );
    assert_eq!(panel.action_calls(&server), 1, "exactly one power-on");

    let snapshot = bridge.snapshot(&server).await.unwrap();
    assert_eq!(snapshot.power, PowerState::On);
    assert_eq!(snapshot.queued, 1);
    assert!(snapshot.pending.is_none());

    // The client is dispatched: occupancy drains, cooldown starts
    events.send(event("survival", EventKind::Dequeued)).await.unwrap();
    assert!(
        wait_for_lifecycle(&bridge, &server, Lifecycle::Cooling, Duration::from_secs(2)).await,
        "empty server should enter cooling"
    );
    assert_eq!(
        panel.action_calls(&server),
        1,
        "cooling must not issue any panel action"
    );

    // The cooldown elapses with no new events: the sweep powers it off
    assert!(
        wait_for_lifecycle(&bridge, &server, Lifecycle::IdleOff, Duration::from_secs(2)).await,
        "idle server should be shut down after the cooldown"
    );
    assert_eq!(panel.action_calls(&server), 2, "power-on then power-off");

    let snapshot = bridge.snapshot(&server).await.unwrap();
    assert_eq!(snapshot.power, PowerState::Off);
    assert!(snapshot.pending.is_none());

    bridge.shutdown().await;
}

#[tokio::test]
async fn client_arriving_during_cooling_cancels_shutdown() {
    let config = test_config(&["survival"]);
    let panel = Arc::new(MockPanel::new());
    let mut bridge = Bridge::builder(config).panel(panel.clone()).build();
    let events = bridge.event_sender();
    let server = ServerId::from("survival");

    events.send(event("survival", EventKind::Enqueued)).await.unwrap();
    assert!(wait_for_lifecycle(&bridge, &server, Lifecycle::Active, Duration::from_secs(2)).await);

    events.send(event("survival", EventKind::Dequeued)).await.unwrap();
    assert!(wait_for_lifecycle(&bridge, &server, Lifecycle::Cooling, Duration::from_secs(2)).await);

    // A client returns before the cooldown elapses
    events.send(event("survival", EventKind::Enqueued)).await.unwrap();
    assert!(wait_for_lifecycle(&bridge, &server, Lifecycle::Active, Duration::from_secs(2)).await);

    // Wait well past the original cooldown deadline: no power-off may fire
    tokio::time::sleep(Duration::from_millis(400)).await;
    let snapshot = bridge.snapshot(&server).await.unwrap();
    assert_eq!(snapshot.lifecycle, Lifecycle::Active);
    assert_eq!(
        panel.action_calls(&server),
        1,
        "no power-off was ever issued"
    );

    bridge.shutdown().await;
}

#[tokio::test]
async fn power_on_when_already_on_is_idempotent() {
    let config = test_config(&["survival"]);
    let panel = Arc::new(MockPanel::new());
    let server = ServerId::from("survival");

    // The panel already reports the server running (e.g. bridge restart)
    panel.set_power(&server, PowerState::On);

    let mut bridge = Bridge::builder(config).panel(panel.clone()).build();
    let events = bridge.event_sender();

    events.send(event("survival", EventKind::Enqueued)).await.unwrap();
    assert!(wait_for_lifecycle(&bridge, &server, Lifecycle::Active, Duration::from_secs(2)).await);

    let snapshot = bridge.snapshot(&server).await.unwrap();
    assert_eq!(snapshot.power, PowerState::On);
    assert!(snapshot.pending.is_none(), "no duplicate action queued");
    assert_eq!(panel.action_calls(&server), 1);

    bridge.shutdown().await;
}

#[tokio::test]
async fn queue_cleared_resets_occupancy_and_cools_down() {
    let config = test_config(&["survival"]);
    let panel = Arc::new(MockPanel::new());
    let mut bridge = Bridge::builder(config).panel(panel.clone()).build();
    let events = bridge.event_sender();
    let server = ServerId::from("survival");

    for _ in 0..5 {
        events.send(event("survival", EventKind::Enqueued)).await.unwrap();
    }
    assert!(wait_for_lifecycle(&bridge, &server, Lifecycle::Active, Duration::from_secs(2)).await);
    let snapshot = bridge.snapshot(&server).await.unwrap();
    assert_eq!(snapshot.queued, 5);

    events
        .send(event("survival", EventKind::QueueCleared))
        .await
        .unwrap();
    assert!(wait_for_lifecycle(&bridge, &server, Lifecycle::Cooling, Duration::from_secs(2)).await);
    let snapshot = bridge.snapshot(&server).await.unwrap();
    assert_eq!(snapshot.queued, 0);

    bridge.shutdown().await;
}

#[tokio::test]
async fn unknown_server_is_tracked_but_never_powered() {
    // Config manages only "survival"; events arrive for "skyblock" too
    let config = test_config(&["survival"]);
    let panel = Arc::new(MockPanel::new());
    let mut bridge = Bridge::builder(config).panel(panel.clone()).build();
    let events = bridge.event_sender();
    let unknown = ServerId::from("skyblock");

    events.send(event("skyblock", EventKind::Enqueued)).await.unwrap();
    events.send(event("skyblock", EventKind::Enqueued)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let snapshot = bridge.snapshot(&unknown).await.unwrap();
    assert_eq!(snapshot.queued, 2, "occupancy is still tracked");
    assert_eq!(snapshot.lifecycle, Lifecycle::IdleOff);
    assert_eq!(panel.action_calls(&unknown), 0, "no panel action issued");

    bridge.shutdown().await;
}

#[tokio::test]
async fn playing_count_defers_shutdown_under_default_policy() {
    let config = test_config(&["survival"]);
    let panel = Arc::new(MockPanel::new());
    let mut bridge = Bridge::builder(config).panel(panel.clone()).build();
    let events = bridge.event_sender();
    let server = ServerId::from("survival");

    events.send(event("survival", EventKind::Enqueued)).await.unwrap();
    assert!(wait_for_lifecycle(&bridge, &server, Lifecycle::Active, Duration::from_secs(2)).await);

    // The queued client was dispatched into the server: queue empty but the
    // player is now on the server
    let mut dispatched = event("survival", EventKind::Dequeued);
    dispatched.playing = Some(1);
    events.send(dispatched).await.unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    let snapshot = bridge.snapshot(&server).await.unwrap();
    assert_eq!(
        snapshot.lifecycle,
        Lifecycle::Active,
        "a server with players must not cool down under queued-and-playing"
    );
    assert_eq!(panel.action_calls(&server), 1);

    // The player logs off; the queue subsystem reports the empty server
    let mut left = event("survival", EventKind::QueueCleared);
    left.playing = Some(0);
    events.send(left).await.unwrap();

    assert!(
        wait_for_lifecycle(&bridge, &server, Lifecycle::IdleOff, Duration::from_secs(2)).await,
        "empty server shuts down once nobody is playing"
    );

    bridge.shutdown().await;
}
