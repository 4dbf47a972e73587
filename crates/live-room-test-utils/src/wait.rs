//! Bounded waits on snapshots and events.
//!
//! Every helper panics after [`WAIT_TIMEOUT`] so a broken test fails instead
//! of hanging.

use std::time::Duration;

use live_room::actors::{RoomEvent, RoomSnapshot};
use tokio::sync::{broadcast, watch};

/// Default bound for every wait.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Wait until the published snapshot satisfies `predicate`.
///
/// # Panics
///
/// Panics on timeout or if the room actor stopped.
pub async fn wait_for_snapshot(
    snapshots: &mut watch::Receiver<RoomSnapshot>,
    predicate: impl FnMut(&RoomSnapshot) -> bool,
) -> RoomSnapshot {
    tokio::time::timeout(WAIT_TIMEOUT, snapshots.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("room actor stopped")
        .clone()
}

/// Receive the next event.
///
/// # Panics
///
/// Panics on timeout, lag or a closed channel.
pub async fn next_event(events: &mut broadcast::Receiver<RoomEvent>) -> RoomEvent {
    tokio::time::timeout(WAIT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel open")
}

/// Receive events until one matches `predicate`, returning everything seen
/// including the match.
///
/// # Panics
///
/// Panics on timeout, lag or a closed channel.
pub async fn events_until(
    events: &mut broadcast::Receiver<RoomEvent>,
    mut predicate: impl FnMut(&RoomEvent) -> bool,
) -> Vec<RoomEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let done = predicate(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Drain whatever events are already queued.
#[must_use]
pub fn drain_events(events: &mut broadcast::Receiver<RoomEvent>) -> Vec<RoomEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
