//! Metrics definitions for Live Room.
//!
//! All metrics follow Prometheus naming conventions:
//! - `live_room_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `command`: 5 values (invite, accept, reject, force_end, end)
//! - `outcome`: 5 values (ok, not_authorized, invalid_state, remote_failure, error)
//! - `call`: 5 values (`CallKind`)
//! - `kind`: bounded by `RemoteNotification` variants (~9 values)
//! - `mode`: 2 values (single, multi)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a finished room command.
///
/// Metric: `live_room_commands_total`
/// Labels: `command`, `outcome`
pub fn record_command(command: &str, outcome: &str) {
    counter!(
        "live_room_commands_total",
        "command" => command.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record time from command receipt to reply (includes the remote round trip).
///
/// Metric: `live_room_command_duration_seconds`
/// Labels: `command`
pub fn record_command_duration(command: &str, duration: Duration) {
    histogram!("live_room_command_duration_seconds", "command" => command.to_string())
        .record(duration.as_secs_f64());
}

/// Record an optimistic transition undone after a remote failure.
///
/// Metric: `live_room_rollbacks_total`
/// Labels: `command`
pub fn record_rollback(command: &str) {
    counter!("live_room_rollbacks_total", "command" => command.to_string()).increment(1);
}

/// Record a remote completion ignored because the seat moved on.
///
/// Metric: `live_room_stale_completions_total`
/// Labels: `command`
pub fn record_stale_completion(command: &str) {
    counter!("live_room_stale_completions_total", "command" => command.to_string())
        .increment(1);
}

/// Record a rejection the coordinator could not deliver to the owner.
/// The local seat is not rolled back.
///
/// Metric: `live_room_rejections_undelivered_total`
pub fn record_rejection_undelivered() {
    counter!("live_room_rejections_undelivered_total").increment(1);
}

/// Record a coordination retry.
///
/// Metric: `live_room_coordination_retries_total`
/// Labels: `call`
pub fn record_coordination_retry(call: &str) {
    counter!("live_room_coordination_retries_total", "call" => call.to_string()).increment(1);
}

/// Record an inbound notification that was applied or ignored.
///
/// Metric: `live_room_notifications_total`
/// Labels: `kind`, `applied`
pub fn record_notification(kind: &str, applied: bool) {
    let applied = if applied { "true" } else { "false" };
    counter!(
        "live_room_notifications_total",
        "kind" => kind.to_string(),
        "applied" => applied
    )
    .increment(1);
}

/// Record a mode change published to presenters.
///
/// Metric: `live_room_mode_changes_total`
/// Labels: `mode`
pub fn record_mode_change(mode: &str) {
    counter!("live_room_mode_changes_total", "mode" => mode.to_string()).increment(1);
}

/// Set the number of live room actors in this process.
///
/// Metric: `live_room_rooms_active`
pub fn set_rooms_active(count: u64) {
    // u64 to f64 conversion is safe for realistic room counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("live_room_rooms_active").set(count as f64);
}
