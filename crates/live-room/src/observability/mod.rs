//! Observability for Live Room.
//!
//! Logging goes through `tracing` with per-component targets
//! (`live_room.actor.room`, `live_room.coordination`). Handlers are
//! instrumented with `skip_all` and an explicit `room_id` field, display names
//! are never logged.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `live_room_commands_total` | Counter | `command`, `outcome` | Command results |
//! | `live_room_command_duration_seconds` | Histogram | `command` | Command latency |
//! | `live_room_rollbacks_total` | Counter | `command` | Undone optimistic transitions |
//! | `live_room_stale_completions_total` | Counter | `command` | Ignored late completions |
//! | `live_room_rejections_undelivered_total` | Counter | none | Rejections not delivered to the owner |
//! | `live_room_coordination_retries_total` | Counter | `call` | Coordination retries |
//! | `live_room_notifications_total` | Counter | `kind`, `applied` | Inbound notifications |
//! | `live_room_mode_changes_total` | Counter | `mode` | Published mode changes |
//! | `live_room_rooms_active` | Gauge | none | Running room actors |

pub mod metrics;

// Re-exports for convenience
pub use self::metrics::{
    record_command, record_command_duration, record_coordination_retry, record_mode_change,
    record_notification, record_rejection_undelivered, record_rollback, record_stale_completion,
    set_rooms_active,
};
