//! Message types for the room actor.
//!
//! Commands use `tokio::sync::oneshot` for request-reply. Remote completions
//! re-enter the same mailbox so every state change is serialized.

use crate::coordination::Extras;
use crate::errors::{CoordinationError, RoomError};
use crate::mode::BroadcastingMode;
use crate::participant::{Participant, Role};
use crate::seat::{Seat, SeatTicket};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Messages sent to `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    /// Owner invites an audience member to a seat.
    Invite {
        caller_id: String,
        seat_index: u32,
        invitee: Participant,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Invitee takes the seat.
    AcceptInvitation {
        caller_id: String,
        seat_index: u32,
        extras: Extras,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Invitee declines. Replies once the local transition is done.
    RejectInvitation {
        caller_id: String,
        owner_id: String,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Owner removes the co-broadcaster.
    ForceEndBroadcasting {
        caller_id: String,
        seat_index: u32,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Co-broadcaster leaves the seat.
    EndBroadcasting {
        caller_id: String,
        seat_index: u32,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Inbound push from the coordination service.
    Notification(RemoteNotification),

    /// A coordination call finished (internal).
    RemoteCompleted(RemoteCompletion),

    /// Get the last published snapshot. Ordered after earlier messages.
    GetSnapshot {
        respond_to: oneshot::Sender<RoomSnapshot>,
    },

    /// Look up a participant's role.
    RoleOf {
        user_id: String,
        respond_to: oneshot::Sender<Option<Role>>,
    },

    /// List known participants with their roles.
    Participants {
        respond_to: oneshot::Sender<Vec<(Participant, Role)>>,
    },
}

/// Seat commands, for logs, metrics and rollback events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Invite,
    Accept,
    Reject,
    ForceEnd,
    End,
}

impl Command {
    /// Returns the command as a string for log fields and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Command::Invite => "invite",
            Command::Accept => "accept",
            Command::Reject => "reject",
            Command::ForceEnd => "force_end",
            Command::End => "end",
        }
    }
}

/// Result of a coordination call, tagged with the seat state it was issued for.
#[derive(Debug)]
pub struct RemoteCompletion {
    pub command: Command,
    pub ticket: SeatTicket,
    /// Invitee, accepter or (former) occupant the command was about.
    pub subject: Participant,
    pub result: Result<(), CoordinationError>,
    pub respond_to: Option<oneshot::Sender<Result<(), RoomError>>>,
    pub started_at: Instant,
}

/// Seat occupancy as reported by the coordination service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatAssignment {
    pub seat_index: u32,
    pub occupant: Option<Participant>,
}

/// Pushes from the coordination service about other participants' actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteNotification {
    InvitationReceived {
        seat_index: u32,
        owner_id: String,
        invitee: Participant,
    },
    InvitationAccepted {
        seat_index: u32,
        broadcaster: Participant,
    },
    InvitationRejected {
        seat_index: u32,
        by: Participant,
    },
    BroadcastingEnded {
        seat_index: u32,
        user_id: String,
        forced: bool,
    },
    /// Authoritative occupancy list.
    SeatsSynced { seats: Vec<SeatAssignment> },
    ParticipantJoined { participant: Participant },
    ParticipantLeft { user_id: String },
    ProfileUpdated {
        user_id: String,
        display_name: Option<String>,
        head_url: Option<String>,
    },
    /// The owner ended the live.
    LiveEnded,
}

impl RemoteNotification {
    /// Returns the notification kind for log fields and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            RemoteNotification::InvitationReceived { .. } => "invitation_received",
            RemoteNotification::InvitationAccepted { .. } => "invitation_accepted",
            RemoteNotification::InvitationRejected { .. } => "invitation_rejected",
            RemoteNotification::BroadcastingEnded { .. } => "broadcasting_ended",
            RemoteNotification::SeatsSynced { .. } => "seats_synced",
            RemoteNotification::ParticipantJoined { .. } => "participant_joined",
            RemoteNotification::ParticipantLeft { .. } => "participant_left",
            RemoteNotification::ProfileUpdated { .. } => "profile_updated",
            RemoteNotification::LiveEnded => "live_ended",
        }
    }
}

/// Discrete events for presenters (dialogs, toasts, appearance pickers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoomEvent {
    InvitationSent {
        seat_index: u32,
        invitee: Participant,
    },
    InvitationReceived {
        seat_index: u32,
        owner: Participant,
        invitee: Participant,
    },
    InvitationAccepted {
        seat_index: u32,
        broadcaster: Participant,
    },
    InvitationRejected {
        seat_index: u32,
        by: Participant,
    },
    BroadcastingEnded {
        seat_index: u32,
        participant: Participant,
        forced: bool,
    },
    RoleChanged {
        user_id: String,
        role: Role,
        is_local: bool,
    },
    CommandRolledBack {
        command: Command,
        seat_index: u32,
    },
    ParticipantJoined {
        participant: Participant,
    },
    ParticipantLeft {
        user_id: String,
    },
    ProfileUpdated {
        participant: Participant,
    },
    LiveEnded,
}

/// Seats and mode published together after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSnapshot {
    pub room_id: String,
    /// Increases by one per publish.
    pub revision: u64,
    pub seats: Vec<Seat>,
    pub mode: BroadcastingMode,
    pub local_role: Role,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_round_trips_through_json() {
        let json = r#"{
            "type": "invitation_received",
            "seat_index": 1,
            "owner_id": "100",
            "invitee": {
                "user_id": "200",
                "display_name": "Guest",
                "remote_media_id": 9,
                "is_local": false,
                "avatar": { "head_url": "", "image_index": 8 }
            }
        }"#;

        let notification: RemoteNotification = serde_json::from_str(json).unwrap();
        assert_eq!(notification.kind(), "invitation_received");
        assert!(matches!(
            notification,
            RemoteNotification::InvitationReceived { seat_index: 1, ref owner_id, .. } if owner_id == "100"
        ));
    }

    #[test]
    fn test_live_ended_is_unit_tagged() {
        let notification: RemoteNotification =
            serde_json::from_str(r#"{"type":"live_ended"}"#).unwrap();
        assert_eq!(notification, RemoteNotification::LiveEnded);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = RoomEvent::CommandRolledBack {
            command: Command::ForceEnd,
            seat_index: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "command_rolled_back");
        assert_eq!(json["command"], "force_end");
    }
}
