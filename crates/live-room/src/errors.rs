//! Live Room error types.
//!
//! Local precondition failures (`NotAuthorized`, `InvalidSeatState`, not-found
//! variants) are returned before any state is touched. `RemoteFailure` is only
//! returned after the optimistic transition has been undone and the prior
//! snapshot re-published.

use thiserror::Error;

/// Error type for room commands.
///
/// Maps to presenter-facing error codes:
/// - `NotAuthorized`: `FORBIDDEN` (3)
/// - `ParticipantNotFound`, `SeatNotFound`: `NOT_FOUND` (4)
/// - `InvalidSeatState`: `CONFLICT` (5)
/// - `RemoteFailure`: `UNAVAILABLE` (8)
/// - `SessionNotReady`, `SessionClosed`: `SESSION` (9)
/// - `Internal`: `INTERNAL_ERROR` (6)
#[derive(Debug, Error)]
pub enum RoomError {
    /// Caller's role does not allow the command.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Command is not valid for the current seat state.
    #[error("Invalid seat state: {0}")]
    InvalidSeatState(String),

    /// Coordination service reported failure after its retries were exhausted.
    #[error("Remote failure: {0}")]
    RemoteFailure(#[from] CoordinationError),

    /// Session context is incomplete (missing owner, local user or room id).
    #[error("Session not ready: {0}")]
    SessionNotReady(String),

    /// Session has been left or the room actor has stopped.
    #[error("Session closed")]
    SessionClosed,

    /// Participant is not registered in the room.
    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    /// Seat index does not exist in this room.
    #[error("Seat not found: {0}")]
    SeatNotFound(u32),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures reported by the coordination collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinationError {
    /// The service refused the request. Not retried.
    #[error("rejected by coordination service: {0}")]
    Rejected(String),

    /// The service could not be reached. Retryable.
    #[error("coordination service unavailable: {0}")]
    Unavailable(String),

    /// A single attempt exceeded its deadline. Retryable.
    #[error("coordination request timed out")]
    Timeout,
}

impl CoordinationError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinationError::Unavailable(_) | CoordinationError::Timeout
        )
    }
}

impl RoomError {
    /// Returns the presenter-facing error code for this error.
    pub fn error_code(&self) -> i32 {
        match self {
            RoomError::Internal(_) => 6, // INTERNAL_ERROR
            RoomError::NotAuthorized(_) => 3, // FORBIDDEN
            RoomError::ParticipantNotFound(_) | RoomError::SeatNotFound(_) => 4, // NOT_FOUND
            RoomError::InvalidSeatState(_) => 5, // CONFLICT
            RoomError::RemoteFailure(_) => 8, // UNAVAILABLE
            RoomError::SessionNotReady(_) | RoomError::SessionClosed => 9, // SESSION
        }
    }

    /// Returns a message safe to show in an alert (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            RoomError::Internal(_) => "An internal error occurred".to_string(),
            RoomError::NotAuthorized(_) => {
                "You are not allowed to do that in this room".to_string()
            }
            RoomError::InvalidSeatState(_) => "The broadcasting seat is busy".to_string(),
            RoomError::RemoteFailure(_) => "Request failed, please try again".to_string(),
            RoomError::SessionNotReady(_) => "The live room is not ready yet".to_string(),
            RoomError::SessionClosed => "The live room has ended".to_string(),
            RoomError::ParticipantNotFound(_) => "User is no longer in the room".to_string(),
            RoomError::SeatNotFound(_) => "Seat not found".to_string(),
        }
    }
}
