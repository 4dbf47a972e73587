//! Coordination service collaborator.
//!
//! Every seat command is mirrored to a remote coordination service which
//! notifies the other participants. The service is opaque to the room actor:
//! it only sees success or a [`CoordinationError`]. Retries belong here, in
//! [`RetryingCoordinator`], never in the actor.
//!
//! # Modules
//!
//! - [`retry`] - exponential-backoff decorator with per-attempt timeout
//! - [`memory`] - in-process coordinator with scripted outcomes

pub mod memory;
pub mod retry;

pub use memory::{InMemoryCoordinator, RecordedCall};
pub use retry::RetryingCoordinator;

use crate::errors::CoordinationError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Opaque attachment forwarded with an acceptance (e.g. `virtualAvatar`).
pub type Extras = serde_json::Map<String, serde_json::Value>;

/// Addressing shared by all seat requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatRequest {
    pub room_id: String,
    pub seat_index: u32,
    pub from_user_id: String,
    pub to_user_id: String,
}

/// Kind of coordination call, used for logs, metrics and test scripting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallKind {
    Invite,
    Acceptance,
    Rejection,
    ForceEnd,
    SelfEnd,
}

impl CallKind {
    /// Returns the call kind as a string for log fields and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CallKind::Invite => "invite",
            CallKind::Acceptance => "acceptance",
            CallKind::Rejection => "rejection",
            CallKind::ForceEnd => "force_end",
            CallKind::SelfEnd => "self_end",
        }
    }
}

/// Trait for coordination service operations (enables mocking).
#[async_trait::async_trait]
pub trait Coordinator: Send + Sync {
    /// Ask the invitee to take a seat.
    async fn send_invite(&self, request: &SeatRequest) -> Result<(), CoordinationError>;

    /// Tell the owner the invitation was accepted.
    async fn send_acceptance(
        &self,
        request: &SeatRequest,
        extras: &Extras,
    ) -> Result<(), CoordinationError>;

    /// Tell the owner the invitation was rejected.
    async fn send_rejection(&self, request: &SeatRequest) -> Result<(), CoordinationError>;

    /// Owner removes the co-broadcaster.
    async fn send_force_end(&self, request: &SeatRequest) -> Result<(), CoordinationError>;

    /// Co-broadcaster leaves the seat.
    async fn send_self_end(&self, request: &SeatRequest) -> Result<(), CoordinationError>;
}

/// Lets callers keep a handle on a shared coordinator (e.g. to inspect
/// recorded calls) while the room owns another.
#[async_trait::async_trait]
impl<C: Coordinator + ?Sized> Coordinator for Arc<C> {
    async fn send_invite(&self, request: &SeatRequest) -> Result<(), CoordinationError> {
        (**self).send_invite(request).await
    }

    async fn send_acceptance(
        &self,
        request: &SeatRequest,
        extras: &Extras,
    ) -> Result<(), CoordinationError> {
        (**self).send_acceptance(request, extras).await
    }

    async fn send_rejection(&self, request: &SeatRequest) -> Result<(), CoordinationError> {
        (**self).send_rejection(request).await
    }

    async fn send_force_end(&self, request: &SeatRequest) -> Result<(), CoordinationError> {
        (**self).send_force_end(request).await
    }

    async fn send_self_end(&self, request: &SeatRequest) -> Result<(), CoordinationError> {
        (**self).send_self_end(request).await
    }
}
