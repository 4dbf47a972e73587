//! Room session.
//!
//! A `RoomSession` is the local user's membership in one live room. It is
//! built from an explicit `SessionContext` and owns the room actor for as
//! long as the user stays in the room.

use crate::actors::{RemoteNotification, RoomActor, RoomActorHandle, RoomEvent, RoomSnapshot};
use crate::config::Config;
use crate::coordination::{Coordinator, Extras, RetryingCoordinator};
use crate::errors::RoomError;
use crate::participant::{Owner, Participant, ParticipantDirectory};
use crate::seat::SeatState;
use crate::view::{BroadcastControl, MediaState, VideoLayout};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

/// Seat used when the snapshot does not point at a better one.
const FIRST_SEAT: u32 = 1;

/// Who is in which room, fixed for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    room_id: String,
    local: Participant,
    owner: Owner,
}

impl SessionContext {
    #[must_use]
    pub fn builder() -> SessionContextBuilder {
        SessionContextBuilder::default()
    }

    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    #[must_use]
    pub fn local(&self) -> &Participant {
        &self.local
    }

    #[must_use]
    pub fn owner(&self) -> &Owner {
        &self.owner
    }
}

/// Builder for [`SessionContext`].
#[derive(Debug, Default)]
pub struct SessionContextBuilder {
    room_id: Option<String>,
    local: Option<Participant>,
    owner: Option<Participant>,
}

impl SessionContextBuilder {
    #[must_use]
    pub fn room_id(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    #[must_use]
    pub fn local(mut self, local: Participant) -> Self {
        self.local = Some(local);
        self
    }

    #[must_use]
    pub fn owner(mut self, owner: Participant) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Build the context.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotReady` if the room ID, local participant or owner
    /// is missing or blank.
    pub fn build(self) -> Result<SessionContext, RoomError> {
        let room_id = self
            .room_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| RoomError::SessionNotReady("room id is missing".to_string()))?;
        let local = self
            .local
            .filter(|p| !p.user_id.is_empty())
            .ok_or_else(|| {
                RoomError::SessionNotReady("local participant is missing".to_string())
            })?;
        let owner = self
            .owner
            .filter(|p| !p.user_id.is_empty())
            .ok_or_else(|| RoomError::SessionNotReady("room owner is missing".to_string()))?;

        let local = Participant {
            is_local: true,
            ..local
        };
        let owner = if owner.user_id == local.user_id {
            Owner::Local(Participant {
                is_local: true,
                ..owner
            })
        } else {
            Owner::Remote(Participant {
                is_local: false,
                ..owner
            })
        };

        Ok(SessionContext {
            room_id,
            local,
            owner,
        })
    }
}

/// The local user's session in one live room.
pub struct RoomSession {
    session_id: Uuid,
    joined_at: DateTime<Utc>,
    context: SessionContext,
    handle: RoomActorHandle,
    task: JoinHandle<()>,
    directory: Arc<dyn ParticipantDirectory>,
}

impl RoomSession {
    /// Join the room and start its actor.
    ///
    /// `coordinator` is wrapped with the retry policy from `config`.
    pub fn join<C>(
        context: SessionContext,
        config: &Config,
        coordinator: C,
        directory: Arc<dyn ParticipantDirectory>,
    ) -> Self
    where
        C: Coordinator + 'static,
    {
        let session_id = Uuid::new_v4();
        let coordinator: Arc<dyn Coordinator> =
            Arc::new(RetryingCoordinator::new(coordinator, config.retry));

        let (handle, task) = RoomActor::spawn(
            context.room_id.clone(),
            context.owner.clone(),
            context.local.clone(),
            config,
            coordinator,
            CancellationToken::new(),
        );

        info!(
            target: "live_room.session",
            session_id = %session_id,
            room_id = %context.room_id,
            owner_is_local = context.owner.is_local(),
            "Joined room"
        );

        Self {
            session_id,
            joined_at: Utc::now(),
            context,
            handle,
            task,
            directory,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    #[must_use]
    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Handle to the room actor, for callers acting on behalf of others.
    #[must_use]
    pub fn handle(&self) -> &RoomActorHandle {
        &self.handle
    }

    /// Whether the room actor has stopped (left or live ended).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.handle.is_cancelled() || self.task.is_finished()
    }

    /// Invite an audience member by user ID to the first free seat.
    ///
    /// # Errors
    ///
    /// `ParticipantNotFound` if the directory does not know `user_id`, plus
    /// everything the room actor can return for an invite.
    #[instrument(skip_all, fields(room_id = %self.context.room_id))]
    pub async fn invite(&self, user_id: &str) -> Result<(), RoomError> {
        let invitee = self
            .directory
            .lookup(user_id)
            .ok_or_else(|| RoomError::ParticipantNotFound(user_id.to_string()))?;
        let seat_index = self
            .seat_where(|state| state.is_empty())
            .unwrap_or(FIRST_SEAT);
        self.handle
            .invite(self.local_id(), seat_index, invitee)
            .await
    }

    /// Accept the invitation addressed to the local user.
    pub async fn accept_invitation(&self, extras: Extras) -> Result<(), RoomError> {
        let local_id = self.local_id();
        let seat_index = self
            .seat_where(|state| matches!(state, SeatState::Pending(p) if p.user_id == local_id))
            .unwrap_or(FIRST_SEAT);
        self.handle
            .accept_invitation(local_id, seat_index, extras)
            .await
    }

    /// Reject the invitation addressed to the local user.
    pub async fn reject_invitation(&self) -> Result<(), RoomError> {
        self.handle
            .reject_invitation(self.local_id(), self.context.owner.user_id().to_string())
            .await
    }

    /// Owner removes whoever is co-broadcasting.
    pub async fn force_end_broadcasting(&self) -> Result<(), RoomError> {
        let seat_index = self
            .seat_where(SeatState::is_occupied)
            .unwrap_or(FIRST_SEAT);
        self.handle
            .force_end_broadcasting(self.local_id(), seat_index)
            .await
    }

    /// Local co-broadcaster leaves the seat.
    pub async fn end_broadcasting(&self) -> Result<(), RoomError> {
        let local_id = self.local_id();
        let seat_index = self
            .seat_where(|state| matches!(state, SeatState::Occupied(p) if p.user_id == local_id))
            .unwrap_or(FIRST_SEAT);
        self.handle.end_broadcasting(local_id, seat_index).await
    }

    /// Forward a push from the coordination service.
    pub async fn apply_notification(
        &self,
        notification: RemoteNotification,
    ) -> Result<(), RoomError> {
        self.handle.notify(notification).await
    }

    #[must_use]
    pub fn snapshot(&self) -> RoomSnapshot {
        self.handle.snapshot()
    }

    #[must_use]
    pub fn watch_snapshots(&self) -> watch::Receiver<RoomSnapshot> {
        self.handle.watch_snapshots()
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<RoomEvent> {
        self.handle.subscribe_events()
    }

    /// Broadcast button state for the latest snapshot.
    #[must_use]
    pub fn broadcast_control(&self) -> BroadcastControl {
        let snapshot = self.snapshot();
        BroadcastControl::derive(&snapshot.mode, &self.context.owner, snapshot.local_role)
    }

    /// Video tiles for the latest snapshot.
    #[must_use]
    pub fn video_layout(&self) -> VideoLayout {
        VideoLayout::derive(&self.snapshot().mode, &self.context.local.user_id)
    }

    /// Whether the local camera and microphone should be capturing.
    #[must_use]
    pub fn media_state(&self) -> MediaState {
        MediaState::for_role(self.snapshot().local_role)
    }

    /// Leave the room and wait for the actor to stop.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the actor task panicked.
    pub async fn leave(self) -> Result<(), RoomError> {
        self.handle.cancel();
        self.task
            .await
            .map_err(|e| RoomError::Internal(format!("room actor task failed: {e}")))?;

        let stayed = Utc::now() - self.joined_at;
        info!(
            target: "live_room.session",
            session_id = %self.session_id,
            room_id = %self.context.room_id,
            stayed_secs = stayed.num_seconds(),
            "Left room"
        );
        Ok(())
    }

    fn local_id(&self) -> String {
        self.context.local.user_id.clone()
    }

    fn seat_where(&self, predicate: impl Fn(&SeatState) -> bool) -> Option<u32> {
        self.snapshot()
            .seats
            .iter()
            .find(|seat| predicate(&seat.state))
            .map(|seat| seat.index)
    }
}
