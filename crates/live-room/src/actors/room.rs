//! `RoomActor` - per-room actor that owns seats and roles.
//!
//! Each `RoomActor`:
//! - Owns the `RoleRegistry` and `SeatTable` for one live room
//! - Applies seat commands optimistically and mirrors them to the coordinator
//! - Applies remote notifications from other participants
//! - Publishes seats and mode together as one `RoomSnapshot`
//!
//! # Remote calls
//!
//! Coordination calls run on spawned tasks and report back through the actor's
//! own mailbox as `RemoteCompleted`. Each completion carries the `SeatTicket`
//! captured when its optimistic transition was applied. If the seat has moved
//! on since then the completion is stale: it is logged, counted, and never
//! touches state.
//!
//! # Rollback
//!
//! | Command | Optimistic | On failure |
//! |---------|------------|------------|
//! | invite | Empty -> Pending | -> Empty |
//! | accept | Pending -> Occupied, promote | -> Pending, demote |
//! | reject | Pending -> Empty | logged and counted only |
//! | force-end | Occupied -> Closed, demote | -> Occupied, promote |
//! | end | Occupied -> Empty, demote | -> Occupied, promote |
//!
//! A successful force-end completes Closed -> Empty.

use super::messages::{
    Command, RemoteCompletion, RemoteNotification, RoomEvent, RoomMessage, RoomSnapshot,
    SeatAssignment,
};
use crate::config::Config;
use crate::coordination::{Coordinator, Extras, SeatRequest};
use crate::errors::RoomError;
use crate::mode::BroadcastingMode;
use crate::observability::metrics;
use crate::participant::{Owner, Participant, Role, RoleRegistry};
use crate::seat::{SeatState, SeatTable, SeatTicket};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Room actors running in this process.
static ROOMS_ACTIVE: AtomicU64 = AtomicU64::new(0);

type Reply = oneshot::Sender<Result<(), RoomError>>;

/// Handle to a `RoomActor`.
#[derive(Clone)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: String,
    snapshots: watch::Receiver<RoomSnapshot>,
    events: broadcast::Sender<RoomEvent>,
}

impl RoomActorHandle {
    /// Get the room ID.
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Owner invites `invitee` to `seat_index`.
    ///
    /// Resolves once the coordinator has answered. On failure the seat is
    /// already back to `Empty` when the error is returned.
    pub async fn invite(
        &self,
        caller_id: String,
        seat_index: u32,
        invitee: Participant,
    ) -> Result<(), RoomError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::Invite {
            caller_id,
            seat_index,
            invitee,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| RoomError::SessionClosed)?
    }

    /// Invitee accepts the pending invitation on `seat_index`.
    ///
    /// `extras` is forwarded to the coordinator untouched.
    pub async fn accept_invitation(
        &self,
        caller_id: String,
        seat_index: u32,
        extras: Extras,
    ) -> Result<(), RoomError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::AcceptInvitation {
            caller_id,
            seat_index,
            extras,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| RoomError::SessionClosed)?
    }

    /// Invitee rejects the pending invitation sent by `owner_id`.
    ///
    /// Returns after the local transition. Delivery to the owner is not awaited.
    pub async fn reject_invitation(
        &self,
        caller_id: String,
        owner_id: String,
    ) -> Result<(), RoomError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::RejectInvitation {
            caller_id,
            owner_id,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| RoomError::SessionClosed)?
    }

    /// Owner removes the co-broadcaster on `seat_index`.
    pub async fn force_end_broadcasting(
        &self,
        caller_id: String,
        seat_index: u32,
    ) -> Result<(), RoomError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::ForceEndBroadcasting {
            caller_id,
            seat_index,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| RoomError::SessionClosed)?
    }

    /// Co-broadcaster leaves `seat_index`.
    pub async fn end_broadcasting(
        &self,
        caller_id: String,
        seat_index: u32,
    ) -> Result<(), RoomError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::EndBroadcasting {
            caller_id,
            seat_index,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| RoomError::SessionClosed)?
    }

    /// Deliver a coordination-service push (fire-and-forget).
    pub async fn notify(&self, notification: RemoteNotification) -> Result<(), RoomError> {
        self.send(RoomMessage::Notification(notification)).await
    }

    /// Get the snapshot as of every message sent before this call.
    pub async fn get_snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::GetSnapshot { respond_to: tx })
            .await?;
        rx.await.map_err(|_| RoomError::SessionClosed)
    }

    /// Latest published snapshot, without a round trip.
    #[must_use]
    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    #[must_use]
    pub fn watch_snapshots(&self) -> watch::Receiver<RoomSnapshot> {
        self.snapshots.clone()
    }

    /// Subscribe to discrete room events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    /// Role of a participant, `None` if unknown to the room.
    pub async fn role_of(&self, user_id: String) -> Result<Option<Role>, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::RoleOf {
            user_id,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| RoomError::SessionClosed)
    }

    /// Everyone known to the room with their roles, sorted by user ID.
    pub async fn participants(&self) -> Result<Vec<(Participant, Role)>, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::Participants { respond_to: tx })
            .await?;
        rx.await.map_err(|_| RoomError::SessionClosed)
    }

    /// Cancel the actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn send(&self, message: RoomMessage) -> Result<(), RoomError> {
        if self.cancel_token.is_cancelled() {
            return Err(RoomError::SessionClosed);
        }
        self.sender
            .send(message)
            .await
            .map_err(|_| RoomError::SessionClosed)
    }
}

/// Coordination call to issue after an optimistic transition.
#[derive(Debug)]
enum RemoteCall {
    Invite,
    Acceptance(Extras),
    Rejection,
    ForceEnd,
    SelfEnd,
}

/// Everything needed to mirror one command to the coordinator.
#[derive(Debug)]
struct Outbound {
    call: RemoteCall,
    request: SeatRequest,
    ticket: SeatTicket,
    subject: Participant,
}

/// The room actor implementation.
pub struct RoomActor {
    room_id: String,
    owner: Owner,
    local_id: String,
    receiver: mpsc::Receiver<RoomMessage>,
    /// Weak so that dropping every handle still closes the mailbox.
    mailbox: mpsc::WeakSender<RoomMessage>,
    cancel_token: CancellationToken,
    coordinator: Arc<dyn Coordinator>,
    registry: RoleRegistry,
    seats: SeatTable,
    snapshots: watch::Sender<RoomSnapshot>,
    events: broadcast::Sender<RoomEvent>,
    /// Events raised while handling the current message; sent after publish.
    queued_events: Vec<RoomEvent>,
    revision: u64,
    dirty: bool,
    in_flight: usize,
    is_ended: bool,
}

impl RoomActor {
    /// Spawn a new room actor.
    ///
    /// # Arguments
    ///
    /// * `room_id` - Room the session is in
    /// * `owner` - Room owner, local or remote
    /// * `local` - The local user of this session
    /// * `config` - Seat count and channel sizes
    /// * `coordinator` - Coordination service (wrap it for retries)
    /// * `cancel_token` - Cancelled when the actor stops, or to stop it
    pub fn spawn(
        room_id: String,
        owner: Owner,
        local: Participant,
        config: &Config,
        coordinator: Arc<dyn Coordinator>,
        cancel_token: CancellationToken,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.mailbox_buffer);
        let (events, _) = broadcast::channel(config.event_buffer);

        let local = Participant {
            is_local: true,
            ..local
        };
        let owner = match owner {
            Owner::Local(p) | Owner::Remote(p) if p.user_id == local.user_id => {
                Owner::Local(Participant {
                    is_local: true,
                    ..p
                })
            }
            Owner::Local(p) | Owner::Remote(p) => Owner::Remote(Participant {
                is_local: false,
                ..p
            }),
        };

        let registry = RoleRegistry::new(&owner, &local);
        let seats = SeatTable::new(config.seat_count);
        let initial = RoomSnapshot {
            room_id: room_id.clone(),
            revision: 0,
            seats: seats.seats().to_vec(),
            mode: BroadcastingMode::resolve(owner.participant(), seats.seats()),
            local_role: registry.role_of(&local.user_id).unwrap_or(Role::Audience),
        };
        let (snapshots, snapshot_rx) = watch::channel(initial);

        let actor = Self {
            room_id: room_id.clone(),
            owner,
            local_id: local.user_id,
            receiver,
            mailbox: sender.downgrade(),
            cancel_token: cancel_token.clone(),
            coordinator,
            registry,
            seats,
            snapshots,
            events: events.clone(),
            queued_events: Vec::new(),
            revision: 0,
            dirty: false,
            in_flight: 0,
            is_ended: false,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id,
            snapshots: snapshot_rx,
            events,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "live_room.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        let active = ROOMS_ACTIVE.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_rooms_active(active);

        info!(
            target: "live_room.actor.room",
            room_id = %self.room_id,
            seats = self.seats.seats().len(),
            owner_is_local = self.owner.is_local(),
            "RoomActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "live_room.actor.room",
                        room_id = %self.room_id,
                        "RoomActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message);
                            self.flush();
                            if self.is_ended {
                                info!(
                                    target: "live_room.actor.room",
                                    room_id = %self.room_id,
                                    "Live ended, stopping RoomActor"
                                );
                                break;
                            }
                        }
                        None => {
                            info!(
                                target: "live_room.actor.room",
                                room_id = %self.room_id,
                                "RoomActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        // In-flight coordination tasks watch child tokens of this one.
        self.cancel_token.cancel();

        let active = ROOMS_ACTIVE
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);
        metrics::set_rooms_active(active);

        info!(
            target: "live_room.actor.room",
            room_id = %self.room_id,
            revision = self.revision,
            in_flight = self.in_flight,
            "RoomActor stopped"
        );
    }

    fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::Invite {
                caller_id,
                seat_index,
                invitee,
                respond_to,
            } => {
                let started_at = Instant::now();
                let outbound = self.start_invite(&caller_id, seat_index, invitee);
                self.launch(Command::Invite, outbound, respond_to, started_at);
            }

            RoomMessage::AcceptInvitation {
                caller_id,
                seat_index,
                extras,
                respond_to,
            } => {
                let started_at = Instant::now();
                let outbound = self.start_accept(&caller_id, seat_index, extras);
                self.launch(Command::Accept, outbound, respond_to, started_at);
            }

            RoomMessage::RejectInvitation {
                caller_id,
                owner_id,
                respond_to,
            } => {
                let started_at = Instant::now();
                match self.start_reject(&caller_id, &owner_id) {
                    Ok(outbound) => {
                        self.flush();
                        self.dispatch(Command::Reject, outbound, None, started_at);
                        self.finish(Command::Reject, started_at, Ok(()), Some(respond_to));
                    }
                    Err(e) => {
                        self.finish(Command::Reject, started_at, Err(e), Some(respond_to));
                    }
                }
            }

            RoomMessage::ForceEndBroadcasting {
                caller_id,
                seat_index,
                respond_to,
            } => {
                let started_at = Instant::now();
                let outbound = self.start_force_end(&caller_id, seat_index);
                self.launch(Command::ForceEnd, outbound, respond_to, started_at);
            }

            RoomMessage::EndBroadcasting {
                caller_id,
                seat_index,
                respond_to,
            } => {
                let started_at = Instant::now();
                let outbound = self.start_end(&caller_id, seat_index);
                self.launch(Command::End, outbound, respond_to, started_at);
            }

            RoomMessage::Notification(notification) => {
                self.handle_notification(notification);
            }

            RoomMessage::RemoteCompleted(completion) => {
                self.handle_completion(completion);
            }

            RoomMessage::GetSnapshot { respond_to } => {
                self.flush();
                let _ = respond_to.send(self.snapshots.borrow().clone());
            }

            RoomMessage::RoleOf {
                user_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.registry.role_of(&user_id));
            }

            RoomMessage::Participants { respond_to } => {
                let _ = respond_to.send(self.registry.entries());
            }
        }
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    #[instrument(skip_all, fields(room_id = %self.room_id, seat_index))]
    fn start_invite(
        &mut self,
        caller_id: &str,
        seat_index: u32,
        invitee: Participant,
    ) -> Result<Outbound, RoomError> {
        self.require_role(caller_id, Role::Owner, "invite")?;
        self.seats.get(seat_index)?;

        if !self.seats.all_empty() {
            return Err(RoomError::InvalidSeatState(
                "a seat is already pending, occupied or closing".to_string(),
            ));
        }
        if self.registry.is_owner(&invitee.user_id) {
            return Err(RoomError::InvalidSeatState(
                "the owner cannot be invited".to_string(),
            ));
        }

        let invitee = self.known(invitee);
        let ticket = self
            .seats
            .transition(seat_index, SeatState::Pending(invitee.clone()))?;
        self.dirty = true;

        debug!(
            target: "live_room.actor.room",
            room_id = %self.room_id,
            seat_index,
            invitee = %invitee.user_id,
            "Invitation pending"
        );
        self.emit(RoomEvent::InvitationSent {
            seat_index,
            invitee: invitee.clone(),
        });

        Ok(Outbound {
            call: RemoteCall::Invite,
            request: self.request(seat_index, caller_id, &invitee.user_id),
            ticket,
            subject: invitee,
        })
    }

    #[instrument(skip_all, fields(room_id = %self.room_id, seat_index))]
    fn start_accept(
        &mut self,
        caller_id: &str,
        seat_index: u32,
        extras: Extras,
    ) -> Result<Outbound, RoomError> {
        let invitee = match &self.seats.get(seat_index)?.state {
            SeatState::Pending(p) if p.user_id == caller_id => p.clone(),
            SeatState::Pending(_) => {
                return Err(RoomError::NotAuthorized(
                    "invitation is for another participant".to_string(),
                ));
            }
            other => {
                return Err(RoomError::InvalidSeatState(format!(
                    "seat {seat_index} is {}, not pending",
                    other.as_str()
                )));
            }
        };

        let ticket = self
            .seats
            .transition(seat_index, SeatState::Occupied(invitee.clone()))?;
        self.dirty = true;
        self.change_role(&invitee, Role::Broadcaster);
        self.emit(RoomEvent::InvitationAccepted {
            seat_index,
            broadcaster: invitee.clone(),
        });

        let owner_id = self.owner.user_id().to_string();
        Ok(Outbound {
            call: RemoteCall::Acceptance(extras),
            request: self.request(seat_index, caller_id, &owner_id),
            ticket,
            subject: invitee,
        })
    }

    #[instrument(skip_all, fields(room_id = %self.room_id))]
    fn start_reject(&mut self, caller_id: &str, owner_id: &str) -> Result<Outbound, RoomError> {
        let (seat_index, invitee) = self
            .seats
            .held_by(caller_id)
            .and_then(|seat| match &seat.state {
                SeatState::Pending(p) => Some((seat.index, p.clone())),
                _ => None,
            })
            .ok_or_else(|| {
                RoomError::InvalidSeatState("no pending invitation for caller".to_string())
            })?;

        if !self.registry.is_owner(owner_id) {
            return Err(RoomError::InvalidSeatState(format!(
                "no pending invitation from {owner_id}"
            )));
        }

        let ticket = self.seats.transition(seat_index, SeatState::Empty)?;
        self.dirty = true;
        self.emit(RoomEvent::InvitationRejected {
            seat_index,
            by: invitee.clone(),
        });

        Ok(Outbound {
            call: RemoteCall::Rejection,
            request: self.request(seat_index, caller_id, owner_id),
            ticket,
            subject: invitee,
        })
    }

    #[instrument(skip_all, fields(room_id = %self.room_id, seat_index))]
    fn start_force_end(&mut self, caller_id: &str, seat_index: u32) -> Result<Outbound, RoomError> {
        self.require_role(caller_id, Role::Owner, "force-end broadcasting")?;

        let occupant = match &self.seats.get(seat_index)?.state {
            SeatState::Occupied(p) => p.clone(),
            other => {
                return Err(RoomError::InvalidSeatState(format!(
                    "seat {seat_index} is {}, not occupied",
                    other.as_str()
                )));
            }
        };

        let ticket = self
            .seats
            .transition(seat_index, SeatState::Closed(occupant.clone()))?;
        self.dirty = true;
        self.change_role(&occupant, Role::Audience);

        Ok(Outbound {
            call: RemoteCall::ForceEnd,
            request: self.request(seat_index, caller_id, &occupant.user_id),
            ticket,
            subject: occupant,
        })
    }

    #[instrument(skip_all, fields(room_id = %self.room_id, seat_index))]
    fn start_end(&mut self, caller_id: &str, seat_index: u32) -> Result<Outbound, RoomError> {
        self.require_role(caller_id, Role::Broadcaster, "end broadcasting")?;

        let broadcaster = match &self.seats.get(seat_index)?.state {
            SeatState::Occupied(p) if p.user_id == caller_id => p.clone(),
            _ => {
                return Err(RoomError::InvalidSeatState(format!(
                    "seat {seat_index} is not held by caller"
                )));
            }
        };

        let ticket = self.seats.transition(seat_index, SeatState::Empty)?;
        self.dirty = true;
        self.change_role(&broadcaster, Role::Audience);
        self.emit(RoomEvent::BroadcastingEnded {
            seat_index,
            participant: broadcaster.clone(),
            forced: false,
        });

        let owner_id = self.owner.user_id().to_string();
        Ok(Outbound {
            call: RemoteCall::SelfEnd,
            request: self.request(seat_index, caller_id, &owner_id),
            ticket,
            subject: broadcaster,
        })
    }

    /// Publish the optimistic state and start the remote call, or reply with
    /// the precondition failure.
    fn launch(
        &mut self,
        command: Command,
        outbound: Result<Outbound, RoomError>,
        respond_to: Reply,
        started_at: Instant,
    ) {
        match outbound {
            Ok(outbound) => {
                self.flush();
                self.dispatch(command, outbound, Some(respond_to), started_at);
            }
            Err(e) => {
                debug!(
                    target: "live_room.actor.room",
                    room_id = %self.room_id,
                    command = command.as_str(),
                    error = %e,
                    "Command refused"
                );
                self.finish(command, started_at, Err(e), Some(respond_to));
            }
        }
    }

    /// Spawn the coordination call. Its result re-enters the mailbox.
    fn dispatch(
        &mut self,
        command: Command,
        outbound: Outbound,
        respond_to: Option<Reply>,
        started_at: Instant,
    ) {
        let Outbound {
            call,
            request,
            ticket,
            subject,
        } = outbound;
        let coordinator = Arc::clone(&self.coordinator);
        let mailbox = self.mailbox.clone();
        let cancel_token = self.cancel_token.child_token();
        self.in_flight += 1;

        tokio::spawn(async move {
            let remote = async {
                match &call {
                    RemoteCall::Invite => coordinator.send_invite(&request).await,
                    RemoteCall::Acceptance(extras) => {
                        coordinator.send_acceptance(&request, extras).await
                    }
                    RemoteCall::Rejection => coordinator.send_rejection(&request).await,
                    RemoteCall::ForceEnd => coordinator.send_force_end(&request).await,
                    RemoteCall::SelfEnd => coordinator.send_self_end(&request).await,
                }
            };

            let result = tokio::select! {
                () = cancel_token.cancelled() => return,
                result = remote => result,
            };

            let completion = RemoteCompletion {
                command,
                ticket,
                subject,
                result,
                respond_to,
                started_at,
            };

            // No strong sender left means the actor is gone; dropping the
            // completion drops `respond_to`, which the caller sees as closed.
            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox
                    .send(RoomMessage::RemoteCompleted(completion))
                    .await;
            }
        });
    }

    #[instrument(
        skip_all,
        fields(
            room_id = %self.room_id,
            command = completion.command.as_str(),
            seat_index = completion.ticket.seat_index
        )
    )]
    fn handle_completion(&mut self, completion: RemoteCompletion) {
        let RemoteCompletion {
            command,
            ticket,
            subject,
            result,
            respond_to,
            started_at,
        } = completion;
        self.in_flight = self.in_flight.saturating_sub(1);

        if command == Command::Reject {
            if let Err(e) = result {
                metrics::record_rejection_undelivered();
                warn!(
                    target: "live_room.actor.room",
                    room_id = %self.room_id,
                    seat_index = ticket.seat_index,
                    error = %e,
                    "Rejection could not be delivered"
                );
            }
            return;
        }

        if !self.seats.matches(&ticket) {
            debug!(
                target: "live_room.actor.room",
                room_id = %self.room_id,
                command = command.as_str(),
                seat_index = ticket.seat_index,
                generation = ticket.generation,
                "Ignoring stale completion"
            );
            metrics::record_stale_completion(command.as_str());
            self.finish(
                command,
                started_at,
                result.map_err(RoomError::from),
                respond_to,
            );
            return;
        }

        match result {
            Ok(()) => {
                if command == Command::ForceEnd {
                    self.commit_force_end(ticket.seat_index, subject);
                }
                self.finish(command, started_at, Ok(()), respond_to);
            }
            Err(e) => {
                self.roll_back(command, ticket.seat_index, subject);
                self.finish(command, started_at, Err(e.into()), respond_to);
            }
        }
    }

    fn commit_force_end(&mut self, seat_index: u32, occupant: Participant) {
        if let Err(e) = self.seats.transition(seat_index, SeatState::Empty) {
            error!(
                target: "live_room.actor.room",
                room_id = %self.room_id,
                seat_index,
                error = %e,
                "Failed to clear closed seat"
            );
            return;
        }
        self.dirty = true;
        self.emit(RoomEvent::BroadcastingEnded {
            seat_index,
            participant: occupant,
            forced: true,
        });
    }

    fn roll_back(&mut self, command: Command, seat_index: u32, subject: Participant) {
        let restored = match command {
            Command::Invite => SeatState::Empty,
            // Someone who left meanwhile is not put back on a seat.
            Command::Accept => match self.registry.participant(&subject.user_id) {
                Some(p) => SeatState::Pending(p.clone()),
                None => SeatState::Empty,
            },
            Command::ForceEnd | Command::End => match self.registry.participant(&subject.user_id) {
                Some(p) => SeatState::Occupied(p.clone()),
                None => SeatState::Empty,
            },
            Command::Reject => return,
        };

        if let Err(e) = self.seats.transition(seat_index, restored.clone()) {
            error!(
                target: "live_room.actor.room",
                room_id = %self.room_id,
                seat_index,
                error = %e,
                "Rollback failed"
            );
            return;
        }
        self.dirty = true;

        match (&command, &restored) {
            (Command::Accept, _) => self.change_role(&subject, Role::Audience),
            (Command::ForceEnd | Command::End, SeatState::Occupied(p)) => {
                let p = p.clone();
                self.change_role(&p, Role::Broadcaster);
            }
            _ => {}
        }

        warn!(
            target: "live_room.actor.room",
            room_id = %self.room_id,
            command = command.as_str(),
            seat_index,
            restored = restored.as_str(),
            "Rolled back optimistic transition"
        );
        metrics::record_rollback(command.as_str());
        self.emit(RoomEvent::CommandRolledBack {
            command,
            seat_index,
        });
    }

    /// Publish pending state, record metrics, then reply.
    fn finish(
        &mut self,
        command: Command,
        started_at: Instant,
        outcome: Result<(), RoomError>,
        respond_to: Option<Reply>,
    ) {
        self.flush();
        metrics::record_command(command.as_str(), outcome_label(&outcome));
        metrics::record_command_duration(command.as_str(), started_at.elapsed());
        if let Some(tx) = respond_to {
            let _ = tx.send(outcome);
        }
    }

    // ---------------------------------------------------------------------
    // Notifications
    // ---------------------------------------------------------------------

    #[instrument(skip_all, fields(room_id = %self.room_id, kind = notification.kind()))]
    fn handle_notification(&mut self, notification: RemoteNotification) {
        let kind = notification.kind();

        let applied = match notification {
            RemoteNotification::InvitationReceived {
                seat_index,
                owner_id,
                invitee,
            } => self.apply_invitation_received(seat_index, &owner_id, invitee),
            RemoteNotification::InvitationAccepted {
                seat_index,
                broadcaster,
            } => self.apply_invitation_accepted(seat_index, broadcaster),
            RemoteNotification::InvitationRejected { seat_index, by } => {
                self.apply_invitation_rejected(seat_index, &by)
            }
            RemoteNotification::BroadcastingEnded {
                seat_index,
                user_id,
                forced,
            } => self.apply_broadcasting_ended(seat_index, &user_id, forced),
            RemoteNotification::SeatsSynced { seats } => self.apply_seats_synced(&seats),
            RemoteNotification::ParticipantJoined { participant } => {
                let participant = self.localize(participant);
                let joined = self.registry.register(&participant);
                if joined {
                    self.emit(RoomEvent::ParticipantJoined { participant });
                }
                joined
            }
            RemoteNotification::ParticipantLeft { user_id } => {
                self.apply_participant_left(&user_id)
            }
            RemoteNotification::ProfileUpdated {
                user_id,
                display_name,
                head_url,
            } => self.apply_profile_updated(&user_id, display_name.as_deref(), head_url.as_deref()),
            RemoteNotification::LiveEnded => {
                self.is_ended = true;
                self.emit(RoomEvent::LiveEnded);
                true
            }
        };

        metrics::record_notification(kind, applied);
        if !applied {
            debug!(
                target: "live_room.actor.room",
                room_id = %self.room_id,
                kind,
                "Notification ignored"
            );
        }
    }

    fn apply_invitation_received(
        &mut self,
        seat_index: u32,
        owner_id: &str,
        invitee: Participant,
    ) -> bool {
        if !self.registry.is_owner(owner_id) {
            warn!(
                target: "live_room.actor.room",
                room_id = %self.room_id,
                owner_id,
                "Invitation from a participant who does not own the room"
            );
            return false;
        }
        let Ok(seat) = self.seats.get(seat_index) else {
            return false;
        };
        let invitee = self.localize(invitee);
        if seat.state.same_as(&SeatState::Pending(invitee.clone())) {
            return false;
        }
        if !self.seats.all_empty() || self.registry.is_owner(&invitee.user_id) {
            warn!(
                target: "live_room.actor.room",
                room_id = %self.room_id,
                seat_index,
                "Invitation conflicts with local seat state"
            );
            return false;
        }

        let invitee = self.known(invitee);
        if self
            .seats
            .transition(seat_index, SeatState::Pending(invitee.clone()))
            .is_err()
        {
            return false;
        }
        self.dirty = true;
        self.emit(RoomEvent::InvitationReceived {
            seat_index,
            owner: self.owner.participant().clone(),
            invitee,
        });
        true
    }

    fn apply_invitation_accepted(&mut self, seat_index: u32, broadcaster: Participant) -> bool {
        let broadcaster = self.localize(broadcaster);
        let all_empty = self.seats.all_empty();
        // The owner sent every invitation, so it never misses one.
        let may_have_missed_invite = !self.owner.is_local();
        let Ok(seat) = self.seats.get(seat_index) else {
            return false;
        };

        match &seat.state {
            SeatState::Occupied(p) if p.user_id == broadcaster.user_id => return false,
            SeatState::Pending(p) if p.user_id == broadcaster.user_id => {}
            // The invitation itself was not seen by this session. A late
            // acceptance from whoever just left the seat is not one.
            SeatState::Empty
                if all_empty
                    && may_have_missed_invite
                    && !seat.released_by(&broadcaster.user_id) => {}
            _ => {
                warn!(
                    target: "live_room.actor.room",
                    room_id = %self.room_id,
                    seat_index,
                    state = seat.state.as_str(),
                    "Acceptance conflicts with local seat state"
                );
                return false;
            }
        }
        if self.registry.is_owner(&broadcaster.user_id) {
            return false;
        }

        let broadcaster = self.known(broadcaster);
        if self
            .seats
            .transition(seat_index, SeatState::Occupied(broadcaster.clone()))
            .is_err()
        {
            return false;
        }
        self.dirty = true;
        self.change_role(&broadcaster, Role::Broadcaster);
        self.emit(RoomEvent::InvitationAccepted {
            seat_index,
            broadcaster,
        });
        true
    }

    fn apply_invitation_rejected(&mut self, seat_index: u32, by: &Participant) -> bool {
        let invitee = match self.seats.get(seat_index).map(|s| &s.state) {
            Ok(SeatState::Pending(p)) if p.user_id == by.user_id => p.clone(),
            _ => return false,
        };

        if self
            .seats
            .transition(seat_index, SeatState::Empty)
            .is_err()
        {
            return false;
        }
        self.dirty = true;
        self.emit(RoomEvent::InvitationRejected {
            seat_index,
            by: invitee,
        });
        true
    }

    fn apply_broadcasting_ended(&mut self, seat_index: u32, user_id: &str, forced: bool) -> bool {
        let participant = match self.seats.get(seat_index).map(|s| &s.state) {
            Ok(SeatState::Occupied(p)) if p.user_id == user_id => p.clone(),
            // Our own force-end is in flight; the coordinator got there first.
            Ok(SeatState::Closed(p)) if p.user_id == user_id => self
                .registry
                .participant(user_id)
                .cloned()
                .unwrap_or_else(|| p.clone()),
            _ => return false,
        };

        if self
            .seats
            .transition(seat_index, SeatState::Empty)
            .is_err()
        {
            return false;
        }
        self.dirty = true;
        self.change_role(&participant, Role::Audience);
        self.emit(RoomEvent::BroadcastingEnded {
            seat_index,
            participant,
            forced,
        });
        true
    }

    /// Reconcile seat occupancy with the coordinator's list.
    ///
    /// Pending and closed seats are left alone unless the list names an
    /// occupant for them: those mark local commands still in flight.
    fn apply_seats_synced(&mut self, assignments: &[SeatAssignment]) -> bool {
        let reported = assignments
            .iter()
            .filter(|a| a.occupant.is_some())
            .count();
        if reported > 1 {
            warn!(
                target: "live_room.actor.room",
                room_id = %self.room_id,
                occupants = reported,
                "Seat sync names more than one occupant, ignoring"
            );
            return false;
        }
        if let Some(unknown) = assignments
            .iter()
            .find(|a| self.seats.get(a.seat_index).is_err())
        {
            warn!(
                target: "live_room.actor.room",
                room_id = %self.room_id,
                seat_index = unknown.seat_index,
                "Seat sync names an unknown seat, ignoring"
            );
            return false;
        }

        let mut targets = Vec::new();
        let mut non_empty = 0;
        for seat in self.seats.seats() {
            let occupant = assignments
                .iter()
                .find(|a| a.seat_index == seat.index)
                .and_then(|a| a.occupant.clone())
                .map(|p| self.localize(p));

            let target = match (&seat.state, occupant) {
                (SeatState::Closed(_), _) | (SeatState::Pending(_), None) => None,
                (_, Some(p)) => Some(SeatState::Occupied(p)),
                (_, None) => Some(SeatState::Empty),
            }
            .filter(|target| !seat.state.same_as(target));

            let resulting = target.as_ref().unwrap_or(&seat.state);
            if !resulting.is_empty() {
                non_empty += 1;
            }
            if let Some(target) = target {
                targets.push((seat.index, target));
            }
        }

        if non_empty > 1 {
            warn!(
                target: "live_room.actor.room",
                room_id = %self.room_id,
                "Seat sync conflicts with a command in flight, ignoring"
            );
            return false;
        }
        if targets.is_empty() {
            return false;
        }

        for (seat_index, target) in targets {
            let previous = self
                .seats
                .get(seat_index)
                .ok()
                .and_then(|s| match &s.state {
                    SeatState::Occupied(p) => Some(p.clone()),
                    _ => None,
                });
            let target = match target {
                SeatState::Occupied(p) => SeatState::Occupied(self.known(p)),
                other => other,
            };
            if self.seats.transition(seat_index, target.clone()).is_err() {
                continue;
            }
            self.dirty = true;

            if let Some(previous) = previous {
                self.change_role(&previous, Role::Audience);
            }
            if let SeatState::Occupied(p) = &target {
                self.change_role(p, Role::Broadcaster);
            }
        }

        info!(
            target: "live_room.actor.room",
            room_id = %self.room_id,
            "Seats reconciled with coordinator"
        );
        true
    }

    fn apply_participant_left(&mut self, user_id: &str) -> bool {
        if self.registry.is_owner(user_id) {
            warn!(
                target: "live_room.actor.room",
                room_id = %self.room_id,
                "Owner left without ending the live"
            );
            return false;
        }
        if self.registry.remove(user_id).is_none() {
            return false;
        }

        let held = self
            .seats
            .held_by(user_id)
            .map(|seat| (seat.index, seat.state.clone()));
        if let Some((seat_index, state)) = held {
            if self
                .seats
                .transition(seat_index, SeatState::Empty)
                .is_ok()
            {
                self.dirty = true;
                if let SeatState::Occupied(participant) = state {
                    self.emit(RoomEvent::BroadcastingEnded {
                        seat_index,
                        participant,
                        forced: false,
                    });
                }
            }
        }

        self.emit(RoomEvent::ParticipantLeft {
            user_id: user_id.to_string(),
        });
        true
    }

    fn apply_profile_updated(
        &mut self,
        user_id: &str,
        display_name: Option<&str>,
        head_url: Option<&str>,
    ) -> bool {
        let Some(updated) = self
            .registry
            .update_profile(user_id, display_name, head_url)
        else {
            return false;
        };

        if self.registry.is_owner(user_id) {
            match &mut self.owner {
                Owner::Local(p) | Owner::Remote(p) => *p = updated.clone(),
            }
        }
        self.seats.refresh_holder(&updated);
        self.dirty = true;
        self.emit(RoomEvent::ProfileUpdated {
            participant: updated,
        });
        true
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn require_role(&self, caller_id: &str, role: Role, action: &str) -> Result<(), RoomError> {
        match self.registry.role_of(caller_id) {
            Some(actual) if actual == role => Ok(()),
            Some(actual) => Err(RoomError::NotAuthorized(format!(
                "{} cannot {action}",
                actual.as_str()
            ))),
            None => Err(RoomError::NotAuthorized(format!(
                "unknown participant cannot {action}"
            ))),
        }
    }

    /// Set `is_local` from this session's point of view.
    fn localize(&self, mut participant: Participant) -> Participant {
        participant.is_local = participant.user_id == self.local_id;
        participant
    }

    /// Register if new and return the registry's copy.
    fn known(&mut self, participant: Participant) -> Participant {
        let participant = self.localize(participant);
        self.registry.register(&participant);
        self.registry
            .participant(&participant.user_id)
            .cloned()
            .unwrap_or(participant)
    }

    fn change_role(&mut self, participant: &Participant, role: Role) {
        if role == Role::Broadcaster {
            self.registry.register(participant);
        }
        if let Some(previous) = self.registry.set_role(&participant.user_id, role) {
            self.dirty = true;
            info!(
                target: "live_room.actor.room",
                room_id = %self.room_id,
                user_id = %participant.user_id,
                from = previous.as_str(),
                to = role.as_str(),
                "Role changed"
            );
            self.emit(RoomEvent::RoleChanged {
                user_id: participant.user_id.clone(),
                role,
                is_local: participant.user_id == self.local_id,
            });
        }
    }

    fn request(&self, seat_index: u32, from_user_id: &str, to_user_id: &str) -> SeatRequest {
        SeatRequest {
            room_id: self.room_id.clone(),
            seat_index,
            from_user_id: from_user_id.to_string(),
            to_user_id: to_user_id.to_string(),
        }
    }

    fn emit(&mut self, event: RoomEvent) {
        self.queued_events.push(event);
    }

    /// Publish one snapshot for everything changed since the last flush, then
    /// send the queued events.
    fn flush(&mut self) {
        if self.dirty {
            self.dirty = false;
            self.revision += 1;

            let mode = BroadcastingMode::resolve(self.owner.participant(), self.seats.seats());
            let snapshot = RoomSnapshot {
                room_id: self.room_id.clone(),
                revision: self.revision,
                seats: self.seats.seats().to_vec(),
                mode,
                local_role: self
                    .registry
                    .role_of(&self.local_id)
                    .unwrap_or(Role::Audience),
            };

            let mode_changed = {
                let previous = self.snapshots.borrow();
                previous.mode.as_str() != snapshot.mode.as_str()
                    || previous.mode.broadcaster().map(|p| &p.user_id)
                        != snapshot.mode.broadcaster().map(|p| &p.user_id)
            };
            if mode_changed {
                info!(
                    target: "live_room.actor.room",
                    room_id = %self.room_id,
                    mode = snapshot.mode.as_str(),
                    revision = self.revision,
                    "Broadcasting mode changed"
                );
                metrics::record_mode_change(snapshot.mode.as_str());
            }

            self.snapshots.send_replace(snapshot);
        }

        for event in self.queued_events.drain(..) {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }
}

fn outcome_label(outcome: &Result<(), RoomError>) -> &'static str {
    match outcome {
        Ok(()) => "ok",
        Err(RoomError::NotAuthorized(_)) => "not_authorized",
        Err(
            RoomError::InvalidSeatState(_)
            | RoomError::SeatNotFound(_)
            | RoomError::ParticipantNotFound(_),
        ) => "invalid_state",
        Err(RoomError::RemoteFailure(_)) => "remote_failure",
        Err(_) => "error",
    }
}
