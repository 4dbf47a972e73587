//! Seat lifecycle integration tests.
//!
//! Runs owner, co-broadcaster and bystander sessions against one relayed
//! coordinator and checks that they agree after every step:
//! - Invite, accept, force-end
//! - Invite, reject
//! - Invite, accept, self-end
//! - Retry and rollback through the session's retrying coordinator

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use live_room::actors::{Command, RoomEvent};
use live_room::coordination::{CallKind, Extras};
use live_room::errors::{CoordinationError, RoomError};
use live_room::participant::{Participant, Role};
use live_room::seat::SeatState;
use live_room::session::RoomSession;
use live_room::view::BroadcastControl;
use live_room_test_utils::*;

struct Cast {
    host: Participant,
    guest: Participant,
    bystander: Participant,
}

fn cast() -> Cast {
    Cast {
        host: TestParticipant::new("100").with_name("Host").build(),
        guest: TestParticipant::new("200").with_name("Guest").build(),
        bystander: TestParticipant::new("300").build(),
    }
}

/// Owner, invitee and bystander sessions sharing one relay.
fn join_all(room: &TestRoom, cast: &Cast, relay: &CoordinationRelay) -> [RoomSession; 3] {
    let owner = room.join_with_directory(
        &cast.host,
        &cast.host,
        relay.coordinator(),
        vec![cast.guest.clone(), cast.bystander.clone()],
    );
    let audience = room.join_as(&cast.guest, &cast.host, relay.coordinator());
    let bystander = room.join_as(&cast.bystander, &cast.host, relay.coordinator());
    [owner, audience, bystander]
}

fn broadcaster_of(session: &RoomSession) -> Option<String> {
    session
        .snapshot()
        .mode
        .broadcaster()
        .map(|p| p.user_id.clone())
}

#[tokio::test]
async fn test_invite_accept_force_end_across_sessions() {
    let cast = cast();
    let room = TestRoom::random();
    let relay = CoordinationRelay::new([
        cast.host.clone(),
        cast.guest.clone(),
        cast.bystander.clone(),
    ]);
    let [owner, audience, bystander] = join_all(&room, &cast, &relay);
    let mut audience_events = audience.subscribe_events();

    // Invite.
    owner.invite("200").await.unwrap();
    relay.deliver_next(&[&audience, &bystander]).await;

    let event = next_event(&mut audience_events).await;
    assert!(matches!(
        event,
        RoomEvent::InvitationReceived { seat_index: 1, ref owner, ref invitee }
            if owner.user_id == "100" && invitee.is_local
    ));
    assert!(matches!(
        audience.snapshot().seats[0].state,
        SeatState::Pending(ref p) if p.user_id == "200"
    ));

    // Accept.
    audience.accept_invitation(Extras::new()).await.unwrap();
    relay.deliver_next(&[&owner, &bystander]).await;

    for session in [&owner, &audience, &bystander] {
        assert_eq!(broadcaster_of(session).as_deref(), Some("200"));
    }
    assert_eq!(audience.snapshot().local_role, Role::Broadcaster);
    assert_eq!(owner.broadcast_control(), BroadcastControl::ForceEnd);
    assert_eq!(audience.broadcast_control(), BroadcastControl::EndSelf);
    assert_eq!(bystander.broadcast_control(), BroadcastControl::Hidden);

    // Force-end.
    let mut audience_events = audience.subscribe_events();
    owner.force_end_broadcasting().await.unwrap();
    relay.deliver_next(&[&audience, &bystander]).await;

    for session in [&owner, &audience, &bystander] {
        assert_eq!(broadcaster_of(session), None);
        assert!(session.snapshot().seats[0].state.is_empty());
    }
    assert_eq!(audience.snapshot().local_role, Role::Audience);
    assert!(!audience.media_state().camera_on);

    let seen = events_until(&mut audience_events, |e| {
        matches!(e, RoomEvent::BroadcastingEnded { .. })
    })
    .await;
    assert!(matches!(
        seen.last(),
        Some(RoomEvent::BroadcastingEnded { forced: true, .. })
    ));

    for session in [owner, audience, bystander] {
        session.leave().await.unwrap();
    }
}

#[tokio::test]
async fn test_invite_reject_clears_owner_seat() {
    let cast = cast();
    let room = TestRoom::random();
    let relay = CoordinationRelay::new([cast.host.clone(), cast.guest.clone()]);
    let [owner, audience, bystander] = join_all(&room, &cast, &relay);
    let mut owner_events = owner.subscribe_events();

    owner.invite("200").await.unwrap();
    relay.deliver_next(&[&audience, &bystander]).await;

    audience.reject_invitation().await.unwrap();
    assert!(audience.snapshot().seats[0].state.is_empty());
    relay.deliver_next(&[&owner, &bystander]).await;

    assert!(owner.snapshot().seats[0].state.is_empty());
    assert!(bystander.snapshot().seats[0].state.is_empty());
    assert_eq!(owner.broadcast_control(), BroadcastControl::Invite);

    let seen = events_until(&mut owner_events, |e| {
        matches!(e, RoomEvent::InvitationRejected { .. })
    })
    .await;
    assert!(matches!(
        seen.last(),
        Some(RoomEvent::InvitationRejected { by, .. }) if by.user_id == "200"
    ));

    // The owner can invite again.
    owner.invite("300").await.unwrap();
    assert!(matches!(
        owner.snapshot().seats[0].state,
        SeatState::Pending(ref p) if p.user_id == "300"
    ));
}

#[tokio::test]
async fn test_self_end_returns_everyone_to_single() {
    let cast = cast();
    let room = TestRoom::random();
    let relay = CoordinationRelay::new([cast.host.clone(), cast.guest.clone()]);
    let [owner, audience, bystander] = join_all(&room, &cast, &relay);

    owner.invite("200").await.unwrap();
    relay.deliver_next(&[&audience, &bystander]).await;
    audience.accept_invitation(Extras::new()).await.unwrap();
    relay.deliver_next(&[&owner, &bystander]).await;
    assert_eq!(broadcaster_of(&owner).as_deref(), Some("200"));

    audience.end_broadcasting().await.unwrap();
    let notification = relay.deliver_next(&[&owner, &bystander]).await;
    assert!(matches!(
        notification,
        live_room::actors::RemoteNotification::BroadcastingEnded { forced: false, .. }
    ));

    for session in [&owner, &audience, &bystander] {
        assert_eq!(broadcaster_of(session), None);
    }
    assert_eq!(
        owner.handle().role_of("200".to_string()).await.unwrap(),
        Some(Role::Audience)
    );
}

#[tokio::test]
async fn test_invite_retries_transient_failures() {
    let cast = cast();
    let room = TestRoom::random().with_max_attempts(3);
    let relay = CoordinationRelay::new([cast.host.clone(), cast.guest.clone()]);
    let coordinator = relay.coordinator();
    for _ in 0..2 {
        coordinator
            .push_outcome(
                CallKind::Invite,
                Err(CoordinationError::Unavailable("flaky".to_string())),
            )
            .await;
    }
    let owner = room.join_with_directory(
        &cast.host,
        &cast.host,
        relay.coordinator(),
        vec![cast.guest.clone()],
    );

    owner.invite("200").await.unwrap();

    assert_eq!(coordinator.calls_of(CallKind::Invite).len(), 3);
    assert!(matches!(
        owner.snapshot().seats[0].state,
        SeatState::Pending(_)
    ));
}

#[tokio::test]
async fn test_exhausted_retries_roll_back_and_republish() {
    let cast = cast();
    let room = TestRoom::random().with_max_attempts(2);
    let relay = CoordinationRelay::new([cast.host.clone(), cast.guest.clone()]);
    let coordinator = relay.coordinator();
    for _ in 0..2 {
        coordinator
            .push_outcome(CallKind::Invite, Err(CoordinationError::Timeout))
            .await;
    }
    let owner = room.join_with_directory(
        &cast.host,
        &cast.host,
        relay.coordinator(),
        vec![cast.guest.clone()],
    );
    let mut snapshots = owner.watch_snapshots();
    let mut events = owner.subscribe_events();

    let result = owner.invite("200").await;

    assert!(matches!(
        result,
        Err(RoomError::RemoteFailure(CoordinationError::Timeout))
    ));
    // The rolled-back snapshot was published before the error came back.
    let snapshot = wait_for_snapshot(&mut snapshots, |s| s.revision == 2).await;
    assert!(snapshot.seats[0].state.is_empty());
    assert_eq!(owner.snapshot().revision, 2);

    let seen = drain_events(&mut events);
    assert_eq!(
        seen.last(),
        Some(&RoomEvent::CommandRolledBack {
            command: Command::Invite,
            seat_index: 1,
        })
    );
}

#[tokio::test]
async fn test_unknown_invitee_is_not_found() {
    let cast = cast();
    let room = TestRoom::random();
    let relay = CoordinationRelay::new([cast.host.clone()]);
    let owner = room.join_as(&cast.host, &cast.host, relay.coordinator());

    let result = owner.invite("200").await;

    assert!(matches!(result, Err(RoomError::ParticipantNotFound(_))));
    assert_eq!(relay.coordinator().call_count(), 0);
}
