//! Room invariant tests.
//!
//! Drives owner and audience sessions through long, seeded sequences of
//! commands, notifications and scripted coordinator failures, and checks
//! after every step that:
//! - At most one seat is non-empty
//! - The published mode matches the published seats
//! - A non-owner is a broadcaster iff it occupies a seat
//! - The owner's role never changes
//! - No command fails with anything but a domain error

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use live_room::actors::{RemoteNotification, SeatAssignment};
use live_room::coordination::{CallKind, Extras};
use live_room::errors::{CoordinationError, RoomError};
use live_room::mode::BroadcastingMode;
use live_room::participant::{Participant, Role};
use live_room::seat::SeatState;
use live_room::session::RoomSession;
use live_room_test_utils::*;

const STEPS: usize = 200;

/// Small deterministic generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) % bound
    }
}

async fn assert_invariants(session: &RoomSession, owner_id: &str, step: usize) {
    let snapshot = session.handle().get_snapshot().await.unwrap();

    let non_empty = snapshot
        .seats
        .iter()
        .filter(|s| !s.state.is_empty())
        .count();
    assert!(non_empty <= 1, "step {step}: {non_empty} seats in use");

    assert_eq!(
        snapshot.mode,
        BroadcastingMode::resolve(snapshot.mode.owner(), &snapshot.seats),
        "step {step}: mode does not match seats"
    );
    assert_eq!(snapshot.mode.owner().user_id, owner_id);

    let local_id = session.context().local().user_id.clone();
    for (participant, role) in session.handle().participants().await.unwrap() {
        let occupying = snapshot.seats.iter().any(|s| {
            matches!(&s.state, SeatState::Occupied(p) if p.user_id == participant.user_id)
        });
        if participant.user_id == owner_id {
            assert_eq!(role, Role::Owner, "step {step}: owner role changed");
        } else {
            assert_eq!(
                role == Role::Broadcaster,
                occupying,
                "step {step}: {} is {:?} but occupying={occupying}",
                participant.user_id,
                role
            );
        }
        if participant.user_id == local_id {
            assert_eq!(snapshot.local_role, role, "step {step}: stale local role");
        }
    }
}

fn assert_domain_error(result: Result<(), RoomError>, step: usize) {
    if let Err(e) = result {
        assert!(
            matches!(
                e,
                RoomError::NotAuthorized(_)
                    | RoomError::InvalidSeatState(_)
                    | RoomError::RemoteFailure(_)
            ),
            "step {step}: unexpected error {e:?}"
        );
    }
}

fn failure(rng: &mut Lcg) -> CoordinationError {
    match rng.next(3) {
        0 => CoordinationError::Rejected("refused".to_string()),
        1 => CoordinationError::Unavailable("down".to_string()),
        _ => CoordinationError::Timeout,
    }
}

#[tokio::test]
async fn test_owner_session_invariants_hold() {
    let host = TestParticipant::new("100").build();
    let guest = TestParticipant::new("200").build();
    let other = TestParticipant::new("300").build();
    let room = TestRoom::random();
    let relay = CoordinationRelay::new([host.clone(), guest.clone(), other.clone()]);
    let coordinator = relay.coordinator();
    let owner = room.join_with_directory(
        &host,
        &host,
        relay.coordinator(),
        vec![guest.clone(), other.clone()],
    );

    let mut rng = Lcg(0x5eed_0001);
    for step in 0..STEPS {
        let result = match rng.next(8) {
            0 => {
                if rng.next(4) == 0 {
                    coordinator.push_outcome(CallKind::Invite, Err(failure(&mut rng))).await;
                }
                let invitee = if rng.next(2) == 0 { "200" } else { "300" };
                owner.invite(invitee).await
            }
            1 => {
                if rng.next(3) == 0 {
                    coordinator.push_outcome(CallKind::ForceEnd, Err(failure(&mut rng))).await;
                }
                owner.force_end_broadcasting().await
            }
            2 => {
                owner
                    .apply_notification(RemoteNotification::InvitationAccepted {
                        seat_index: 1,
                        broadcaster: guest.clone(),
                    })
                    .await
            }
            3 => {
                owner
                    .apply_notification(RemoteNotification::InvitationRejected {
                        seat_index: 1,
                        by: guest.clone(),
                    })
                    .await
            }
            4 => {
                owner
                    .apply_notification(RemoteNotification::BroadcastingEnded {
                        seat_index: 1,
                        user_id: "200".to_string(),
                        forced: false,
                    })
                    .await
            }
            5 => {
                let occupant = match rng.next(3) {
                    0 => None,
                    1 => Some(guest.clone()),
                    _ => Some(other.clone()),
                };
                owner
                    .apply_notification(RemoteNotification::SeatsSynced {
                        seats: vec![SeatAssignment {
                            seat_index: 1,
                            occupant,
                        }],
                    })
                    .await
            }
            6 => {
                owner
                    .apply_notification(RemoteNotification::ParticipantLeft {
                        user_id: "200".to_string(),
                    })
                    .await
            }
            _ => {
                owner
                    .apply_notification(RemoteNotification::ParticipantJoined {
                        participant: guest.clone(),
                    })
                    .await
            }
        };

        assert_domain_error(result, step);
        assert_invariants(&owner, "100", step).await;
    }

    owner.leave().await.unwrap();
}

#[tokio::test]
async fn test_audience_session_invariants_hold() {
    let host = TestParticipant::new("100").build();
    let guest = TestParticipant::new("200").build();
    let room = TestRoom::random();
    let relay = CoordinationRelay::new([host.clone(), guest.clone()]);
    let coordinator = relay.coordinator();
    let audience = room.join_as(&guest, &host, relay.coordinator());

    let mut rng = Lcg(0x5eed_0002);
    for step in 0..STEPS {
        let result = match rng.next(7) {
            0 => {
                audience
                    .apply_notification(RemoteNotification::InvitationReceived {
                        seat_index: 1,
                        owner_id: "100".to_string(),
                        invitee: guest.clone(),
                    })
                    .await
            }
            1 => {
                if rng.next(3) == 0 {
                    coordinator
                        .push_outcome(CallKind::Acceptance, Err(failure(&mut rng)))
                        .await;
                }
                audience.accept_invitation(Extras::new()).await
            }
            2 => audience.reject_invitation().await,
            3 => {
                if rng.next(3) == 0 {
                    coordinator.push_outcome(CallKind::SelfEnd, Err(failure(&mut rng))).await;
                }
                audience.end_broadcasting().await
            }
            4 => {
                audience
                    .apply_notification(RemoteNotification::BroadcastingEnded {
                        seat_index: 1,
                        user_id: "200".to_string(),
                        forced: true,
                    })
                    .await
            }
            5 => {
                let occupant: Option<Participant> = (rng.next(2) == 0).then(|| guest.clone());
                audience
                    .apply_notification(RemoteNotification::SeatsSynced {
                        seats: vec![SeatAssignment {
                            seat_index: 1,
                            occupant,
                        }],
                    })
                    .await
            }
            _ => {
                audience
                    .apply_notification(RemoteNotification::ProfileUpdated {
                        user_id: "200".to_string(),
                        display_name: Some(format!("Guest {step}")),
                        head_url: None,
                    })
                    .await
            }
        };

        assert_domain_error(result, step);
        assert_invariants(&audience, "100", step).await;
    }

    audience.leave().await.unwrap();
}

#[tokio::test]
async fn test_multi_seat_room_keeps_single_slot() {
    let host = TestParticipant::new("100").build();
    let guests: Vec<Participant> = ["200", "300", "400"]
        .iter()
        .map(|id| TestParticipant::new(*id).build())
        .collect();
    let room = TestRoom::random().with_seats(3);
    let relay = CoordinationRelay::new(std::iter::once(host.clone()).chain(guests.clone()));
    let owner = room.join_with_directory(&host, &host, relay.coordinator(), guests.clone());

    let mut rng = Lcg(0x5eed_0003);
    for step in 0..STEPS {
        let guest = &guests[usize::try_from(rng.next(3)).unwrap()];
        let seat_index = u32::try_from(rng.next(3)).unwrap() + 1;
        let result = match rng.next(4) {
            0 => owner.invite(&guest.user_id).await,
            1 => owner.force_end_broadcasting().await,
            2 => {
                owner
                    .apply_notification(RemoteNotification::InvitationAccepted {
                        seat_index,
                        broadcaster: guest.clone(),
                    })
                    .await
            }
            _ => {
                let seats = (1..=3)
                    .map(|index| SeatAssignment {
                        seat_index: index,
                        occupant: (index == seat_index && rng.next(2) == 0)
                            .then(|| guest.clone()),
                    })
                    .collect();
                owner
                    .apply_notification(RemoteNotification::SeatsSynced { seats })
                    .await
            }
        };

        assert_domain_error(result, step);
        assert_invariants(&owner, "100", step).await;
    }
}
