//! Coordination relay.
//!
//! Plays the coordination service's fan-out: every call recorded by the shared
//! `InMemoryCoordinator` becomes the `RemoteNotification` the other sessions
//! in the room would be pushed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use live_room::actors::RemoteNotification;
use live_room::coordination::{CallKind, InMemoryCoordinator, RecordedCall};
use live_room::participant::Participant;
use live_room::session::RoomSession;

/// How long `deliver_next` waits for a call before failing the test.
pub const RELAY_TIMEOUT: Duration = Duration::from_secs(2);

/// Relays recorded coordinator calls to sessions as notifications.
pub struct CoordinationRelay {
    coordinator: Arc<InMemoryCoordinator>,
    participants: HashMap<String, Participant>,
    delivered: AtomicUsize,
}

impl CoordinationRelay {
    /// Create a relay that knows the given participants.
    #[must_use]
    pub fn new(participants: impl IntoIterator<Item = Participant>) -> Self {
        Self::with_coordinator(Arc::new(InMemoryCoordinator::new()), participants)
    }

    /// Create a relay around an existing coordinator.
    #[must_use]
    pub fn with_coordinator(
        coordinator: Arc<InMemoryCoordinator>,
        participants: impl IntoIterator<Item = Participant>,
    ) -> Self {
        Self {
            coordinator,
            participants: participants
                .into_iter()
                .map(|p| (p.user_id.clone(), p))
                .collect(),
            delivered: AtomicUsize::new(0),
        }
    }

    /// Shared coordinator to pass to every session.
    #[must_use]
    pub fn coordinator(&self) -> Arc<InMemoryCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// The notification the service would push for `call`.
    #[must_use]
    pub fn notification_for(&self, call: &RecordedCall) -> RemoteNotification {
        let request = &call.request;
        match call.kind {
            CallKind::Invite => RemoteNotification::InvitationReceived {
                seat_index: request.seat_index,
                owner_id: request.from_user_id.clone(),
                invitee: self.participant(&request.to_user_id),
            },
            CallKind::Acceptance => RemoteNotification::InvitationAccepted {
                seat_index: request.seat_index,
                broadcaster: self.participant(&request.from_user_id),
            },
            CallKind::Rejection => RemoteNotification::InvitationRejected {
                seat_index: request.seat_index,
                by: self.participant(&request.from_user_id),
            },
            CallKind::ForceEnd => RemoteNotification::BroadcastingEnded {
                seat_index: request.seat_index,
                user_id: request.to_user_id.clone(),
                forced: true,
            },
            CallKind::SelfEnd => RemoteNotification::BroadcastingEnded {
                seat_index: request.seat_index,
                user_id: request.from_user_id.clone(),
                forced: false,
            },
        }
    }

    /// Wait for the next undelivered call and push its notification to
    /// `targets`. Returns once every target has applied it.
    ///
    /// # Panics
    ///
    /// Panics if no call arrives within [`RELAY_TIMEOUT`].
    pub async fn deliver_next(&self, targets: &[&RoomSession]) -> RemoteNotification {
        let index = self.delivered.fetch_add(1, Ordering::SeqCst);
        tokio::time::timeout(
            RELAY_TIMEOUT,
            self.coordinator.wait_for_call_count(index + 1),
        )
        .await
        .expect("timed out waiting for a coordination call");

        let call = self
            .coordinator
            .calls()
            .get(index)
            .cloned()
            .expect("call was recorded");
        let notification = self.notification_for(&call);

        for target in targets {
            target
                .apply_notification(notification.clone())
                .await
                .expect("target session is open");
            // Round trip so the notification is applied before returning.
            target
                .handle()
                .get_snapshot()
                .await
                .expect("target session is open");
        }
        notification
    }

    /// Skip the next call, e.g. one the service refused.
    pub fn skip(&self) {
        self.delivered.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of calls relayed or skipped so far.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    fn participant(&self, user_id: &str) -> Participant {
        self.participants
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| Participant::new(user_id, user_id, 0, false))
    }
}
