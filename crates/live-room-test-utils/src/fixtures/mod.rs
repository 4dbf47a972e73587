//! Pre-configured test data fixtures.
//!
//! Provides builders for:
//! - Participants with explicit or random IDs
//! - Rooms with a seat count and a fast retry policy

use std::sync::Arc;
use std::time::Duration;

use live_room::config::{Config, RetryPolicy};
use live_room::coordination::Coordinator;
use live_room::participant::{Avatar, Participant, StaticDirectory};
use live_room::session::{RoomSession, SessionContext};
use uuid::Uuid;

/// Test participant fixture.
#[derive(Debug, Clone)]
pub struct TestParticipant {
    /// User ID.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Remote media stream ID.
    pub media_id: u32,
    /// Remote head image URL.
    pub head_url: String,
}

impl TestParticipant {
    /// Create a participant with the given user ID.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            media_id: user_id.parse().unwrap_or(0),
            name: format!("User {user_id}"),
            user_id,
            head_url: String::new(),
        }
    }

    /// Create a participant with a random user ID.
    #[must_use]
    pub fn random() -> Self {
        Self::new(format!("user-{}", &Uuid::new_v4().to_string()[..8]))
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the head image URL.
    #[must_use]
    pub fn with_head_url(mut self, url: impl Into<String>) -> Self {
        self.head_url = url.into();
        self
    }

    /// Build the participant. `is_local` is decided by the session.
    #[must_use]
    pub fn build(&self) -> Participant {
        let mut participant = Participant::new(&self.user_id, &self.name, self.media_id, false);
        participant.avatar = Avatar {
            head_url: self.head_url.clone(),
            image_index: 0,
        };
        participant
    }
}

/// Test room fixture.
#[derive(Debug, Clone)]
pub struct TestRoom {
    /// Room ID.
    pub id: String,
    /// Number of seats.
    pub seat_count: u32,
    /// Coordination attempts per call.
    pub max_attempts: u32,
}

impl TestRoom {
    /// Create a single-seat room with the given ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            seat_count: 1,
            max_attempts: 1,
        }
    }

    /// Create a room with a random ID.
    #[must_use]
    pub fn random() -> Self {
        Self::new(format!("room-{}", Uuid::new_v4()))
    }

    /// Set the seat count.
    #[must_use]
    pub fn with_seats(mut self, seat_count: u32) -> Self {
        self.seat_count = seat_count;
        self
    }

    /// Retry coordination calls up to `max_attempts` times.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Config with short backoff so retries do not slow tests down.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            seat_count: self.seat_count,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                backoff_base: Duration::from_millis(5),
                backoff_max: Duration::from_millis(20),
                attempt_timeout: Duration::from_secs(2),
            },
            ..Config::default()
        }
    }

    /// Join the room as `local`, owned by `owner`, with an empty directory.
    pub fn join_as<C>(&self, local: &Participant, owner: &Participant, coordinator: C) -> RoomSession
    where
        C: Coordinator + 'static,
    {
        self.join_with_directory(local, owner, coordinator, Vec::new())
    }

    /// Join with a directory of invitable participants.
    pub fn join_with_directory<C>(
        &self,
        local: &Participant,
        owner: &Participant,
        coordinator: C,
        audience: Vec<Participant>,
    ) -> RoomSession
    where
        C: Coordinator + 'static,
    {
        let context = SessionContext::builder()
            .room_id(&self.id)
            .local(local.clone())
            .owner(owner.clone())
            .build()
            .expect("fixture context is complete");
        RoomSession::join(
            context,
            &self.config(),
            coordinator,
            Arc::new(StaticDirectory::new(audience)),
        )
    }
}
