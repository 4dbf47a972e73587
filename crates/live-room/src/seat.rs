//! Broadcasting seats.
//!
//! Seats are indexed from 1; the owner's own slot is implicit. Every
//! transition bumps the seat generation, and a [`SeatTicket`] captured after a
//! transition identifies that exact state so a late remote completion can be
//! recognized as stale.

use crate::errors::RoomError;
use crate::participant::Participant;
use serde::{Deserialize, Serialize};

/// State of one broadcasting seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "participant", rename_all = "snake_case")]
pub enum SeatState {
    Empty,
    /// Invitation sent, waiting for the invitee's answer.
    Pending(Participant),
    Occupied(Participant),
    /// Transient marker while the force-end of this occupant is in flight.
    /// Blocks invites.
    Closed(Participant),
}

impl SeatState {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, SeatState::Empty)
    }

    #[must_use]
    pub fn is_occupied(&self) -> bool {
        matches!(self, SeatState::Occupied(_))
    }

    /// The invitee or occupant, if any. A closing seat has no holder.
    #[must_use]
    pub fn holder(&self) -> Option<&Participant> {
        match self {
            SeatState::Pending(p) | SeatState::Occupied(p) => Some(p),
            SeatState::Empty | SeatState::Closed(_) => None,
        }
    }

    /// Same variant and same holder identity; profile fields are ignored.
    #[must_use]
    pub fn same_as(&self, other: &SeatState) -> bool {
        match (self, other) {
            (SeatState::Empty, SeatState::Empty) => true,
            (SeatState::Pending(a), SeatState::Pending(b))
            | (SeatState::Occupied(a), SeatState::Occupied(b))
            | (SeatState::Closed(a), SeatState::Closed(b)) => a.user_id == b.user_id,
            _ => false,
        }
    }

    /// Returns the state name for log fields and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SeatState::Empty => "empty",
            SeatState::Pending(_) => "pending",
            SeatState::Occupied(_) => "occupied",
            SeatState::Closed(_) => "closed",
        }
    }
}

/// A broadcasting seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub index: u32,
    pub state: SeatState,
    #[serde(skip)]
    generation: u64,
    /// Whoever last left this seat empty (rejected, ended, removed).
    #[serde(skip)]
    released_by: Option<String>,
}

impl Seat {
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self {
            index,
            state: SeatState::Empty,
            generation: 0,
            released_by: None,
        }
    }

    /// Number of transitions this seat has gone through.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `user_id` was the last invitee or occupant to leave this seat
    /// empty. Cleared once anyone else is seated or invited.
    #[must_use]
    pub fn released_by(&self, user_id: &str) -> bool {
        self.released_by.as_deref() == Some(user_id)
    }
}

/// Identifies a seat state produced by one transition.
#[derive(Debug, Clone)]
pub struct SeatTicket {
    pub seat_index: u32,
    pub generation: u64,
    pub expected: SeatState,
}

/// Fixed set of seats for one room.
#[derive(Debug, Clone)]
pub struct SeatTable {
    seats: Vec<Seat>,
}

impl SeatTable {
    /// Create `count` empty seats indexed `1..=count`.
    #[must_use]
    pub fn new(count: u32) -> Self {
        Self {
            seats: (1..=count).map(Seat::new).collect(),
        }
    }

    #[must_use]
    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn get(&self, index: u32) -> Result<&Seat, RoomError> {
        self.seats
            .iter()
            .find(|s| s.index == index)
            .ok_or(RoomError::SeatNotFound(index))
    }

    /// True when no seat is pending, occupied or closed.
    #[must_use]
    pub fn all_empty(&self) -> bool {
        self.seats.iter().all(|s| s.state.is_empty())
    }

    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.seats.iter().filter(|s| s.state.is_occupied()).count()
    }

    /// The seat this user is invited to or occupying.
    #[must_use]
    pub fn held_by(&self, user_id: &str) -> Option<&Seat> {
        self.seats
            .iter()
            .find(|s| s.state.holder().is_some_and(|p| p.user_id == user_id))
    }

    /// The first pending seat, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&Seat> {
        self.seats
            .iter()
            .find(|s| matches!(s.state, SeatState::Pending(_)))
    }

    /// Set a seat's state and return a ticket for the new state.
    pub(crate) fn transition(
        &mut self,
        index: u32,
        state: SeatState,
    ) -> Result<SeatTicket, RoomError> {
        let seat = self
            .seats
            .iter_mut()
            .find(|s| s.index == index)
            .ok_or(RoomError::SeatNotFound(index))?;
        seat.released_by = match (&state, &seat.state) {
            (
                SeatState::Empty,
                SeatState::Pending(p) | SeatState::Occupied(p) | SeatState::Closed(p),
            ) => Some(p.user_id.clone()),
            (SeatState::Empty, SeatState::Empty) => seat.released_by.take(),
            _ => None,
        };
        seat.state = state;
        seat.generation += 1;
        Ok(SeatTicket {
            seat_index: index,
            generation: seat.generation,
            expected: seat.state.clone(),
        })
    }

    /// Whether the seat is still exactly where the ticket left it.
    #[must_use]
    pub fn matches(&self, ticket: &SeatTicket) -> bool {
        self.get(ticket.seat_index)
            .map(|s| s.generation == ticket.generation && s.state.same_as(&ticket.expected))
            .unwrap_or(false)
    }

    /// Replace the stored copy of a holder after a profile update.
    /// Does not count as a transition.
    pub(crate) fn refresh_holder(&mut self, participant: &Participant) {
        for seat in &mut self.seats {
            match &mut seat.state {
                SeatState::Pending(p) | SeatState::Occupied(p) | SeatState::Closed(p)
                    if p.user_id == participant.user_id =>
                {
                    *p = participant.clone();
                }
                _ => {}
            }
        }
    }
}
