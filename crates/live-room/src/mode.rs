//! Broadcasting mode resolution.
//!
//! The mode is never stored: it is recomputed from the seat set after every
//! transition and published together with the seats.

use crate::participant::Participant;
use crate::seat::{Seat, SeatState};
use serde::{Deserialize, Serialize};

/// High-level room mode observed by the presenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BroadcastingMode {
    /// Only the owner is on screen.
    Single { owner: Participant },
    /// The owner and exactly one co-broadcaster are on screen.
    Multi {
        owner: Participant,
        broadcaster: Participant,
    },
}

impl BroadcastingMode {
    /// Resolve the mode for a seat set.
    ///
    /// `Multi` iff exactly one seat is `Occupied`, otherwise `Single`.
    #[must_use]
    pub fn resolve(owner: &Participant, seats: &[Seat]) -> Self {
        let mut occupants = seats.iter().filter_map(|seat| match &seat.state {
            SeatState::Occupied(p) => Some(p),
            _ => None,
        });

        match (occupants.next(), occupants.next()) {
            (Some(broadcaster), None) => BroadcastingMode::Multi {
                owner: owner.clone(),
                broadcaster: broadcaster.clone(),
            },
            _ => BroadcastingMode::Single {
                owner: owner.clone(),
            },
        }
    }

    #[must_use]
    pub fn is_multi(&self) -> bool {
        matches!(self, BroadcastingMode::Multi { .. })
    }

    #[must_use]
    pub fn owner(&self) -> &Participant {
        match self {
            BroadcastingMode::Single { owner } | BroadcastingMode::Multi { owner, .. } => owner,
        }
    }

    #[must_use]
    pub fn broadcaster(&self) -> Option<&Participant> {
        match self {
            BroadcastingMode::Single { .. } => None,
            BroadcastingMode::Multi { broadcaster, .. } => Some(broadcaster),
        }
    }

    /// Everyone on screen, owner first.
    #[must_use]
    pub fn on_screen(&self) -> Vec<&Participant> {
        match self {
            BroadcastingMode::Single { owner } => vec![owner],
            BroadcastingMode::Multi { owner, broadcaster } => vec![owner, broadcaster],
        }
    }

    /// Returns the mode name for log fields and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            BroadcastingMode::Single { .. } => "single",
            BroadcastingMode::Multi { .. } => "multi",
        }
    }
}
