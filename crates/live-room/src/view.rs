//! View-state derivation for presenters.
//!
//! Pure functions of (mode, owner, local role). Presenters call these on every
//! snapshot instead of re-deriving button and tile state themselves.

use crate::mode::BroadcastingMode;
use crate::participant::{Owner, Role};
use serde::Serialize;

/// What the primary broadcast button does for the local user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BroadcastControl {
    /// Owner may open the invite list.
    Invite,
    /// Owner may force the co-broadcaster off (after confirmation).
    ForceEnd,
    /// Co-broadcaster may end their own broadcast (after confirmation).
    EndSelf,
    /// Button is not shown.
    Hidden,
}

impl BroadcastControl {
    #[must_use]
    pub fn derive(mode: &BroadcastingMode, owner: &Owner, local_role: Role) -> Self {
        match (mode.is_multi(), owner.is_local()) {
            (false, true) => BroadcastControl::Invite,
            (false, false) => BroadcastControl::Hidden,
            (true, true) => BroadcastControl::ForceEnd,
            (true, false) if local_role == Role::Broadcaster => BroadcastControl::EndSelf,
            (true, false) => BroadcastControl::Hidden,
        }
    }

    /// Localization key for the button title.
    #[must_use]
    pub const fn label_key(&self) -> Option<&'static str> {
        match self {
            BroadcastControl::Invite => Some("Invite_Broadcasting"),
            BroadcastControl::ForceEnd | BroadcastControl::EndSelf => Some("Ending_Broadcasting"),
            BroadcastControl::Hidden => None,
        }
    }

    /// Whether the action needs a confirm dialog before it is issued.
    #[must_use]
    pub const fn needs_confirmation(&self) -> bool {
        matches!(self, BroadcastControl::ForceEnd | BroadcastControl::EndSelf)
    }
}

/// Where a tile's video comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamSource {
    Local,
    Remote,
}

/// One video tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoTile {
    pub user_id: String,
    pub media_id: u32,
    pub source: StreamSource,
}

/// Ordered video tiles: owner first, co-broadcaster second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoLayout {
    pub tiles: Vec<VideoTile>,
}

impl VideoLayout {
    #[must_use]
    pub fn derive(mode: &BroadcastingMode, local_user_id: &str) -> Self {
        let tiles = mode
            .on_screen()
            .into_iter()
            .map(|p| VideoTile {
                user_id: p.user_id.clone(),
                media_id: p.remote_media_id,
                source: if p.user_id == local_user_id {
                    StreamSource::Local
                } else {
                    StreamSource::Remote
                },
            })
            .collect();
        Self { tiles }
    }

    #[must_use]
    pub fn only_owner(&self) -> bool {
        self.tiles.len() == 1
    }
}

/// Local capture devices state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaState {
    pub camera_on: bool,
    pub mic_on: bool,
}

impl MediaState {
    /// Anyone on screen captures; audience does not.
    #[must_use]
    pub fn for_role(role: Role) -> Self {
        let on = role != Role::Audience;
        Self {
            camera_on: on,
            mic_on: on,
        }
    }
}
