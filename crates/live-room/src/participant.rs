//! Participants, roles and the per-room role registry.
//!
//! The registry is owned by the room actor. Roles only change as a side
//! effect of seat transitions, so `set_role` is crate-private.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of built-in head images a participant may be assigned.
pub const HEAD_IMAGE_COUNT: u64 = 12;

/// Avatar presentation data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    /// Remote head image URL, empty when unset.
    pub head_url: String,
    /// Index into the built-in head images.
    pub image_index: u32,
}

/// A room participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Unique user ID.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Media stream ID used by the video layer to render this participant.
    pub remote_media_id: u32,
    /// Whether this participant is the local user of this session.
    pub is_local: bool,
    /// Avatar shown next to the display name.
    pub avatar: Avatar,
}

/// Directory record as served by the user service.
#[derive(Debug, Deserialize)]
struct DirectoryRecord {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "userName")]
    user_name: String,
    #[serde(default)]
    avatar: String,
    #[serde(rename = "uid", default)]
    media_id: u32,
}

impl Participant {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        remote_media_id: u32,
        is_local: bool,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            remote_media_id,
            is_local,
            avatar: Avatar::default(),
        }
    }

    /// Build a participant from a user-service JSON record
    /// (`userId`, `userName`, optional `avatar` and `uid`).
    ///
    /// The head image index is derived from numeric user IDs.
    pub fn from_record(json: &str, is_local: bool) -> Result<Self, serde_json::Error> {
        let record: DirectoryRecord = serde_json::from_str(json)?;
        let image_index = head_image_index(&record.user_id);
        Ok(Self {
            user_id: record.user_id,
            display_name: record.user_name,
            remote_media_id: record.media_id,
            is_local,
            avatar: Avatar {
                head_url: record.avatar,
                image_index,
            },
        })
    }

    /// Apply an explicit profile update. `None` fields are left unchanged.
    pub fn apply_profile(&mut self, display_name: Option<&str>, head_url: Option<&str>) {
        if let Some(name) = display_name {
            self.display_name = name.to_string();
        }
        if let Some(url) = head_url {
            self.avatar.head_url = url.to_string();
        }
    }
}

fn head_image_index(user_id: &str) -> u32 {
    user_id
        .parse::<u64>()
        .ok()
        .and_then(|id| u32::try_from(id % HEAD_IMAGE_COUNT).ok())
        .unwrap_or(0)
}

/// The room owner, fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Owner {
    /// The local user owns the room.
    Local(Participant),
    /// Someone else owns the room.
    Remote(Participant),
}

impl Owner {
    #[must_use]
    pub fn participant(&self) -> &Participant {
        match self {
            Owner::Local(p) | Owner::Remote(p) => p,
        }
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Owner::Local(_))
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.participant().user_id
    }
}

/// Per-participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Owner,
    Broadcaster,
    Audience,
}

impl Role {
    /// Returns the role as a string for log fields and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Broadcaster => "broadcaster",
            Role::Audience => "audience",
        }
    }
}

#[derive(Debug, Clone)]
struct Member {
    participant: Participant,
    role: Role,
}

/// `user_id -> (participant, role)` for everyone known in the room.
#[derive(Debug)]
pub struct RoleRegistry {
    owner_id: String,
    members: HashMap<String, Member>,
}

impl RoleRegistry {
    /// Create a registry holding the owner and the local participant.
    #[must_use]
    pub fn new(owner: &Owner, local: &Participant) -> Self {
        let mut members = HashMap::new();
        members.insert(
            owner.user_id().to_string(),
            Member {
                participant: owner.participant().clone(),
                role: Role::Owner,
            },
        );
        members
            .entry(local.user_id.clone())
            .or_insert_with(|| Member {
                participant: local.clone(),
                role: Role::Audience,
            });

        Self {
            owner_id: owner.user_id().to_string(),
            members,
        }
    }

    #[must_use]
    pub fn role_of(&self, user_id: &str) -> Option<Role> {
        self.members.get(user_id).map(|m| m.role)
    }

    #[must_use]
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.members.get(user_id).map(|m| &m.participant)
    }

    #[must_use]
    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// All known participants with their roles, sorted by user ID.
    #[must_use]
    pub fn entries(&self) -> Vec<(Participant, Role)> {
        let mut entries: Vec<_> = self
            .members
            .values()
            .map(|m| (m.participant.clone(), m.role))
            .collect();
        entries.sort_by(|a, b| a.0.user_id.cmp(&b.0.user_id));
        entries
    }

    /// Change a participant's role. The owner's role is fixed.
    ///
    /// Returns the previous role when it actually changed.
    pub(crate) fn set_role(&mut self, user_id: &str, role: Role) -> Option<Role> {
        if self.is_owner(user_id) || role == Role::Owner {
            return None;
        }
        let member = self.members.get_mut(user_id)?;
        if member.role == role {
            return None;
        }
        Some(std::mem::replace(&mut member.role, role))
    }

    /// Register a participant as audience. Returns `false` if already known.
    pub(crate) fn register(&mut self, participant: &Participant) -> bool {
        if self.members.contains_key(&participant.user_id) {
            return false;
        }
        self.members.insert(
            participant.user_id.clone(),
            Member {
                participant: participant.clone(),
                role: Role::Audience,
            },
        );
        true
    }

    /// Remove a participant. The owner is never removed.
    pub(crate) fn remove(&mut self, user_id: &str) -> Option<(Participant, Role)> {
        if self.is_owner(user_id) {
            return None;
        }
        self.members
            .remove(user_id)
            .map(|m| (m.participant, m.role))
    }

    /// Apply a profile update, returning the updated participant.
    pub(crate) fn update_profile(
        &mut self,
        user_id: &str,
        display_name: Option<&str>,
        head_url: Option<&str>,
    ) -> Option<Participant> {
        let member = self.members.get_mut(user_id)?;
        member.participant.apply_profile(display_name, head_url);
        Some(member.participant.clone())
    }
}

/// Read-only lookup of participants the local user can see (audience list).
pub trait ParticipantDirectory: Send + Sync {
    fn lookup(&self, user_id: &str) -> Option<Participant>;
}

/// In-memory directory.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    entries: HashMap<String, Participant>,
}

impl StaticDirectory {
    #[must_use]
    pub fn new(participants: impl IntoIterator<Item = Participant>) -> Self {
        Self {
            entries: participants
                .into_iter()
                .map(|p| (p.user_id.clone(), p))
                .collect(),
        }
    }
}

impl ParticipantDirectory for StaticDirectory {
    fn lookup(&self, user_id: &str) -> Option<Participant> {
        self.entries.get(user_id).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn owner() -> Owner {
        Owner::Local(Participant::new("100", "Host", 1, true))
    }

    fn audience(id: &str) -> Participant {
        Participant::new(id, format!("User {id}"), 2, false)
    }

    #[test]
    fn test_from_record_derives_image_index() {
        let p = Participant::from_record(
            r#"{"userId":"25","userName":"Ana","avatar":"https://img/a.png","uid":77}"#,
            false,
        )
        .unwrap();

        assert_eq!(p.user_id, "25");
        assert_eq!(p.display_name, "Ana");
        assert_eq!(p.remote_media_id, 77);
        assert_eq!(p.avatar.head_url, "https://img/a.png");
        assert_eq!(p.avatar.image_index, 1);
    }

    #[test]
    fn test_from_record_non_numeric_id_and_missing_avatar() {
        let p = Participant::from_record(r#"{"userId":"abc","userName":"Bo"}"#, true).unwrap();
        assert_eq!(p.avatar.image_index, 0);
        assert!(p.avatar.head_url.is_empty());
        assert!(p.is_local);
    }

    #[test]
    fn test_from_record_missing_name_fails() {
        assert!(Participant::from_record(r#"{"userId":"1"}"#, false).is_err());
    }

    #[test]
    fn test_registry_seeds_owner_and_local() {
        let local = audience("200");
        let registry = RoleRegistry::new(&owner(), &local);

        assert_eq!(registry.role_of("100"), Some(Role::Owner));
        assert_eq!(registry.role_of("200"), Some(Role::Audience));
        assert_eq!(registry.role_of("300"), None);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registry_local_owner_registered_once() {
        let owner = owner();
        let registry = RoleRegistry::new(&owner, owner.participant());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.role_of("100"), Some(Role::Owner));
    }

    #[test]
    fn test_owner_role_cannot_change() {
        let mut registry = RoleRegistry::new(&owner(), &audience("200"));
        assert_eq!(registry.set_role("100", Role::Audience), None);
        assert_eq!(registry.role_of("100"), Some(Role::Owner));
        assert!(registry.remove("100").is_none());
    }

    #[test]
    fn test_set_role_reports_previous_only_on_change() {
        let mut registry = RoleRegistry::new(&owner(), &audience("200"));
        assert_eq!(
            registry.set_role("200", Role::Broadcaster),
            Some(Role::Audience)
        );
        assert_eq!(registry.set_role("200", Role::Broadcaster), None);
        assert_eq!(registry.set_role("200", Role::Owner), None);
        assert_eq!(registry.set_role("missing", Role::Broadcaster), None);
    }

    #[test]
    fn test_register_and_remove() {
        let mut registry = RoleRegistry::new(&owner(), &audience("200"));
        assert!(registry.register(&audience("300")));
        assert!(!registry.register(&audience("300")));
        assert_eq!(registry.role_of("300"), Some(Role::Audience));

        let (removed, role) = registry.remove("300").unwrap();
        assert_eq!(removed.user_id, "300");
        assert_eq!(role, Role::Audience);
        assert_eq!(registry.role_of("300"), None);
    }

    #[test]
    fn test_update_profile() {
        let mut registry = RoleRegistry::new(&owner(), &audience("200"));
        let updated = registry
            .update_profile("200", Some("Renamed"), None)
            .unwrap();
        assert_eq!(updated.display_name, "Renamed");
        assert_eq!(registry.participant("200").unwrap().display_name, "Renamed");
    }

    #[test]
    fn test_static_directory_lookup() {
        let directory = StaticDirectory::new([audience("1"), audience("2")]);
        assert_eq!(directory.lookup("2").unwrap().display_name, "User 2");
        assert!(directory.lookup("3").is_none());
    }
}
