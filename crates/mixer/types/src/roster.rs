//! Roster entities as reported by the messaging service
//!
//! The runtime never mutates these; it classifies and diffs against them.

use serde::{Deserialize, Serialize};

/// Whether an entity is a plain buddy or a multi-user room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Buddy,
    Room,
}

/// Presence as the service reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Available,
    Away,
    Busy,
    Xa,
    Chat,
    #[default]
    Offline,
    /// The buddy asked to add us and is waiting for an answer.
    Pending,
}

/// Subscription state between the local account and a buddy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Subscribed,
    #[default]
    Pending,
    Rejected,
}

/// A contact or room on the service roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntity {
    pub address: String,
    pub name: String,
    #[serde(default)]
    pub kind: EntityKind,
    /// `None` is the service's root group, which has no group channel.
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub presence: Presence,
    #[serde(default)]
    pub subscription: SubscriptionState,
    #[serde(default)]
    pub mood: Option<String>,
    /// Addresses currently in the room. Always empty for buddies.
    #[serde(default)]
    pub participants: Vec<String>,
}

impl RosterEntity {
    pub fn buddy(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            kind: EntityKind::Buddy,
            group: None,
            presence: Presence::Offline,
            subscription: SubscriptionState::Subscribed,
            mood: None,
            participants: Vec::new(),
        }
    }

    pub fn room(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Room,
            presence: Presence::Available,
            ..Self::buddy(address, name)
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        self.group = if group.is_empty() { None } else { Some(group) };
        self
    }

    pub fn in_root_group(mut self) -> Self {
        self.group = None;
        self
    }

    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }

    pub fn with_subscription(mut self, subscription: SubscriptionState) -> Self {
        self.subscription = subscription;
        self
    }

    pub fn with_mood(mut self, mood: impl Into<String>) -> Self {
        self.mood = Some(mood.into());
        self
    }

    pub fn with_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participants = participants.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_room(&self) -> bool {
        self.kind == EntityKind::Room
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription == SubscriptionState::Subscribed
    }

    pub fn group_name(&self) -> Option<&str> {
        self.group.as_deref()
    }
}

/// Attribute names carried by buddy/room update events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuddyAttr {
    Presence,
    Mood,
    Name,
    Group,
    Subscription,
}

/// Changes requested of the service for an existing buddy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuddyUpdate {
    pub name: Option<String>,
    /// `Some(None)` moves the buddy to the root group.
    pub group: Option<Option<String>>,
}

impl BuddyUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            group: None,
        }
    }

    pub fn move_to(group: Option<String>) -> Self {
        Self {
            name: None,
            group: Some(group),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_group_name_means_root() {
        let buddy = RosterEntity::buddy("alice@mxit", "Alice").in_group("");
        assert_eq!(buddy.group_name(), None);

        let buddy = buddy.in_group("Friends");
        assert_eq!(buddy.group_name(), Some("Friends"));
    }

    #[test]
    fn rooms_default_to_available() {
        let room = RosterEntity::room("room1@mxit", "Lounge").with_participants(["a", "b"]);
        assert!(room.is_room());
        assert_eq!(room.presence, Presence::Available);
        assert_eq!(room.participants.len(), 2);
    }

    #[test]
    fn deserializes_with_defaults() {
        let buddy: RosterEntity =
            serde_json::from_str(r#"{"address":"bob@mxit","name":"Bob"}"#).unwrap();
        assert_eq!(buddy.kind, EntityKind::Buddy);
        assert_eq!(buddy.presence, Presence::Offline);
        assert!(!buddy.is_subscribed());
    }
}
