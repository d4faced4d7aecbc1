//! Presence
//!
//! Maps the service's presence values onto the status names exposed to
//! clients, and back.

use crate::connection::{Connection, ConnectionEvent};
use chrono::Utc;
use mixer_types::{
    HandleId, HandleKind, HandleRef, HandleType, MixerError, MixerResult, Presence, RosterEntity,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

const ROOM_STATUS_MESSAGE: &str = "MultiMX";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceType {
    Offline,
    Available,
    Away,
    ExtendedAway,
    Busy,
    Unknown,
}

impl PresenceType {
    pub fn code(self) -> u32 {
        match self {
            PresenceType::Offline => 1,
            PresenceType::Available => 2,
            PresenceType::Away => 3,
            PresenceType::ExtendedAway => 4,
            PresenceType::Busy => 6,
            PresenceType::Unknown => 7,
        }
    }
}

/// A status clients may see or set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSpec {
    pub name: &'static str,
    pub presence_type: PresenceType,
    pub may_set_on_self: bool,
    pub exclusive: bool,
}

const fn status(name: &'static str, presence_type: PresenceType) -> StatusSpec {
    StatusSpec {
        name,
        presence_type,
        may_set_on_self: true,
        exclusive: true,
    }
}

pub const STATUSES: [StatusSpec; 6] = [
    status("available", PresenceType::Available),
    status("away", PresenceType::Away),
    status("busy", PresenceType::Busy),
    status("xa", PresenceType::ExtendedAway),
    status("offline", PresenceType::Offline),
    status("unknown", PresenceType::Unknown),
];

/// One contact's presence as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceStatus {
    /// Seconds since the epoch, or 0 when not known.
    pub last_activity: i64,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Status name for a service presence.
pub fn status_name(presence: Presence) -> &'static str {
    match presence {
        Presence::Available | Presence::Chat => "available",
        Presence::Away => "away",
        Presence::Busy => "busy",
        Presence::Xa => "xa",
        Presence::Offline => "offline",
        Presence::Pending => "unknown",
    }
}

/// Service presence for a status name.
pub fn presence_for(status: &str) -> MixerResult<Presence> {
    match status {
        "available" => Ok(Presence::Available),
        "away" => Ok(Presence::Away),
        "busy" => Ok(Presence::Busy),
        "xa" => Ok(Presence::Xa),
        "offline" => Ok(Presence::Offline),
        "unknown" => Ok(Presence::Pending),
        other => Err(MixerError::NotAvailable(format!("unknown status {}", other))),
    }
}

/// Presence of a roster entry. Entities the roster doesn't know are offline.
pub fn presence_of(entity: Option<&RosterEntity>, last_activity: i64) -> PresenceStatus {
    match entity {
        Some(entity) => PresenceStatus {
            last_activity,
            status: status_name(entity.presence),
            message: if entity.is_room() {
                Some(ROOM_STATUS_MESSAGE.to_string())
            } else {
                entity.mood.clone()
            },
        },
        None => PresenceStatus {
            last_activity,
            status: "offline",
            message: None,
        },
    }
}

impl Connection {
    pub fn statuses(&self) -> &'static [StatusSpec] {
        &STATUSES
    }

    pub fn get_presences(&self, ids: &[HandleId]) -> MixerResult<BTreeMap<HandleId, PresenceStatus>> {
        ids.iter()
            .map(|id| {
                let handle = self.handles().resolve_ref(HandleType::Contact, &HandleRef::Id(*id))?;
                let entity = self.entity_for(&handle);
                Ok((*id, presence_of(entity.as_ref(), 0)))
            })
            .collect()
    }

    /// Like [`Connection::get_presences`], but answered with a presence
    /// update.
    pub fn request_presence(&self, ids: &[HandleId]) -> MixerResult<()> {
        let presences = self.get_presences(ids)?;
        self.emit(ConnectionEvent::PresenceUpdate { presences });
        Ok(())
    }

    /// Set our own status. Going offline disconnects.
    pub async fn set_status(&self, status: &str, message: Option<String>) -> MixerResult<()> {
        if status == "offline" {
            info!("Offline status requested, disconnecting");
            return self.disconnect().await;
        }
        self.check_connected()?;
        let presence = presence_for(status)?;
        info!(status, presence = ?presence, "Setting presence");
        self.service().set_presence(presence, message).await
    }

    /// A buddy's presence or mood changed on the roster.
    pub(crate) fn presence_received(&self, address: &str) {
        let Some(handle) = self.handles().lookup(HandleKind::Contact, address) else {
            debug!(address = %address, "Presence for a contact nobody references");
            return;
        };
        let entity = self.entity_for(&handle);
        let presences = BTreeMap::from([(
            handle.id(),
            presence_of(entity.as_ref(), Utc::now().timestamp()),
        )]);
        self.emit(ConnectionEvent::PresenceUpdate { presences });
    }
}
