//! The messaging-service seam
//!
//! [`ServiceAdapter`] is everything the runtime needs from the network
//! side: a roster snapshot, per-entity lookup and a handful of commands.
//! Answers to commands come back later as [`RosterEvent`]s on the
//! connection's event queue, never as return values.

use async_trait::async_trait;
use mixer_types::{
    BuddyUpdate, MixerError, MixerResult, Presence, RosterEntity, RosterEvent, ServiceStatus,
    StatusReason,
};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    async fn connect(&self) -> MixerResult<()>;

    async fn disconnect(&self) -> MixerResult<()>;

    /// Every buddy on the roster. Rooms are not included.
    fn all_buddies(&self) -> Vec<RosterEntity>;

    fn all_rooms(&self) -> Vec<RosterEntity>;

    fn get_buddy(&self, address: &str) -> Option<RosterEntity>;

    fn get_room(&self, address: &str) -> Option<RosterEntity>;

    /// The account's own roster entry.
    fn self_entity(&self) -> RosterEntity;

    async fn invite(&self, address: &str, name: &str, group: Option<String>) -> MixerResult<()>;

    async fn accept_invite(&self, address: &str) -> MixerResult<()>;

    async fn reject_buddy(&self, address: &str) -> MixerResult<()>;

    async fn remove_buddy(&self, address: &str) -> MixerResult<()>;

    async fn update_buddy(&self, address: &str, update: BuddyUpdate) -> MixerResult<()>;

    async fn send_message(&self, to: &str, body: &str) -> MixerResult<()>;

    async fn set_presence(&self, presence: Presence, mood: Option<String>) -> MixerResult<()>;

    /// Buddy or room by address.
    fn get_entity(&self, address: &str) -> Option<RosterEntity> {
        self.get_buddy(address).or_else(|| self.get_room(address))
    }

    /// Buddies followed by rooms: everything a contact list can show.
    fn all_entities(&self) -> Vec<RosterEntity> {
        let mut entities = self.all_buddies();
        entities.extend(self.all_rooms());
        entities
    }
}

/// A command the runtime sent to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCommand {
    Connect,
    Disconnect,
    Invite {
        address: String,
        name: String,
        group: Option<String>,
    },
    AcceptInvite {
        address: String,
    },
    RejectBuddy {
        address: String,
    },
    RemoveBuddy {
        address: String,
    },
    UpdateBuddy {
        address: String,
        update: BuddyUpdate,
    },
    SendMessage {
        to: String,
        body: String,
    },
    SetPresence {
        presence: Presence,
        mood: Option<String>,
    },
}

/// In-memory service for tests and replays.
///
/// The roster is whatever the fixture puts in it. Commands are recorded
/// rather than acted on; `connect` and `disconnect` report their status
/// change on the attached event queue, if any.
pub struct InMemoryService {
    buddies: RwLock<BTreeMap<String, RosterEntity>>,
    rooms: RwLock<BTreeMap<String, RosterEntity>>,
    self_entity: RwLock<RosterEntity>,
    commands: Mutex<Vec<ServiceCommand>>,
    events: Mutex<Option<mpsc::Sender<RosterEvent>>>,
}

impl InMemoryService {
    pub fn new(account: impl Into<String>) -> Self {
        let account = account.into();
        Self {
            buddies: RwLock::new(BTreeMap::new()),
            rooms: RwLock::new(BTreeMap::new()),
            self_entity: RwLock::new(
                RosterEntity::buddy(account.clone(), account).with_presence(Presence::Available),
            ),
            commands: Mutex::new(Vec::new()),
            events: Mutex::new(None),
        }
    }

    /// Seed the roster. Rooms are recognised by their entity kind.
    pub fn with_roster(self, entities: impl IntoIterator<Item = RosterEntity>) -> Self {
        for entity in entities {
            self.upsert(entity);
        }
        self
    }

    /// Route status changes from `connect`/`disconnect` to `sink`.
    pub fn attach_events(&self, sink: mpsc::Sender<RosterEvent>) {
        *self.events.lock() = Some(sink);
    }

    pub fn upsert(&self, entity: RosterEntity) {
        if entity.is_room() {
            self.rooms.write().insert(entity.address.clone(), entity);
        } else {
            self.buddies.write().insert(entity.address.clone(), entity);
        }
    }

    /// Change a roster entry in place. Returns false if it isn't there.
    pub fn modify(&self, address: &str, f: impl FnOnce(&mut RosterEntity)) -> bool {
        if let Some(entity) = self.buddies.write().get_mut(address) {
            f(entity);
            return true;
        }
        if let Some(entity) = self.rooms.write().get_mut(address) {
            f(entity);
            return true;
        }
        false
    }

    pub fn remove(&self, address: &str) -> Option<RosterEntity> {
        self.buddies
            .write()
            .remove(address)
            .or_else(|| self.rooms.write().remove(address))
    }

    pub fn set_self(&self, entity: RosterEntity) {
        *self.self_entity.write() = entity;
    }

    pub fn commands(&self) -> Vec<ServiceCommand> {
        self.commands.lock().clone()
    }

    pub fn take_commands(&self) -> Vec<ServiceCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    fn record(&self, command: ServiceCommand) {
        debug!(command = ?command, "Service command");
        self.commands.lock().push(command);
    }

    fn emit(&self, event: RosterEvent) {
        let sink = self.events.lock().clone();
        if let Some(sink) = sink {
            if let Err(err) = sink.try_send(event) {
                warn!(error = %err, "Dropped service event");
            }
        }
    }
}

#[async_trait]
impl ServiceAdapter for InMemoryService {
    async fn connect(&self) -> MixerResult<()> {
        self.record(ServiceCommand::Connect);
        for status in [ServiceStatus::Connecting, ServiceStatus::Active] {
            self.emit(RosterEvent::StatusChanged {
                status,
                reason: StatusReason::Requested,
            });
        }
        Ok(())
    }

    async fn disconnect(&self) -> MixerResult<()> {
        self.record(ServiceCommand::Disconnect);
        self.emit(RosterEvent::StatusChanged {
            status: ServiceStatus::Disconnected,
            reason: StatusReason::Requested,
        });
        Ok(())
    }

    fn all_buddies(&self) -> Vec<RosterEntity> {
        self.buddies.read().values().cloned().collect()
    }

    fn all_rooms(&self) -> Vec<RosterEntity> {
        self.rooms.read().values().cloned().collect()
    }

    fn get_buddy(&self, address: &str) -> Option<RosterEntity> {
        self.buddies.read().get(address).cloned()
    }

    fn get_room(&self, address: &str) -> Option<RosterEntity> {
        self.rooms.read().get(address).cloned()
    }

    fn self_entity(&self) -> RosterEntity {
        self.self_entity.read().clone()
    }

    async fn invite(&self, address: &str, name: &str, group: Option<String>) -> MixerResult<()> {
        if address.is_empty() {
            return Err(MixerError::Service("cannot invite an empty address".into()));
        }
        self.record(ServiceCommand::Invite {
            address: address.to_string(),
            name: name.to_string(),
            group,
        });
        Ok(())
    }

    async fn accept_invite(&self, address: &str) -> MixerResult<()> {
        self.record(ServiceCommand::AcceptInvite {
            address: address.to_string(),
        });
        Ok(())
    }

    async fn reject_buddy(&self, address: &str) -> MixerResult<()> {
        self.record(ServiceCommand::RejectBuddy {
            address: address.to_string(),
        });
        Ok(())
    }

    async fn remove_buddy(&self, address: &str) -> MixerResult<()> {
        self.record(ServiceCommand::RemoveBuddy {
            address: address.to_string(),
        });
        Ok(())
    }

    async fn update_buddy(&self, address: &str, update: BuddyUpdate) -> MixerResult<()> {
        self.record(ServiceCommand::UpdateBuddy {
            address: address.to_string(),
            update,
        });
        Ok(())
    }

    async fn send_message(&self, to: &str, body: &str) -> MixerResult<()> {
        self.record(ServiceCommand::SendMessage {
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn set_presence(&self, presence: Presence, mood: Option<String>) -> MixerResult<()> {
        self.record(ServiceCommand::SetPresence { presence, mood });
        Ok(())
    }
}
