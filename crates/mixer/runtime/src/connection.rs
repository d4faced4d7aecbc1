//! Per-connection context
//!
//! A [`Connection`] owns everything one account session needs: the handle
//! and channel registries, the service adapter and the connection status.
//! Nothing here is global; every component reaches the registries through
//! the connection it was handed.
//!
//! Reconciliation is serialised through one async gate. The router holds it
//! while it processes an event and the public channel operations take it
//! before they create or populate anything, so membership state is only
//! ever touched by one task at a time.

use crate::channel::{Channel, RoomInfo, TextChannel};
use crate::classifier::ListVariant;
use crate::config::MixerConfig;
use crate::handles::{Handle, HandleRegistry};
use crate::presence::PresenceStatus;
use crate::request::ChannelRequest;
use crate::service::ServiceAdapter;
use crate::channel_registry::ChannelRegistry;
use mixer_types::{
    BuddyUpdate, ChannelId, ChannelKey, ChannelKind, ChannelParams, ClientId, ConnectionStatus,
    ConnectionStatusReason, HandleId, HandleKind, HandleRef, HandleType, MessageType,
    MixerError, MixerResult, RosterEntity,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Connection-level notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StatusChanged {
        status: ConnectionStatus,
        reason: ConnectionStatusReason,
    },
    NewChannel {
        channel: ChannelId,
        identifiers: BTreeMap<String, Value>,
        suppress_handler: bool,
    },
    ChannelClosed {
        channel: ChannelId,
    },
    PresenceUpdate {
        presences: BTreeMap<HandleId, PresenceStatus>,
    },
    AliasesChanged {
        aliases: Vec<(HandleId, String)>,
    },
}

pub struct Connection {
    config: MixerConfig,
    handles: HandleRegistry,
    channels: ChannelRegistry,
    service: Arc<dyn ServiceAdapter>,
    status: RwLock<ConnectionStatus>,
    events: broadcast::Sender<ConnectionEvent>,
    gate: Mutex<()>,
}

impl Connection {
    pub fn new(config: MixerConfig, service: Arc<dyn ServiceAdapter>) -> MixerResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.runtime.connection_event_capacity);
        let handles = HandleRegistry::new(config.account.account.clone());
        let channels = ChannelRegistry::new(config.runtime.channel_event_capacity);
        info!(account = %config.account.account, "Connection created");
        Ok(Self {
            config,
            handles,
            channels,
            service,
            status: RwLock::new(ConnectionStatus::Disconnected),
            events,
            gate: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn service(&self) -> &Arc<dyn ServiceAdapter> {
        &self.service
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn check_connected(&self) -> MixerResult<()> {
        match self.status() {
            ConnectionStatus::Active => Ok(()),
            _ => Err(MixerError::Disconnected),
        }
    }

    /// Wait for exclusive access to reconciliation state.
    pub(crate) async fn serialize(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        // No observers is fine.
        let _ = self.events.send(event);
    }

    /// Ask the service to connect. The move to active arrives later as a
    /// status event.
    pub async fn connect(&self) -> MixerResult<()> {
        {
            let _gate = self.serialize().await;
            if self.status() != ConnectionStatus::Disconnected {
                debug!(status = ?self.status(), "Connect ignored");
                return Ok(());
            }
            self.update_status(ConnectionStatus::Connecting, ConnectionStatusReason::Requested);
        }
        if let Err(err) = self.service.connect().await {
            warn!(error = %err, "Service connect failed");
            let _gate = self.serialize().await;
            self.teardown(ConnectionStatusReason::NetworkError);
            return Err(err);
        }
        Ok(())
    }

    /// Disconnect and tear the session down. A later disconnected status
    /// event from the service finds nothing left to do.
    pub async fn disconnect(&self) -> MixerResult<()> {
        let result = self.service.disconnect().await;
        let _gate = self.serialize().await;
        self.teardown(ConnectionStatusReason::Requested);
        result
    }

    /// Record a status change. Returns false when nothing changed.
    pub(crate) fn update_status(&self, status: ConnectionStatus, reason: ConnectionStatusReason) -> bool {
        {
            let mut current = self.status.write();
            if *current == status {
                return false;
            }
            info!(from = ?*current, to = ?status, reason = ?reason, "Connection status changed");
            *current = status;
        }
        self.emit(ConnectionEvent::StatusChanged { status, reason });
        true
    }

    /// The service is ready: announce the initial lists and fill every
    /// standing list that has not been populated yet.
    pub(crate) fn go_active(&self, reason: ConnectionStatusReason) {
        if !self.update_status(ConnectionStatus::Active, reason) {
            return;
        }
        for name in &self.config.runtime.initial_lists {
            if let Err(err) = self.list_channel(name) {
                warn!(list = %name, error = %err, "Cannot open initial list");
            }
        }
        for channel in self.list_channels() {
            if let Some(list) = channel.as_list() {
                if !list.is_populated() {
                    self.populate_channel(&channel);
                }
            }
        }
    }

    /// Close every channel and forget every handle. Safe to repeat.
    pub(crate) fn teardown(&self, reason: ConnectionStatusReason) {
        self.update_status(ConnectionStatus::Disconnected, reason);
        for channel in self.channels.close_all() {
            self.emit(ConnectionEvent::ChannelClosed {
                channel: channel.id(),
            });
        }
        self.handles.teardown();
    }

    pub fn request_handles(
        &self,
        client: &ClientId,
        handle_type: HandleType,
        names: &[String],
    ) -> MixerResult<Vec<HandleId>> {
        self.check_connected()?;
        match handle_type {
            HandleType::Contact | HandleType::List | HandleType::Group | HandleType::Room => {
                self.handles.request(client, handle_type, names)
            }
            HandleType::None => Err(MixerError::NotAvailable(format!(
                "handle type {:?} unsupported",
                handle_type
            ))),
        }
    }

    pub fn hold_handles(
        &self,
        client: &ClientId,
        handle_type: HandleType,
        ids: &[HandleId],
    ) -> MixerResult<()> {
        self.check_connected()?;
        let resolved = ids
            .iter()
            .map(|id| self.handles.resolve_ref(handle_type, &HandleRef::Id(*id)))
            .collect::<MixerResult<Vec<_>>>()?;
        for handle in &resolved {
            self.handles.hold(client, handle);
        }
        Ok(())
    }

    pub fn release_handles(&self, client: &ClientId, ids: &[HandleId]) -> MixerResult<()> {
        self.check_connected()?;
        for id in ids {
            self.handles.release(client, *id)?;
        }
        Ok(())
    }

    pub fn inspect_handles(&self, handle_type: HandleType, ids: &[HandleId]) -> MixerResult<Vec<String>> {
        self.check_connected()?;
        self.handles.inspect(handle_type, ids)
    }

    /// Resolve by numeric id or natural key.
    pub fn resolve(&self, handle_type: HandleType, handle: &HandleRef) -> MixerResult<Arc<Handle>> {
        self.handles.resolve_ref(handle_type, handle)
    }

    /// Roster entry behind a contact, room or self handle.
    pub fn entity_for(&self, handle: &Handle) -> Option<RosterEntity> {
        match handle.kind() {
            HandleKind::SelfHandle => Some(self.service.self_entity()),
            HandleKind::Contact => self.service.get_entity(handle.key()),
            HandleKind::Room => self.service.get_room(handle.key()),
            _ => None,
        }
    }

    /// Return the channel matching `request`, creating it if needed.
    pub async fn ensure_channel(
        &self,
        request: &ChannelRequest,
        suppress_handler: bool,
    ) -> MixerResult<(Arc<Channel>, bool)> {
        self.check_connected()?;
        let _gate = self.serialize().await;
        self.open_requested(request, suppress_handler, false)
    }

    /// Create the channel matching `request`; AlreadyExists if there is one.
    pub async fn create_channel(
        &self,
        request: &ChannelRequest,
        suppress_handler: bool,
    ) -> MixerResult<Arc<Channel>> {
        self.check_connected()?;
        let _gate = self.serialize().await;
        self.open_requested(request, suppress_handler, true)
            .map(|(channel, _)| channel)
    }

    /// Property-map form of [`Connection::ensure_channel`] and
    /// [`Connection::create_channel`].
    pub async fn request_channel(
        &self,
        props: &BTreeMap<String, Value>,
        create: bool,
    ) -> MixerResult<(Arc<Channel>, bool)> {
        let request = ChannelRequest::from_properties(props).map_err(|err| {
            warn!(error = %err, "Rejected channel request");
            err
        })?;
        if create {
            self.create_channel(&request, false)
                .await
                .map(|channel| (channel, true))
        } else {
            self.ensure_channel(&request, false).await
        }
    }

    fn open_requested(
        &self,
        request: &ChannelRequest,
        suppress_handler: bool,
        exclusive: bool,
    ) -> MixerResult<(Arc<Channel>, bool)> {
        let target = match &request.target {
            Some(target) => Some(self.handles.resolve_ref(request.target_handle_type(), target)?),
            None => None,
        };
        self.open_channel(
            request.kind,
            target,
            request.params.clone(),
            true,
            suppress_handler,
            exclusive,
        )
    }

    /// Get or create a channel. A new channel is announced, then populated.
    pub(crate) fn open_channel(
        &self,
        kind: ChannelKind,
        target: Option<Arc<Handle>>,
        params: ChannelParams,
        requested: bool,
        suppress_handler: bool,
        exclusive: bool,
    ) -> MixerResult<(Arc<Channel>, bool)> {
        let initiator = match (&target, requested) {
            (Some(target), false) => target.clone(),
            _ => self.handles.self_handle(),
        };
        let (channel, created) = if exclusive {
            let channel = self
                .channels
                .create(kind, target, params, initiator, requested)?;
            (channel, true)
        } else {
            self.channels
                .get_or_create(kind, target, params, initiator, requested)?
        };
        if created {
            self.emit(ConnectionEvent::NewChannel {
                channel: channel.id(),
                identifiers: channel.identifiers(),
                suppress_handler,
            });
            self.populate_channel(&channel);
        }
        Ok((channel, created))
    }

    /// Second construction phase: fill a fresh channel from the roster.
    pub(crate) fn populate_channel(&self, channel: &Channel) {
        if let Some(list) = channel.as_list() {
            let roster = self.service.all_entities();
            if let Some(change) = list.populate(&self.handles, &roster) {
                debug!(channel = %channel.id(), added = change.added.len(), "List populated");
            }
        } else if let Some(room) = channel.as_room() {
            let entity = channel
                .target()
                .and_then(|target| self.service.get_room(target.key()));
            let participants = match entity {
                Some(entity) => {
                    room.set_name(entity.name);
                    entity.participants
                }
                None => Vec::new(),
            };
            room.populate(&self.handles, &participants);
        }
    }

    pub async fn close_channel(&self, id: ChannelId) -> MixerResult<()> {
        let _gate = self.serialize().await;
        let channel = self
            .channels
            .get_by_id(id)
            .ok_or_else(|| MixerError::NotAvailable(format!("{} does not exist", id)))?;
        self.close(&channel);
        drop(channel);
        self.handles.sweep();
        Ok(())
    }

    pub(crate) fn close(&self, channel: &Arc<Channel>) -> bool {
        let closed = self.channels.close(channel);
        if closed {
            self.emit(ConnectionEvent::ChannelClosed {
                channel: channel.id(),
            });
        }
        closed
    }

    /// The well-known list called `name`.
    pub(crate) fn list_channel(&self, name: &str) -> MixerResult<Arc<Channel>> {
        let handle = self.handles.intern(HandleKind::List, name)?;
        self.open_channel(ChannelKind::ContactList, Some(handle), ChannelParams::None, false, false, false)
            .map(|(channel, _)| channel)
    }

    pub(crate) fn group_channel(&self, group: &str) -> MixerResult<Arc<Channel>> {
        let handle = self.handles.intern(HandleKind::Group, group)?;
        self.open_channel(ChannelKind::Group, Some(handle), ChannelParams::None, false, false, false)
            .map(|(channel, _)| channel)
    }

    /// Group channel for the entity's group. The root group has none.
    pub(crate) fn group_channel_for(&self, entity: &RosterEntity) -> MixerResult<Option<Arc<Channel>>> {
        match entity.group_name() {
            Some(group) => self.group_channel(group).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn text_channel_for(&self, address: &str) -> MixerResult<Arc<Channel>> {
        let handle = self.handles.intern(HandleKind::Contact, address)?;
        self.open_channel(ChannelKind::Text, Some(handle), ChannelParams::None, false, false, false)
            .map(|(channel, _)| channel)
    }

    pub(crate) fn room_channel_for(&self, address: &str) -> MixerResult<Arc<Channel>> {
        let handle = self.handles.intern(HandleKind::Room, address)?;
        self.open_channel(ChannelKind::Room, Some(handle), ChannelParams::None, false, false, false)
            .map(|(channel, _)| channel)
    }

    /// The open room channel for `address`, without creating one.
    pub(crate) fn existing_room_channel(&self, address: &str) -> Option<Arc<Channel>> {
        let handle = self.handles.lookup(HandleKind::Room, address)?;
        self.channels.get(&ChannelKey::new(
            ChannelKind::Room,
            Some(handle.id()),
            ChannelParams::None,
        ))
    }

    /// Contact lists and groups currently open.
    pub fn list_channels(&self) -> Vec<Arc<Channel>> {
        let mut channels = self.channels.list_by_kind(ChannelKind::ContactList);
        channels.extend(self.group_channels());
        channels
    }

    pub fn group_channels(&self) -> Vec<Arc<Channel>> {
        self.channels.list_by_kind(ChannelKind::Group)
    }

    /// Ask the service to add contacts to a list or group. Membership
    /// changes once the service reports back.
    pub async fn add_members(&self, channel: ChannelId, ids: &[HandleId], message: &str) -> MixerResult<()> {
        self.check_connected()?;
        let channel = self.live_channel(channel)?;
        if channel.as_room().is_some() {
            debug!(channel = %channel.id(), count = ids.len(), note = message, "Room invitations are not sent");
            return Ok(());
        }
        let variant = Self::variant_of(&channel)?;
        for handle in self.member_handles(ids)? {
            let address = handle.key();
            let buddy = self.service.get_buddy(address);
            match &variant {
                ListVariant::Subscribe => match buddy {
                    Some(buddy) if buddy.is_subscribed() => {
                        debug!(address = %address, "Already subscribed");
                    }
                    Some(buddy) => {
                        info!(address = %address, "Inviting");
                        self.service
                            .invite(address, &buddy.name, buddy.group.clone())
                            .await?;
                    }
                    None => {
                        info!(address = %address, "Inviting unknown contact");
                        self.service.invite(address, address, None).await?;
                    }
                },
                ListVariant::Publish => {
                    self.service.accept_invite(address).await?;
                }
                ListVariant::Group(group) => {
                    self.service
                        .update_buddy(address, BuddyUpdate::move_to(Some(group.clone())))
                        .await?;
                }
                other => return Err(Self::static_list(other)),
            }
        }
        Ok(())
    }

    /// Ask the service to drop contacts from a list or group.
    pub async fn remove_members(&self, channel: ChannelId, ids: &[HandleId], message: &str) -> MixerResult<()> {
        self.check_connected()?;
        let channel = self.live_channel(channel)?;
        let variant = Self::variant_of(&channel)?;
        debug!(channel = %channel.id(), list = variant.name(), count = ids.len(), note = message, "Removing members");
        for handle in self.member_handles(ids)? {
            let address = handle.key();
            match &variant {
                ListVariant::Subscribe => {
                    if self.service.get_buddy(address).is_some() {
                        info!(address = %address, "Removing buddy");
                        self.service.remove_buddy(address).await?;
                    }
                }
                ListVariant::Publish => {
                    info!(address = %address, "Rejecting buddy");
                    self.service.reject_buddy(address).await?;
                }
                ListVariant::Group(group) => {
                    let in_group = self
                        .service
                        .get_buddy(address)
                        .map(|buddy| buddy.group_name() == Some(group.as_str()))
                        .unwrap_or(false);
                    if in_group {
                        self.service
                            .update_buddy(address, BuddyUpdate::move_to(None))
                            .await?;
                    }
                }
                other => return Err(Self::static_list(other)),
            }
        }
        Ok(())
    }

    /// Contacts named by a membership request. The self handle is a contact
    /// to outsiders but never a roster entry, so it is refused before any
    /// command reaches the service.
    fn member_handles(&self, ids: &[HandleId]) -> MixerResult<Vec<Arc<Handle>>> {
        let handles = ids
            .iter()
            .map(|id| self.handles.resolve_ref(HandleType::Contact, &HandleRef::Id(*id)))
            .collect::<MixerResult<Vec<_>>>()?;
        if let Some(me) = handles.iter().find(|h| h.kind() == HandleKind::SelfHandle) {
            return Err(MixerError::NotAvailable(format!(
                "handle {} is the connection's own handle",
                me.id()
            )));
        }
        Ok(handles)
    }

    fn live_channel(&self, id: ChannelId) -> MixerResult<Arc<Channel>> {
        self.channels
            .get_by_id(id)
            .ok_or_else(|| MixerError::NotAvailable(format!("{} does not exist", id)))
    }

    fn variant_of(channel: &Channel) -> MixerResult<ListVariant> {
        channel
            .as_list()
            .map(|list| list.variant().clone())
            .ok_or_else(|| {
                MixerError::NotImplemented(format!("{} channels have no members to change", channel.kind()))
            })
    }

    fn static_list(variant: &ListVariant) -> MixerError {
        MixerError::NotImplemented(format!("the {} list cannot be changed", variant.name()))
    }

    /// Send a message on a text or room channel.
    pub async fn send_message(
        &self,
        channel: ChannelId,
        message_type: MessageType,
        text: &str,
    ) -> MixerResult<()> {
        self.check_connected()?;
        let channel = self.live_channel(channel)?;
        let target = channel
            .target()
            .cloned()
            .ok_or_else(|| MixerError::NotImplemented(format!("cannot send on {} channels", channel.kind())))?;
        match channel.kind() {
            ChannelKind::Text => {}
            ChannelKind::Room => {
                if self.service.get_room(target.key()).is_none() {
                    return Err(MixerError::NotAvailable("Room does not exist".into()));
                }
            }
            other => {
                return Err(MixerError::NotImplemented(format!(
                    "cannot send on {} channels",
                    other
                )))
            }
        }
        TextChannel::check_sendable(message_type)?;
        self.service.send_message(target.key(), text).await
    }

    /// Announce every room on the roster on the room-list channel.
    pub async fn list_rooms(&self, channel: ChannelId) -> MixerResult<()> {
        self.check_connected()?;
        let _gate = self.serialize().await;
        let channel = self.live_channel(channel)?;
        let room_list = channel
            .as_room_list()
            .ok_or_else(|| MixerError::NotImplemented(format!("{} is not a room list", channel.id())))?;
        let mut rooms = Vec::new();
        for room in self.service.all_rooms() {
            let handle = self.handles.intern(HandleKind::Room, &room.address)?;
            rooms.push(RoomInfo::new(handle.id(), room.address.clone(), room.name.clone()));
        }
        room_list.list_rooms(rooms);
        Ok(())
    }
}
