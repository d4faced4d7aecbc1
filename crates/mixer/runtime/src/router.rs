//! Roster event routing
//!
//! The router is the single consumer of a connection's roster event queue.
//! Events are processed one at a time, in arrival order, with the
//! connection's gate held. Status events drive the connection state
//! machine; everything else is dropped unless the connection is active.
//!
//! Roster events are best-effort notifications. An event naming an entity
//! the roster can't resolve is logged and dropped.

use crate::channel::Channel;
use crate::connection::Connection;
use mixer_types::{
    BuddyAttr, ChannelKind, ConnectionStatus, HandleKind, MessageType, RosterEntity, RosterEvent,
    ServiceStatus, StatusReason,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct RosterEventRouter {
    connection: Arc<Connection>,
}

impl RosterEventRouter {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Consume `events` until every sender is gone.
    pub async fn run(self, mut events: mpsc::Receiver<RosterEvent>) {
        info!("Roster event router started");
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        info!("Roster event router stopped");
    }

    pub fn spawn(self, events: mpsc::Receiver<RosterEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    /// Process one event under the connection's gate.
    pub async fn handle(&self, event: RosterEvent) {
        let _gate = self.connection.serialize().await;
        self.dispatch(event);
    }

    fn dispatch(&self, event: RosterEvent) {
        if let RosterEvent::StatusChanged { status, reason } = event {
            self.status_changed(status, reason);
            return;
        }
        if self.connection.status() != ConnectionStatus::Active {
            debug!(event = event.name(), "Dropping event, connection not active");
            return;
        }

        debug!(event = event.name(), "Routing roster event");
        match event {
            RosterEvent::BuddyAdded { address } | RosterEvent::RoomAdded { address } => {
                self.entity_added(&address)
            }
            RosterEvent::BuddyUpdated { address, attrs }
            | RosterEvent::RoomUpdated { address, attrs } => self.entity_updated(&address, &attrs),
            RosterEvent::BuddyRemoved { address } | RosterEvent::RoomRemoved { address } => {
                self.entity_removed(&address)
            }
            RosterEvent::RoomParticipantsJoined { room, participants } => {
                self.participants_changed(&room, &participants, true)
            }
            RosterEvent::RoomParticipantsLeft { room, participants } => {
                self.participants_changed(&room, &participants, false)
            }
            RosterEvent::MessageReceived { from, body } => self.message_received(&from, body),
            RosterEvent::RoomMessageReceived {
                room,
                sender_name,
                body,
            } => self.room_message_received(&room, &sender_name, &body),
            RosterEvent::MessageSent { to, body } => self.message_delivered(&to, body, true),
            RosterEvent::MessageError { to, body } => self.message_delivered(&to, body, false),
            RosterEvent::PresenceChanged => debug!("Own presence changed"),
            RosterEvent::StatusChanged { .. } => {}
        }
    }

    fn status_changed(&self, status: ServiceStatus, reason: StatusReason) {
        let reason = reason.connection_reason();
        match status {
            ServiceStatus::Connecting => {
                self.connection
                    .update_status(ConnectionStatus::Connecting, reason);
            }
            ServiceStatus::Authenticating => debug!("Service authenticating"),
            ServiceStatus::Active => self.connection.go_active(reason),
            ServiceStatus::Disconnected => self.connection.teardown(reason),
        }
    }

    fn resolve(&self, address: &str, event: &str) -> Option<RosterEntity> {
        let entity = self.connection.service().get_entity(address);
        if entity.is_none() {
            warn!(address = %address, event, "Roster entity not found, dropping event");
        }
        entity
    }

    fn entity_added(&self, address: &str) {
        let Some(entity) = self.resolve(address, "added") else {
            return;
        };
        self.reconcile_contact_lists(address, Some(&entity));
        self.reassign_group(&entity);
    }

    fn entity_updated(&self, address: &str, attrs: &[BuddyAttr]) {
        let Some(entity) = self.resolve(address, "updated") else {
            return;
        };
        let changed = |attr: BuddyAttr| attrs.contains(&attr);

        if changed(BuddyAttr::Presence) || changed(BuddyAttr::Mood) {
            self.connection.presence_received(address);
        }
        if changed(BuddyAttr::Presence) || changed(BuddyAttr::Subscription) {
            self.reconcile_contact_lists(address, Some(&entity));
        }
        if changed(BuddyAttr::Name) {
            self.connection.alias_changed(address);
            if let Some(room) = self.connection.existing_room_channel(address) {
                if let Some(room) = room.as_room() {
                    room.set_name(entity.name.clone());
                }
            }
        }
        if changed(BuddyAttr::Group) {
            self.reassign_group(&entity);
        }
    }

    /// The entity left the roster. If the roster still knows it, the event
    /// is stale and membership follows the roster instead.
    fn entity_removed(&self, address: &str) {
        let entity = self.connection.service().get_entity(address);
        if entity.is_some() {
            debug!(address = %address, "Removed entity is still on the roster");
        }
        for channel in self.connection.list_channels() {
            if let Some(list) = channel.as_list() {
                list.reconcile(self.connection.handles(), address, entity.as_ref());
            }
        }
    }

    /// Contact lists (not groups) follow subscription and presence.
    fn reconcile_contact_lists(&self, address: &str, entity: Option<&RosterEntity>) {
        for channel in self.connection.channels().list_by_kind(ChannelKind::ContactList) {
            if let Some(list) = channel.as_list() {
                list.reconcile(self.connection.handles(), address, entity);
            }
        }
    }

    /// Move the entity into the channel of its current group and out of
    /// every other open group channel.
    fn reassign_group(&self, entity: &RosterEntity) {
        let target = match self.connection.group_channel_for(entity) {
            Ok(target) => target,
            Err(err) => {
                warn!(address = %entity.address, error = %err, "Cannot open group channel");
                None
            }
        };
        let is_target =
            |channel: &Arc<Channel>| target.as_ref().map(|t| Arc::ptr_eq(t, channel)) == Some(true);

        for channel in self.connection.group_channels() {
            if is_target(&channel) {
                continue;
            }
            if let Some(list) = channel.as_list() {
                list.reconcile(self.connection.handles(), &entity.address, Some(entity));
            }
        }
        if let Some(list) = target.as_ref().and_then(|channel| channel.as_list()) {
            list.reconcile(self.connection.handles(), &entity.address, Some(entity));
        }
    }

    fn participants_changed(&self, room: &str, participants: &[String], joined: bool) {
        let Some(entity) = self.resolve(room, "participants") else {
            return;
        };
        let channel = match self.connection.room_channel_for(&entity.address) {
            Ok(channel) => channel,
            Err(err) => {
                warn!(room = %room, error = %err, "Cannot open room channel");
                return;
            }
        };
        let Some(room_channel) = channel.as_room() else {
            return;
        };
        let names: Vec<String> = participants
            .iter()
            .map(|address| {
                self.connection
                    .service()
                    .get_buddy(address)
                    .map(|buddy| buddy.name)
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| address.clone())
            })
            .collect();
        info!(room = %room, ?names, joined, "Room participants changed");

        let handles = self.connection.handles();
        let room_handle = channel.target_handle();
        if joined {
            room_channel.participants_joined(handles, room_handle, participants, &names);
        } else {
            room_channel.participants_left(handles, room_handle, participants, &names);
        }
    }

    fn message_received(&self, from: &str, body: String) {
        let Some(sender) = self.resolve(from, "message") else {
            return;
        };
        if sender.is_room() {
            info!(room = %from, "Ignoring message from a room");
            return;
        }
        match self.connection.text_channel_for(from) {
            Ok(channel) => {
                if let Some(text) = channel.as_text() {
                    text.message_received(channel.target_handle(), MessageType::Normal, body);
                }
            }
            Err(err) => warn!(address = %from, error = %err, "Cannot open text channel"),
        }
    }

    fn room_message_received(&self, room: &str, sender_name: &str, body: &str) {
        let Some(entity) = self.resolve(room, "room message") else {
            return;
        };
        match self.connection.room_channel_for(&entity.address) {
            Ok(channel) => {
                if let Some(text) = channel.as_text() {
                    text.message_received(
                        channel.target_handle(),
                        MessageType::Normal,
                        format!("<{}> {}", sender_name, body),
                    );
                }
            }
            Err(err) => warn!(room = %room, error = %err, "Cannot open room channel"),
        }
    }

    /// Delivery report for a message we sent.
    fn message_delivered(&self, to: &str, body: String, sent: bool) {
        let is_room = self
            .connection
            .service()
            .get_room(to)
            .is_some()
            || self.connection.handles().lookup(HandleKind::Room, to).is_some();
        let channel = if is_room {
            self.connection.room_channel_for(to)
        } else {
            self.connection.text_channel_for(to)
        };
        let channel = match channel {
            Ok(channel) => channel,
            Err(err) => {
                warn!(address = %to, error = %err, "Cannot report message delivery");
                return;
            }
        };
        if let Some(text) = channel.as_text() {
            if sent {
                text.message_sent(MessageType::Normal, body);
            } else {
                text.send_error(MessageType::Normal, body);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelEvent;
    use crate::config::MixerConfig;
    use crate::service::InMemoryService;
    use mixer_types::Presence;

    async fn active_router(roster: Vec<RosterEntity>) -> (RosterEventRouter, Arc<InMemoryService>) {
        let service = Arc::new(InMemoryService::new("me@mxit").with_roster(roster));
        let connection =
            Arc::new(Connection::new(MixerConfig::for_account("me@mxit"), service.clone()).unwrap());
        let router = RosterEventRouter::new(connection);
        for status in [ServiceStatus::Connecting, ServiceStatus::Active] {
            router
                .handle(RosterEvent::StatusChanged {
                    status,
                    reason: StatusReason::Requested,
                })
                .await;
        }
        (router, service)
    }

    #[tokio::test]
    async fn authenticating_is_not_a_transition() {
        let service = Arc::new(InMemoryService::new("me@mxit"));
        let connection =
            Arc::new(Connection::new(MixerConfig::for_account("me@mxit"), service).unwrap());
        let router = RosterEventRouter::new(connection.clone());
        router
            .handle(RosterEvent::StatusChanged {
                status: ServiceStatus::Authenticating,
                reason: StatusReason::Unknown,
            })
            .await;
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn buddy_messages_open_a_text_channel() {
        let (router, _service) = active_router(vec![
            RosterEntity::buddy("a@mxit", "Alice"),
            RosterEntity::room("r@mxit", "Lounge"),
        ])
        .await;
        router
            .handle(RosterEvent::MessageReceived {
                from: "a@mxit".into(),
                body: "hi".into(),
            })
            .await;
        router
            .handle(RosterEvent::MessageReceived {
                from: "r@mxit".into(),
                body: "ignored".into(),
            })
            .await;

        let connection = router.connection();
        let texts = connection.channels().list_by_kind(ChannelKind::Text);
        assert_eq!(texts.len(), 1);
        let pending = texts[0].as_text().unwrap().list_pending(false);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].text, "hi");
        assert_eq!(pending[0].sender, texts[0].target_handle());
    }

    #[tokio::test]
    async fn room_messages_carry_the_sender_name() {
        let (router, _service) =
            active_router(vec![RosterEntity::room("r@mxit", "Lounge")]).await;
        router
            .handle(RosterEvent::RoomMessageReceived {
                room: "r@mxit".into(),
                sender_name: "Bob".into(),
                body: "hello all".into(),
            })
            .await;
        let rooms = router.connection().channels().list_by_kind(ChannelKind::Room);
        assert_eq!(rooms.len(), 1);
        let pending = rooms[0].as_text().unwrap().list_pending(true);
        assert_eq!(pending[0].text, "<Bob> hello all");
    }

    #[tokio::test]
    async fn participants_joining_post_a_notice() {
        let (router, _service) = active_router(vec![
            RosterEntity::buddy("b@mxit", "Bob"),
            RosterEntity::room("r@mxit", "Lounge"),
        ])
        .await;
        router
            .handle(RosterEvent::RoomParticipantsJoined {
                room: "r@mxit".into(),
                participants: vec!["b@mxit".into(), "c@mxit".into()],
            })
            .await;
        let room = &router.connection().channels().list_by_kind(ChannelKind::Room)[0];
        assert_eq!(room.as_room().unwrap().member_names(), vec!["me@mxit", "b@mxit", "c@mxit"]);
        let notices = room.as_text().unwrap().list_pending(false);
        assert_eq!(notices[0].text, "Bob, c@mxit have joined");
        assert_eq!(notices[0].message_type, MessageType::Notice);
    }

    #[tokio::test]
    async fn delivery_reports_reach_the_text_channel() {
        let (router, _service) = active_router(vec![RosterEntity::buddy("a@mxit", "Alice")]).await;
        let channel = router.connection().text_channel_for("a@mxit").unwrap();
        let mut events = channel.subscribe();
        router
            .handle(RosterEvent::MessageError {
                to: "a@mxit".into(),
                body: "lost".into(),
            })
            .await;
        assert!(matches!(
            events.recv().await.unwrap(),
            ChannelEvent::SendError { text, .. } if text == "lost"
        ));
    }

    #[tokio::test]
    async fn presence_updates_are_published() {
        let (router, service) = active_router(vec![RosterEntity::buddy("a@mxit", "Alice")]).await;
        let mut events = router.connection().subscribe();
        service.modify("a@mxit", |buddy| buddy.presence = Presence::Busy);
        router
            .handle(RosterEvent::BuddyUpdated {
                address: "a@mxit".into(),
                attrs: vec![BuddyAttr::Presence],
            })
            .await;
        match events.recv().await.unwrap() {
            crate::connection::ConnectionEvent::PresenceUpdate { presences } => {
                let presence = presences.values().next().unwrap();
                assert_eq!(presence.status, "busy");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_entities_are_dropped() {
        let (router, _service) = active_router(Vec::new()).await;
        let before = router.connection().channels().len();
        router
            .handle(RosterEvent::BuddyAdded {
                address: "ghost@mxit".into(),
            })
            .await;
        router
            .handle(RosterEvent::MessageReceived {
                from: "ghost@mxit".into(),
                body: "boo".into(),
            })
            .await;
        assert_eq!(router.connection().channels().len(), before);
        assert!(router
            .connection()
            .handles()
            .lookup(HandleKind::Contact, "ghost@mxit")
            .is_none());
    }
}
