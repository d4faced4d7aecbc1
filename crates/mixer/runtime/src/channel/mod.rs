//! Channels
//!
//! A [`Channel`] is one conversation or roster view. The shared part
//! (identity, target, closure, observers) lives here; each kind keeps its own
//! state in a [`ChannelState`] variant chosen once at construction.

mod file_transfer;
mod list;
mod room;
mod room_list;
mod text;

pub use file_transfer::FileTransferChannel;
pub use list::{ListChannel, LocalPendingInfo};
pub use room::RoomChannel;
pub use room_list::{RoomInfo, RoomListChannel};
pub use text::{PendingMessage, TextChannel};

use crate::classifier::ListVariant;
use crate::handles::Handle;
use chrono::{DateTime, Utc};
use mixer_types::{
    iface, ChannelId, ChannelKey, ChannelKind, ChannelParams, FileTransferState, HandleId,
    HandleType, MembershipChange, MessageType, MixerError, MixerResult,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Notifications a channel broadcasts to its observers.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    MembersChanged {
        change: MembershipChange,
        message: String,
    },
    Closed,
    MessageReceived(PendingMessage),
    MessageSent {
        timestamp: DateTime<Utc>,
        message_type: MessageType,
        text: String,
    },
    SendError {
        timestamp: DateTime<Utc>,
        message_type: MessageType,
        text: String,
    },
    ListingRooms(bool),
    RoomsListed(Vec<RoomInfo>),
    FileTransferStateChanged {
        state: FileTransferState,
        reason: u32,
    },
    InitialOffsetDefined(u64),
}

/// Kind-specific channel state.
pub enum ChannelState {
    Text(TextChannel),
    List(ListChannel),
    Room(RoomChannel),
    RoomList(RoomListChannel),
    FileTransfer(FileTransferChannel),
}

/// Serializable view of a channel, for logs and the replay driver.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSnapshot {
    pub id: ChannelId,
    pub kind: ChannelKind,
    pub target_handle: HandleId,
    pub target_id: String,
    pub requested: bool,
    pub closed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub local_pending: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remote_pending: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending_messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_state: Option<FileTransferState>,
}

pub struct Channel {
    id: ChannelId,
    key: ChannelKey,
    target: Option<Arc<Handle>>,
    initiator: Arc<Handle>,
    requested: bool,
    state: ChannelState,
    closed: AtomicBool,
    events: broadcast::Sender<ChannelEvent>,
}

impl Channel {
    /// Build a channel for `key`. The target must have the handle type the
    /// kind expects, and list targets must name a known list.
    pub fn new(
        id: ChannelId,
        key: ChannelKey,
        target: Option<Arc<Handle>>,
        initiator: Arc<Handle>,
        requested: bool,
        event_capacity: usize,
    ) -> MixerResult<Self> {
        let expected = key.kind.target_handle_type();
        let actual = target
            .as_ref()
            .map(|handle| handle.handle_type())
            .unwrap_or(HandleType::None);
        if expected != actual {
            return Err(MixerError::NotImplemented(format!(
                "{} channels need a {:?} target, got {:?}",
                key.kind, expected, actual
            )));
        }

        let (events, _) = broadcast::channel(event_capacity.max(1));
        let state = match (key.kind, &key.params) {
            (ChannelKind::ContactList | ChannelKind::Group, ChannelParams::None) => {
                let variant = match &target {
                    Some(handle) => ListVariant::for_target(handle)?,
                    None => return Err(MixerError::UnknownListType(String::new())),
                };
                ChannelState::List(ListChannel::new(variant, events.clone()))
            }
            (ChannelKind::Text, ChannelParams::None) => {
                ChannelState::Text(TextChannel::new(events.clone()))
            }
            (ChannelKind::Room, ChannelParams::None) => {
                let name = target
                    .as_ref()
                    .map(|handle| handle.display_name())
                    .unwrap_or_default();
                ChannelState::Room(RoomChannel::new(name, events.clone()))
            }
            (ChannelKind::RoomList, ChannelParams::None) => {
                ChannelState::RoomList(RoomListChannel::new(events.clone()))
            }
            (ChannelKind::FileTransfer, ChannelParams::FileTransfer(params)) => {
                ChannelState::FileTransfer(FileTransferChannel::new(
                    params.clone(),
                    requested,
                    events.clone(),
                ))
            }
            (kind, params) => {
                return Err(MixerError::NotImplemented(format!(
                    "{} channels do not take {:?}",
                    kind, params
                )))
            }
        };

        Ok(Self {
            id,
            key,
            target,
            initiator,
            requested,
            state,
            closed: AtomicBool::new(false),
            events,
        })
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub fn kind(&self) -> ChannelKind {
        self.key.kind
    }

    pub fn target(&self) -> Option<&Arc<Handle>> {
        self.target.as_ref()
    }

    pub fn target_handle(&self) -> HandleId {
        self.target
            .as_ref()
            .map(|handle| handle.id())
            .unwrap_or(HandleId::NONE)
    }

    pub fn target_id(&self) -> String {
        self.target
            .as_ref()
            .map(|handle| handle.target_id())
            .unwrap_or_default()
    }

    pub fn requested(&self) -> bool {
        self.requested
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn as_list(&self) -> Option<&ListChannel> {
        match &self.state {
            ChannelState::List(list) => Some(list),
            _ => None,
        }
    }

    /// Text behaviour, shared by text and room channels.
    pub fn as_text(&self) -> Option<&TextChannel> {
        match &self.state {
            ChannelState::Text(text) => Some(text),
            ChannelState::Room(room) => Some(room.text()),
            _ => None,
        }
    }

    pub fn as_room(&self) -> Option<&RoomChannel> {
        match &self.state {
            ChannelState::Room(room) => Some(room),
            _ => None,
        }
    }

    pub fn as_room_list(&self) -> Option<&RoomListChannel> {
        match &self.state {
            ChannelState::RoomList(room_list) => Some(room_list),
            _ => None,
        }
    }

    pub fn as_file_transfer(&self) -> Option<&FileTransferChannel> {
        match &self.state {
            ChannelState::FileTransfer(transfer) => Some(transfer),
            _ => None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flag the channel closed and tell observers, once. Returns whether
    /// this call did the closing.
    pub(crate) fn mark_closed(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.events.send(ChannelEvent::Closed);
        true
    }

    fn interfaces(&self) -> Vec<&'static str> {
        match self.kind() {
            ChannelKind::ContactList | ChannelKind::Group | ChannelKind::Room => {
                vec![iface::CHANNEL_INTERFACE_GROUP]
            }
            ChannelKind::RoomList => vec![iface::PROPERTIES],
            ChannelKind::Text | ChannelKind::FileTransfer => Vec::new(),
        }
    }

    /// Every externally visible read-only property, keyed by qualified name.
    pub fn identifiers(&self) -> BTreeMap<String, Value> {
        let mut props = BTreeMap::new();
        let mut put = |interface: &str, name: &str, value: Value| {
            props.insert(iface::qualified(interface, name), value);
        };

        put(iface::CHANNEL, "ChannelType", json!(self.kind().channel_type()));
        put(iface::CHANNEL, "Interfaces", json!(self.interfaces()));
        put(iface::CHANNEL, "TargetHandle", json!(self.target_handle().value()));
        put(iface::CHANNEL, "TargetID", json!(self.target_id()));
        put(
            iface::CHANNEL,
            "TargetHandleType",
            json!(self.kind().target_handle_type().code()),
        );
        put(iface::CHANNEL, "Requested", json!(self.requested));
        put(iface::CHANNEL, "InitiatorHandle", json!(self.initiator.id().value()));
        put(iface::CHANNEL, "InitiatorID", json!(self.initiator.target_id()));

        match &self.state {
            ChannelState::List(list) => {
                let group = iface::CHANNEL_INTERFACE_GROUP;
                put(group, "GroupFlags", json!(list.group_flags().bits()));
                put(group, "Members", json!(ids(list.members())));
                let local_pending: Vec<Value> = list
                    .local_pending_with_info()
                    .into_iter()
                    .map(|info| {
                        json!([
                            info.handle.value(),
                            info.actor.value(),
                            info.reason.code(),
                            info.message
                        ])
                    })
                    .collect();
                put(group, "LocalPendingMembers", json!(local_pending));
                put(group, "RemotePendingMembers", json!(ids(list.remote_pending())));
                put(group, "SelfHandle", json!(0));
                put(group, "HandleOwners", json!({}));
            }
            ChannelState::Room(room) => {
                let group = iface::CHANNEL_INTERFACE_GROUP;
                put(group, "GroupFlags", json!(room.group_flags().bits()));
                put(group, "Members", json!(ids(room.members())));
                put(group, "LocalPendingMembers", json!([]));
                put(group, "RemotePendingMembers", json!([]));
                put(group, "HandleOwners", json!({}));
            }
            ChannelState::FileTransfer(transfer) => {
                let ft = iface::CHANNEL_TYPE_FILE_TRANSFER;
                let params = transfer.params();
                put(ft, "State", json!(transfer.state().code()));
                put(ft, "ContentType", json!(params.content_type));
                put(ft, "Filename", json!(params.filename));
                put(ft, "Size", json!(params.size));
                put(ft, "Description", json!(params.description));
                put(ft, "InitialOffset", json!(transfer.initial_offset()));
            }
            ChannelState::Text(_) | ChannelState::RoomList(_) => {}
        }
        props
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        let mut snapshot = ChannelSnapshot {
            id: self.id,
            kind: self.kind(),
            target_handle: self.target_handle(),
            target_id: self.target_id(),
            requested: self.requested,
            closed: self.is_closed(),
            members: Vec::new(),
            local_pending: Vec::new(),
            remote_pending: Vec::new(),
            pending_messages: Vec::new(),
            transfer_state: None,
        };
        match &self.state {
            ChannelState::List(list) => {
                snapshot.members = list.member_names();
                snapshot.local_pending = list.local_pending_names();
            }
            ChannelState::Room(room) => {
                snapshot.members = room.member_names();
                snapshot.pending_messages = pending_texts(room.text());
            }
            ChannelState::Text(text) => {
                snapshot.pending_messages = pending_texts(text);
            }
            ChannelState::FileTransfer(transfer) => {
                snapshot.transfer_state = Some(transfer.state());
            }
            ChannelState::RoomList(_) => {}
        }
        snapshot
    }
}

fn ids(set: std::collections::BTreeSet<HandleId>) -> Vec<u32> {
    set.into_iter().map(HandleId::value).collect()
}

fn pending_texts(text: &TextChannel) -> Vec<String> {
    text.list_pending(false)
        .into_iter()
        .map(|message| message.text)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handles::HandleRegistry;
    use mixer_types::{FileTransferParams, HandleKind};

    fn channel_for(
        handles: &HandleRegistry,
        kind: ChannelKind,
        target: Option<Arc<Handle>>,
        params: ChannelParams,
    ) -> MixerResult<Channel> {
        let key = ChannelKey::new(kind, target.as_ref().map(|h| h.id()), params);
        Channel::new(ChannelId(1), key, target, handles.self_handle(), false, 16)
    }

    #[test]
    fn list_identifiers_carry_group_properties() {
        let handles = HandleRegistry::new("me@mxit");
        let publish = handles.intern(HandleKind::List, "publish").unwrap();
        let channel =
            channel_for(&handles, ChannelKind::ContactList, Some(publish.clone()), ChannelParams::None)
                .unwrap();
        let props = channel.identifiers();

        assert_eq!(
            props[&iface::qualified(iface::CHANNEL, "ChannelType")],
            json!(iface::CHANNEL_TYPE_CONTACT_LIST)
        );
        assert_eq!(
            props[&iface::qualified(iface::CHANNEL, "TargetHandle")],
            json!(publish.id().value())
        );
        assert_eq!(props[&iface::qualified(iface::CHANNEL, "TargetHandleType")], json!(3));
        assert_eq!(
            props[&iface::qualified(iface::CHANNEL_INTERFACE_GROUP, "GroupFlags")],
            json!(2048)
        );
    }

    #[test]
    fn target_type_must_match_kind() {
        let handles = HandleRegistry::new("me@mxit");
        let contact = handles.intern(HandleKind::Contact, "a@mxit").unwrap();
        let err = channel_for(&handles, ChannelKind::Group, Some(contact), ChannelParams::None)
            .err()
            .unwrap();
        assert!(matches!(err, MixerError::NotImplemented(_)));

        let list = handles.intern(HandleKind::List, "buddies").unwrap();
        let err = channel_for(&handles, ChannelKind::ContactList, Some(list), ChannelParams::None)
            .err()
            .unwrap();
        assert!(matches!(err, MixerError::UnknownListType(_)));
    }

    #[test]
    fn transfer_needs_file_params() {
        let handles = HandleRegistry::new("me@mxit");
        let contact = handles.intern(HandleKind::Contact, "a@mxit").unwrap();
        assert!(channel_for(
            &handles,
            ChannelKind::FileTransfer,
            Some(contact.clone()),
            ChannelParams::None
        )
        .is_err());

        let params = FileTransferParams {
            filename: "photo.jpg".into(),
            size: 2048,
            ..Default::default()
        };
        let channel = channel_for(
            &handles,
            ChannelKind::FileTransfer,
            Some(contact),
            ChannelParams::FileTransfer(params),
        )
        .unwrap();
        let props = channel.identifiers();
        assert_eq!(
            props[&iface::qualified(iface::CHANNEL_TYPE_FILE_TRANSFER, "Filename")],
            json!("photo.jpg")
        );
    }

    #[tokio::test]
    async fn close_is_signalled_once() {
        let handles = HandleRegistry::new("me@mxit");
        let channel = channel_for(&handles, ChannelKind::RoomList, None, ChannelParams::None).unwrap();
        let mut events = channel.subscribe();

        assert!(channel.mark_closed());
        assert!(!channel.mark_closed());
        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Closed);
        assert!(events.try_recv().is_err());
        assert!(channel.snapshot().closed);
    }
}
