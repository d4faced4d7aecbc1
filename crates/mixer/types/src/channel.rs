//! Channel kinds, keys and distinguishing parameters

use crate::handle::{HandleId, HandleType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Interface and property names of the outer object model.
pub mod iface {
    pub const CHANNEL: &str = "org.freedesktop.Telepathy.Channel";
    pub const CHANNEL_TYPE_TEXT: &str = "org.freedesktop.Telepathy.Channel.Type.Text";
    pub const CHANNEL_TYPE_CONTACT_LIST: &str =
        "org.freedesktop.Telepathy.Channel.Type.ContactList";
    pub const CHANNEL_TYPE_ROOM_LIST: &str = "org.freedesktop.Telepathy.Channel.Type.RoomList";
    pub const CHANNEL_TYPE_FILE_TRANSFER: &str =
        "org.freedesktop.Telepathy.Channel.Type.FileTransfer.DRAFT";
    pub const CHANNEL_INTERFACE_GROUP: &str =
        "org.freedesktop.Telepathy.Channel.Interface.Group";
    pub const PROPERTIES: &str = "org.freedesktop.DBus.Properties";

    pub const CHANNEL_TYPE: &str = "org.freedesktop.Telepathy.Channel.ChannelType";
    pub const TARGET_HANDLE_TYPE: &str = "org.freedesktop.Telepathy.Channel.TargetHandleType";
    pub const TARGET_HANDLE: &str = "org.freedesktop.Telepathy.Channel.TargetHandle";
    pub const TARGET_ID: &str = "org.freedesktop.Telepathy.Channel.TargetID";
    /// Older spelling of `TARGET_ID` still sent by some clients.
    pub const TARGET_HANDLE_ID: &str = "org.freedesktop.Telepathy.Channel.TargetHandleID";

    pub fn qualified(interface: &str, name: &str) -> String {
        format!("{}.{}", interface, name)
    }
}

/// Connection-scoped channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel:{}", self.0)
    }
}

/// The kind of conversation or roster view a channel represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    ContactList,
    Group,
    Room,
    RoomList,
    FileTransfer,
}

impl ChannelKind {
    /// Channel type interface announced for this kind.
    pub fn channel_type(self) -> &'static str {
        match self {
            ChannelKind::Text | ChannelKind::Room => iface::CHANNEL_TYPE_TEXT,
            ChannelKind::ContactList | ChannelKind::Group => iface::CHANNEL_TYPE_CONTACT_LIST,
            ChannelKind::RoomList => iface::CHANNEL_TYPE_ROOM_LIST,
            ChannelKind::FileTransfer => iface::CHANNEL_TYPE_FILE_TRANSFER,
        }
    }

    /// Handle type a target of this kind must have.
    pub fn target_handle_type(self) -> HandleType {
        match self {
            ChannelKind::Text | ChannelKind::FileTransfer => HandleType::Contact,
            ChannelKind::ContactList => HandleType::List,
            ChannelKind::Group => HandleType::Group,
            ChannelKind::Room => HandleType::Room,
            ChannelKind::RoomList => HandleType::None,
        }
    }

    /// Resolve a kind from the announced channel type and target handle type.
    pub fn from_request(channel_type: &str, handle_type: HandleType) -> Option<Self> {
        let kind = match (channel_type, handle_type) {
            (iface::CHANNEL_TYPE_TEXT, HandleType::Contact) => ChannelKind::Text,
            (iface::CHANNEL_TYPE_TEXT, HandleType::Room) => ChannelKind::Room,
            (iface::CHANNEL_TYPE_CONTACT_LIST, HandleType::List) => ChannelKind::ContactList,
            (iface::CHANNEL_TYPE_CONTACT_LIST, HandleType::Group) => ChannelKind::Group,
            (iface::CHANNEL_TYPE_ROOM_LIST, HandleType::None) => ChannelKind::RoomList,
            (iface::CHANNEL_TYPE_FILE_TRANSFER, HandleType::Contact) => ChannelKind::FileTransfer,
            _ => return None,
        };
        Some(kind)
    }

    pub fn has_membership(self) -> bool {
        matches!(
            self,
            ChannelKind::ContactList | ChannelKind::Group | ChannelKind::Room
        )
    }

    /// Contact-list and group channels; the ones roster events reconcile.
    pub fn is_list(self) -> bool {
        matches!(self, ChannelKind::ContactList | ChannelKind::Group)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelKind::Text => "text",
            ChannelKind::ContactList => "contact-list",
            ChannelKind::Group => "group",
            ChannelKind::Room => "room",
            ChannelKind::RoomList => "room-list",
            ChannelKind::FileTransfer => "file-transfer",
        };
        f.write_str(name)
    }
}

/// File metadata distinguishing one transfer channel from another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileTransferParams {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub description: String,
    pub initial_offset: u64,
}

impl Default for FileTransferParams {
    fn default() -> Self {
        Self {
            filename: String::new(),
            content_type: "application/octet-stream".into(),
            size: 0,
            description: String::new(),
            initial_offset: 0,
        }
    }
}

/// Kind-specific parameters that take part in channel deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelParams {
    #[default]
    None,
    FileTransfer(FileTransferParams),
}

/// Deduplication key: at most one live channel exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelKey {
    pub kind: ChannelKind,
    pub target: Option<HandleId>,
    pub params: ChannelParams,
}

impl ChannelKey {
    pub fn new(kind: ChannelKind, target: Option<HandleId>, params: ChannelParams) -> Self {
        Self {
            kind,
            target,
            params,
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            Some(target) => write!(f, "{}/{}", self.kind, target),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Group interface flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupFlags(pub u32);

impl GroupFlags {
    pub const NONE: GroupFlags = GroupFlags(0);
    pub const CAN_ADD: GroupFlags = GroupFlags(1);
    pub const CAN_REMOVE: GroupFlags = GroupFlags(2);
    pub const ONLY_ONE_GROUP: GroupFlags = GroupFlags(512);
    pub const PROPERTIES: GroupFlags = GroupFlags(2048);

    pub fn contains(self, other: GroupFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for GroupFlags {
    type Output = GroupFlags;

    fn bitor(self, rhs: GroupFlags) -> GroupFlags {
        GroupFlags(self.0 | rhs.0)
    }
}

/// Text message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Normal,
    Action,
    Notice,
    AutoReply,
}

impl MessageType {
    pub fn code(self) -> u32 {
        match self {
            MessageType::Normal => 0,
            MessageType::Action => 1,
            MessageType::Notice => 2,
            MessageType::AutoReply => 3,
        }
    }
}

/// File-transfer channel states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileTransferState {
    None,
    #[default]
    Pending,
    Accepted,
    Open,
    Completed,
    Cancelled,
}

impl FileTransferState {
    pub fn code(self) -> u32 {
        match self {
            FileTransferState::None => 0,
            FileTransferState::Pending => 1,
            FileTransferState::Accepted => 2,
            FileTransferState::Open => 3,
            FileTransferState::Completed => 4,
            FileTransferState::Cancelled => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FileTransferState::Completed | FileTransferState::Cancelled)
    }
}
