//! Service-side events and connection status

use crate::roster::BuddyAttr;
use serde::{Deserialize, Serialize};

/// Status values the service adapter reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Connecting,
    Authenticating,
    Active,
    Disconnected,
}

/// Why the service changed status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusReason {
    #[default]
    Unknown,
    Requested,
    NetworkError,
    Timeout,
    AuthFailed,
    Error,
}

impl StatusReason {
    pub fn connection_reason(self) -> ConnectionStatusReason {
        match self {
            StatusReason::Unknown => ConnectionStatusReason::NoneSpecified,
            StatusReason::Requested => ConnectionStatusReason::Requested,
            StatusReason::NetworkError | StatusReason::Timeout | StatusReason::Error => {
                ConnectionStatusReason::NetworkError
            }
            StatusReason::AuthFailed => ConnectionStatusReason::AuthenticationFailed,
        }
    }
}

/// Connection status as exposed to the outer framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Active,
}

/// Reason attached to a connection status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatusReason {
    NoneSpecified,
    Requested,
    NetworkError,
    AuthenticationFailed,
}

impl ConnectionStatusReason {
    pub fn code(self) -> u32 {
        match self {
            ConnectionStatusReason::NoneSpecified => 0,
            ConnectionStatusReason::Requested => 1,
            ConnectionStatusReason::NetworkError => 2,
            ConnectionStatusReason::AuthenticationFailed => 3,
        }
    }
}

/// Asynchronous notifications from the service adapter.
///
/// Events name entities by address; the router resolves them against the
/// roster when it processes the event, not when the event was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RosterEvent {
    BuddyAdded {
        address: String,
    },
    BuddyUpdated {
        address: String,
        attrs: Vec<BuddyAttr>,
    },
    BuddyRemoved {
        address: String,
    },
    RoomAdded {
        address: String,
    },
    RoomUpdated {
        address: String,
        attrs: Vec<BuddyAttr>,
    },
    RoomRemoved {
        address: String,
    },
    RoomParticipantsJoined {
        room: String,
        participants: Vec<String>,
    },
    RoomParticipantsLeft {
        room: String,
        participants: Vec<String>,
    },
    MessageReceived {
        from: String,
        body: String,
    },
    RoomMessageReceived {
        room: String,
        sender_name: String,
        body: String,
    },
    MessageSent {
        to: String,
        body: String,
    },
    MessageError {
        to: String,
        body: String,
    },
    /// Our own presence or mood changed.
    PresenceChanged,
    StatusChanged {
        status: ServiceStatus,
        #[serde(default)]
        reason: StatusReason,
    },
}

impl RosterEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RosterEvent::BuddyAdded { .. } => "buddy_added",
            RosterEvent::BuddyUpdated { .. } => "buddy_updated",
            RosterEvent::BuddyRemoved { .. } => "buddy_removed",
            RosterEvent::RoomAdded { .. } => "room_added",
            RosterEvent::RoomUpdated { .. } => "room_updated",
            RosterEvent::RoomRemoved { .. } => "room_removed",
            RosterEvent::RoomParticipantsJoined { .. } => "room_participants_joined",
            RosterEvent::RoomParticipantsLeft { .. } => "room_participants_left",
            RosterEvent::MessageReceived { .. } => "message_received",
            RosterEvent::RoomMessageReceived { .. } => "room_message_received",
            RosterEvent::MessageSent { .. } => "message_sent",
            RosterEvent::MessageError { .. } => "message_error",
            RosterEvent::PresenceChanged => "presence_changed",
            RosterEvent::StatusChanged { .. } => "status_changed",
        }
    }
}
