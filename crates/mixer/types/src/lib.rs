//! Mixer Types - shared data model for the Mixer connection manager
//!
//! This crate defines the vocabulary every other Mixer crate speaks:
//!
//! - **Handles**: kinds, numeric ids and the external handle-type codes
//! - **Roster**: entities and events delivered by the messaging service
//! - **Channels**: kinds, keys and distinguishing parameters
//! - **Membership**: classifications, placements and change records
//!
//! Nothing in here locks, allocates ids or talks to the network. The
//! runtime crate owns all mutable state.

#![deny(unsafe_code)]

pub mod channel;
pub mod error;
pub mod event;
pub mod handle;
pub mod membership;
pub mod roster;

pub use channel::{
    iface, ChannelId, ChannelKey, ChannelKind, ChannelParams, FileTransferParams,
    FileTransferState, GroupFlags, MessageType,
};
pub use error::{MixerError, MixerResult};
pub use event::{ConnectionStatus, ConnectionStatusReason, RosterEvent, ServiceStatus, StatusReason};
pub use handle::{ClientId, HandleId, HandleKind, HandleRef, HandleType};
pub use membership::{ChangeReason, Classification, MembershipChange, Placement, Transition};
pub use roster::{BuddyAttr, BuddyUpdate, EntityKind, Presence, RosterEntity, SubscriptionState};
