//! Mixer Runtime - identity and membership reconciliation
//!
//! One [`Connection`] per account session. It owns:
//!
//! - a [`HandleRegistry`] interning one handle per (kind, natural key)
//! - a [`ChannelRegistry`] holding at most one live channel per key
//! - the [`ServiceAdapter`] that talks to the messaging service
//!
//! The [`RosterEventRouter`] consumes the service's event queue and keeps
//! list, group and room membership in step with the roster through the
//! classifiers in [`classifier`] and the [`MembershipReconciler`].
//!
//! ```ignore
//! let service = Arc::new(InMemoryService::new("me@mxit").with_roster(roster));
//! let connection = Arc::new(Connection::new(MixerConfig::for_account("me@mxit"), service.clone())?);
//! let (tx, rx) = mpsc::channel(connection.config().runtime.event_queue_capacity);
//! service.attach_events(tx);
//! RosterEventRouter::new(connection.clone()).spawn(rx);
//! connection.connect().await?;
//! ```

#![deny(unsafe_code)]

mod aliasing;
pub mod channel;
pub mod channel_registry;
pub mod classifier;
pub mod config;
pub mod connection;
pub mod handles;
pub mod membership;
pub mod presence;
pub mod request;
pub mod router;
pub mod service;

pub use channel::{
    Channel, ChannelEvent, ChannelSnapshot, ChannelState, FileTransferChannel, ListChannel,
    LocalPendingInfo, PendingMessage, RoomChannel, RoomInfo, RoomListChannel, TextChannel,
};
pub use channel_registry::ChannelRegistry;
pub use classifier::{ListVariant, WELL_KNOWN_LISTS};
pub use config::{AccountConfig, MixerConfig, RuntimeConfig};
pub use connection::{Connection, ConnectionEvent};
pub use handles::{Handle, HandleRegistry};
pub use membership::{MembershipReconciler, MembershipState};
pub use presence::{PresenceStatus, PresenceType, StatusSpec, STATUSES};
pub use request::ChannelRequest;
pub use router::RosterEventRouter;
pub use service::{InMemoryService, ServiceAdapter, ServiceCommand};
