use super::ChannelEvent;
use mixer_types::{iface, HandleId};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

/// One room as announced by a room listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub handle: HandleId,
    pub channel_type: &'static str,
    pub handle_name: String,
    pub name: String,
}

impl RoomInfo {
    pub fn new(handle: HandleId, handle_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            handle,
            channel_type: iface::CHANNEL_TYPE_TEXT,
            handle_name: handle_name.into(),
            name: name.into(),
        }
    }
}

/// The room directory. It has no target and no membership.
pub struct RoomListChannel {
    listing: AtomicBool,
    events: broadcast::Sender<ChannelEvent>,
}

impl RoomListChannel {
    pub(super) fn new(events: broadcast::Sender<ChannelEvent>) -> Self {
        Self {
            listing: AtomicBool::new(false),
            events,
        }
    }

    pub fn is_listing(&self) -> bool {
        self.listing.load(Ordering::SeqCst)
    }

    /// Announce `rooms`, bracketed by listing-started and listing-stopped.
    pub fn list_rooms(&self, rooms: Vec<RoomInfo>) {
        self.set_listing(true);
        let _ = self.events.send(ChannelEvent::RoomsListed(rooms));
        self.set_listing(false);
    }

    fn set_listing(&self, listing: bool) {
        self.listing.store(listing, Ordering::SeqCst);
        let _ = self.events.send(ChannelEvent::ListingRooms(listing));
    }
}
