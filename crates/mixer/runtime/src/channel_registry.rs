//! Channel deduplication
//!
//! At most one live channel exists per [`ChannelKey`]. Creation goes
//! through the map's entry API, so concurrent requests for the same key
//! see exactly one winner and everyone else gets the winner's instance.

use crate::channel::Channel;
use crate::handles::Handle;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mixer_types::{ChannelId, ChannelKey, ChannelKind, ChannelParams, MixerError, MixerResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-connection channel registry.
pub struct ChannelRegistry {
    channels: DashMap<ChannelKey, Arc<Channel>>,
    next_id: AtomicU64,
    event_capacity: usize,
}

impl ChannelRegistry {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            next_id: AtomicU64::new(1),
            event_capacity,
        }
    }

    fn key_for(
        kind: ChannelKind,
        target: Option<&Arc<Handle>>,
        params: ChannelParams,
    ) -> ChannelKey {
        ChannelKey::new(kind, target.map(|handle| handle.id()), params)
    }

    /// Return the live channel for the key, creating it if there is none.
    /// The flag says whether this call created it.
    pub fn get_or_create(
        &self,
        kind: ChannelKind,
        target: Option<Arc<Handle>>,
        params: ChannelParams,
        initiator: Arc<Handle>,
        requested: bool,
    ) -> MixerResult<(Arc<Channel>, bool)> {
        let key = Self::key_for(kind, target.as_ref(), params);
        match self.channels.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!(channel = %entry.get().id(), key = %key, "Channel cache hit");
                Ok((entry.get().clone(), false))
            }
            Entry::Vacant(entry) => {
                let id = ChannelId(self.next_id.fetch_add(1, Ordering::SeqCst));
                let channel = Arc::new(Channel::new(
                    id,
                    key.clone(),
                    target,
                    initiator,
                    requested,
                    self.event_capacity,
                )?);
                entry.insert(channel.clone());
                info!(channel = %id, key = %key, requested, "Channel created");
                Ok((channel, true))
            }
        }
    }

    /// Create a channel, failing if one already exists for the key.
    pub fn create(
        &self,
        kind: ChannelKind,
        target: Option<Arc<Handle>>,
        params: ChannelParams,
        initiator: Arc<Handle>,
        requested: bool,
    ) -> MixerResult<Arc<Channel>> {
        let key = Self::key_for(kind, target.as_ref(), params.clone());
        if self.channels.contains_key(&key) {
            return Err(MixerError::AlreadyExists(key.to_string()));
        }
        match self.get_or_create(kind, target, params, initiator, requested)? {
            (channel, true) => Ok(channel),
            (_, false) => Err(MixerError::AlreadyExists(key.to_string())),
        }
    }

    pub fn get(&self, key: &ChannelKey) -> Option<Arc<Channel>> {
        self.channels.get(key).map(|entry| entry.value().clone())
    }

    pub fn get_by_id(&self, id: ChannelId) -> Option<Arc<Channel>> {
        self.channels
            .iter()
            .find(|entry| entry.value().id() == id)
            .map(|entry| entry.value().clone())
    }

    /// Remove `channel` and signal its observers. A stale instance that was
    /// already replaced under its key leaves the live one alone. Returns
    /// whether this call closed the channel.
    pub fn close(&self, channel: &Arc<Channel>) -> bool {
        self.channels
            .remove_if(channel.key(), |_, live| Arc::ptr_eq(live, channel));
        let closed = channel.mark_closed();
        if closed {
            info!(channel = %channel.id(), key = %channel.key(), "Channel closed");
        }
        closed
    }

    /// Close every channel. Returns the ones this call closed.
    pub fn close_all(&self) -> Vec<Arc<Channel>> {
        let keys: Vec<ChannelKey> = self.channels.iter().map(|entry| entry.key().clone()).collect();
        let mut closed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((_, channel)) = self.channels.remove(&key) {
                if channel.mark_closed() {
                    closed.push(channel);
                }
            }
        }
        if !closed.is_empty() {
            info!(count = closed.len(), "Closed all channels");
        }
        closed
    }

    /// Channels of one kind, in no particular order.
    pub fn list_by_kind(&self, kind: ChannelKind) -> Vec<Arc<Channel>> {
        self.channels
            .iter()
            .filter(|entry| entry.key().kind == kind)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn list_all(&self) -> Vec<Arc<Channel>> {
        self.channels
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
