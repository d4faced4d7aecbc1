use super::ChannelEvent;
use chrono::{DateTime, Utc};
use mixer_types::{HandleId, MessageType, MixerError, MixerResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::broadcast;

/// A received message waiting for acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingMessage {
    pub id: u32,
    pub timestamp: DateTime<Utc>,
    pub sender: HandleId,
    pub message_type: MessageType,
    pub flags: u32,
    pub text: String,
}

/// Text conversation with one contact. Room channels embed one too.
pub struct TextChannel {
    next_message_id: AtomicU32,
    pending: Mutex<BTreeMap<u32, PendingMessage>>,
    events: broadcast::Sender<ChannelEvent>,
}

impl TextChannel {
    pub(super) fn new(events: broadcast::Sender<ChannelEvent>) -> Self {
        Self {
            next_message_id: AtomicU32::new(0),
            pending: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    /// Only plain messages go out to the service.
    pub fn check_sendable(message_type: MessageType) -> MixerResult<()> {
        match message_type {
            MessageType::Normal => Ok(()),
            other => Err(MixerError::NotImplemented(format!(
                "unhandled message type {:?}",
                other
            ))),
        }
    }

    pub fn message_received(
        &self,
        sender: HandleId,
        message_type: MessageType,
        text: impl Into<String>,
    ) -> PendingMessage {
        let message = PendingMessage {
            id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            sender,
            message_type,
            flags: 0,
            text: text.into(),
        };
        self.pending.lock().insert(message.id, message.clone());
        let _ = self
            .events
            .send(ChannelEvent::MessageReceived(message.clone()));
        message
    }

    pub fn message_sent(&self, message_type: MessageType, text: impl Into<String>) {
        let _ = self.events.send(ChannelEvent::MessageSent {
            timestamp: Utc::now(),
            message_type,
            text: text.into(),
        });
    }

    pub fn send_error(&self, message_type: MessageType, text: impl Into<String>) {
        let _ = self.events.send(ChannelEvent::SendError {
            timestamp: Utc::now(),
            message_type,
            text: text.into(),
        });
    }

    /// Pending messages in arrival order, optionally clearing them.
    pub fn list_pending(&self, clear: bool) -> Vec<PendingMessage> {
        let mut pending = self.pending.lock();
        if clear {
            std::mem::take(&mut *pending).into_values().collect()
        } else {
            pending.values().cloned().collect()
        }
    }

    /// Acknowledge messages. Unknown ids fail the whole call and nothing is
    /// acknowledged.
    pub fn acknowledge(&self, ids: &[u32]) -> MixerResult<()> {
        let mut pending = self.pending.lock();
        let unknown: Vec<u32> = ids
            .iter()
            .copied()
            .filter(|id| !pending.contains_key(id))
            .collect();
        if !unknown.is_empty() {
            return Err(MixerError::NotAvailable(format!(
                "no pending messages with ids {:?}",
                unknown
            )));
        }
        for id in ids {
            pending.remove(id);
        }
        Ok(())
    }
}
