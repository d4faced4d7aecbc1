use super::{ChannelEvent, TextChannel};
use crate::handles::{Handle, HandleRegistry};
use crate::membership::MembershipState;
use mixer_types::{
    ChangeReason, GroupFlags, HandleId, HandleKind, MembershipChange, MessageType, Placement,
    Transition,
};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

/// A multi-user room: text plus a participant list.
pub struct RoomChannel {
    text: TextChannel,
    participants: Mutex<MembershipState>,
    name: RwLock<String>,
    events: broadcast::Sender<ChannelEvent>,
}

impl RoomChannel {
    pub(super) fn new(name: String, events: broadcast::Sender<ChannelEvent>) -> Self {
        Self {
            text: TextChannel::new(events.clone()),
            participants: Mutex::new(MembershipState::new()),
            name: RwLock::new(name),
            events,
        }
    }

    pub fn text(&self) -> &TextChannel {
        &self.text
    }

    pub fn group_flags(&self) -> GroupFlags {
        GroupFlags::CAN_ADD | GroupFlags::PROPERTIES
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    /// Room properties: `name`, `invite-only` and `private`.
    pub fn properties(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("name".to_string(), json!(self.name())),
            ("invite-only".to_string(), json!(true)),
            ("private".to_string(), json!(true)),
        ])
    }

    pub fn members(&self) -> BTreeSet<HandleId> {
        self.participants.lock().members()
    }

    pub fn member_names(&self) -> Vec<String> {
        let participants = self.participants.lock();
        participants
            .member_handles()
            .iter()
            .map(|h| h.target_id())
            .collect()
    }

    /// Seed the participant list with ourselves and everyone already there.
    pub fn populate(
        &self,
        handles: &HandleRegistry,
        participants: &[String],
    ) -> Option<MembershipChange> {
        let mut all = vec![handles.self_handle()];
        all.extend(intern_all(handles, participants));
        self.apply(all, Some(Placement::Member), String::new())
    }

    /// Participants joined: add them and post a notice from the room.
    pub fn participants_joined(
        &self,
        handles: &HandleRegistry,
        room: HandleId,
        participants: &[String],
        names: &[String],
    ) -> Option<MembershipChange> {
        let notice = presence_notice(names, "joined");
        let change = self.apply(
            intern_all(handles, participants),
            Some(Placement::Member),
            notice.clone(),
        );
        if !names.is_empty() {
            self.text
                .message_received(room, MessageType::Notice, notice);
        }
        change
    }

    /// Participants left: remove them and post a notice from the room.
    pub fn participants_left(
        &self,
        handles: &HandleRegistry,
        room: HandleId,
        participants: &[String],
        names: &[String],
    ) -> Option<MembershipChange> {
        let notice = presence_notice(names, "left");
        let leaving = participants
            .iter()
            .filter_map(|address| handles.lookup(HandleKind::Contact, address))
            .collect();
        let change = self.apply(leaving, None, notice.clone());
        if !names.is_empty() {
            self.text
                .message_received(room, MessageType::Notice, notice);
        }
        change
    }

    fn apply(
        &self,
        handles: Vec<Arc<Handle>>,
        to: Option<Placement>,
        message: String,
    ) -> Option<MembershipChange> {
        let mut participants = self.participants.lock();
        let transitions: Vec<Transition> = handles
            .into_iter()
            .filter_map(|handle| participants.place(handle, to))
            .collect();
        if transitions.is_empty() {
            return None;
        }
        let change = MembershipChange::from_transitions(transitions, ChangeReason::None);
        let _ = self.events.send(ChannelEvent::MembersChanged {
            change: change.clone(),
            message,
        });
        Some(change)
    }
}

fn intern_all(handles: &HandleRegistry, addresses: &[String]) -> Vec<Arc<Handle>> {
    addresses
        .iter()
        .filter_map(|address| match handles.intern(HandleKind::Contact, address) {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(address = %address, error = %err, "Skipping room participant");
                None
            }
        })
        .collect()
}

/// "Alice has joined", "Alice, Bob have joined".
fn presence_notice(names: &[String], verb: &str) -> String {
    let auxiliary = if names.len() == 1 { "has" } else { "have" };
    format!("{} {} {}", names.join(", "), auxiliary, verb)
}
