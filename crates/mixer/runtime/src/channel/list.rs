use super::ChannelEvent;
use crate::classifier::ListVariant;
use crate::handles::HandleRegistry;
use crate::membership::{MembershipReconciler, MembershipState};
use mixer_types::{
    ChangeReason, GroupFlags, HandleId, MembershipChange, RosterEntity,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use tokio::sync::{broadcast, watch};
use tracing::debug;

const INVITED_MESSAGE: &str = "you are invited!";

/// One entry of the local-pending-with-info listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalPendingInfo {
    pub handle: HandleId,
    pub actor: HandleId,
    pub reason: ChangeReason,
    pub message: String,
}

/// A contact list or group.
///
/// Membership starts empty. [`ListChannel::populate`] fills it from a
/// roster snapshot; until then [`ListChannel::wait_populated`] blocks.
pub struct ListChannel {
    variant: ListVariant,
    state: Mutex<MembershipState>,
    populated: watch::Sender<bool>,
    events: broadcast::Sender<ChannelEvent>,
}

impl ListChannel {
    pub(super) fn new(variant: ListVariant, events: broadcast::Sender<ChannelEvent>) -> Self {
        let (populated, _) = watch::channel(false);
        Self {
            variant,
            state: Mutex::new(MembershipState::new()),
            populated,
            events,
        }
    }

    pub fn variant(&self) -> &ListVariant {
        &self.variant
    }

    pub fn group_flags(&self) -> GroupFlags {
        self.variant.group_flags()
    }

    pub fn members(&self) -> BTreeSet<HandleId> {
        self.state.lock().members()
    }

    pub fn local_pending(&self) -> BTreeSet<HandleId> {
        self.state.lock().local_pending()
    }

    pub fn remote_pending(&self) -> BTreeSet<HandleId> {
        self.state.lock().remote_pending()
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.state.lock().contains(id)
    }

    pub fn member_names(&self) -> Vec<String> {
        let state = self.state.lock();
        state.member_handles().iter().map(|h| h.target_id()).collect()
    }

    pub fn local_pending_names(&self) -> Vec<String> {
        let state = self.state.lock();
        state
            .local_pending_handles()
            .iter()
            .map(|h| h.target_id())
            .collect()
    }

    /// Local pending members with the actor and message shown to the user.
    /// Only the publish list has anything to say here.
    pub fn local_pending_with_info(&self) -> Vec<LocalPendingInfo> {
        if self.variant != ListVariant::Publish {
            return Vec::new();
        }
        self.local_pending()
            .into_iter()
            .map(|id| LocalPendingInfo {
                handle: id,
                actor: id,
                reason: ChangeReason::Invited,
                message: INVITED_MESSAGE.to_string(),
            })
            .collect()
    }

    /// Reconcile one roster entity and announce the change, if any.
    pub fn reconcile(
        &self,
        handles: &HandleRegistry,
        address: &str,
        entity: Option<&RosterEntity>,
    ) -> Option<MembershipChange> {
        let mut state = self.state.lock();
        let change = MembershipReconciler::new(handles).reconcile(
            &mut state,
            &self.variant,
            address,
            entity,
        )?;
        debug!(list = self.variant.name(), address = %address, "List membership changed");
        self.announce(&change);
        Some(change)
    }

    /// Fill membership from a roster snapshot with one coalesced change,
    /// then mark the channel populated.
    pub fn populate<'e, I>(&self, handles: &HandleRegistry, entities: I) -> Option<MembershipChange>
    where
        I: IntoIterator<Item = &'e RosterEntity>,
    {
        let change = {
            let mut state = self.state.lock();
            let change =
                MembershipReconciler::new(handles).populate(&mut state, &self.variant, entities);
            if let Some(change) = &change {
                self.announce(change);
            }
            change
        };
        self.populated.send_replace(true);
        change
    }

    pub fn is_populated(&self) -> bool {
        *self.populated.borrow()
    }

    /// Resolve once the initial population has been applied.
    pub async fn wait_populated(&self) {
        let mut populated = self.populated.subscribe();
        let _ = populated.wait_for(|done| *done).await;
    }

    fn announce(&self, change: &MembershipChange) {
        let _ = self.events.send(ChannelEvent::MembersChanged {
            change: change.clone(),
            message: String::new(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixer_types::{HandleKind, Presence, SubscriptionState};
    use std::sync::Arc;

    fn list(variant: ListVariant) -> (ListChannel, broadcast::Receiver<ChannelEvent>) {
        let (events, rx) = broadcast::channel(16);
        (ListChannel::new(variant, events), rx)
    }

    #[tokio::test]
    async fn population_is_observable() {
        let handles = HandleRegistry::new("me@mxit");
        let (channel, mut rx) = list(ListVariant::Subscribe);
        let channel = Arc::new(channel);
        assert!(!channel.is_populated());

        let waiter = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.wait_populated().await })
        };
        let roster = vec![
            RosterEntity::buddy("a@mxit", "A"),
            RosterEntity::room("r@mxit", "Room"),
        ];
        channel.populate(&handles, &roster);
        waiter.await.unwrap();

        match rx.recv().await.unwrap() {
            ChannelEvent::MembersChanged { change, .. } => {
                assert_eq!(change.added.len(), 2);
                assert_eq!(change.reason, ChangeReason::None);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(channel.member_names(), vec!["a@mxit", "r@mxit"]);
    }

    #[test]
    fn empty_population_still_completes() {
        let handles = HandleRegistry::new("me@mxit");
        let (channel, mut rx) = list(ListVariant::Deny);
        let roster = vec![RosterEntity::buddy("a@mxit", "A")];
        assert!(channel.populate(&handles, &roster).is_none());
        assert!(channel.is_populated());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn publish_reports_invitation_info() {
        let handles = HandleRegistry::new("me@mxit");
        let (channel, _rx) = list(ListVariant::Publish);
        let buddy = RosterEntity::buddy("p@mxit", "P")
            .with_subscription(SubscriptionState::Pending)
            .with_presence(Presence::Pending);
        channel.reconcile(&handles, &buddy.address, Some(&buddy));

        let id = handles.lookup(HandleKind::Contact, "p@mxit").unwrap().id();
        let info = channel.local_pending_with_info();
        assert_eq!(
            info,
            vec![LocalPendingInfo {
                handle: id,
                actor: id,
                reason: ChangeReason::Invited,
                message: "you are invited!".into(),
            }]
        );
    }
}
