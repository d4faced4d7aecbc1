//! Membership state and reconciliation
//!
//! A [`MembershipState`] is the last membership a channel announced. The
//! [`MembershipReconciler`] moves one handle at a time to wherever the
//! channel's classifier says it belongs and describes the move as an
//! incremental [`MembershipChange`]. Nothing here fails: an entity that
//! cannot be classified or named is simply not placed.

use crate::classifier::ListVariant;
use crate::handles::{Handle, HandleRegistry};
use mixer_types::{
    ChangeReason, HandleId, HandleKind, MembershipChange, Placement, RosterEntity, Transition,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::warn;

/// Three disjoint sets of handles. Placed handles are held alive.
#[derive(Debug, Default)]
pub struct MembershipState {
    members: BTreeMap<HandleId, Arc<Handle>>,
    local_pending: BTreeMap<HandleId, Arc<Handle>>,
    remote_pending: BTreeMap<HandleId, Arc<Handle>>,
}

impl MembershipState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn placement_of(&self, id: HandleId) -> Option<Placement> {
        if self.members.contains_key(&id) {
            Some(Placement::Member)
        } else if self.local_pending.contains_key(&id) {
            Some(Placement::LocalPending)
        } else if self.remote_pending.contains_key(&id) {
            Some(Placement::RemotePending)
        } else {
            None
        }
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.placement_of(id).is_some()
    }

    pub fn members(&self) -> BTreeSet<HandleId> {
        self.members.keys().copied().collect()
    }

    pub fn local_pending(&self) -> BTreeSet<HandleId> {
        self.local_pending.keys().copied().collect()
    }

    pub fn remote_pending(&self) -> BTreeSet<HandleId> {
        self.remote_pending.keys().copied().collect()
    }

    pub fn member_handles(&self) -> Vec<Arc<Handle>> {
        self.members.values().cloned().collect()
    }

    pub fn local_pending_handles(&self) -> Vec<Arc<Handle>> {
        self.local_pending.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len() + self.local_pending.len() + self.remote_pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_mut(&mut self, placement: Placement) -> &mut BTreeMap<HandleId, Arc<Handle>> {
        match placement {
            Placement::Member => &mut self.members,
            Placement::LocalPending => &mut self.local_pending,
            Placement::RemotePending => &mut self.remote_pending,
        }
    }

    /// Move `handle` to `to`, or out of the state when `to` is `None`.
    /// Returns the transition, or `None` when the handle is already there.
    pub fn place(&mut self, handle: Arc<Handle>, to: Option<Placement>) -> Option<Transition> {
        let id = handle.id();
        let from = self.placement_of(id);
        if from == to {
            return None;
        }
        if let Some(from) = from {
            self.set_mut(from).remove(&id);
        }
        if let Some(to) = to {
            self.set_mut(to).insert(id, handle);
        }
        Some(Transition {
            handle: id,
            from,
            to,
        })
    }

    /// Empty the state, returning one removal per placed handle.
    pub fn clear(&mut self) -> Vec<Transition> {
        let mut transitions = Vec::with_capacity(self.len());
        for (placement, set) in [
            (Placement::Member, &mut self.members),
            (Placement::LocalPending, &mut self.local_pending),
            (Placement::RemotePending, &mut self.remote_pending),
        ] {
            for id in std::mem::take(set).into_keys() {
                transitions.push(Transition {
                    handle: id,
                    from: Some(placement),
                    to: None,
                });
            }
        }
        transitions
    }
}

/// Diffs roster entities against a channel's membership state.
pub struct MembershipReconciler<'a> {
    handles: &'a HandleRegistry,
}

impl<'a> MembershipReconciler<'a> {
    pub fn new(handles: &'a HandleRegistry) -> Self {
        Self { handles }
    }

    /// Bring the handle for `address` to where `variant` places `entity`.
    ///
    /// `entity` is `None` when the roster no longer knows `address`. An
    /// address with no live handle can't be placed anywhere, so removing it
    /// is a no-op and never interns a handle.
    pub fn reconcile(
        &self,
        state: &mut MembershipState,
        variant: &ListVariant,
        address: &str,
        entity: Option<&RosterEntity>,
    ) -> Option<MembershipChange> {
        let target = variant.classify(entity).target();
        let handle = match target {
            Some(_) => match self.handles.intern(HandleKind::Contact, address) {
                Ok(handle) => handle,
                Err(err) => {
                    warn!(address = %address, list = variant.name(), error = %err, "Cannot place roster entity");
                    return None;
                }
            },
            None => self.handles.lookup(HandleKind::Contact, address)?,
        };

        let transition = state.place(handle, target)?;
        let reason = match target {
            Some(Placement::LocalPending) => ChangeReason::Invited,
            _ => ChangeReason::None,
        };
        Some(MembershipChange::from_transitions(vec![transition], reason))
    }

    /// Reconcile every entity and fold the result into a single change.
    pub fn populate<'e, I>(
        &self,
        state: &mut MembershipState,
        variant: &ListVariant,
        entities: I,
    ) -> Option<MembershipChange>
    where
        I: IntoIterator<Item = &'e RosterEntity>,
    {
        let transitions: Vec<Transition> = entities
            .into_iter()
            .filter_map(|entity| {
                self.reconcile(state, variant, &entity.address, Some(entity))
                    .map(|change| change.transitions)
            })
            .flatten()
            .collect();
        if transitions.is_empty() {
            return None;
        }
        Some(MembershipChange::from_transitions(
            transitions,
            ChangeReason::None,
        ))
    }
}
