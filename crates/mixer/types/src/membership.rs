//! Membership classification and change records

use crate::handle::HandleId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where a handle sits in a channel's membership state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Member,
    LocalPending,
    RemotePending,
}

/// A list variant's verdict on a roster entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Classification {
    pub in_members: bool,
    pub in_local_pending: bool,
    pub in_remote_pending: bool,
}

impl Classification {
    /// Verdict for an unknown entity.
    pub const NONE: Classification = Classification {
        in_members: false,
        in_local_pending: false,
        in_remote_pending: false,
    };

    pub fn member() -> Self {
        Self {
            in_members: true,
            ..Self::NONE
        }
    }

    pub fn local_pending() -> Self {
        Self {
            in_local_pending: true,
            ..Self::NONE
        }
    }

    /// Target placement. Members take precedence over local pending,
    /// which takes precedence over remote pending.
    pub fn target(&self) -> Option<Placement> {
        if self.in_members {
            Some(Placement::Member)
        } else if self.in_local_pending {
            Some(Placement::LocalPending)
        } else if self.in_remote_pending {
            Some(Placement::RemotePending)
        } else {
            None
        }
    }

    /// At most one flag is set.
    pub fn is_exclusive(&self) -> bool {
        [self.in_members, self.in_local_pending, self.in_remote_pending]
            .iter()
            .filter(|flag| **flag)
            .count()
            <= 1
    }
}

/// Reason code carried by a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    #[default]
    None,
    Invited,
}

impl ChangeReason {
    pub fn code(self) -> u32 {
        match self {
            ChangeReason::None => 0,
            ChangeReason::Invited => 4,
        }
    }
}

/// One handle moving between placements. `None` on either side is absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub handle: HandleId,
    pub from: Option<Placement>,
    pub to: Option<Placement>,
}

/// An incremental membership change, as announced to channel observers.
///
/// `removed` only lists handles that left the channel entirely; a handle
/// moving from local pending to members shows up in `added` alone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MembershipChange {
    pub actor: HandleId,
    pub added: BTreeSet<HandleId>,
    pub removed: BTreeSet<HandleId>,
    pub local_pending: BTreeSet<HandleId>,
    pub remote_pending: BTreeSet<HandleId>,
    pub reason_actor: HandleId,
    pub reason: ChangeReason,
    pub transitions: Vec<Transition>,
}

impl MembershipChange {
    pub fn from_transitions(transitions: Vec<Transition>, reason: ChangeReason) -> Self {
        let mut change = MembershipChange {
            reason,
            ..Default::default()
        };
        for transition in &transitions {
            match transition.to {
                Some(Placement::Member) => change.added.insert(transition.handle),
                Some(Placement::LocalPending) => change.local_pending.insert(transition.handle),
                Some(Placement::RemotePending) => change.remote_pending.insert(transition.handle),
                None => change.removed.insert(transition.handle),
            };
        }
        change.transitions = transitions;
        change
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.local_pending.is_empty()
            && self.remote_pending.is_empty()
    }
}
