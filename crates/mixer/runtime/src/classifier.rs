//! Membership classifiers
//!
//! Each contact-list or group channel is bound to one [`ListVariant`] when
//! it is constructed. The variant picks its classifier from a fixed table
//! once; events are never re-dispatched on the list name.

use crate::handles::Handle;
use mixer_types::{
    Classification, GroupFlags, HandleKind, MixerError, MixerResult, Presence, RosterEntity,
};

/// List names the connection recognises.
pub const WELL_KNOWN_LISTS: [&str; 5] = ["subscribe", "publish", "hide", "allow", "deny"];

/// Classifier signature shared by every variant.
pub type ClassifyFn = fn(&ListVariant, Option<&RosterEntity>) -> Classification;

/// Which contact list or group a channel shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListVariant {
    Subscribe,
    Publish,
    Hide,
    Allow,
    Deny,
    Group(String),
}

impl ListVariant {
    /// Variant for a well-known list name.
    pub fn from_list_name(name: &str) -> MixerResult<Self> {
        match name {
            "subscribe" => Ok(ListVariant::Subscribe),
            "publish" => Ok(ListVariant::Publish),
            "hide" => Ok(ListVariant::Hide),
            "allow" => Ok(ListVariant::Allow),
            "deny" => Ok(ListVariant::Deny),
            other => Err(MixerError::UnknownListType(other.to_string())),
        }
    }

    /// Variant for a channel target: a list handle or a group handle.
    pub fn for_target(target: &Handle) -> MixerResult<Self> {
        match target.kind() {
            HandleKind::List => Self::from_list_name(target.key()),
            HandleKind::Group => Ok(ListVariant::Group(target.key().to_string())),
            other => Err(MixerError::UnknownListType(format!(
                "{} handle {} is not a list",
                other,
                target.id()
            ))),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ListVariant::Subscribe => "subscribe",
            ListVariant::Publish => "publish",
            ListVariant::Hide => "hide",
            ListVariant::Allow => "allow",
            ListVariant::Deny => "deny",
            ListVariant::Group(name) => name.as_str(),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, ListVariant::Group(_))
    }

    /// Lists the service has no notion of. They exist but stay empty.
    pub fn is_static(&self) -> bool {
        matches!(self, ListVariant::Hide | ListVariant::Allow | ListVariant::Deny)
    }

    pub fn group_flags(&self) -> GroupFlags {
        let flags = match self {
            ListVariant::Subscribe => GroupFlags::CAN_ADD | GroupFlags::CAN_REMOVE,
            ListVariant::Group(_) => {
                GroupFlags::CAN_ADD | GroupFlags::CAN_REMOVE | GroupFlags::ONLY_ONE_GROUP
            }
            ListVariant::Publish | ListVariant::Hide | ListVariant::Allow | ListVariant::Deny => {
                GroupFlags::NONE
            }
        };
        flags | GroupFlags::PROPERTIES
    }

    pub fn classifier(&self) -> ClassifyFn {
        match self {
            ListVariant::Subscribe => classify_subscribe,
            ListVariant::Publish => classify_publish,
            ListVariant::Group(_) => classify_group,
            ListVariant::Hide | ListVariant::Allow | ListVariant::Deny => classify_static,
        }
    }

    pub fn classify(&self, entity: Option<&RosterEntity>) -> Classification {
        (self.classifier())(self, entity)
    }
}

fn classify_subscribe(_: &ListVariant, entity: Option<&RosterEntity>) -> Classification {
    match entity {
        Some(_) => Classification::member(),
        None => Classification::NONE,
    }
}

fn classify_publish(_: &ListVariant, entity: Option<&RosterEntity>) -> Classification {
    match entity {
        Some(entity) => Classification {
            in_members: entity.is_subscribed(),
            in_local_pending: !entity.is_subscribed() && entity.presence == Presence::Pending,
            in_remote_pending: false,
        },
        None => Classification::NONE,
    }
}

fn classify_group(variant: &ListVariant, entity: Option<&RosterEntity>) -> Classification {
    let group = match variant {
        ListVariant::Group(group) => group.as_str(),
        _ => return Classification::NONE,
    };
    match entity {
        Some(entity) if entity.group_name() == Some(group) => Classification::member(),
        _ => Classification::NONE,
    }
}

fn classify_static(_: &ListVariant, _: Option<&RosterEntity>) -> Classification {
    Classification::NONE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handles::HandleRegistry;
    use mixer_types::SubscriptionState;

    #[test]
    fn subscribe_takes_anything_present() {
        let buddy = RosterEntity::buddy("a@mxit", "A").with_subscription(SubscriptionState::Rejected);
        assert_eq!(
            ListVariant::Subscribe.classify(Some(&buddy)),
            Classification::member()
        );
        assert_eq!(ListVariant::Subscribe.classify(None), Classification::NONE);
    }

    #[test]
    fn publish_pending_buddy_is_local_pending() {
        let buddy = RosterEntity::buddy("p@mxit", "P")
            .with_subscription(SubscriptionState::Pending)
            .with_presence(Presence::Pending);
        let verdict = ListVariant::Publish.classify(Some(&buddy));
        assert_eq!(verdict, Classification::local_pending());

        let accepted = buddy.with_subscription(SubscriptionState::Subscribed);
        let verdict = ListVariant::Publish.classify(Some(&accepted));
        assert_eq!(verdict, Classification::member());
    }

    #[test]
    fn group_matches_by_name() {
        let buddy = RosterEntity::buddy("g@mxit", "G").in_group("Friends");
        let friends = ListVariant::Group("Friends".into());
        let work = ListVariant::Group("Work".into());
        assert!(friends.classify(Some(&buddy)).in_members);
        assert_eq!(work.classify(Some(&buddy)), Classification::NONE);
        assert_eq!(
            friends.classify(Some(&buddy.clone().in_root_group())),
            Classification::NONE
        );
    }

    #[test]
    fn static_lists_are_always_empty() {
        let buddy = RosterEntity::buddy("x@mxit", "X");
        for variant in [ListVariant::Hide, ListVariant::Allow, ListVariant::Deny] {
            assert_eq!(variant.classify(Some(&buddy)), Classification::NONE);
            assert!(variant.is_static());
        }
    }

    #[test]
    fn variants_resolve_from_targets() {
        let registry = HandleRegistry::new("me@mxit");
        let publish = registry.intern(HandleKind::List, "publish").unwrap();
        let group = registry.intern(HandleKind::Group, "Work").unwrap();
        let bogus = registry.intern(HandleKind::List, "known").unwrap();
        let contact = registry.intern(HandleKind::Contact, "c@mxit").unwrap();

        assert_eq!(ListVariant::for_target(&publish).unwrap(), ListVariant::Publish);
        assert_eq!(
            ListVariant::for_target(&group).unwrap(),
            ListVariant::Group("Work".into())
        );
        assert!(matches!(
            ListVariant::for_target(&bogus),
            Err(MixerError::UnknownListType(_))
        ));
        assert!(ListVariant::for_target(&contact).is_err());
    }

    #[test]
    fn flags_per_variant() {
        assert_eq!(ListVariant::Publish.group_flags(), GroupFlags::PROPERTIES);
        assert_eq!(ListVariant::Subscribe.group_flags().bits(), 2051);
        assert!(ListVariant::Group("G".into())
            .group_flags()
            .contains(GroupFlags::ONLY_ONE_GROUP));
    }
}
