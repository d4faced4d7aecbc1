//! Property tests for classification, interning and reconciliation.

use mixer_runtime::{HandleRegistry, ListVariant, MembershipReconciler, MembershipState};
use mixer_types::{Classification, EntityKind, HandleKind, Presence, RosterEntity, SubscriptionState};
use proptest::prelude::*;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_presence() -> impl Strategy<Value = Presence> {
    prop_oneof![
        Just(Presence::Available),
        Just(Presence::Away),
        Just(Presence::Busy),
        Just(Presence::Xa),
        Just(Presence::Chat),
        Just(Presence::Offline),
        Just(Presence::Pending),
    ]
}

fn arb_subscription() -> impl Strategy<Value = SubscriptionState> {
    prop_oneof![
        Just(SubscriptionState::Subscribed),
        Just(SubscriptionState::Pending),
        Just(SubscriptionState::Rejected),
    ]
}

fn arb_group() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("Friends".to_string())),
        Just(Some("Work".to_string())),
        "[A-Za-z]{1,8}".prop_map(Some),
    ]
}

fn arb_entity() -> impl Strategy<Value = RosterEntity> {
    (
        "[a-z]{1,8}@mxit",
        any::<bool>(),
        arb_group(),
        arb_presence(),
        arb_subscription(),
    )
        .prop_map(|(address, room, group, presence, subscription)| RosterEntity {
            name: address.to_uppercase(),
            address,
            kind: if room { EntityKind::Room } else { EntityKind::Buddy },
            group,
            presence,
            subscription,
            mood: None,
            participants: Vec::new(),
        })
}

fn arb_variant() -> impl Strategy<Value = ListVariant> {
    prop_oneof![
        Just(ListVariant::Subscribe),
        Just(ListVariant::Publish),
        Just(ListVariant::Hide),
        Just(ListVariant::Allow),
        Just(ListVariant::Deny),
        Just(ListVariant::Group("Friends".into())),
        Just(ListVariant::Group("Work".into())),
    ]
}

fn arb_kind() -> impl Strategy<Value = HandleKind> {
    prop_oneof![
        Just(HandleKind::Contact),
        Just(HandleKind::Room),
        Just(HandleKind::List),
        Just(HandleKind::Group),
    ]
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn classifications_are_exclusive(variant in arb_variant(), entity in arb_entity()) {
        prop_assert!(variant.classify(Some(&entity)).is_exclusive());
        prop_assert_eq!(variant.classify(None), Classification::NONE);
    }

    #[test]
    fn interning_is_idempotent(kind in arb_kind(), key in "[a-z0-9@.]{1,16}") {
        let handles = HandleRegistry::new("me@mxit");
        let first = handles.intern(kind, &key).unwrap();
        let second = handles.intern(kind, &key).unwrap();
        prop_assert!(Arc::ptr_eq(&first, &second));
        prop_assert_eq!(first.id(), second.id());
        let resolved = handles.resolve(first.id()).unwrap();
        prop_assert_eq!(resolved.key(), key.as_str());
    }

    #[test]
    fn reconciling_twice_changes_nothing(variant in arb_variant(), entity in arb_entity()) {
        let handles = HandleRegistry::new("me@mxit");
        let reconciler = MembershipReconciler::new(&handles);
        let mut state = MembershipState::new();

        let first = reconciler.reconcile(&mut state, &variant, &entity.address, Some(&entity));
        let placed = variant.classify(Some(&entity)).target().is_some();
        prop_assert_eq!(first.is_some(), placed);
        prop_assert!(reconciler
            .reconcile(&mut state, &variant, &entity.address, Some(&entity))
            .is_none());
    }

    #[test]
    fn an_entity_sits_in_at_most_one_group(
        moves in prop::collection::vec(prop_oneof![Just(None), Just(Some(0usize)), Just(Some(1)), Just(Some(2))], 1..12)
    ) {
        const GROUPS: [&str; 3] = ["G", "H", "K"];
        let handles = HandleRegistry::new("me@mxit");
        let reconciler = MembershipReconciler::new(&handles);
        let variants: Vec<ListVariant> =
            GROUPS.iter().map(|g| ListVariant::Group(g.to_string())).collect();
        let mut states: Vec<MembershipState> = GROUPS.iter().map(|_| MembershipState::new()).collect();

        for group in moves {
            let mut entity = RosterEntity::buddy("b@mxit", "B");
            entity.group = group.map(|i| GROUPS[i].to_string());
            for (state, variant) in states.iter_mut().zip(&variants) {
                reconciler.reconcile(state, variant, &entity.address, Some(&entity));
            }

            let holding: Vec<usize> = states
                .iter()
                .enumerate()
                .filter(|(_, state)| !state.is_empty())
                .map(|(i, _)| i)
                .collect();
            match group {
                Some(i) => prop_assert_eq!(holding, vec![i]),
                None => prop_assert!(holding.is_empty()),
            }
        }
    }
}
