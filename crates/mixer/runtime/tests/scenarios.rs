//! End-to-end scenarios: roster events through the router into channels.

use mixer_runtime::{
    Channel, ChannelEvent, ChannelRequest, Connection, ConnectionEvent, InMemoryService,
    MixerConfig, RosterEventRouter,
};
use mixer_types::{
    BuddyAttr, ChangeReason, ChannelKind, ConnectionStatus, HandleId, HandleKind,
    MembershipChange, Placement, Presence, RosterEntity, RosterEvent, ServiceStatus,
    StatusReason, SubscriptionState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

struct Harness {
    connection: Arc<Connection>,
    service: Arc<InMemoryService>,
    router: RosterEventRouter,
}

impl Harness {
    async fn active(roster: Vec<RosterEntity>) -> Self {
        let service = Arc::new(InMemoryService::new("me@mxit").with_roster(roster));
        let connection = Arc::new(
            Connection::new(MixerConfig::for_account("me@mxit"), service.clone()).unwrap(),
        );
        let router = RosterEventRouter::new(connection.clone());
        let harness = Self {
            connection,
            service,
            router,
        };
        harness.status(ServiceStatus::Connecting).await;
        harness.status(ServiceStatus::Active).await;
        assert_eq!(harness.connection.status(), ConnectionStatus::Active);
        harness
    }

    async fn status(&self, status: ServiceStatus) {
        self.router
            .handle(RosterEvent::StatusChanged {
                status,
                reason: StatusReason::Requested,
            })
            .await;
    }

    async fn send(&self, event: RosterEvent) {
        self.router.handle(event).await;
    }

    async fn list(&self, name: &str) -> Arc<Channel> {
        let (channel, _) = self
            .connection
            .ensure_channel(&ChannelRequest::contact_list(name), false)
            .await
            .unwrap();
        channel
    }

    async fn group(&self, name: &str) -> Arc<Channel> {
        let (channel, _) = self
            .connection
            .ensure_channel(&ChannelRequest::group(name), false)
            .await
            .unwrap();
        channel
    }

    fn contact(&self, address: &str) -> HandleId {
        self.connection
            .handles()
            .lookup(HandleKind::Contact, address)
            .unwrap()
            .id()
    }
}

fn next_change(events: &mut broadcast::Receiver<ChannelEvent>) -> MembershipChange {
    loop {
        match events.try_recv() {
            Ok(ChannelEvent::MembersChanged { change, .. }) => return change,
            Ok(_) => continue,
            Err(err) => panic!("no membership change: {:?}", err),
        }
    }
}

fn group_members(connection: &Connection) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = connection
        .group_channels()
        .into_iter()
        .map(|channel| {
            (
                channel.target_id(),
                channel.as_list().unwrap().member_names(),
            )
        })
        .collect();
    groups.sort();
    groups
}

#[tokio::test]
async fn invitation_then_acceptance_on_publish() {
    let harness = Harness::active(Vec::new()).await;
    let publish = harness.list("publish").await;
    let mut events = publish.subscribe();

    harness.service.upsert(
        RosterEntity::buddy("p@mxit", "Pat")
            .with_subscription(SubscriptionState::Pending)
            .with_presence(Presence::Pending),
    );
    harness
        .send(RosterEvent::BuddyAdded {
            address: "p@mxit".into(),
        })
        .await;

    let id = harness.contact("p@mxit");
    let change = next_change(&mut events);
    assert!(change.added.is_empty());
    assert_eq!(change.local_pending.into_iter().collect::<Vec<_>>(), vec![id]);
    assert_eq!(change.reason, ChangeReason::Invited);

    harness.service.modify("p@mxit", |buddy| {
        buddy.subscription = SubscriptionState::Subscribed;
        buddy.presence = Presence::Available;
    });
    harness
        .send(RosterEvent::BuddyUpdated {
            address: "p@mxit".into(),
            attrs: vec![BuddyAttr::Subscription, BuddyAttr::Presence],
        })
        .await;

    let change = next_change(&mut events);
    assert_eq!(change.added.into_iter().collect::<Vec<_>>(), vec![id]);
    assert!(change.local_pending.is_empty());
    assert_eq!(change.reason, ChangeReason::None);
    assert_eq!(change.transitions[0].from, Some(Placement::LocalPending));
    assert_eq!(change.transitions[0].to, Some(Placement::Member));

    // The same roster state again changes nothing.
    harness
        .send(RosterEvent::BuddyUpdated {
            address: "p@mxit".into(),
            attrs: vec![BuddyAttr::Subscription],
        })
        .await;
    assert!(events.try_recv().is_err());
    assert_eq!(publish.as_list().unwrap().members().len(), 1);
}

#[tokio::test]
async fn group_reassignment_moves_between_channels() {
    let harness =
        Harness::active(vec![RosterEntity::buddy("a@mxit", "Alice").in_group("Friends")]).await;
    let friends = harness.group("Friends").await;
    let work = harness.group("Work").await;
    let mut friends_events = friends.subscribe();
    let mut work_events = work.subscribe();

    harness
        .service
        .modify("a@mxit", |buddy| buddy.group = Some("Work".into()));
    harness
        .send(RosterEvent::BuddyUpdated {
            address: "a@mxit".into(),
            attrs: vec![BuddyAttr::Group],
        })
        .await;

    let id = harness.contact("a@mxit");
    let left = next_change(&mut friends_events);
    assert_eq!(left.removed.into_iter().collect::<Vec<_>>(), vec![id]);
    assert!(left.added.is_empty());

    let joined = next_change(&mut work_events);
    assert_eq!(joined.added.into_iter().collect::<Vec<_>>(), vec![id]);
    assert!(joined.removed.is_empty());

    assert_eq!(
        group_members(&harness.connection),
        vec![
            ("Friends".to_string(), vec![]),
            ("Work".to_string(), vec!["a@mxit".to_string()]),
        ]
    );
}

#[tokio::test]
async fn group_round_trip_leaves_one_group() {
    let harness = Harness::active(Vec::new()).await;
    harness.service.upsert(RosterEntity::buddy("b@mxit", "Bea"));
    harness
        .send(RosterEvent::BuddyAdded {
            address: "b@mxit".into(),
        })
        .await;
    assert!(harness.connection.group_channels().is_empty());

    for group in ["G", "H"] {
        harness
            .service
            .modify("b@mxit", |buddy| buddy.group = Some(group.into()));
        harness
            .send(RosterEvent::BuddyUpdated {
                address: "b@mxit".into(),
                attrs: vec![BuddyAttr::Group],
            })
            .await;
    }

    let groups = group_members(&harness.connection);
    assert_eq!(
        groups,
        vec![
            ("G".to_string(), vec![]),
            ("H".to_string(), vec!["b@mxit".to_string()]),
        ]
    );
    let holding = groups
        .iter()
        .filter(|(_, members)| members.contains(&"b@mxit".to_string()))
        .count();
    assert_eq!(holding, 1);

    // Back to the root group: no group channel holds the buddy.
    harness.service.modify("b@mxit", |buddy| buddy.group = None);
    harness
        .send(RosterEvent::BuddyUpdated {
            address: "b@mxit".into(),
            attrs: vec![BuddyAttr::Group],
        })
        .await;
    assert!(group_members(&harness.connection)
        .iter()
        .all(|(_, members)| members.is_empty()));
}

#[tokio::test]
async fn removal_is_idempotent() {
    let harness = Harness::active(vec![RosterEntity::buddy("a@mxit", "Alice")]).await;
    let subscribe = harness.list("subscribe").await;
    let id = harness.contact("a@mxit");
    let mut events = subscribe.subscribe();

    harness.service.remove("a@mxit");
    for _ in 0..2 {
        harness
            .send(RosterEvent::BuddyRemoved {
                address: "a@mxit".into(),
            })
            .await;
    }
    let change = next_change(&mut events);
    assert_eq!(change.removed.into_iter().collect::<Vec<_>>(), vec![id]);
    assert!(events.try_recv().is_err());
    assert!(!subscribe.as_list().unwrap().contains(id));
}

#[tokio::test]
async fn disconnect_closes_each_channel_once() {
    let harness = Harness::active(vec![RosterEntity::buddy("a@mxit", "Alice").in_group("Friends")]).await;
    let friends = harness.group("Friends").await;
    let (text, _) = harness
        .connection
        .ensure_channel(&ChannelRequest::text("a@mxit"), false)
        .await
        .unwrap();
    let live = harness.connection.channels().len();
    assert_eq!(live, 4);

    let mut connection_events = harness.connection.subscribe();
    let mut friends_events = friends.subscribe();
    harness.status(ServiceStatus::Disconnected).await;
    harness.status(ServiceStatus::Disconnected).await;

    let mut closed = Vec::new();
    while let Ok(event) = connection_events.try_recv() {
        if let ConnectionEvent::ChannelClosed { channel } = event {
            closed.push(channel);
        }
    }
    closed.sort();
    closed.dedup();
    assert_eq!(closed.len(), live);
    assert_eq!(friends_events.try_recv().unwrap(), ChannelEvent::Closed);
    assert!(friends_events.try_recv().is_err());
    assert!(friends.is_closed() && text.is_closed());

    // Reconnect: the same keys produce fresh channels.
    harness.status(ServiceStatus::Connecting).await;
    harness.status(ServiceStatus::Active).await;
    let (again, created) = harness
        .connection
        .ensure_channel(&ChannelRequest::group("Friends"), false)
        .await
        .unwrap();
    assert!(created);
    assert!(!Arc::ptr_eq(&again, &friends));
    assert!(again.id() > friends.id());
    assert_eq!(again.as_list().unwrap().member_names(), vec!["a@mxit"]);
}

#[tokio::test]
async fn events_after_disconnect_are_dropped() {
    let harness = Harness::active(Vec::new()).await;
    harness.status(ServiceStatus::Disconnected).await;

    harness.service.upsert(RosterEntity::buddy("late@mxit", "Late"));
    harness
        .send(RosterEvent::BuddyAdded {
            address: "late@mxit".into(),
        })
        .await;
    harness
        .send(RosterEvent::MessageReceived {
            from: "late@mxit".into(),
            body: "anyone?".into(),
        })
        .await;

    assert!(harness.connection.channels().is_empty());
    assert!(harness
        .connection
        .handles()
        .lookup(HandleKind::Contact, "late@mxit")
        .is_none());
}

#[tokio::test]
async fn connect_through_the_event_queue() {
    let service = Arc::new(
        InMemoryService::new("me@mxit").with_roster([RosterEntity::buddy("a@mxit", "Alice")]),
    );
    let connection =
        Arc::new(Connection::new(MixerConfig::for_account("me@mxit"), service.clone()).unwrap());
    let (tx, rx) = mpsc::channel(connection.config().runtime.event_queue_capacity);
    service.attach_events(tx);
    let router = RosterEventRouter::new(connection.clone()).spawn(rx);

    let mut events = connection.subscribe();
    connection.connect().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(ConnectionEvent::StatusChanged {
                status: ConnectionStatus::Active,
                ..
            }) = events.recv().await
            {
                break;
            }
        }
    })
    .await
    .unwrap();

    let lists = connection.channels().list_by_kind(ChannelKind::ContactList);
    assert_eq!(lists.len(), 2);
    for list in &lists {
        list.as_list().unwrap().wait_populated().await;
    }

    connection.disconnect().await.unwrap();
    assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    assert!(connection.channels().is_empty());

    // Dropping the last sender stops the router.
    service.attach_events(mpsc::channel(1).0);
    tokio::time::timeout(Duration::from_secs(5), router)
        .await
        .unwrap()
        .unwrap();
}
