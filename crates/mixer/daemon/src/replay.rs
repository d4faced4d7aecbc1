//! Roster replay
//!
//! Feeds a recorded roster and event script through a connection backed by
//! the in-memory service, then reports the state of every open channel.
//!
//! A script is a JSON array. Each entry is either a bare roster event or a
//! step that edits the roster before its event is delivered:
//!
//! ```json
//! [
//!   {"upsert": [{"address": "p@mxit", "name": "Pat", "subscription": "pending"}],
//!    "event": {"event": "buddy_added", "address": "p@mxit"}},
//!   {"event": "message_received", "from": "p@mxit", "body": "hi"}
//! ]
//! ```

use crate::error::DaemonResult;
use mixer_runtime::{
    ChannelRequest, ChannelSnapshot, Connection, InMemoryService, MixerConfig, RosterEventRouter,
    ServiceAdapter,
};
use mixer_types::{RosterEntity, RosterEvent, ServiceStatus, StatusReason};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One entry of a replay script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScriptEntry {
    Step {
        #[serde(default)]
        upsert: Vec<RosterEntity>,
        #[serde(default)]
        remove: Vec<String>,
        #[serde(default)]
        event: Option<RosterEvent>,
    },
    Event(RosterEvent),
}

pub fn load_roster(path: impl AsRef<Path>) -> DaemonResult<Vec<RosterEntity>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn load_script(path: impl AsRef<Path>) -> DaemonResult<Vec<ScriptEntry>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Drives one connection through a script, event by event.
pub struct Replay {
    service: Arc<InMemoryService>,
    router: RosterEventRouter,
    open_groups: bool,
}

impl Replay {
    pub fn new(config: MixerConfig, roster: Vec<RosterEntity>) -> DaemonResult<Self> {
        let service = Arc::new(
            InMemoryService::new(config.account.account.clone()).with_roster(roster),
        );
        let connection = Arc::new(Connection::new(config, service.clone())?);
        Ok(Self {
            service,
            router: RosterEventRouter::new(connection),
            open_groups: true,
        })
    }

    /// Whether to request a group channel per roster group once active.
    pub fn open_groups(mut self, open: bool) -> Self {
        self.open_groups = open;
        self
    }

    pub fn connection(&self) -> &Arc<Connection> {
        self.router.connection()
    }

    pub fn service(&self) -> &Arc<InMemoryService> {
        &self.service
    }

    /// Bring the connection up the way the service would on login.
    pub async fn start(&self) -> DaemonResult<()> {
        for status in [ServiceStatus::Connecting, ServiceStatus::Active] {
            self.router
                .handle(RosterEvent::StatusChanged {
                    status,
                    reason: StatusReason::Requested,
                })
                .await;
        }
        if self.open_groups {
            self.open_roster_groups().await?;
        }
        Ok(())
    }

    async fn open_roster_groups(&self) -> DaemonResult<()> {
        let groups: BTreeSet<String> = self
            .service
            .all_buddies()
            .into_iter()
            .filter_map(|buddy| buddy.group)
            .filter(|group| !group.is_empty())
            .collect();
        for group in groups {
            debug!(group = %group, "Opening roster group");
            self.connection()
                .ensure_channel(&ChannelRequest::group(&group), false)
                .await?;
        }
        Ok(())
    }

    pub async fn apply(&self, entry: ScriptEntry) {
        let event = match entry {
            ScriptEntry::Step {
                upsert,
                remove,
                event,
            } => {
                for entity in upsert {
                    self.service.upsert(entity);
                }
                for address in remove {
                    if self.service.remove(&address).is_none() {
                        warn!(address = %address, "Replay removes an unknown entity");
                    }
                }
                event
            }
            ScriptEntry::Event(event) => Some(event),
        };
        if let Some(event) = event {
            debug!(event = event.name(), "Replaying event");
            self.router.handle(event).await;
        }
    }

    /// Run the whole script and snapshot the channels left open, in
    /// creation order. A script that opens with a status change drives the
    /// connection itself; otherwise it is started first.
    pub async fn run(self, script: Vec<ScriptEntry>) -> DaemonResult<Vec<ChannelSnapshot>> {
        let drives_status = matches!(
            script.first(),
            Some(ScriptEntry::Event(RosterEvent::StatusChanged { .. }))
        );
        if !drives_status {
            self.start().await?;
        }

        let steps = script.len();
        for entry in script {
            self.apply(entry).await;
        }

        let snapshots = self.snapshots();
        info!(steps = steps, channels = snapshots.len(), "Replay finished");
        Ok(snapshots)
    }

    pub fn snapshots(&self) -> Vec<ChannelSnapshot> {
        let mut snapshots: Vec<ChannelSnapshot> = self
            .connection()
            .channels()
            .list_all()
            .iter()
            .map(|channel| channel.snapshot())
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.id);
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixer_types::{ChannelKind, ConnectionStatus};

    fn roster() -> Vec<RosterEntity> {
        vec![RosterEntity::buddy("a@mxit", "Alice").in_group("Friends")]
    }

    fn find<'a>(
        snapshots: &'a [ChannelSnapshot],
        kind: ChannelKind,
        target: &str,
    ) -> &'a ChannelSnapshot {
        snapshots
            .iter()
            .find(|snapshot| snapshot.kind == kind && snapshot.target_id == target)
            .unwrap()
    }

    #[test]
    fn test_script_entries_parse() {
        let script: Vec<ScriptEntry> = serde_json::from_str(
            r#"[
                {"event": "buddy_removed", "address": "a@mxit"},
                {"upsert": [{"address": "p@mxit", "name": "Pat"}],
                 "event": {"event": "buddy_added", "address": "p@mxit"}},
                {"remove": ["p@mxit"]}
            ]"#,
        )
        .unwrap();

        assert_eq!(
            script[0],
            ScriptEntry::Event(RosterEvent::BuddyRemoved {
                address: "a@mxit".into()
            })
        );
        assert!(matches!(
            &script[1],
            ScriptEntry::Step { upsert, event: Some(RosterEvent::BuddyAdded { .. }), .. }
                if upsert.len() == 1
        ));
        assert!(matches!(
            &script[2],
            ScriptEntry::Step { remove, event: None, .. } if remove == &vec!["p@mxit".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_replay_reports_channels() {
        let script: Vec<ScriptEntry> = serde_json::from_str(
            r#"[
                {"upsert": [{"address": "p@mxit", "name": "Pat",
                             "subscription": "pending", "presence": "pending"}],
                 "event": {"event": "buddy_added", "address": "p@mxit"}},
                {"upsert": [{"address": "a@mxit", "name": "Alice", "group": "Work",
                             "subscription": "subscribed"}],
                 "event": {"event": "buddy_updated", "address": "a@mxit", "attrs": ["group"]}},
                {"event": "message_received", "from": "a@mxit", "body": "hi"}
            ]"#,
        )
        .unwrap();

        let replay = Replay::new(MixerConfig::for_account("me@mxit"), roster()).unwrap();
        let snapshots = replay.run(script).await.unwrap();

        let publish = find(&snapshots, ChannelKind::ContactList, "publish");
        assert_eq!(publish.local_pending, vec!["p@mxit"]);

        assert!(find(&snapshots, ChannelKind::Group, "Friends").members.is_empty());
        assert_eq!(
            find(&snapshots, ChannelKind::Group, "Work").members,
            vec!["a@mxit"]
        );
        assert_eq!(
            find(&snapshots, ChannelKind::Text, "a@mxit").pending_messages,
            vec!["hi"]
        );

        let ids: Vec<_> = snapshots.iter().map(|snapshot| snapshot.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn test_script_may_drive_status() {
        let script: Vec<ScriptEntry> = serde_json::from_str(
            r#"[
                {"event": "status_changed", "status": "connecting"},
                {"event": "status_changed", "status": "active"},
                {"event": "status_changed", "status": "disconnected", "reason": "network_error"}
            ]"#,
        )
        .unwrap();

        let replay = Replay::new(MixerConfig::for_account("me@mxit"), roster()).unwrap();
        let connection = replay.connection().clone();
        let snapshots = replay.run(script).await.unwrap();
        assert!(snapshots.is_empty());
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    }
}
