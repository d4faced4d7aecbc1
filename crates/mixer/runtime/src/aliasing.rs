//! Aliasing: contact display names

use crate::connection::{Connection, ConnectionEvent};
use mixer_types::{BuddyUpdate, HandleId, HandleKind, HandleRef, HandleType, MixerResult};
use std::collections::BTreeMap;
use tracing::{debug, info};

impl Connection {
    /// Roster names for contacts, falling back to the address.
    pub fn request_aliases(&self, ids: &[HandleId]) -> MixerResult<Vec<String>> {
        ids.iter()
            .map(|id| {
                let handle = self.handles().resolve_ref(HandleType::Contact, &HandleRef::Id(*id))?;
                let alias = self
                    .entity_for(&handle)
                    .map(|entity| entity.name)
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| handle.target_id());
                Ok(alias)
            })
            .collect()
    }

    /// Rename buddies on the service. The new names come back as roster
    /// updates.
    pub async fn set_aliases(&self, aliases: &BTreeMap<HandleId, String>) -> MixerResult<()> {
        self.check_connected()?;
        for (id, alias) in aliases {
            let handle = self.handles().resolve_ref(HandleType::Contact, &HandleRef::Id(*id))?;
            if handle.kind() == HandleKind::SelfHandle {
                info!(alias = %alias, "Self alias changes are not supported");
                continue;
            }
            info!(handle = %handle.id(), alias = %alias, "Renaming contact");
            self.service()
                .update_buddy(handle.key(), BuddyUpdate::rename(alias.clone()))
                .await?;
        }
        Ok(())
    }

    /// The roster renamed a buddy.
    pub(crate) fn alias_changed(&self, address: &str) {
        let Some(entity) = self.service().get_entity(address) else {
            debug!(address = %address, "Alias change for an unknown entity");
            return;
        };
        let Some(handle) = self.handles().lookup(HandleKind::Contact, address) else {
            debug!(address = %address, "Alias for a contact nobody references");
            return;
        };
        handle.set_display_name(entity.name.clone());
        self.emit(ConnectionEvent::AliasesChanged {
            aliases: vec![(handle.id(), entity.name)],
        });
    }
}
