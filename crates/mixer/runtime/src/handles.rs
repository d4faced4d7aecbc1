//! Handle interning
//!
//! The registry hands out one [`Handle`] per (kind, natural key) for as long
//! as something holds it. Liveness is plain `Arc` ownership: channels hold
//! their target, membership state holds every placed handle, external
//! clients hold what they requested, and the registry pins the none and
//! self handles. The maps themselves only keep `Weak` references, so a
//! handle nobody holds is gone the moment its last `Arc` drops; the dead
//! slot is purged lazily by [`HandleRegistry::sweep`] or by the next
//! [`HandleRegistry::intern`] of the same key.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mixer_types::{
    ClientId, HandleId, HandleKind, HandleRef, HandleType, MixerError, MixerResult,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// An addressable entity as the outer object model sees it.
pub struct Handle {
    id: HandleId,
    kind: HandleKind,
    key: String,
    display_name: RwLock<String>,
}

impl Handle {
    fn new(id: HandleId, kind: HandleKind, key: String, display_name: String) -> Self {
        Self {
            id,
            kind,
            key,
            display_name: RwLock::new(display_name),
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Natural key: address, list name or group name. Empty for none/self.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn handle_type(&self) -> HandleType {
        self.kind.handle_type()
    }

    pub fn display_name(&self) -> String {
        self.display_name.read().clone()
    }

    pub fn set_display_name(&self, name: impl Into<String>) {
        *self.display_name.write() = name.into();
    }

    /// Name announced to external callers. The self handle answers with the
    /// account it belongs to.
    pub fn target_id(&self) -> String {
        match self.kind {
            HandleKind::SelfHandle => self.display_name(),
            _ => self.key.clone(),
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("key", &self.key)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HandleKey {
    kind: HandleKind,
    key: String,
}

struct Slot {
    id: HandleId,
    handle: Weak<Handle>,
}

/// Per-connection handle registry.
pub struct HandleRegistry {
    by_key: DashMap<HandleKey, Slot>,
    by_id: DashMap<HandleId, Weak<Handle>>,
    next_id: AtomicU32,
    none: Arc<Handle>,
    self_handle: Arc<Handle>,
    clients: DashMap<ClientId, HashMap<HandleId, Arc<Handle>>>,
}

impl HandleRegistry {
    /// Create a registry whose self handle displays as `account`.
    pub fn new(account: impl Into<String>) -> Self {
        let none = Arc::new(Handle::new(
            HandleId::NONE,
            HandleKind::None,
            String::new(),
            String::new(),
        ));
        let self_handle = Arc::new(Handle::new(
            HandleId(1),
            HandleKind::SelfHandle,
            String::new(),
            account.into(),
        ));

        let by_id = DashMap::new();
        by_id.insert(none.id, Arc::downgrade(&none));
        by_id.insert(self_handle.id, Arc::downgrade(&self_handle));

        Self {
            by_key: DashMap::new(),
            by_id,
            next_id: AtomicU32::new(2),
            none,
            self_handle,
            clients: DashMap::new(),
        }
    }

    pub fn none_handle(&self) -> Arc<Handle> {
        self.none.clone()
    }

    pub fn self_handle(&self) -> Arc<Handle> {
        self.self_handle.clone()
    }

    /// Issue the next numeric id. Ids are never reused within a connection.
    pub fn next_numeric_id(&self) -> HandleId {
        HandleId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Return the live handle for (kind, key), creating it if needed.
    pub fn intern(&self, kind: HandleKind, key: &str) -> MixerResult<Arc<Handle>> {
        match kind {
            HandleKind::None => return Ok(self.none.clone()),
            HandleKind::SelfHandle => return Ok(self.self_handle.clone()),
            _ => {}
        }
        if key.is_empty() {
            return Err(MixerError::empty_key(kind));
        }

        let handle_key = HandleKey {
            kind,
            key: key.to_string(),
        };
        match self.by_key.entry(handle_key) {
            Entry::Occupied(mut entry) => {
                if let Some(handle) = entry.get().handle.upgrade() {
                    return Ok(handle);
                }
                let stale = entry.get().id;
                self.by_id.remove(&stale);
                let handle = self.create(kind, key);
                entry.insert(Slot {
                    id: handle.id,
                    handle: Arc::downgrade(&handle),
                });
                debug!(handle = %handle.id, stale = %stale, kind = %kind, key, "Re-interned handle");
                Ok(handle)
            }
            Entry::Vacant(entry) => {
                let handle = self.create(kind, key);
                entry.insert(Slot {
                    id: handle.id,
                    handle: Arc::downgrade(&handle),
                });
                debug!(handle = %handle.id, kind = %kind, key, "Interned handle");
                Ok(handle)
            }
        }
    }

    fn create(&self, kind: HandleKind, key: &str) -> Arc<Handle> {
        let id = self.next_numeric_id();
        let handle = Arc::new(Handle::new(id, kind, key.to_string(), key.to_string()));
        self.by_id.insert(id, Arc::downgrade(&handle));
        handle
    }

    /// The live handle for (kind, key), without creating one.
    pub fn lookup(&self, kind: HandleKind, key: &str) -> Option<Arc<Handle>> {
        match kind {
            HandleKind::None => Some(self.none.clone()),
            HandleKind::SelfHandle => Some(self.self_handle.clone()),
            _ => {
                let handle_key = HandleKey {
                    kind,
                    key: key.to_string(),
                };
                self.by_key
                    .get(&handle_key)
                    .and_then(|slot| slot.handle.upgrade())
            }
        }
    }

    pub fn resolve(&self, id: HandleId) -> MixerResult<Arc<Handle>> {
        self.by_id
            .get(&id)
            .and_then(|weak| weak.upgrade())
            .ok_or_else(|| MixerError::NotAvailable(format!("handle {} is not valid", id)))
    }

    /// Resolve a handle named by id or natural key, checking its type.
    pub fn resolve_ref(&self, handle_type: HandleType, handle: &HandleRef) -> MixerResult<Arc<Handle>> {
        match handle {
            HandleRef::Id(id) => {
                let resolved = self.resolve(*id)?;
                if resolved.handle_type() != handle_type {
                    return Err(MixerError::NotAvailable(format!(
                        "handle {} is not of type {:?}",
                        id, handle_type
                    )));
                }
                Ok(resolved)
            }
            HandleRef::Name(name) => {
                if handle_type == HandleType::None {
                    return Err(MixerError::NotAvailable(format!(
                        "cannot name a handle of type {:?}",
                        handle_type
                    )));
                }
                self.intern(HandleKind::for_type(handle_type), name)
            }
        }
    }

    /// Intern each key and register the client's interest in it.
    pub fn request(
        &self,
        client: &ClientId,
        handle_type: HandleType,
        keys: &[String],
    ) -> MixerResult<Vec<HandleId>> {
        if handle_type == HandleType::None {
            return Err(MixerError::NotAvailable("cannot request none handles".into()));
        }
        let kind = HandleKind::for_type(handle_type);
        let handles = keys
            .iter()
            .map(|key| self.intern(kind, key))
            .collect::<MixerResult<Vec<_>>>()?;
        Ok(handles.iter().map(|handle| self.hold(client, handle)).collect())
    }

    /// Keep `handle` alive on behalf of `client`.
    pub fn hold(&self, client: &ClientId, handle: &Arc<Handle>) -> HandleId {
        self.clients
            .entry(client.clone())
            .or_default()
            .insert(handle.id, handle.clone());
        handle.id
    }

    /// Drop a client's hold on `id`.
    pub fn release(&self, client: &ClientId, id: HandleId) -> MixerResult<()> {
        let mut held = self
            .clients
            .get_mut(client)
            .ok_or_else(|| MixerError::NotAvailable(format!("{} holds no handles", client)))?;
        if held.remove(&id).is_none() {
            return Err(MixerError::NotAvailable(format!(
                "{} does not hold handle {}",
                client, id
            )));
        }
        let empty = held.is_empty();
        drop(held);
        if empty {
            self.clients.remove_if(client, |_, held| held.is_empty());
        }
        self.sweep();
        Ok(())
    }

    /// Drop every hold a client has, e.g. when it leaves the bus.
    pub fn release_client(&self, client: &ClientId) -> usize {
        let released = self
            .clients
            .remove(client)
            .map(|(_, held)| held.len())
            .unwrap_or(0);
        if released > 0 {
            self.sweep();
        }
        released
    }

    pub fn holds(&self, client: &ClientId, id: HandleId) -> bool {
        self.clients
            .get(client)
            .map(|held| held.contains_key(&id))
            .unwrap_or(false)
    }

    /// Names for a batch of ids, all of which must be of `handle_type`.
    pub fn inspect(&self, handle_type: HandleType, ids: &[HandleId]) -> MixerResult<Vec<String>> {
        ids.iter()
            .map(|id| {
                let handle = self.resolve_ref(handle_type, &HandleRef::Id(*id))?;
                Ok(handle.target_id())
            })
            .collect()
    }

    /// Purge slots whose handle has been dropped. Returns how many went.
    pub fn sweep(&self) -> usize {
        let before = self.by_id.len();
        self.by_key.retain(|_, slot| slot.handle.strong_count() > 0);
        self.by_id.retain(|_, weak| weak.strong_count() > 0);
        let purged = before - self.by_id.len();
        if purged > 0 {
            debug!(purged, "Swept dead handles");
        }
        purged
    }

    /// Number of handles currently alive, none and self included.
    pub fn live_count(&self) -> usize {
        self.by_id
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    /// Forget everything except the none and self handles. The id counter
    /// keeps running so ids handed out before teardown are never reissued.
    pub fn teardown(&self) {
        self.clients.clear();
        self.by_key.clear();
        let none = self.none.id;
        let self_id = self.self_handle.id;
        self.by_id.retain(|id, _| *id == none || *id == self_id);
        debug!("Handle registry torn down");
    }
}
