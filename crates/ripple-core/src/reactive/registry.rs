#![forbid(unsafe_code)]

//! Callback and dependency registries.
//!
//! Both registries are multimaps keyed by [`Signature`]. Entries for one key
//! keep their insertion order. Every entry gets a handle that is never
//! reused, so removing through a stale handle is a harmless `false` rather
//! than a removal of whatever entry took its slot.

use ahash::AHashMap;
use smallvec::SmallVec;

use super::poly_fun::PolyFun;
use super::signature::Signature;
use crate::error::{Error, Result};

/// Handle to one registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Handle to one registered child -> parent dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyId(u64);

impl DependencyId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// Multimap from field signature to the callbacks observing it.
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    by_field: AHashMap<Signature, SmallVec<[(CallbackId, PolyFun); 2]>>,
    owners: AHashMap<CallbackId, Signature>,
    next_id: u64,
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for `signature`, after any callbacks already there.
    pub fn insert(&mut self, signature: Signature, callback: PolyFun) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        self.owners.insert(id, signature.clone());
        self.by_field.entry(signature).or_default().push((id, callback));
        id
    }

    /// Removes every callback registered for `signature`. Returns how many.
    pub fn remove_key(&mut self, signature: &Signature) -> usize {
        let Some(entries) = self.by_field.remove(signature) else {
            return 0;
        };
        for (id, _) in &entries {
            self.owners.remove(id);
        }
        entries.len()
    }

    /// Removes one callback. Returns `false` if the handle is stale.
    pub fn remove(&mut self, id: CallbackId) -> bool {
        let Some(signature) = self.owners.remove(&id) else {
            return false;
        };
        if let Some(entries) = self.by_field.get_mut(&signature) {
            entries.retain(|(entry, _)| *entry != id);
            if entries.is_empty() {
                self.by_field.remove(&signature);
            }
        }
        true
    }

    /// Callbacks for `signature`, in registration order.
    pub fn callbacks(&self, signature: &Signature) -> impl Iterator<Item = &PolyFun> {
        self.by_field
            .get(signature)
            .into_iter()
            .flat_map(|entries| entries.iter().map(|(_, callback)| callback))
    }

    #[must_use]
    pub fn count_for(&self, signature: &Signature) -> usize {
        self.by_field.get(signature).map_or(0, SmallVec::len)
    }

    #[must_use]
    pub fn contains(&self, id: CallbackId) -> bool {
        self.owners.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Drops every callback whose field root no longer exists.
    pub fn retain_alive(&mut self) -> usize {
        let dead: Vec<Signature> = self
            .by_field
            .keys()
            .filter(|signature| !signature.is_alive())
            .cloned()
            .collect();
        dead.iter().map(|signature| self.remove_key(signature)).sum()
    }
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// Multimap from child signature to the parents notified after it changes.
///
/// Cycles are allowed; the propagation walk is what bounds them.
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    by_child: AHashMap<Signature, SmallVec<[(DependencyId, Signature); 2]>>,
    children: AHashMap<DependencyId, Signature>,
    next_id: u64,
}

impl DependencyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `child -> parent`.
    ///
    /// An identical pair already present returns its existing handle.
    ///
    /// # Errors
    ///
    /// [`Error::SelfDependency`] if `child` and `parent` are the same field.
    pub fn insert(&mut self, child: Signature, parent: Signature) -> Result<DependencyId> {
        if child == parent {
            return Err(Error::SelfDependency {
                type_name: child.type_name(),
            });
        }
        if let Some((existing, _)) = self
            .by_child
            .get(&child)
            .and_then(|parents| parents.iter().find(|(_, p)| *p == parent))
        {
            return Ok(*existing);
        }

        let id = DependencyId(self.next_id);
        self.next_id += 1;
        self.children.insert(id, child.clone());
        self.by_child.entry(child).or_default().push((id, parent));
        Ok(id)
    }

    /// Removes every dependency whose child is `child`. Returns how many.
    pub fn remove_key(&mut self, child: &Signature) -> usize {
        let Some(entries) = self.by_child.remove(child) else {
            return 0;
        };
        for (id, _) in &entries {
            self.children.remove(id);
        }
        entries.len()
    }

    /// Removes one dependency. Returns `false` if the handle is stale.
    pub fn remove(&mut self, id: DependencyId) -> bool {
        let Some(child) = self.children.remove(&id) else {
            return false;
        };
        if let Some(entries) = self.by_child.get_mut(&child) {
            entries.retain(|(entry, _)| *entry != id);
            if entries.is_empty() {
                self.by_child.remove(&child);
            }
        }
        true
    }

    /// Parents of `child`, in registration order.
    pub fn parents(&self, child: &Signature) -> impl Iterator<Item = &Signature> {
        self.by_child
            .get(child)
            .into_iter()
            .flat_map(|entries| entries.iter().map(|(_, parent)| parent))
    }

    #[must_use]
    pub fn contains(&self, id: DependencyId) -> bool {
        self.children.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Drops every dependency with a dead child or a dead parent.
    pub fn retain_alive(&mut self) -> usize {
        let dead: Vec<DependencyId> = self
            .by_child
            .iter()
            .flat_map(|(child, parents)| {
                let child_dead = !child.is_alive();
                parents
                    .iter()
                    .filter(move |(_, parent)| child_dead || !parent.is_alive())
                    .map(|(id, _)| *id)
            })
            .collect();
        dead.into_iter().filter(|id| self.remove(*id)).count()
    }
}
