//! Entity identifiers and per-entity bookkeeping.
//!
//! An [`Entity`] is a [`Handle`] minted by the scene's own handle pool. It does
//! not address component storage directly: its index selects an
//! [`EntityNode`] in the scene's entity table, and the node records which pool
//! and slot currently hold the entity's components.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::archetype::Archetype;
use crate::handle::Handle;
use crate::pool::PoolId;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A generational entity identifier. Safe to hold across frames: once the
/// entity is removed, [`Scene::is_alive`](crate::scene::Scene::is_alive)
/// reports `false` even if its index is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity(Handle);

impl Entity {
    #[inline]
    pub(crate) fn from_handle(handle: Handle) -> Self {
        Self(handle)
    }

    /// The underlying handle.
    #[inline]
    pub fn handle(self) -> Handle {
        self.0
    }

    /// Index into the scene's entity table.
    #[inline]
    pub fn index(self) -> u32 {
        self.0.index()
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.0.generation()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// ---------------------------------------------------------------------------
// EntityNode
// ---------------------------------------------------------------------------

/// Bookkeeping row for one live entity, addressed by entity index.
#[derive(Debug, Clone)]
pub struct EntityNode {
    pub(crate) entity: Entity,
    pub(crate) archetype: Archetype,
    pub(crate) pool: PoolId,
    /// Valid only while `pool` is the entity's current pool.
    pub(crate) slot: Handle,
    pub(crate) parent: Option<Entity>,
    /// Ordered, duplicate-free.
    pub(crate) children: Vec<Entity>,
    pub(crate) dirty: bool,
}

impl EntityNode {
    pub(crate) fn new(entity: Entity, archetype: Archetype, pool: PoolId, slot: Handle) -> Self {
        Self {
            entity,
            archetype,
            pool,
            slot,
            parent: None,
            children: Vec::new(),
            dirty: false,
        }
    }

    #[inline]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    #[inline]
    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    #[inline]
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    #[inline]
    pub fn slot(&self) -> Handle {
        self.slot
    }

    #[inline]
    pub fn parent(&self) -> Option<Entity> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[Entity] {
        &self.children
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Append `child` unless already present. Returns whether it was added.
    pub(crate) fn add_child(&mut self, child: Entity) -> bool {
        if self.children.contains(&child) {
            return false;
        }
        self.children.push(child);
        true
    }

    /// Remove `child`, keeping the order of the rest. Returns whether it was
    /// present.
    pub(crate) fn remove_child(&mut self, child: Entity) -> bool {
        match self.children.iter().position(|c| *c == child) {
            Some(pos) => {
                self.children.remove(pos);
                true
            }
            None => false,
        }
    }
}
