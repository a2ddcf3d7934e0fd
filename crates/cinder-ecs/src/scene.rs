//! The [`Scene`] is the top-level container. It owns the kind table, one
//! [`ComponentPool`] per archetype seen so far, the entity handle pool and the
//! entity table with its parent/child links.
//!
//! Hierarchy maintenance lives in [`hierarchy`](crate::hierarchy), queries in
//! [`query`](crate::query) and the per-frame system runner in
//! [`system`](crate::system); they all extend `Scene` with further `impl`
//! blocks.

use std::any::type_name;
use std::collections::HashMap;

use serde::Serialize;

use crate::archetype::Archetype;
use crate::component::{Component, ComponentKind, KindTable};
use crate::config::SceneConfig;
use crate::entity::{Entity, EntityNode};
use crate::handle::HandlePool;
use crate::pool::{ComponentPool, PoolId};
use crate::system::Schedule;
use crate::SceneError;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Occupancy of one pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub id: PoolId,
    /// Component names, in bit order.
    pub components: Vec<String>,
    pub len: usize,
    pub capacity: usize,
    pub stride: usize,
}

/// A serializable snapshot of scene occupancy for debugging tools.
#[derive(Debug, Clone, Serialize)]
pub struct SceneStats {
    pub entity_count: usize,
    pub pool_count: usize,
    pub empty_pool_count: usize,
    pub pools: Vec<PoolStats>,
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

/// Entity/component storage with a parent/child hierarchy.
///
/// Single-threaded: every operation takes `&self` or `&mut self` and none of
/// them blocks. References returned by component accessors borrow the scene,
/// so they cannot outlive the next structural change.
pub struct Scene {
    pub(crate) kinds: KindTable,
    config: SceneConfig,
    /// All pools, indexed by `PoolId.0`, in creation order. Never shrinks.
    pub(crate) pools: Vec<ComponentPool>,
    /// Exactly one pool per archetype.
    pool_index: HashMap<Archetype, PoolId>,
    /// Entity handle allocator.
    entities: HandlePool,
    /// Indexed by entity index; `None` for free indices.
    pub(crate) nodes: Vec<Option<EntityNode>>,
    pub(crate) schedule: Schedule,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("entity_count", &self.entity_count())
            .field("pool_count", &self.pools.len())
            .field("system_count", &self.schedule.len())
            .finish()
    }
}

impl Scene {
    /// Create an empty scene with the default configuration.
    pub fn new(kinds: KindTable) -> Self {
        Self::with_config(kinds, SceneConfig::default())
    }

    /// Create an empty scene.
    ///
    /// # Panics
    ///
    /// Panics if `config` does not validate.
    pub fn with_config(kinds: KindTable, config: SceneConfig) -> Self {
        if let Err(e) = config.validate() {
            panic!("{e}");
        }
        Self {
            kinds,
            entities: HandlePool::with_capacity(config.initial_entity_capacity),
            nodes: Vec::with_capacity(config.initial_entity_capacity),
            config,
            pools: Vec::new(),
            pool_index: HashMap::new(),
            schedule: Schedule::default(),
        }
    }

    /// The kind table this scene was built with.
    pub fn kinds(&self) -> &KindTable {
        &self.kinds
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// The kind registered for `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    pub fn kind<T: 'static>(&self) -> ComponentKind {
        self.kinds.kind::<T>()
    }

    // -- pool management ----------------------------------------------------

    /// Find or create the pool for `archetype`.
    fn get_or_create_pool(&mut self, archetype: Archetype) -> PoolId {
        if let Some(&id) = self.pool_index.get(&archetype) {
            return id;
        }
        let id = PoolId(self.pools.len() as u32);
        let pool = ComponentPool::new(id, archetype, &self.kinds, self.config.initial_pool_capacity);
        tracing::debug!(
            pool = id.0,
            components = ?self.kinds.names_of(archetype),
            stride = pool.stride(),
            "component pool created"
        );
        self.pools.push(pool);
        self.pool_index.insert(archetype, id);
        id
    }

    /// The pool holding exactly `archetype`, if one was created.
    pub fn pool_for(&self, archetype: Archetype) -> Option<PoolId> {
        self.pool_index.get(&archetype).copied()
    }

    pub fn pool(&self, id: PoolId) -> &ComponentPool {
        &self.pools[id.index()]
    }

    /// All pools in creation order, empty ones included.
    pub fn pools(&self) -> &[ComponentPool] {
        &self.pools
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Pools with no live slot. Pools are never reclaimed, so this grows with
    /// the number of transient archetypes a scene has seen.
    pub fn empty_pool_count(&self) -> usize {
        self.pools.iter().filter(|p| p.is_empty()).count()
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an entity whose components start at their default values.
    ///
    /// # Panics
    ///
    /// Panics if `archetype` is empty or names an unregistered kind.
    pub fn entity_new(&mut self, archetype: Archetype) -> Entity {
        assert!(!archetype.is_empty(), "an entity needs at least one component");
        let pool = self.get_or_create_pool(archetype);
        let slot = self.pools[pool.index()].new_slot(&self.kinds);
        let entity = Entity::from_handle(self.entities.allocate());

        let idx = entity.index() as usize;
        if idx >= self.nodes.len() {
            self.nodes.resize_with(idx + 1, || None);
        }
        self.nodes[idx] = Some(EntityNode::new(entity, archetype, pool, slot));
        tracing::trace!(%entity, ?archetype, "entity created");
        entity
    }

    /// Create an entity and parent it under `parent`.
    pub fn spawn_child(&mut self, parent: Entity, archetype: Archetype) -> Entity {
        let child = self.entity_new(archetype);
        self.set_parent(child, Some(parent));
        child
    }

    /// Remove an entity, running release hooks for its components.
    ///
    /// The entity is detached from its parent; its children become roots and
    /// are marked dirty.
    pub fn entity_remove(&mut self, entity: Entity) {
        let node = self.take_node(entity);
        if let Some(parent) = node.parent {
            let parent_node = self.node_mut(parent);
            parent_node.remove_child(entity);
            parent_node.dirty = true;
        }
        for &child in &node.children {
            let child_node = self.node_mut(child);
            child_node.parent = None;
            child_node.dirty = true;
        }
        self.pools[node.pool.index()].remove_slot(node.slot, &self.kinds);
        self.entities.release(entity.handle());
        tracing::trace!(%entity, orphaned = node.children.len(), "entity removed");
    }

    /// Remove an entity and all of its descendants.
    pub fn entity_remove_recursive(&mut self, entity: Entity) {
        let mut order = Vec::new();
        let mut stack = vec![entity];
        while let Some(e) = stack.pop() {
            order.push(e);
            stack.extend_from_slice(&self.node(e).children);
        }
        // Pre-order reversed: every descendant goes before its ancestors.
        for e in order.into_iter().rev() {
            self.entity_remove(e);
        }
    }

    /// Remove every entity, running release hooks. Pools survive, empty.
    pub fn clear(&mut self) {
        for node in self.nodes.iter().flatten() {
            let pool = &self.pools[node.pool.index()];
            for kind in node.archetype.kinds() {
                self.kinds.release(kind, pool.bytes(node.slot, kind));
            }
        }
        for pool in &mut self.pools {
            pool.clear();
        }
        self.nodes.clear();
        self.entities.clear();
    }

    /// Whether `entity` refers to a live entity.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_valid(entity.handle())
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Live entities, in no stable order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.live().iter().map(|h| Entity::from_handle(*h))
    }

    /// The bookkeeping row of a live entity.
    ///
    /// # Panics
    ///
    /// Panics if the entity's index has no node. In debug builds, also panics
    /// on a stale handle whose index was reused.
    pub fn node(&self, entity: Entity) -> &EntityNode {
        debug_assert!(self.is_alive(entity), "stale entity {entity:?}");
        match self.nodes.get(entity.index() as usize).and_then(Option::as_ref) {
            Some(node) => node,
            None => panic!("entity {entity:?} does not exist"),
        }
    }

    pub(crate) fn node_mut(&mut self, entity: Entity) -> &mut EntityNode {
        debug_assert!(self.is_alive(entity), "stale entity {entity:?}");
        match self.nodes.get_mut(entity.index() as usize).and_then(Option::as_mut) {
            Some(node) => node,
            None => panic!("entity {entity:?} does not exist"),
        }
    }

    fn take_node(&mut self, entity: Entity) -> EntityNode {
        debug_assert!(self.is_alive(entity), "stale entity {entity:?}");
        match self.nodes.get_mut(entity.index() as usize).and_then(Option::take) {
            Some(node) => node,
            None => panic!("entity {entity:?} does not exist"),
        }
    }

    /// The entity's current archetype.
    pub fn archetype_of(&self, entity: Entity) -> Archetype {
        self.node(entity).archetype
    }

    /// Whether `entity` is alive and has every kind in `mask`.
    pub fn has_components(&self, entity: Entity, mask: Archetype) -> bool {
        self.is_alive(entity) && self.node(entity).archetype.contains_all(mask)
    }

    // -- archetype migration ------------------------------------------------

    /// Add component kinds to an entity. New components start at their
    /// default values; existing ones keep their bytes.
    ///
    /// A no-op (logged) if the entity already has every kind in `additional`.
    pub fn entity_add_component(&mut self, entity: Entity, additional: Archetype) {
        let old = self.node(entity).archetype;
        let new = old | additional;
        if new == old {
            tracing::warn!(%entity, ?additional, "entity already has every requested component");
            return;
        }
        self.migrate(entity, new);
    }

    /// Remove component kinds from an entity, running release hooks for the
    /// removed kinds only.
    ///
    /// A no-op (logged) if the entity has none of them, or if the removal
    /// would leave the entity with no components.
    pub fn entity_remove_components(&mut self, entity: Entity, removed: Archetype) {
        let old = self.node(entity).archetype;
        let new = old - removed;
        if new == old {
            tracing::warn!(%entity, ?removed, "entity has none of the components to remove");
            return;
        }
        if new.is_empty() {
            tracing::warn!(%entity, ?removed, "refusing to remove every component of an entity");
            return;
        }
        self.migrate(entity, new);
    }

    /// Move an entity's components into the pool for `new`.
    ///
    /// Shared kinds are copied by kind (offsets differ between pools), kinds
    /// only in the old archetype are released, and the old slot is retired.
    /// The entity node is updated last, after both pools are consistent.
    fn migrate(&mut self, entity: Entity, new: Archetype) {
        let (old_pool, old_slot, old) = {
            let node = self.node(entity);
            (node.pool, node.slot, node.archetype)
        };
        let dst = self.get_or_create_pool(new);
        let new_slot = self.pools[dst.index()].new_slot(&self.kinds);

        let (src_pool, dst_pool) = pool_pair_mut(&mut self.pools, old_pool.index(), dst.index());
        for kind in (old & new).kinds() {
            dst_pool
                .bytes_mut(new_slot, kind)
                .copy_from_slice(src_pool.bytes(old_slot, kind));
        }
        for kind in (old - new).kinds() {
            self.kinds.release(kind, src_pool.bytes(old_slot, kind));
        }
        src_pool.retire_slot(old_slot);

        let node = self.node_mut(entity);
        node.archetype = new;
        node.pool = dst;
        node.slot = new_slot;
        tracing::trace!(%entity, from = ?old, to = ?new, "entity migrated");
    }

    // -- component access ---------------------------------------------------

    /// A component of `entity`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered or the entity lacks it.
    pub fn component_get<T: Component>(&self, entity: Entity) -> &T {
        let kind = self.kinds.kind::<T>();
        let node = self.node(entity);
        self.assert_has(node, kind);
        self.pools[node.pool.index()].get(node.slot, kind)
    }

    /// A component of `entity`, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered or the entity lacks it.
    pub fn component_get_mut<T: Component>(&mut self, entity: Entity) -> &mut T {
        let kind = self.kinds.kind::<T>();
        let node = self.node(entity);
        self.assert_has(node, kind);
        let (pool, slot) = (node.pool, node.slot);
        self.pools[pool.index()].get_mut(slot, kind)
    }

    /// The raw bytes of one component of `entity`.
    pub fn component_bytes(&self, entity: Entity, kind: ComponentKind) -> &[u8] {
        let node = self.node(entity);
        self.assert_has(node, kind);
        self.pools[node.pool.index()].bytes(node.slot, kind)
    }

    /// The raw bytes of one component of `entity`, mutably.
    pub fn component_bytes_mut(&mut self, entity: Entity, kind: ComponentKind) -> &mut [u8] {
        let node = self.node(entity);
        self.assert_has(node, kind);
        let (pool, slot) = (node.pool, node.slot);
        self.pools[pool.index()].bytes_mut(slot, kind)
    }

    /// Set a component, adding its kind first if the entity lacks it.
    pub fn insert_component<T: Component>(&mut self, entity: Entity, value: T) {
        let kind = self.kinds.kind::<T>();
        let old = self.node(entity).archetype;
        if !old.contains(kind) {
            self.migrate(entity, old.with(kind));
        }
        *self.component_get_mut::<T>(entity) = value;
    }

    /// Checked variant of [`component_get`](Self::component_get).
    pub fn try_component<T: Component>(&self, entity: Entity) -> Result<&T, SceneError> {
        let kind = self.checked_kind::<T>(entity)?;
        let node = self.node(entity);
        Ok(self.pools[node.pool.index()].get(node.slot, kind))
    }

    /// Checked variant of [`component_get_mut`](Self::component_get_mut).
    pub fn try_component_mut<T: Component>(
        &mut self,
        entity: Entity,
    ) -> Result<&mut T, SceneError> {
        let kind = self.checked_kind::<T>(entity)?;
        let node = self.node(entity);
        let (pool, slot) = (node.pool, node.slot);
        Ok(self.pools[pool.index()].get_mut(slot, kind))
    }

    fn checked_kind<T: 'static>(&self, entity: Entity) -> Result<ComponentKind, SceneError> {
        let kind = self
            .kinds
            .lookup::<T>()
            .ok_or_else(|| SceneError::UnknownComponent {
                name: type_name::<T>().to_owned(),
                registered: self.kinds.registered_names().join(", "),
            })?;
        if !self.is_alive(entity) {
            return Err(SceneError::StaleEntity { entity });
        }
        if !self.node(entity).archetype.contains(kind) {
            return Err(SceneError::MissingComponent {
                entity,
                component: self.kinds.info(kind).name.clone(),
            });
        }
        Ok(kind)
    }

    fn assert_has(&self, node: &EntityNode, kind: ComponentKind) {
        assert!(
            node.archetype.contains(kind),
            "entity {:?} has no '{}' component",
            node.entity,
            self.kinds.info(kind).name
        );
    }

    // -- introspection ------------------------------------------------------

    /// Occupancy of every pool.
    pub fn stats(&self) -> SceneStats {
        SceneStats {
            entity_count: self.entity_count(),
            pool_count: self.pools.len(),
            empty_pool_count: self.empty_pool_count(),
            pools: self
                .pools
                .iter()
                .map(|pool| PoolStats {
                    id: pool.id(),
                    components: self
                        .kinds
                        .names_of(pool.archetype())
                        .into_iter()
                        .map(str::to_owned)
                        .collect(),
                    len: pool.len(),
                    capacity: pool.capacity(),
                    stride: pool.stride(),
                })
                .collect(),
        }
    }
}

impl Drop for Scene {
    /// Release every resource reference still held by live components.
    fn drop(&mut self) {
        self.clear();
    }
}

/// Mutable borrows of two distinct pools.
fn pool_pair_mut(
    pools: &mut [ComponentPool],
    a: usize,
    b: usize,
) -> (&mut ComponentPool, &mut ComponentPool) {
    assert_ne!(a, b, "migration source and destination are the same pool");
    if a < b {
        let (lo, hi) = pools.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = pools.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
