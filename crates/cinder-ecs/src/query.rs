//! Iterating entities by component set.
//!
//! A query names a component mask and visits every live slot of every pool
//! whose archetype is a superset of that mask. Pools are walked in creation
//! order and slots in the pool's dense order, which is swap-remove order and
//! changes whenever an entity leaves the pool.
//!
//! Two front ends share the same matching rule:
//!
//! - [`QueryCursor`], driven by [`Scene::iter_begin`] / [`Scene::iter_next`].
//!   The cursor is a plain value, so a system can interleave reads and writes
//!   through the scene while iterating.
//! - [`Scene::query`] (shared rows as an [`Iterator`]) and
//!   [`Scene::query_for_each_mut`] (mutable rows through a closure).
//!
//! Nothing is cached between passes. Creating, removing or migrating entities
//! during a pass is not supported: the cursor does not notice, and may skip or
//! revisit slots.

use crate::archetype::Archetype;
use crate::component::{Component, ComponentKind, KindTable};
use crate::entity::Entity;
use crate::handle::Handle;
use crate::pool::{ComponentPool, PoolId};
use crate::scene::Scene;

// ---------------------------------------------------------------------------
// QueryCursor
// ---------------------------------------------------------------------------

/// Position of an in-progress query: a pool and a dense position inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryCursor {
    mask: Archetype,
    pool: usize,
    pos: usize,
    valid: bool,
}

impl QueryCursor {
    /// Whether the cursor points at a live row. False once exhausted.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    pub fn mask(&self) -> Archetype {
        self.mask
    }

    /// The pool the cursor is in.
    #[inline]
    pub fn pool(&self) -> PoolId {
        PoolId(self.pool as u32)
    }

    /// Dense position inside the current pool.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    fn exhausted(mask: Archetype) -> Self {
        Self {
            mask,
            pool: 0,
            pos: 0,
            valid: false,
        }
    }
}

impl Scene {
    /// Index of the first non-empty pool at or after `from` that matches.
    fn next_matching_pool(&self, mask: Archetype, from: usize) -> Option<usize> {
        self.pools
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, pool)| !pool.is_empty() && pool.archetype().contains_all(mask))
            .map(|(i, _)| i)
    }

    /// Start a query. The returned cursor is already positioned at the first
    /// match, or is invalid if nothing matches.
    pub fn iter_begin(&self, mask: Archetype) -> QueryCursor {
        match self.next_matching_pool(mask, 0) {
            Some(pool) => QueryCursor {
                mask,
                pool,
                pos: 0,
                valid: true,
            },
            None => QueryCursor::exhausted(mask),
        }
    }

    /// Advance to the next match. Returns `false`, and invalidates the
    /// cursor, when there are none left.
    pub fn iter_next(&self, cursor: &mut QueryCursor) -> bool {
        if !cursor.valid {
            return false;
        }
        cursor.pos += 1;
        if cursor.pos < self.pools[cursor.pool].len() {
            return true;
        }
        match self.next_matching_pool(cursor.mask, cursor.pool + 1) {
            Some(pool) => {
                cursor.pool = pool;
                cursor.pos = 0;
                true
            }
            None => {
                *cursor = QueryCursor::exhausted(cursor.mask);
                false
            }
        }
    }

    fn cursor_pool(&self, cursor: &QueryCursor) -> &ComponentPool {
        assert!(cursor.valid, "query cursor is exhausted");
        &self.pools[cursor.pool]
    }

    /// The pool slot under the cursor.
    pub fn iter_slot(&self, cursor: &QueryCursor) -> Handle {
        self.cursor_pool(cursor).handle_at(cursor.pos)
    }

    /// The component `T` of the row under the cursor.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is exhausted or the current pool lacks `T`.
    pub fn iter_get<T: Component>(&self, cursor: &QueryCursor) -> &T {
        let kind = self.kinds().kind::<T>();
        let pool = self.cursor_pool(cursor);
        pool.get(pool.handle_at(cursor.pos), kind)
    }

    /// Mutable variant of [`iter_get`](Self::iter_get).
    pub fn iter_get_mut<T: Component>(&mut self, cursor: &QueryCursor) -> &mut T {
        let kind = self.kinds().kind::<T>();
        let slot = self.iter_slot(cursor);
        self.pools[cursor.pool].get_mut(slot, kind)
    }

    /// Raw bytes of `kind` in the row under the cursor.
    pub fn iter_bytes(&self, cursor: &QueryCursor, kind: ComponentKind) -> &[u8] {
        let pool = self.cursor_pool(cursor);
        pool.bytes(pool.handle_at(cursor.pos), kind)
    }

    /// The entity owning the row under the cursor.
    ///
    /// Slots keep no back-pointer, so this scans the entity table: O(entities).
    pub fn iter_get_entity(&self, cursor: &QueryCursor) -> Entity {
        let slot = self.iter_slot(cursor);
        self.entity_at(PoolId(cursor.pool as u32), slot)
    }

    /// The entity stored at `slot` of `pool`. O(entities).
    fn entity_at(&self, pool: PoolId, slot: Handle) -> Entity {
        self.nodes
            .iter()
            .flatten()
            .find(|node| node.pool == pool && node.slot == slot)
            .map(|node| node.entity)
            .unwrap_or_else(|| panic!("no entity owns slot {slot:?} of pool {pool:?}"))
    }

    // -- iterator front end -------------------------------------------------

    /// Every row matching `mask`.
    ///
    /// ```
    /// use cinder_ecs::prelude::*;
    ///
    /// let mut scene = Scene::new(KindTable::new());
    /// let t = Archetype::of(ComponentKind::TRANSFORM);
    /// for i in 0..3 {
    ///     let e = scene.entity_new(t);
    ///     scene.component_get_mut::<Transform>(e).translation.x = i as f32;
    /// }
    /// let sum: f32 = scene.query(t).map(|row| row.get::<Transform>().translation.x).sum();
    /// assert_eq!(sum, 3.0);
    /// ```
    pub fn query(&self, mask: Archetype) -> QueryIter<'_> {
        QueryIter {
            scene: self,
            cursor: self.iter_begin(mask),
        }
    }

    /// Number of rows matching `mask`.
    pub fn query_count(&self, mask: Archetype) -> usize {
        self.pools
            .iter()
            .filter(|pool| pool.archetype().contains_all(mask))
            .map(ComponentPool::len)
            .sum()
    }

    /// Call `f` with a mutable view of every row matching `mask`.
    pub fn query_for_each_mut<F>(&mut self, mask: Archetype, mut f: F)
    where
        F: FnMut(QueryRowMut<'_>),
    {
        let kinds = &self.kinds;
        for pool in self.pools.iter_mut() {
            if !pool.archetype().contains_all(mask) {
                continue;
            }
            for pos in 0..pool.len() {
                let slot = pool.handle_at(pos);
                f(QueryRowMut { kinds, pool: &mut *pool, slot });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Iterator returned by [`Scene::query`].
pub struct QueryIter<'s> {
    scene: &'s Scene,
    cursor: QueryCursor,
}

impl<'s> Iterator for QueryIter<'s> {
    type Item = QueryRow<'s>;

    fn next(&mut self) -> Option<QueryRow<'s>> {
        if !self.cursor.is_valid() {
            return None;
        }
        let pool = &self.scene.pools[self.cursor.pool];
        let row = QueryRow {
            scene: self.scene,
            pool,
            slot: pool.handle_at(self.cursor.pos),
        };
        self.scene.iter_next(&mut self.cursor);
        Some(row)
    }
}

/// One matching row, borrowed from the scene.
#[derive(Clone, Copy)]
pub struct QueryRow<'s> {
    scene: &'s Scene,
    pool: &'s ComponentPool,
    slot: Handle,
}

impl<'s> QueryRow<'s> {
    /// Component `T` of this row.
    pub fn get<T: Component>(&self) -> &'s T {
        self.pool.get(self.slot, self.scene.kinds.kind::<T>())
    }

    pub fn bytes(&self, kind: ComponentKind) -> &'s [u8] {
        self.pool.bytes(self.slot, kind)
    }

    pub fn slot(&self) -> Handle {
        self.slot
    }

    /// The pool's full archetype, which may exceed the query mask.
    pub fn archetype(&self) -> Archetype {
        self.pool.archetype()
    }

    /// The owning entity. O(entities).
    pub fn entity(&self) -> Entity {
        self.scene.entity_at(self.pool.id(), self.slot)
    }
}

/// One matching row with write access, passed to
/// [`Scene::query_for_each_mut`].
pub struct QueryRowMut<'a> {
    kinds: &'a KindTable,
    pool: &'a mut ComponentPool,
    slot: Handle,
}

impl QueryRowMut<'_> {
    pub fn get<T: Component>(&self) -> &T {
        self.pool.get(self.slot, self.kinds.kind::<T>())
    }

    pub fn get_mut<T: Component>(&mut self) -> &mut T {
        let kind = self.kinds.kind::<T>();
        self.pool.get_mut(self.slot, kind)
    }

    pub fn bytes_mut(&mut self, kind: ComponentKind) -> &mut [u8] {
        self.pool.bytes_mut(self.slot, kind)
    }

    pub fn slot(&self) -> Handle {
        self.slot
    }

    pub fn archetype(&self) -> Archetype {
        self.pool.archetype()
    }
}
