//! Parent/child links, dirty flags and world-transform propagation.
//!
//! The hierarchy is a forest stored in the [`EntityNode`](crate::entity::EntityNode)
//! rows: each node holds its parent and an ordered child list. World matrices
//! are cached in each entity's [`Transform`] and are only refreshed by
//! [`Scene::update_hierarchy`]. Nothing marks entities dirty automatically; a
//! system that edits a local transform calls [`Scene::mark_dirty`], and the two
//! built-in systems ([`update_dirty_system`], [`clear_dirty_system`]) sweep
//! once per frame.
//!
//! ```
//! use cinder_ecs::prelude::*;
//!
//! let mut scene = Scene::new(KindTable::new());
//! let t = Archetype::of(ComponentKind::TRANSFORM);
//! let root = scene.entity_new(t);
//! let child = scene.spawn_child(root, t);
//! scene.component_get_mut::<Transform>(root).translation.x = 10.0;
//! scene.component_get_mut::<Transform>(child).translation.x = 1.0;
//! scene.update_hierarchy(root);
//! assert_eq!(scene.component_get::<Transform>(child).world_translation().x, 11.0);
//! ```

use std::collections::VecDeque;

use glam::Mat4;

use crate::component::ComponentKind;
use crate::entity::Entity;
use crate::scene::Scene;
use crate::system::{FrameContext, SystemFlow};
use crate::transform::Transform;

impl Scene {
    // -- links --------------------------------------------------------------

    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.node(entity).parent
    }

    /// Direct children, in the order they were attached.
    pub fn children(&self, entity: Entity) -> &[Entity] {
        &self.node(entity).children
    }

    /// Attach `child` under `new_parent`, or make it a root with `None`.
    ///
    /// If `new_parent` is a descendant of `child`, `child`'s own children are
    /// first handed to `child`'s current parent, so no cycle can form. The
    /// child, its old parent and its new parent are all marked dirty.
    ///
    /// Self-parenting and re-parenting to the current parent are logged
    /// no-ops.
    pub fn set_parent(&mut self, child: Entity, new_parent: Option<Entity>) {
        if new_parent == Some(child) {
            tracing::warn!(entity = %child, "refusing to parent an entity to itself");
            return;
        }
        let old_parent = self.node(child).parent;
        if old_parent == new_parent {
            tracing::warn!(entity = %child, parent = ?new_parent, "entity already has this parent");
            return;
        }

        if let Some(parent) = new_parent {
            if self.is_descendant_of(parent, child) {
                self.hoist_children(child, old_parent);
            }
        }

        if let Some(old) = old_parent {
            let node = self.node_mut(old);
            node.remove_child(child);
            node.dirty = true;
        }
        if let Some(parent) = new_parent {
            let node = self.node_mut(parent);
            node.add_child(child);
            node.dirty = true;
        }
        let node = self.node_mut(child);
        node.parent = new_parent;
        node.dirty = true;
        tracing::trace!(entity = %child, from = ?old_parent, to = ?new_parent, "entity re-parented");
    }

    /// Move every child of `entity` under `target`, leaving `entity` childless.
    fn hoist_children(&mut self, entity: Entity, target: Option<Entity>) {
        let orphans = std::mem::take(&mut self.node_mut(entity).children);
        for &orphan in &orphans {
            let node = self.node_mut(orphan);
            node.parent = target;
            node.dirty = true;
            if let Some(target) = target {
                self.node_mut(target).add_child(orphan);
            }
        }
        tracing::debug!(
            %entity,
            hoisted = orphans.len(),
            new_parent = ?target,
            "re-parent under a descendant; children hoisted to break the cycle"
        );
    }

    /// Whether `root` is a strict ancestor of `candidate`. An entity is not
    /// its own descendant.
    pub fn is_descendant_of(&self, candidate: Entity, root: Entity) -> bool {
        let mut cursor = self.node(candidate).parent;
        while let Some(ancestor) = cursor {
            if ancestor == root {
                return true;
            }
            cursor = self.node(ancestor).parent;
        }
        false
    }

    // -- dirty flags --------------------------------------------------------

    /// Flag `entity` for recomputation by the next hierarchy sweep.
    pub fn mark_dirty(&mut self, entity: Entity) {
        self.node_mut(entity).dirty = true;
    }

    pub fn is_dirty(&self, entity: Entity) -> bool {
        self.node(entity).dirty
    }

    pub fn clear_dirty(&mut self, entity: Entity) {
        self.node_mut(entity).dirty = false;
    }

    /// Every live entity whose dirty flag is set, in entity-index order.
    pub fn dirty_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.nodes
            .iter()
            .flatten()
            .filter(|node| node.dirty)
            .map(|node| node.entity)
    }

    fn has_dirty_ancestor(&self, entity: Entity) -> bool {
        let mut cursor = self.node(entity).parent;
        while let Some(ancestor) = cursor {
            let node = self.node(ancestor);
            if node.dirty {
                return true;
            }
            cursor = node.parent;
        }
        false
    }

    // -- propagation --------------------------------------------------------

    /// Recompute `entity`'s local and world matrices, then those of every
    /// descendant.
    ///
    /// A root uses its local matrix as its world matrix. Entities without a
    /// [`Transform`] are traversed but pass their parent's world matrix
    /// through unchanged. Dirty flags are left alone.
    pub fn update_hierarchy(&mut self, entity: Entity) {
        let mut queue = VecDeque::new();
        queue.push_back((entity, self.ancestor_world(entity)));

        // Parents are always dequeued before their children.
        while let Some((current, parent_world)) = queue.pop_front() {
            let node = self.node(current);
            let (pool, slot) = (node.pool, node.slot);
            let world = if node.archetype.contains(ComponentKind::TRANSFORM) {
                let transform: &mut Transform =
                    self.pools[pool.index()].get_mut(slot, ComponentKind::TRANSFORM);
                transform.recompute(parent_world);
                Some(transform.world)
            } else {
                parent_world
            };
            queue.extend(self.node(current).children.iter().map(|&c| (c, world)));
        }
    }

    /// World matrix of the nearest ancestor that has a [`Transform`].
    fn ancestor_world(&self, entity: Entity) -> Option<Mat4> {
        let mut cursor = self.node(entity).parent;
        while let Some(ancestor) = cursor {
            let node = self.node(ancestor);
            if node.archetype.contains(ComponentKind::TRANSFORM) {
                let transform: &Transform =
                    self.pools[node.pool.index()].get(node.slot, ComponentKind::TRANSFORM);
                return Some(transform.world);
            }
            cursor = node.parent;
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Built-in systems
// ---------------------------------------------------------------------------

/// Run [`Scene::update_hierarchy`] on every dirty entity that has no dirty
/// ancestor. Descendants are covered by their ancestor's pass.
pub fn update_dirty_system(scene: &mut Scene, _ctx: &FrameContext) -> SystemFlow {
    let tops: Vec<Entity> = scene
        .dirty_entities()
        .filter(|&e| !scene.has_dirty_ancestor(e))
        .collect();
    for entity in tops {
        scene.update_hierarchy(entity);
    }
    SystemFlow::Continue
}

/// Clear every dirty flag.
pub fn clear_dirty_system(scene: &mut Scene, _ctx: &FrameContext) -> SystemFlow {
    for node in scene.nodes.iter_mut().flatten() {
        node.dirty = false;
    }
    SystemFlow::Continue
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::archetype::Archetype;
    use crate::component::KindTable;
    use bytemuck_derive::{Pod, Zeroable};
    use glam::{Quat, Vec3};

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
    struct Marker(u32);

    const T: ComponentKind = ComponentKind::TRANSFORM;

    fn scene() -> Scene {
        let mut kinds = KindTable::new();
        kinds.register::<Marker>("marker");
        Scene::new(kinds)
    }

    fn spawn_at(scene: &mut Scene, x: f32) -> Entity {
        let e = scene.entity_new(Archetype::of(T));
        *scene.component_get_mut::<Transform>(e) = Transform::from_xyz(x, 0.0, 0.0);
        e
    }

    fn world_x(scene: &Scene, e: Entity) -> f32 {
        scene.component_get::<Transform>(e).world_translation().x
    }

    #[test]
    fn set_parent_links_both_ends_and_marks_dirty() {
        let mut s = scene();
        let p = spawn_at(&mut s, 0.0);
        let c = spawn_at(&mut s, 0.0);
        s.set_parent(c, Some(p));
        assert_eq!(s.parent(c), Some(p));
        assert_eq!(s.children(p), &[c]);
        assert!(s.is_dirty(p));
        assert!(s.is_dirty(c));
        assert!(s.is_descendant_of(c, p));
        assert!(!s.is_descendant_of(p, c));
    }

    #[test]
    fn self_parenting_is_ignored() {
        let mut s = scene();
        let e = spawn_at(&mut s, 0.0);
        s.set_parent(e, Some(e));
        assert_eq!(s.parent(e), None);
        assert!(!s.is_dirty(e));
    }

    #[test]
    fn reparent_to_current_parent_is_ignored() {
        let mut s = scene();
        let p = spawn_at(&mut s, 0.0);
        let c = s.spawn_child(p, Archetype::of(T));
        s.clear_dirty(p);
        s.clear_dirty(c);
        s.set_parent(c, Some(p));
        assert_eq!(s.children(p), &[c]);
        assert!(!s.is_dirty(c));
    }

    #[test]
    fn reparent_moves_between_parents() {
        let mut s = scene();
        let a = spawn_at(&mut s, 0.0);
        let b = spawn_at(&mut s, 0.0);
        let c = s.spawn_child(a, Archetype::of(T));
        s.set_parent(c, Some(b));
        assert!(s.children(a).is_empty());
        assert_eq!(s.children(b), &[c]);
        s.set_parent(c, None);
        assert!(s.children(b).is_empty());
        assert_eq!(s.parent(c), None);
    }

    #[test]
    fn parenting_under_descendant_hoists_children() {
        let mut s = scene();
        let root = spawn_at(&mut s, 0.0);
        let a = s.spawn_child(root, Archetype::of(T));
        let b = s.spawn_child(a, Archetype::of(T));
        let c = s.spawn_child(b, Archetype::of(T));

        // a -> b -> c; put a under c.
        s.set_parent(a, Some(c));

        assert_eq!(s.parent(b), Some(root));
        assert_eq!(s.parent(a), Some(c));
        assert_eq!(s.children(root), &[b]);
        assert!(!s.is_descendant_of(a, a));
        assert!(s.is_descendant_of(a, root));
        for e in [root, a, b, c] {
            assert!(!s.is_descendant_of(e, e));
        }
    }

    #[test]
    fn world_matrix_composes_parent_and_local() {
        let mut s = scene();
        let p = spawn_at(&mut s, 100.0);
        s.component_get_mut::<Transform>(p).rotation = Quat::from_rotation_z(0.5);
        let c = s.spawn_child(p, Archetype::of(T));
        s.component_get_mut::<Transform>(c).translation = Vec3::new(10.0, 2.0, 0.0);

        s.update_hierarchy(p);

        let pw = s.component_get::<Transform>(p).world;
        let ct = s.component_get::<Transform>(c);
        assert!(ct.world.abs_diff_eq(pw * ct.local, 1e-5));
    }

    #[test]
    fn deep_chain_accumulates() {
        let mut s = scene();
        let a = spawn_at(&mut s, 1.0);
        let b = s.spawn_child(a, Archetype::of(T));
        s.component_get_mut::<Transform>(b).translation.x = 2.0;
        let c = s.spawn_child(b, Archetype::of(T));
        s.component_get_mut::<Transform>(c).translation.x = 3.0;
        s.update_hierarchy(a);
        assert!((world_x(&s, c) - 6.0).abs() < 1e-5);
    }

    #[test]
    fn update_from_middle_uses_ancestor_world() {
        let mut s = scene();
        let a = spawn_at(&mut s, 5.0);
        let b = s.spawn_child(a, Archetype::of(T));
        s.update_hierarchy(a);
        s.component_get_mut::<Transform>(b).translation.x = 1.0;
        s.update_hierarchy(b);
        assert!((world_x(&s, b) - 6.0).abs() < 1e-5);
    }

    #[test]
    fn entities_without_transform_pass_world_through() {
        let mut s = scene();
        let marker = s.kind::<Marker>();
        let a = spawn_at(&mut s, 4.0);
        let mid = s.spawn_child(a, Archetype::of(marker));
        let leaf = s.spawn_child(mid, Archetype::of(T));
        s.component_get_mut::<Transform>(leaf).translation.x = 1.0;
        s.update_hierarchy(a);
        assert!((world_x(&s, leaf) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn removing_parent_orphans_children() {
        let mut s = scene();
        let p = spawn_at(&mut s, 0.0);
        let c = s.spawn_child(p, Archetype::of(T));
        s.clear_dirty(c);
        s.entity_remove(p);
        assert_eq!(s.parent(c), None);
        assert!(s.is_dirty(c));
    }

    #[test]
    fn removing_child_detaches_from_parent() {
        let mut s = scene();
        let p = spawn_at(&mut s, 0.0);
        let a = s.spawn_child(p, Archetype::of(T));
        let b = s.spawn_child(p, Archetype::of(T));
        s.entity_remove(a);
        assert_eq!(s.children(p), &[b]);
    }

    #[test]
    fn remove_recursive_takes_subtree() {
        let mut s = scene();
        let keep = spawn_at(&mut s, 0.0);
        let p = s.spawn_child(keep, Archetype::of(T));
        let c = s.spawn_child(p, Archetype::of(T));
        let g = s.spawn_child(c, Archetype::of(T));
        s.entity_remove_recursive(p);
        assert_eq!(s.entity_count(), 1);
        for e in [p, c, g] {
            assert!(!s.is_alive(e));
        }
        assert!(s.children(keep).is_empty());
    }

    #[test]
    fn dirty_systems_update_then_clear() {
        let mut s = scene();
        let p = spawn_at(&mut s, 3.0);
        let c = s.spawn_child(p, Archetype::of(T));
        s.component_get_mut::<Transform>(c).translation.x = 1.0;
        let ctx = FrameContext::default();

        assert_eq!(update_dirty_system(&mut s, &ctx), SystemFlow::Continue);
        assert!((world_x(&s, c) - 4.0).abs() < 1e-5);
        assert_eq!(s.dirty_entities().count(), 2);

        clear_dirty_system(&mut s, &ctx);
        assert_eq!(s.dirty_entities().count(), 0);
    }
}
