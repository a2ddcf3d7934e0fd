//! Counted resource references held by components.
//!
//! Meshes, materials and similar assets live outside the scene. A component
//! that points at one stores a [`ResourceId`] and implements
//! [`CountedResource`]; when such a component is destroyed the scene tells a
//! [`ResourceCounter`] to drop one reference. The scene never loads or frees
//! assets itself.

use std::cell::RefCell;
use std::collections::HashMap;

use bytemuck_derive::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Identifier of an external resource. `0` means "no resource".
#[repr(transparent)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
pub struct ResourceId(pub u32);

impl ResourceId {
    pub const NONE: ResourceId = ResourceId(0);
}

/// A component value that holds one counted resource reference.
pub trait CountedResource {
    /// The referenced resource, or [`ResourceId::NONE`].
    fn resource(&self) -> ResourceId;
}

/// The reference-counting side of a resource manager.
///
/// Methods take `&self`: a counter is shared between the kind table's release
/// hooks and whoever loads resources.
pub trait ResourceCounter {
    /// Add one reference.
    fn retain(&self, id: ResourceId);
    /// Drop one reference.
    fn release(&self, id: ResourceId);
}

/// A plain in-memory [`ResourceCounter`].
#[derive(Debug, Default)]
pub struct RefCounts {
    counts: RefCell<HashMap<ResourceId, u32>>,
}

impl RefCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current reference count of `id` (0 if unknown).
    pub fn count(&self, id: ResourceId) -> u32 {
        self.counts.borrow().get(&id).copied().unwrap_or(0)
    }

    /// Number of resources with at least one reference.
    pub fn live(&self) -> usize {
        self.counts.borrow().len()
    }
}

impl ResourceCounter for RefCounts {
    fn retain(&self, id: ResourceId) {
        *self.counts.borrow_mut().entry(id).or_insert(0) += 1;
    }

    fn release(&self, id: ResourceId) {
        let mut counts = self.counts.borrow_mut();
        match counts.get_mut(&id) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                counts.remove(&id);
                tracing::trace!(resource = id.0, "last reference released");
            }
            None => tracing::warn!(resource = id.0, "release of unreferenced resource"),
        }
    }
}
