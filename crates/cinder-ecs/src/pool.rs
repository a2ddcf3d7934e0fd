//! Packed byte storage for all entities that share one archetype.
//!
//! A [`ComponentPool`] owns a [`HandlePool`] for its slots and a byte buffer
//! of `stride * capacity`. The slot for handle `h` starts at
//! `h.index() * stride`; inside it, every component kind of the archetype sits
//! at the offset its [`SlotLayout`] assigned. All components of one entity are
//! therefore contiguous (row layout), which keeps migration a handful of byte
//! copies.
//!
//! Returned slices and references borrow the pool. Growing the pool
//! reallocates the buffer, so nothing may be held across [`ComponentPool::new_slot`].

use bytemuck::Pod;
use serde::Serialize;

use crate::archetype::{Archetype, SlotLayout, SLOT_ALIGN};
use crate::component::{ComponentKind, KindTable};
use crate::handle::{Handle, HandlePool};

// ---------------------------------------------------------------------------
// PoolId
// ---------------------------------------------------------------------------

/// Identifies a pool within a scene. Index into the scene's pool list, in
/// creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PoolId(pub(crate) u32);

impl PoolId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Block -- the unit of the backing buffer
// ---------------------------------------------------------------------------

/// One aligned chunk of slot storage. Keeping the buffer as `Vec<Block>`
/// guarantees every slot and every component offset is `SLOT_ALIGN`-aligned.
#[repr(C, align(16))]
#[derive(Clone, Copy)]
struct Block([u8; SLOT_ALIGN]);

// Safety: `Block` is a byte array with no padding (size == align == 16), so
// every bit pattern is valid and zero is a valid value.
#[allow(unsafe_code)]
unsafe impl bytemuck::Zeroable for Block {}
#[allow(unsafe_code)]
unsafe impl bytemuck::Pod for Block {}

const ZERO_BLOCK: Block = Block([0; SLOT_ALIGN]);

// ---------------------------------------------------------------------------
// ComponentPool
// ---------------------------------------------------------------------------

/// Slot storage for one [`Archetype`].
#[derive(Clone)]
pub struct ComponentPool {
    id: PoolId,
    layout: SlotLayout,
    handles: HandlePool,
    data: Vec<Block>,
}

impl ComponentPool {
    /// Create a pool for `archetype` with room for `capacity` slots.
    pub fn new(id: PoolId, archetype: Archetype, kinds: &KindTable, capacity: usize) -> Self {
        let layout = SlotLayout::compute(archetype, kinds);
        let handles = HandlePool::with_capacity(capacity);
        let mut pool = Self {
            id,
            layout,
            handles,
            data: Vec::new(),
        };
        pool.data.resize(pool.blocks_for(capacity), ZERO_BLOCK);
        pool
    }

    #[inline]
    pub fn id(&self) -> PoolId {
        self.id
    }

    #[inline]
    pub fn archetype(&self) -> Archetype {
        self.layout.archetype()
    }

    #[inline]
    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    /// Bytes per slot.
    #[inline]
    pub fn stride(&self) -> usize {
        self.layout.stride()
    }

    /// Number of occupied slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of slots the buffer holds before the next growth.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.handles.capacity()
    }

    /// Whether `slot` is a live handle of this pool.
    #[inline]
    pub fn is_valid(&self, slot: Handle) -> bool {
        self.handles.is_valid(slot)
    }

    /// The live slot at dense position `pos`.
    #[inline]
    pub fn handle_at(&self, pos: usize) -> Handle {
        self.handles.handle_at(pos)
    }

    /// The live slots, in swap-remove order.
    #[inline]
    pub fn slots(&self) -> &[Handle] {
        self.handles.live()
    }

    fn blocks_for(&self, slots: usize) -> usize {
        self.layout.stride() / SLOT_ALIGN * slots
    }

    fn buffer(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    fn buffer_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.data)
    }

    // -- slot lifecycle -----------------------------------------------------

    /// Allocate a slot and fill it with each kind's default value.
    ///
    /// Grows the buffer (capacity doubling) when the handle pool grew;
    /// existing slot bytes are preserved.
    pub fn new_slot(&mut self, kinds: &KindTable) -> Handle {
        let old_cap = self.handles.capacity();
        let slot = self.handles.allocate();
        let new_cap = self.handles.capacity();
        if new_cap != old_cap {
            self.data.resize(self.blocks_for(new_cap), ZERO_BLOCK);
            tracing::debug!(
                pool = self.id.0,
                archetype = ?self.archetype(),
                old_cap,
                new_cap,
                "component pool grew"
            );
        }
        for kind in self.archetype().kinds() {
            let defaults = &kinds.info(kind).default_bytes;
            self.bytes_mut(slot, kind).copy_from_slice(defaults);
        }
        slot
    }

    /// Destroy a slot: run release hooks for every kind that owns a resource,
    /// then free and zero the slot.
    pub fn remove_slot(&mut self, slot: Handle, kinds: &KindTable) {
        assert!(self.is_valid(slot), "remove of invalid slot {slot:?}");
        for kind in self.archetype().kinds() {
            kinds.release(kind, self.bytes(slot, kind));
        }
        self.retire_slot(slot);
    }

    /// Free and zero a slot without running release hooks. Used when the
    /// slot's components have moved to another pool.
    pub(crate) fn retire_slot(&mut self, slot: Handle) {
        self.handles.release(slot);
        let range = self.slot_range(slot);
        self.buffer_mut()[range].fill(0);
    }

    /// Free every slot without running release hooks.
    pub(crate) fn clear(&mut self) {
        self.handles.clear();
        self.data.fill(ZERO_BLOCK);
    }

    // -- addressing ---------------------------------------------------------

    fn slot_range(&self, slot: Handle) -> std::ops::Range<usize> {
        let start = slot.index() as usize * self.stride();
        start..start + self.stride()
    }

    /// Byte offset of `kind` for `slot` within the pool's buffer.
    ///
    /// # Panics
    ///
    /// Panics if `kind` is not part of this pool's archetype. In debug builds,
    /// also panics if `slot` is not live.
    #[inline]
    pub fn data_of(&self, slot: Handle, kind: ComponentKind) -> usize {
        debug_assert!(self.is_valid(slot), "stale slot {slot:?} in pool {:?}", self.id);
        slot.index() as usize * self.stride() + self.layout.view(kind).offset
    }

    /// The bytes of one slot.
    pub fn slot_bytes(&self, slot: Handle) -> &[u8] {
        debug_assert!(self.is_valid(slot), "stale slot {slot:?} in pool {:?}", self.id);
        &self.buffer()[self.slot_range(slot)]
    }

    /// The bytes of `kind` in `slot`.
    #[inline]
    pub fn bytes(&self, slot: Handle, kind: ComponentKind) -> &[u8] {
        let start = self.data_of(slot, kind);
        let size = self.layout.view(kind).size;
        &self.buffer()[start..start + size]
    }

    /// The bytes of `kind` in `slot`, mutably.
    #[inline]
    pub fn bytes_mut(&mut self, slot: Handle, kind: ComponentKind) -> &mut [u8] {
        let start = self.data_of(slot, kind);
        let size = self.layout.view(kind).size;
        &mut self.buffer_mut()[start..start + size]
    }

    /// `kind` in `slot` as a `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T`'s size differs from the stored kind's size.
    #[inline]
    pub fn get<T: Pod>(&self, slot: Handle, kind: ComponentKind) -> &T {
        bytemuck::from_bytes(self.bytes(slot, kind))
    }

    /// `kind` in `slot` as a mutable `T`.
    #[inline]
    pub fn get_mut<T: Pod>(&mut self, slot: Handle, kind: ComponentKind) -> &mut T {
        bytemuck::from_bytes_mut(self.bytes_mut(slot, kind))
    }
}

impl std::fmt::Debug for ComponentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentPool")
            .field("id", &self.id)
            .field("archetype", &self.archetype())
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("stride", &self.stride())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
